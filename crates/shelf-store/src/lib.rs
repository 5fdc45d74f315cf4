//! # shelf-store
//!
//! Hierarchical key-value storage for the Shelf storefront.
//!
//! Data lives in a tree of named namespaces (`products/Cards/Birthday`)
//! whose leaves are byte entries. Callers address it with a [`Query`]
//! (path, optional key, optional value) and go through the [`Storer`]
//! trait; [`RedbStore`] implements it over an embedded redb database.
//!
//! ## Guarantees
//!
//! - Each mutating call is one write transaction: all or nothing.
//! - Reads see one consistent snapshot.
//! - [`Storer::backup`] streams a self-checking snapshot that
//!   [`RedbStore::restore`] applies atomically.

pub mod backup;
pub mod config;
pub mod engine;
pub mod error;
mod keys;
pub mod query;
pub mod traits;
mod tree;

pub use backup::{
    read_snapshot, verify_snapshot, SnapshotRecord, SnapshotSummary, SNAPSHOT_MAGIC,
    SNAPSHOT_VERSION,
};
pub use config::{StoreConfig, DEFAULT_NAMESPACES};
pub use engine::RedbStore;
pub use error::{StoreError, StoreResult};
pub use query::Query;
pub use traits::{BackupSink, Mutation, Storer};
