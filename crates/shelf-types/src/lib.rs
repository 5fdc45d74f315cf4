//! Domain types for the Shelf storefront.
//!
//! Every record persisted by the storage engine is described here. The
//! types carry no storage logic: repositories in `shelf-repo` decide where
//! each value lives and how it is serialized.
//!
//! # Key Types
//!
//! - [`Product`] — catalog entry keyed by its title inside a subcategory
//! - [`Price`] — retail/wholesale price pair stored per category
//! - [`User`] — account keyed by email, with [`Permission`] level
//! - [`Token`] — verification or password-reset token payload
//! - [`BlogPost`] / [`BlogKey`] — blog entries keyed by `"<date>:<title>"`

pub mod blog;
pub mod error;
pub mod product;
pub mod token;
pub mod user;

pub use blog::{BlogKey, BlogPost};
pub use error::TypeError;
pub use product::{Price, Product};
pub use token::Token;
pub use user::{Address, Permission, User, WholesaleStatus};
