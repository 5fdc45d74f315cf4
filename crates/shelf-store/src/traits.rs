//! The storage seam consumed by the repositories.

use std::io::{self, Write};

use crate::error::StoreResult;
use crate::query::Query;

/// One step of an atomic [`Storer::batch`].
#[derive(Clone, Copy, Debug)]
pub enum Mutation<'a> {
    /// Create the query's path, then write `key -> value` when both are set.
    Put(&'a Query),
    /// Remove the query's key, or the whole namespace when it has no key.
    Delete(&'a Query),
    /// Like `Put`, but fails with `AlreadyExists` when the key is present.
    Insert(&'a Query),
    /// Remove the query's key, failing with `NotFound` when it is absent.
    Take(&'a Query),
}

/// Destination of a snapshot stream.
///
/// The total snapshot length is known before the first byte is written and
/// is announced up front, so transports that need a length header (an HTTP
/// `Content-Length`, for instance) can emit it.
pub trait BackupSink: Write {
    fn announce_length(&mut self, _len: u64) -> io::Result<()> {
        Ok(())
    }
}

impl BackupSink for Vec<u8> {
    fn announce_length(&mut self, len: u64) -> io::Result<()> {
        self.reserve(usize::try_from(len).unwrap_or(0));
        Ok(())
    }
}

impl BackupSink for std::fs::File {}

impl BackupSink for io::Sink {}

impl<W: Write> BackupSink for io::BufWriter<W> {}

impl<S: BackupSink + ?Sized> BackupSink for &mut S {
    fn announce_length(&mut self, len: u64) -> io::Result<()> {
        (**self).announce_length(len)
    }
}

/// Hierarchical key-value store.
///
/// Every mutating operation runs in a single write transaction: either all
/// of its effects become visible or none do. Reads run against one
/// consistent snapshot. Visitors receive borrowed bytes that are only valid
/// for the duration of the call; copy them to keep them.
pub trait Storer: Send + Sync {
    /// Apply all mutations in order inside one transaction.
    fn batch(&self, mutations: &[Mutation<'_>]) -> StoreResult<()>;

    /// Atomically write every query.
    fn put(&self, queries: &[Query]) -> StoreResult<()> {
        let mutations: Vec<Mutation<'_>> = queries.iter().map(Mutation::Put).collect();
        self.batch(&mutations)
    }

    /// Atomically delete every query's key (or namespace, when keyless).
    fn delete(&self, queries: &[Query]) -> StoreResult<()> {
        let mutations: Vec<Mutation<'_>> = queries.iter().map(Mutation::Delete).collect();
        self.batch(&mutations)
    }

    /// Look up each query's key and visit `(key, value)` in query order.
    ///
    /// Every lookup must succeed before the first visit: a missing key
    /// fails the whole read and nothing is visited.
    fn get(
        &self,
        queries: &[Query],
        visit: &mut dyn FnMut(&[u8], &[u8]) -> StoreResult<()>,
    ) -> StoreResult<()>;

    /// Visit every leaf entry directly inside the namespace addressed by
    /// the query (its key, when set, names one more nested namespace).
    /// Nested namespaces are skipped.
    fn get_all(
        &self,
        query: &Query,
        visit: &mut dyn FnMut(&[u8], &[u8]) -> StoreResult<()>,
    ) -> StoreResult<()>;

    /// Visit the names of the namespaces directly inside the addressed one.
    fn get_buckets(
        &self,
        query: &Query,
        visit: &mut dyn FnMut(&[u8]) -> StoreResult<()>,
    ) -> StoreResult<()>;

    /// Drop a top-level namespace with everything in it and recreate it empty.
    fn delete_all(&self, namespace: &[u8]) -> StoreResult<()>;

    /// Create the namespace path (plus the key, as a final segment).
    /// Existing namespaces are left untouched.
    fn add_bucket(&self, query: &Query) -> StoreResult<()>;

    /// Move the namespace `src` (path plus key) to `dst`, with everything
    /// nested inside it.
    fn rename_bucket(&self, src: &Query, dst: &Query) -> StoreResult<()>;

    /// Stream a consistent snapshot of the whole store. Returns the number
    /// of bytes written.
    fn backup(&self, sink: &mut dyn BackupSink) -> StoreResult<u64>;

    /// Fetch one value.
    fn fetch(&self, query: &Query) -> StoreResult<Vec<u8>> {
        let mut found = Vec::new();
        self.get(std::slice::from_ref(query), &mut |_, value| {
            found = value.to_vec();
            Ok(())
        })?;
        Ok(found)
    }

    /// Whether the query's key exists. Missing paths count as absent.
    fn exists(&self, query: &Query) -> StoreResult<bool> {
        match self.get(std::slice::from_ref(query), &mut |_, _| Ok(())) {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}
