//! Namespace tree operations over open redb tables.
//!
//! The tree is stored in two flat tables (see [`crate::keys`]):
//!
//! - `buckets`: `parent ++ name -> child id` for nested namespaces
//! - `entries`: `bucket ++ key -> value` for leaf entries
//!
//! A name inside one namespace is either a nested namespace or a leaf,
//! never both. Subtree walks (delete, copy, snapshot) use an explicit work
//! stack of namespace ids instead of recursion, so depth is bounded by the
//! heap and no range iterator outlives the step that created it.

use redb::{
    ReadOnlyTable, ReadTransaction, ReadableTable, Table, TableDefinition, WriteTransaction,
};

use crate::error::{StoreError, StoreResult};
use crate::keys::{self, ROOT};

pub(crate) const BUCKETS: TableDefinition<&[u8], u64> = TableDefinition::new("buckets");
pub(crate) const ENTRIES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("entries");
pub(crate) const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const NEXT_BUCKET_ID: &str = "next_bucket_id";

/// Render a namespace path for error messages and logs.
pub(crate) fn display_path(path: &[Vec<u8>]) -> String {
    path.iter()
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn display_child(path: &[Vec<u8>], name: &[u8]) -> String {
    if path.is_empty() {
        String::from_utf8_lossy(name).into_owned()
    } else {
        format!("{}/{}", display_path(path), String::from_utf8_lossy(name))
    }
}

// ---------------------------------------------------------------------------
// Read helpers shared by read and write transactions
// ---------------------------------------------------------------------------

fn find_bucket<T>(buckets: &T, parent: u64, name: &[u8]) -> StoreResult<Option<u64>>
where
    T: ReadableTable<&'static [u8], u64>,
{
    let key = keys::child_key(parent, name);
    Ok(buckets.get(key.as_slice())?.map(|id| id.value()))
}

fn has_entry<T>(entries: &T, bucket: u64, name: &[u8]) -> StoreResult<bool>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    let key = keys::child_key(bucket, name);
    Ok(entries.get(key.as_slice())?.is_some())
}

/// Walk `path` from the root. Every segment must already exist.
fn resolve<T>(buckets: &T, path: &[Vec<u8>]) -> StoreResult<u64>
where
    T: ReadableTable<&'static [u8], u64>,
{
    let mut current = ROOT;
    for (depth, segment) in path.iter().enumerate() {
        current = find_bucket(buckets, current, segment)?
            .ok_or_else(|| StoreError::not_found(display_path(&path[..=depth])))?;
    }
    Ok(current)
}

/// Direct child namespaces of `parent`, in ascending name order.
fn child_buckets<T>(buckets: &T, parent: u64) -> StoreResult<Vec<(Vec<u8>, u64)>>
where
    T: ReadableTable<&'static [u8], u64>,
{
    let start = keys::children_start(parent);
    let mut children = Vec::new();
    for item in buckets.range::<&[u8]>(start.as_slice()..)? {
        let (key, id) = item?;
        let Some(name) = keys::child_name(parent, key.value()) else {
            break;
        };
        children.push((name.to_vec(), id.value()));
    }
    Ok(children)
}

/// Visit every leaf entry directly inside `bucket`, in ascending key order.
fn visit_entries<T>(
    entries: &T,
    bucket: u64,
    visit: &mut dyn FnMut(&[u8], &[u8]) -> StoreResult<()>,
) -> StoreResult<()>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    let start = keys::children_start(bucket);
    for item in entries.range::<&[u8]>(start.as_slice()..)? {
        let (key, value) = item?;
        let Some(name) = keys::child_name(bucket, key.value()) else {
            break;
        };
        visit(name, value.value())?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Read side
// ---------------------------------------------------------------------------

/// Tables opened inside one read transaction; a consistent snapshot.
pub(crate) struct ReadTree {
    buckets: ReadOnlyTable<&'static [u8], u64>,
    entries: ReadOnlyTable<&'static [u8], &'static [u8]>,
}

impl ReadTree {
    pub(crate) fn open(txn: &ReadTransaction) -> StoreResult<Self> {
        Ok(Self {
            buckets: txn.open_table(BUCKETS)?,
            entries: txn.open_table(ENTRIES)?,
        })
    }

    pub(crate) fn resolve(&self, path: &[Vec<u8>]) -> StoreResult<u64> {
        resolve(&self.buckets, path)
    }

    /// Fetch one entry, copying its value out of the transaction.
    pub(crate) fn entry(&self, bucket: u64, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let raw = keys::child_key(bucket, key);
        Ok(self.entries.get(raw.as_slice())?.map(|v| v.value().to_vec()))
    }

    pub(crate) fn visit_entries(
        &self,
        bucket: u64,
        visit: &mut dyn FnMut(&[u8], &[u8]) -> StoreResult<()>,
    ) -> StoreResult<()> {
        visit_entries(&self.entries, bucket, visit)
    }

    pub(crate) fn child_buckets(&self, parent: u64) -> StoreResult<Vec<(Vec<u8>, u64)>> {
        child_buckets(&self.buckets, parent)
    }
}

// ---------------------------------------------------------------------------
// Write side
// ---------------------------------------------------------------------------

/// Counts reported by subtree operations, used for logging.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct SubtreeStats {
    pub namespaces: usize,
    pub entries: usize,
}

/// Tables opened inside one write transaction.
///
/// Nothing here commits: the caller owns the transaction and commits it
/// only after every step succeeded, so a failure anywhere discards all of
/// the work done through this handle.
pub(crate) struct WriteTree<'txn> {
    buckets: Table<'txn, &'static [u8], u64>,
    entries: Table<'txn, &'static [u8], &'static [u8]>,
    meta: Table<'txn, &'static str, u64>,
}

impl<'txn> WriteTree<'txn> {
    pub(crate) fn open(txn: &'txn WriteTransaction) -> StoreResult<Self> {
        Ok(Self {
            buckets: txn.open_table(BUCKETS)?,
            entries: txn.open_table(ENTRIES)?,
            meta: txn.open_table(META)?,
        })
    }

    fn allocate_id(&mut self) -> StoreResult<u64> {
        let next = self
            .meta
            .get(NEXT_BUCKET_ID)?
            .map(|v| v.value())
            .unwrap_or(ROOT + 1);
        self.meta.insert(NEXT_BUCKET_ID, next + 1)?;
        Ok(next)
    }

    pub(crate) fn resolve(&self, path: &[Vec<u8>]) -> StoreResult<u64> {
        resolve(&self.buckets, path)
    }

    pub(crate) fn find_bucket(&self, parent: u64, name: &[u8]) -> StoreResult<Option<u64>> {
        find_bucket(&self.buckets, parent, name)
    }

    pub(crate) fn entry(&self, bucket: u64, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let raw = keys::child_key(bucket, key);
        Ok(self.entries.get(raw.as_slice())?.map(|v| v.value().to_vec()))
    }

    /// Create the namespace `name` under `parent` unless it exists.
    /// Returns the namespace id.
    pub(crate) fn create_bucket(
        &mut self,
        parent: u64,
        name: &[u8],
        location: &[Vec<u8>],
    ) -> StoreResult<u64> {
        if let Some(id) = self.find_bucket(parent, name)? {
            return Ok(id);
        }
        if has_entry(&self.entries, parent, name)? {
            return Err(StoreError::IncompatibleValue {
                path: display_child(location, name),
                reason: "an entry with this name exists".into(),
            });
        }
        let id = self.allocate_id()?;
        let key = keys::child_key(parent, name);
        self.buckets.insert(key.as_slice(), id)?;
        Ok(id)
    }

    /// Walk `path` from the root, creating missing namespaces. Returns the
    /// id of every namespace on the way, root first, target last.
    pub(crate) fn ensure_path(&mut self, path: &[Vec<u8>]) -> StoreResult<Vec<u64>> {
        let mut chain = Vec::with_capacity(path.len() + 1);
        chain.push(ROOT);
        let mut current = ROOT;
        for (depth, segment) in path.iter().enumerate() {
            current = self.create_bucket(current, segment, &path[..depth])?;
            chain.push(current);
        }
        Ok(chain)
    }

    pub(crate) fn put_entry(
        &mut self,
        bucket: u64,
        key: &[u8],
        value: &[u8],
        location: &[Vec<u8>],
    ) -> StoreResult<()> {
        if self.find_bucket(bucket, key)?.is_some() {
            return Err(StoreError::IncompatibleValue {
                path: display_child(location, key),
                reason: "a namespace with this name exists".into(),
            });
        }
        let raw = keys::child_key(bucket, key);
        self.entries.insert(raw.as_slice(), value)?;
        Ok(())
    }

    /// Remove one entry. Removing an absent key is a no-op.
    pub(crate) fn remove_entry(
        &mut self,
        bucket: u64,
        key: &[u8],
        location: &[Vec<u8>],
    ) -> StoreResult<()> {
        if self.find_bucket(bucket, key)?.is_some() {
            return Err(StoreError::IncompatibleValue {
                path: display_child(location, key),
                reason: "a namespace with this name exists; delete it without a key".into(),
            });
        }
        let raw = keys::child_key(bucket, key);
        self.entries.remove(raw.as_slice())?;
        Ok(())
    }

    /// Remove every entry and namespace nested under `bucket`, leaving
    /// `bucket` itself (and its link in its parent) in place.
    fn clear_subtree(&mut self, bucket: u64) -> StoreResult<SubtreeStats> {
        let mut stats = SubtreeStats::default();
        let mut stack = vec![bucket];

        while let Some(id) = stack.pop() {
            for (name, child) in child_buckets(&self.buckets, id)? {
                let key = keys::child_key(id, &name);
                self.buckets.remove(key.as_slice())?;
                stack.push(child);
                stats.namespaces += 1;
            }

            let mut doomed = Vec::new();
            visit_entries(&self.entries, id, &mut |name, _| {
                doomed.push(keys::child_key(id, name));
                Ok(())
            })?;
            for key in &doomed {
                self.entries.remove(key.as_slice())?;
            }
            stats.entries += doomed.len();
        }

        Ok(stats)
    }

    /// Remove the namespace `name` under `parent` and everything below it.
    pub(crate) fn remove_bucket(
        &mut self,
        parent: u64,
        name: &[u8],
        location: &[Vec<u8>],
    ) -> StoreResult<SubtreeStats> {
        let id = self
            .find_bucket(parent, name)?
            .ok_or_else(|| StoreError::not_found(display_child(location, name)))?;
        let mut stats = self.clear_subtree(id)?;
        let key = keys::child_key(parent, name);
        self.buckets.remove(key.as_slice())?;
        stats.namespaces += 1;
        Ok(stats)
    }

    /// Copy every entry and nested namespace of `src` into the (empty)
    /// namespace `dst`, preserving names.
    ///
    /// The work stack holds `(source id, destination id)` pairs; each step
    /// copies one namespace's entries and queues its children, so the
    /// source is read one level at a time.
    pub(crate) fn copy_subtree(&mut self, src: u64, dst: u64) -> StoreResult<SubtreeStats> {
        let mut stats = SubtreeStats::default();
        let mut stack = vec![(src, dst)];

        while let Some((from, to)) = stack.pop() {
            let mut copied = Vec::new();
            visit_entries(&self.entries, from, &mut |name, value| {
                copied.push((keys::child_key(to, name), value.to_vec()));
                Ok(())
            })?;
            for (key, value) in &copied {
                self.entries.insert(key.as_slice(), value.as_slice())?;
            }
            stats.entries += copied.len();

            for (name, child) in child_buckets(&self.buckets, from)? {
                let id = self.allocate_id()?;
                let key = keys::child_key(to, &name);
                self.buckets.insert(key.as_slice(), id)?;
                stack.push((child, id));
                stats.namespaces += 1;
            }
        }

        Ok(stats)
    }
}
