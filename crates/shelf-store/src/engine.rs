//! redb-backed [`Storer`].

use std::fs;
use std::io::Read;
use std::path::Path;

use redb::{Database, WriteTransaction};
use tracing::{debug, info};

use crate::backup::{self, SnapshotRecord, SnapshotSummary};
use crate::config::{StoreConfig, DEFAULT_NAMESPACES};
use crate::error::{StoreError, StoreResult};
use crate::keys::ROOT;
use crate::query::Query;
use crate::traits::{BackupSink, Mutation, Storer};
use crate::tree::{display_path, ReadTree, WriteTree, BUCKETS, ENTRIES, META};

/// Embedded store over a single redb database.
pub struct RedbStore {
    db: Database,
    namespaces: Vec<String>,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("namespaces", &self.namespaces)
            .finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open (or create) the database described by `config` and make sure
    /// its top-level namespaces exist.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        fs::create_dir_all(&config.data_dir)?;
        Self::open_path(config.db_path(), &config.namespaces)
    }

    pub fn open_path(path: impl AsRef<Path>, namespaces: &[String]) -> StoreResult<Self> {
        let path = path.as_ref();
        let db = Database::create(path)?;
        let store = Self {
            db,
            namespaces: namespaces.to_vec(),
        };
        store.bootstrap()?;
        info!(path = %path.display(), "store opened");
        Ok(store)
    }

    /// A store that lives only in memory, with the default namespaces.
    pub fn in_memory() -> StoreResult<Self> {
        let db = redb::Builder::new().create_with_backend(redb::backends::InMemoryBackend::new())?;
        let store = Self {
            db,
            namespaces: DEFAULT_NAMESPACES.iter().map(|s| s.to_string()).collect(),
        };
        store.bootstrap()?;
        Ok(store)
    }

    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    fn bootstrap(&self) -> StoreResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut tree = WriteTree::open(&txn)?;
            for name in &self.namespaces {
                tree.create_bucket(ROOT, name.as_bytes(), &[])?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Run `f` against a write transaction and commit only if it succeeds.
    fn write<T>(&self, f: impl FnOnce(&mut WriteTree<'_>) -> StoreResult<T>) -> StoreResult<T> {
        let txn = self.db.begin_write()?;
        let out = {
            let mut tree = WriteTree::open(&txn)?;
            f(&mut tree)?
        };
        txn.commit()?;
        Ok(out)
    }

    fn read<T>(&self, f: impl FnOnce(&ReadTree) -> StoreResult<T>) -> StoreResult<T> {
        let txn = self.db.begin_read()?;
        let tree = ReadTree::open(&txn)?;
        f(&tree)
    }

    /// Visit every namespace and entry, depth first, in one consistent view.
    pub fn walk(&self, visit: &mut dyn FnMut(SnapshotRecord) -> StoreResult<()>) -> StoreResult<()> {
        self.read(|tree| backup::walk(tree, visit))
    }

    /// Validate a snapshot stream without touching any store.
    pub fn verify_backup<R: Read>(source: R) -> StoreResult<SnapshotSummary> {
        backup::verify_snapshot(source)
    }

    /// Replace the entire contents of the store with a snapshot.
    ///
    /// Everything happens in one write transaction that is only committed
    /// after the snapshot's checksum verified, so a damaged stream leaves
    /// the current contents untouched.
    pub fn restore<R: Read>(&self, source: R) -> StoreResult<SnapshotSummary> {
        let txn = self.db.begin_write()?;
        clear_tables(&txn)?;
        let summary = {
            let mut tree = WriteTree::open(&txn)?;
            let summary = backup::read_snapshot(source, &mut |record| match record {
                SnapshotRecord::Namespace { path } => {
                    tree.ensure_path(&path)?;
                    Ok(())
                }
                SnapshotRecord::Entry { path, key, value } => {
                    let bucket = *tree
                        .ensure_path(&path)?
                        .last()
                        .unwrap_or(&ROOT);
                    if bucket == ROOT {
                        return Err(StoreError::InvalidQuery(
                            "snapshot entry outside any namespace".into(),
                        ));
                    }
                    tree.put_entry(bucket, &key, &value, &path)
                }
            })?;
            for name in &self.namespaces {
                tree.create_bucket(ROOT, name.as_bytes(), &[])?;
            }
            summary
        };
        txn.commit()?;
        info!(
            namespaces = summary.namespaces,
            entries = summary.entries,
            bytes = summary.bytes,
            "snapshot restored"
        );
        Ok(summary)
    }
}

fn clear_tables(txn: &WriteTransaction) -> StoreResult<()> {
    txn.delete_table(BUCKETS)?;
    txn.delete_table(ENTRIES)?;
    txn.delete_table(META)?;
    Ok(())
}

fn require_path(query: &Query) -> StoreResult<()> {
    if query.segments().is_empty() {
        return Err(StoreError::InvalidQuery(format!(
            "query {query} has no namespace path"
        )));
    }
    Ok(())
}

fn apply_put(tree: &mut WriteTree<'_>, query: &Query) -> StoreResult<()> {
    require_path(query)?;
    let path = query.segments();
    let chain = tree.ensure_path(path)?;
    let bucket = chain[chain.len() - 1];
    if let (Some(key), Some(value)) = (query.key_bytes(), query.value_bytes()) {
        tree.put_entry(bucket, key, value, path)?;
    }
    Ok(())
}

fn required_key(query: &Query) -> StoreResult<&[u8]> {
    query
        .key_bytes()
        .ok_or_else(|| StoreError::InvalidQuery(format!("query {query} has no key")))
}

fn apply_insert(tree: &mut WriteTree<'_>, query: &Query) -> StoreResult<()> {
    require_path(query)?;
    let key = required_key(query)?;
    let value = query
        .value_bytes()
        .ok_or_else(|| StoreError::InvalidQuery(format!("query {query} has no value")))?;
    let path = query.segments();
    let chain = tree.ensure_path(path)?;
    let bucket = chain[chain.len() - 1];
    if tree.entry(bucket, key)?.is_some() {
        return Err(StoreError::already_exists(query.to_string()));
    }
    tree.put_entry(bucket, key, value, path)
}

fn apply_take(tree: &mut WriteTree<'_>, query: &Query) -> StoreResult<()> {
    require_path(query)?;
    let key = required_key(query)?;
    let path = query.segments();
    let bucket = tree.resolve(path)?;
    if tree.entry(bucket, key)?.is_none() {
        return Err(StoreError::not_found(query.to_string()));
    }
    tree.remove_entry(bucket, key, path)
}

fn apply_delete(tree: &mut WriteTree<'_>, query: &Query) -> StoreResult<()> {
    require_path(query)?;
    let path = query.segments();
    match query.key_bytes() {
        Some(key) => {
            let bucket = tree.resolve(path)?;
            tree.remove_entry(bucket, key, path)
        }
        None => {
            let (name, parent_path) = path
                .split_last()
                .ok_or_else(|| StoreError::InvalidQuery("empty path".into()))?;
            let parent = tree.resolve(parent_path)?;
            let stats = tree.remove_bucket(parent, name, parent_path)?;
            debug!(
                namespace = %display_path(path),
                namespaces = stats.namespaces,
                entries = stats.entries,
                "namespace deleted"
            );
            Ok(())
        }
    }
}

impl Storer for RedbStore {
    fn batch(&self, mutations: &[Mutation<'_>]) -> StoreResult<()> {
        self.write(|tree| {
            for mutation in mutations {
                match mutation {
                    Mutation::Put(query) => apply_put(tree, query)?,
                    Mutation::Delete(query) => apply_delete(tree, query)?,
                    Mutation::Insert(query) => apply_insert(tree, query)?,
                    Mutation::Take(query) => apply_take(tree, query)?,
                }
            }
            Ok(())
        })?;
        debug!(mutations = mutations.len(), "batch committed");
        Ok(())
    }

    fn get(
        &self,
        queries: &[Query],
        visit: &mut dyn FnMut(&[u8], &[u8]) -> StoreResult<()>,
    ) -> StoreResult<()> {
        self.read(|tree| {
            let mut found = Vec::with_capacity(queries.len());
            for query in queries {
                require_path(query)?;
                let key = required_key(query)?;
                let bucket = tree.resolve(query.segments())?;
                let value = tree
                    .entry(bucket, key)?
                    .ok_or_else(|| StoreError::not_found(query.to_string()))?;
                found.push((key, value));
            }
            for (key, value) in &found {
                visit(key, value)?;
            }
            Ok(())
        })
    }

    fn get_all(
        &self,
        query: &Query,
        visit: &mut dyn FnMut(&[u8], &[u8]) -> StoreResult<()>,
    ) -> StoreResult<()> {
        let namespace = query.as_namespace();
        require_path(&namespace)?;
        self.read(|tree| {
            let bucket = tree.resolve(namespace.segments())?;
            tree.visit_entries(bucket, visit)
        })
    }

    fn get_buckets(
        &self,
        query: &Query,
        visit: &mut dyn FnMut(&[u8]) -> StoreResult<()>,
    ) -> StoreResult<()> {
        let namespace = query.as_namespace();
        require_path(&namespace)?;
        self.read(|tree| {
            let bucket = tree.resolve(namespace.segments())?;
            for (name, _) in tree.child_buckets(bucket)? {
                visit(&name)?;
            }
            Ok(())
        })
    }

    fn delete_all(&self, namespace: &[u8]) -> StoreResult<()> {
        if namespace.is_empty() {
            return Err(StoreError::InvalidQuery("empty namespace name".into()));
        }
        let stats = self.write(|tree| {
            let stats = tree.remove_bucket(ROOT, namespace, &[])?;
            tree.create_bucket(ROOT, namespace, &[])?;
            Ok(stats)
        })?;
        info!(
            namespace = %String::from_utf8_lossy(namespace),
            entries = stats.entries,
            "namespace emptied"
        );
        Ok(())
    }

    fn add_bucket(&self, query: &Query) -> StoreResult<()> {
        require_path(query)?;
        let namespace = query.as_namespace();
        self.write(|tree| tree.ensure_path(namespace.segments()).map(|_| ()))?;
        debug!(namespace = %namespace, "namespace ensured");
        Ok(())
    }

    fn rename_bucket(&self, src: &Query, dst: &Query) -> StoreResult<()> {
        let src = src.as_namespace();
        let dst = dst.as_namespace();
        let (src_name, src_parent_path) = src
            .segments()
            .split_last()
            .ok_or_else(|| StoreError::InvalidQuery("rename source is empty".into()))?;
        let (dst_name, dst_parent_path) = dst
            .segments()
            .split_last()
            .ok_or_else(|| StoreError::InvalidQuery("rename destination is empty".into()))?;
        if src == dst {
            return Ok(());
        }

        let stats = self.write(|tree| {
            let src_parent = tree.resolve(src_parent_path)?;
            let src_id = tree
                .find_bucket(src_parent, src_name)?
                .ok_or_else(|| StoreError::not_found(src.to_string()))?;

            let dst_chain = tree.ensure_path(dst_parent_path)?;
            if dst_chain.contains(&src_id) {
                return Err(StoreError::InvalidQuery(format!(
                    "cannot move {src} inside itself"
                )));
            }
            let dst_parent = dst_chain[dst_chain.len() - 1];
            if tree.find_bucket(dst_parent, dst_name)?.is_some()
                || tree.entry(dst_parent, dst_name)?.is_some()
            {
                return Err(StoreError::already_exists(dst.to_string()));
            }

            let dst_id = tree.create_bucket(dst_parent, dst_name, dst_parent_path)?;
            let copied = tree.copy_subtree(src_id, dst_id)?;
            tree.remove_bucket(src_parent, src_name, src_parent_path)?;
            Ok(copied)
        })?;

        info!(
            from = %src,
            to = %dst,
            namespaces = stats.namespaces,
            entries = stats.entries,
            "namespace renamed"
        );
        Ok(())
    }

    fn backup(&self, sink: &mut dyn BackupSink) -> StoreResult<u64> {
        self.read(|tree| backup::write_snapshot(tree, sink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn store() -> RedbStore {
        RedbStore::in_memory().unwrap()
    }

    fn entries(store: &RedbStore, query: &Query) -> Vec<(String, String)> {
        let mut out = Vec::new();
        store
            .get_all(query, &mut |k, v| {
                out.push((
                    String::from_utf8_lossy(k).into_owned(),
                    String::from_utf8_lossy(v).into_owned(),
                ));
                Ok(())
            })
            .unwrap();
        out
    }

    fn buckets(store: &RedbStore, query: &Query) -> Vec<String> {
        let mut out = Vec::new();
        store
            .get_buckets(query, &mut |name| {
                out.push(String::from_utf8_lossy(name).into_owned());
                Ok(())
            })
            .unwrap();
        out
    }

    fn clown() -> Query {
        Query::at(["products", "Cards", "Birthday"])
            .key("clown")
            .value(br#"{"description":"a sad clown","id":"33"}"#.to_vec())
    }

    #[test]
    fn bootstrap_creates_top_level_namespaces() {
        let store = store();
        for ns in DEFAULT_NAMESPACES {
            store.get_all(&Query::at([*ns]), &mut |_, _| Ok(())).unwrap();
        }
    }

    #[test]
    fn put_then_get() {
        let store = store();
        store.put(&[clown()]).unwrap();
        let value = store
            .fetch(&Query::at(["products", "Cards", "Birthday"]).key("clown"))
            .unwrap();
        assert_eq!(value, br#"{"description":"a sad clown","id":"33"}"#);
    }

    #[test]
    fn get_visits_in_query_order() {
        let store = store();
        store
            .put(&[
                Query::at(["users"]).key("a@x").value(b"1".to_vec()),
                Query::at(["users"]).key("b@x").value(b"2".to_vec()),
            ])
            .unwrap();
        let mut seen = Vec::new();
        store
            .get(
                &[Query::at(["users"]).key("b@x"), Query::at(["users"]).key("a@x")],
                &mut |k, v| {
                    seen.push((k.to_vec(), v.to_vec()));
                    Ok(())
                },
            )
            .unwrap();
        assert_eq!(
            seen,
            vec![
                (b"b@x".to_vec(), b"2".to_vec()),
                (b"a@x".to_vec(), b"1".to_vec())
            ]
        );
    }

    #[test]
    fn get_fails_whole_read_without_visiting() {
        let store = store();
        store
            .put(&[Query::at(["users"]).key("a@x").value(b"1".to_vec())])
            .unwrap();
        let mut visits = 0;
        let err = store
            .get(
                &[Query::at(["users"]).key("a@x"), Query::at(["users"]).key("nobody")],
                &mut |_, _| {
                    visits += 1;
                    Ok(())
                },
            )
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(visits, 0);
    }

    #[test]
    fn get_requires_key_and_path() {
        let store = store();
        assert!(matches!(
            store.get(&[Query::at(["users"])], &mut |_, _| Ok(())),
            Err(StoreError::InvalidQuery(_))
        ));
        assert!(matches!(
            store.get(&[Query::new().key("x")], &mut |_, _| Ok(())),
            Err(StoreError::InvalidQuery(_))
        ));
    }

    #[test]
    fn missing_path_is_not_found() {
        let store = store();
        let err = store
            .fetch(&Query::at(["products", "Nope", "Birthday"]).key("clown"))
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(!store
            .exists(&Query::at(["products", "Nope"]).key("clown"))
            .unwrap());
    }

    #[test]
    fn walking_through_an_entry_is_not_found() {
        let store = store();
        store.put(&[clown()]).unwrap();
        let err = store
            .fetch(&Query::at(["products", "Cards", "Birthday", "clown"]).key("x"))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn writing_through_an_entry_is_incompatible() {
        let store = store();
        store.put(&[clown()]).unwrap();
        let err = store
            .put(&[Query::at(["products", "Cards", "Birthday", "clown"])
                .key("x")
                .value(b"1".to_vec())])
            .unwrap_err();
        assert!(matches!(err, StoreError::IncompatibleValue { .. }));
    }

    #[test]
    fn get_all_skips_namespaces() {
        let store = store();
        store
            .put(&[
                Query::at(["products", "Cards"])
                    .key("_price_")
                    .value(b"p".to_vec()),
                clown(),
            ])
            .unwrap();
        let found = entries(&store, &Query::at(["products", "Cards"]));
        assert_eq!(found, vec![("_price_".to_string(), "p".to_string())]);
        assert_eq!(buckets(&store, &Query::at(["products", "Cards"])), vec!["Birthday"]);
    }

    #[test]
    fn get_all_on_empty_namespace_visits_nothing() {
        let store = store();
        assert!(entries(&store, &Query::at(["blogs"])).is_empty());
        assert!(store
            .get_all(&Query::at(["nowhere"]), &mut |_, _| Ok(()))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn visitor_error_aborts_read() {
        let store = store();
        store
            .put(&[
                Query::at(["users"]).key("a").value(b"1".to_vec()),
                Query::at(["users"]).key("b").value(b"2".to_vec()),
            ])
            .unwrap();
        let mut seen = 0;
        let err = store
            .get_all(&Query::at(["users"]), &mut |_, _| {
                seen += 1;
                Err(StoreError::Serialization("bad record".into()))
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
        assert_eq!(seen, 1);
    }

    #[test]
    fn put_without_value_only_creates_path() {
        let store = store();
        store
            .put(&[Query::at(["products", "Art"]).key("orphan")])
            .unwrap();
        assert!(entries(&store, &Query::at(["products", "Art"])).is_empty());
    }

    #[test]
    fn failed_batch_leaves_nothing_behind() {
        let store = store();
        store.put(&[clown()]).unwrap();
        let old = Query::at(["products", "Cards", "Birthday"]).key("clown");
        let new = Query::at(["products", "Cards", "Anniversary"])
            .key("clown")
            .value(b"{}".to_vec());
        let bad = Query::new().key("x").value(b"y".to_vec());

        let err = store
            .batch(&[Mutation::Delete(&old), Mutation::Put(&new), Mutation::Put(&bad)])
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidQuery(_)));

        assert!(store.exists(&old).unwrap());
        assert!(!store.exists(&new).unwrap());
        assert!(!buckets(&store, &Query::at(["products", "Cards"])).contains(&"Anniversary".to_string()));
    }

    #[test]
    fn delete_missing_key_is_noop_but_missing_namespace_is_not() {
        let store = store();
        store.delete(&[Query::at(["users"]).key("ghost")]).unwrap();
        assert!(store
            .delete(&[Query::at(["users", "ghosts"])])
            .unwrap_err()
            .is_not_found());
        assert!(store
            .delete(&[Query::at(["nowhere"]).key("ghost")])
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn delete_namespace_removes_subtree() {
        let store = store();
        store
            .put(&[
                Query::at(["images", "products", "clown"])
                    .key("image")
                    .value(b"big".to_vec()),
                Query::at(["images", "products", "clown"])
                    .key("thumb")
                    .value(b"small".to_vec()),
            ])
            .unwrap();
        store
            .delete(&[Query::at(["images", "products", "clown"])])
            .unwrap();
        assert!(buckets(&store, &Query::at(["images", "products"])).is_empty());
        assert!(!store
            .exists(&Query::at(["images", "products", "clown"]).key("image"))
            .unwrap());
    }

    #[test]
    fn delete_all_recreates_empty_namespace() {
        let store = store();
        store.put(&[clown()]).unwrap();
        store.delete_all(b"products").unwrap();
        assert!(buckets(&store, &Query::at(["products"])).is_empty());
        assert!(entries(&store, &Query::at(["products"])).is_empty());
        store.put(&[clown()]).unwrap();
    }

    #[test]
    fn add_bucket_is_idempotent() {
        let store = store();
        store.put(&[clown()]).unwrap();
        let cards = Query::at(["products"]).key("Cards");
        store.add_bucket(&cards).unwrap();
        store.add_bucket(&cards).unwrap();
        assert_eq!(buckets(&store, &Query::at(["products"])), vec!["Cards"]);
        assert!(store
            .exists(&Query::at(["products", "Cards", "Birthday"]).key("clown"))
            .unwrap());
    }

    #[test]
    fn add_bucket_over_entry_is_incompatible() {
        let store = store();
        store
            .put(&[Query::at(["users"]).key("a@x").value(b"{}".to_vec())])
            .unwrap();
        assert!(matches!(
            store.add_bucket(&Query::at(["users"]).key("a@x")),
            Err(StoreError::IncompatibleValue { .. })
        ));
    }

    #[test]
    fn rename_moves_whole_subtree() {
        let store = store();
        store
            .put(&[
                clown(),
                Query::at(["products", "Cards"])
                    .key("_price_")
                    .value(b"p".to_vec()),
            ])
            .unwrap();
        store
            .rename_bucket(
                &Query::at(["products"]).key("Cards"),
                &Query::at(["products"]).key("Greeting Cards"),
            )
            .unwrap();

        assert_eq!(buckets(&store, &Query::at(["products"])), vec!["Greeting Cards"]);
        assert!(store
            .exists(&Query::at(["products", "Greeting Cards", "Birthday"]).key("clown"))
            .unwrap());
        assert_eq!(
            store
                .fetch(&Query::at(["products", "Greeting Cards"]).key("_price_"))
                .unwrap(),
            b"p"
        );
    }

    #[test]
    fn rename_errors() {
        let store = store();
        store.put(&[clown()]).unwrap();
        store.add_bucket(&Query::at(["products"]).key("Art")).unwrap();

        let cards = Query::at(["products"]).key("Cards");
        assert!(store
            .rename_bucket(&cards, &Query::at(["products"]).key("Art"))
            .unwrap_err()
            .is_already_exists());
        assert!(store
            .rename_bucket(&Query::at(["products"]).key("Nope"), &Query::at(["products"]).key("X"))
            .unwrap_err()
            .is_not_found());
        assert!(matches!(
            store.rename_bucket(&cards, &Query::at(["products", "Cards", "Birthday"]).key("Inner")),
            Err(StoreError::InvalidQuery(_))
        ));
        store.rename_bucket(&cards, &cards).unwrap();
        assert_eq!(buckets(&store, &Query::at(["products"])), vec!["Art", "Cards"]);
    }

    #[test]
    fn rename_into_new_parent_creates_it() {
        let store = store();
        store.put(&[clown()]).unwrap();
        store
            .rename_bucket(
                &Query::at(["products", "Cards"]).key("Birthday"),
                &Query::at(["products", "Occasions"]).key("Birthday"),
            )
            .unwrap();
        assert!(store
            .exists(&Query::at(["products", "Occasions", "Birthday"]).key("clown"))
            .unwrap());
        assert!(buckets(&store, &Query::at(["products", "Cards"])).is_empty());
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::default().with_data_dir(dir.path());
        {
            let store = RedbStore::open(&config).unwrap();
            store.put(&[clown()]).unwrap();
        }
        let store = RedbStore::open(&config).unwrap();
        assert!(store
            .exists(&Query::at(["products", "Cards", "Birthday"]).key("clown"))
            .unwrap());
    }

    #[test]
    fn backup_restore_reproduces_contents() {
        let source = store();
        source
            .put(&[
                clown(),
                Query::at(["images", "products", "clown"])
                    .key("image")
                    .value(vec![0, 1, 2, 255]),
            ])
            .unwrap();
        let mut bytes = Vec::new();
        source.backup(&mut bytes).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let target = RedbStore::open(&StoreConfig::default().with_data_dir(dir.path())).unwrap();
        target
            .put(&[Query::at(["users"]).key("stale").value(b"1".to_vec())])
            .unwrap();
        let summary = target.restore(bytes.as_slice()).unwrap();
        assert_eq!(summary.entries, 2);

        let mut a = Vec::new();
        source.walk(&mut |r| {
            a.push(r);
            Ok(())
        })
        .unwrap();
        let mut b = Vec::new();
        target.walk(&mut |r| {
            b.push(r);
            Ok(())
        })
        .unwrap();
        assert_eq!(a, b);
        assert!(!target.exists(&Query::at(["users"]).key("stale")).unwrap());
    }

    #[test]
    fn corrupt_restore_keeps_current_contents() {
        let source = store();
        source.put(&[clown()]).unwrap();
        let mut bytes = Vec::new();
        source.backup(&mut bytes).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        let target = store();
        target
            .put(&[Query::at(["users"]).key("keep").value(b"1".to_vec())])
            .unwrap();
        assert!(matches!(
            target.restore(bytes.as_slice()),
            Err(StoreError::ChecksumMismatch)
        ));
        assert!(target.exists(&Query::at(["users"]).key("keep")).unwrap());
        assert!(!target
            .exists(&Query::at(["products", "Cards", "Birthday"]).key("clown"))
            .unwrap());
    }

    #[test]
    fn insert_refuses_existing_key() {
        let store = store();
        store.batch(&[Mutation::Insert(&clown())]).unwrap();

        let other = Query::at(["users"]).key("a@x").value(b"1".to_vec());
        let again = Query::at(["products", "Cards", "Birthday"])
            .key("clown")
            .value(b"second".to_vec());
        let err = store
            .batch(&[Mutation::Put(&other), Mutation::Insert(&again)])
            .unwrap_err();
        assert!(err.is_already_exists());
        assert!(!store.exists(&Query::at(["users"]).key("a@x")).unwrap());
        assert_eq!(
            store
                .fetch(&Query::at(["products", "Cards", "Birthday"]).key("clown"))
                .unwrap(),
            br#"{"description":"a sad clown","id":"33"}"#
        );
    }

    #[test]
    fn insert_needs_key_and_value() {
        let store = store();
        assert!(matches!(
            store.batch(&[Mutation::Insert(&Query::at(["users"]).key("a@x"))]),
            Err(StoreError::InvalidQuery(_))
        ));
        assert!(matches!(
            store.batch(&[Mutation::Insert(&Query::at(["users"]).value(b"1".to_vec()))]),
            Err(StoreError::InvalidQuery(_))
        ));
    }

    #[test]
    fn take_succeeds_once() {
        let store = store();
        let token = Query::at(["tokens"]).key("abc");
        store.put(&[token.clone().value(b"t".to_vec())]).unwrap();
        let user = Query::at(["users"]).key("a@x").value(b"1".to_vec());

        store
            .batch(&[Mutation::Take(&token), Mutation::Put(&user)])
            .unwrap();
        assert!(!store.exists(&token).unwrap());

        store.delete(&[Query::at(["users"]).key("a@x")]).unwrap();
        let err = store
            .batch(&[Mutation::Take(&token), Mutation::Put(&user)])
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(!store.exists(&Query::at(["users"]).key("a@x")).unwrap());
        assert!(store
            .batch(&[Mutation::Take(&Query::at(["nowhere"]).key("abc"))])
            .unwrap_err()
            .is_not_found());
    }

    fn segment() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9 _-]{1,12}"
    }

    proptest! {
        #[test]
        fn put_get_roundtrip(
            path in prop::collection::vec(segment(), 1..4),
            key in segment(),
            value in prop::collection::vec(any::<u8>(), 0..256),
        ) {
            let store = store();
            let mut full = vec!["products".to_string()];
            full.extend(path);
            store.put(&[Query::at(&full).key(&key).value(value.clone())]).unwrap();
            prop_assert_eq!(store.fetch(&Query::at(&full).key(&key)).unwrap(), value);
        }

        #[test]
        fn rename_preserves_every_entry(
            keys in prop::collection::btree_set(segment(), 1..8),
            nested in prop::collection::btree_set(segment(), 0..4),
        ) {
            let store = store();
            let mut puts = Vec::new();
            for k in &keys {
                puts.push(Query::at(["products", "Cards"]).key(k).value(k.as_bytes().to_vec()));
                for n in &nested {
                    puts.push(Query::at(["products", "Cards", "sub.dir"]).path([n]).key(k).value(b"v".to_vec()));
                }
            }
            store.put(&puts).unwrap();

            store.rename_bucket(
                &Query::at(["products"]).key("Cards"),
                &Query::at(["products"]).key("Moved"),
            ).unwrap();

            for k in &keys {
                prop_assert_eq!(
                    store.fetch(&Query::at(["products", "Moved"]).key(k)).unwrap(),
                    k.as_bytes().to_vec()
                );
                prop_assert!(!store.exists(&Query::at(["products", "Cards"]).key(k)).unwrap());
                for n in &nested {
                    prop_assert!(store.exists(&Query::at(["products", "Moved", "sub.dir"]).path([n]).key(k)).unwrap());
                }
            }
        }
    }
}
