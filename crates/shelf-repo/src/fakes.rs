//! In-process stand-ins for the external collaborators, used by tests.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use shelf_store::{BackupSink, Mutation, Query, RedbStore, StoreResult, Storer};

use crate::error::{RepoError, RepoResult};
use crate::external::{CommerceClient, DecodedImage, ImagePipeline, PasswordHasher};

/// Records every call; can be told to fail.
#[derive(Default)]
pub struct FakeCommerce {
    next_id: AtomicU64,
    pub fail_create: AtomicBool,
    pub fail_delete: AtomicBool,
    pub created: Mutex<Vec<(String, String, String)>>,
    pub deleted: Mutex<Vec<String>>,
    pub images: Mutex<Vec<(String, usize)>>,
}

impl CommerceClient for FakeCommerce {
    fn create(&self, title: &str, category: &str, price: &str) -> RepoResult<String> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(RepoError::External("create refused".into()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.created
            .lock()
            .unwrap()
            .push((title.into(), category.into(), price.into()));
        Ok(id.to_string())
    }

    fn delete(&self, external_id: &str) -> RepoResult<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(RepoError::External("delete refused".into()));
        }
        self.deleted.lock().unwrap().push(external_id.into());
        Ok(())
    }

    fn attach_image(&self, external_id: &str, image: &[u8]) -> RepoResult<()> {
        self.images
            .lock()
            .unwrap()
            .push((external_id.into(), image.len()));
        Ok(())
    }
}

/// Accepts inputs starting with `PNG`; "resizes" by tagging the width.
pub struct FakeImages;

impl ImagePipeline for FakeImages {
    fn decode(&self, bytes: &[u8]) -> RepoResult<DecodedImage> {
        if !bytes.starts_with(b"PNG") {
            return Err(RepoError::Image("not a png".into()));
        }
        Ok(DecodedImage {
            width: 1000,
            height: 800,
            pixels: bytes[3..].to_vec(),
        })
    }

    fn resize(&self, image: &DecodedImage, width: u32) -> RepoResult<Vec<u8>> {
        let mut out = format!("{width}:").into_bytes();
        out.extend_from_slice(&image.pixels);
        Ok(out)
    }
}

/// Reversible "hash" so tests don't pay for bcrypt.
pub struct PlainHasher;

impl PasswordHasher for PlainHasher {
    fn hash(&self, password: &str) -> RepoResult<String> {
        Ok(format!("hashed:{password}"))
    }

    fn verify(&self, password: &str, hashed: &str) -> RepoResult<bool> {
        Ok(hashed == format!("hashed:{password}"))
    }
}

pub fn memory_store() -> Arc<dyn Storer> {
    Arc::new(RedbStore::in_memory().unwrap())
}

type Hook = Box<dyn FnOnce(&dyn Storer) + Send>;

/// Forwards to an inner store, running a one-shot hook against it just
/// before the next batch. Simulates a concurrent writer slipping in
/// between a repository's reads and its write.
pub struct Interleaved {
    inner: Arc<dyn Storer>,
    hook: Mutex<Option<Hook>>,
}

impl Interleaved {
    pub fn new(inner: Arc<dyn Storer>) -> Self {
        Self {
            inner,
            hook: Mutex::new(None),
        }
    }

    pub fn before_next_batch(&self, hook: impl FnOnce(&dyn Storer) + Send + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }
}

impl Storer for Interleaved {
    fn batch(&self, mutations: &[Mutation<'_>]) -> StoreResult<()> {
        let hook = self.hook.lock().unwrap().take();
        if let Some(hook) = hook {
            hook(self.inner.as_ref());
        }
        self.inner.batch(mutations)
    }

    fn get(
        &self,
        queries: &[Query],
        visit: &mut dyn FnMut(&[u8], &[u8]) -> StoreResult<()>,
    ) -> StoreResult<()> {
        self.inner.get(queries, visit)
    }

    fn get_all(
        &self,
        query: &Query,
        visit: &mut dyn FnMut(&[u8], &[u8]) -> StoreResult<()>,
    ) -> StoreResult<()> {
        self.inner.get_all(query, visit)
    }

    fn get_buckets(
        &self,
        query: &Query,
        visit: &mut dyn FnMut(&[u8]) -> StoreResult<()>,
    ) -> StoreResult<()> {
        self.inner.get_buckets(query, visit)
    }

    fn delete_all(&self, namespace: &[u8]) -> StoreResult<()> {
        self.inner.delete_all(namespace)
    }

    fn add_bucket(&self, query: &Query) -> StoreResult<()> {
        self.inner.add_bucket(query)
    }

    fn rename_bucket(&self, src: &Query, dst: &Query) -> StoreResult<()> {
        self.inner.rename_bucket(src, dst)
    }

    fn backup(&self, sink: &mut dyn BackupSink) -> StoreResult<u64> {
        self.inner.backup(sink)
    }
}
