//! Wiring: one store, one cache, every repository.

use std::sync::Arc;

use shelf_store::{BackupSink, RedbStore, Storer};
use shelf_types::Price;
use tracing::info;

use crate::blogs::Blogs;
use crate::cache::CatalogCache;
use crate::catalog::Catalog;
use crate::config::ShopConfig;
use crate::error::RepoResult;
use crate::external::{BcryptHasher, CommerceClient, ImagePipeline, PasswordHasher};
use crate::images::Images;
use crate::products::Products;
use crate::tokens::Tokens;
use crate::users::Users;

/// All repositories over a shared store and cache.
pub struct Shop {
    store: Arc<dyn Storer>,
    cache: Arc<CatalogCache>,
    catalog: Catalog,
    products: Products,
    users: Users,
    tokens: Tokens,
    blogs: Blogs,
    images: Images,
}

impl Shop {
    pub fn new(
        config: &ShopConfig,
        store: Arc<dyn Storer>,
        commerce: Arc<dyn CommerceClient>,
        pipeline: Arc<dyn ImagePipeline>,
        hasher: Arc<dyn PasswordHasher>,
    ) -> Self {
        let cache = Arc::new(CatalogCache::new());
        let tokens = Tokens::new(store.clone(), config.tokens);
        Self {
            catalog: Catalog::new(
                store.clone(),
                cache.clone(),
                Price::new(&config.default_price, &config.wholesale_price),
            ),
            products: Products::new(
                store.clone(),
                commerce,
                pipeline.clone(),
                cache.clone(),
                config,
            ),
            users: Users::new(
                store.clone(),
                hasher,
                tokens.clone(),
                config.min_password_len,
            ),
            blogs: Blogs::new(store.clone(), pipeline, config.images),
            images: Images::new(store.clone()),
            tokens,
            cache,
            store,
        }
    }

    /// Open the on-disk store named by `config` and hash passwords with
    /// bcrypt at the configured cost.
    pub fn open(
        config: &ShopConfig,
        commerce: Arc<dyn CommerceClient>,
        pipeline: Arc<dyn ImagePipeline>,
    ) -> RepoResult<Self> {
        let store = RedbStore::open(&config.store)?;
        info!(path = %config.store.db_path().display(), "shop store opened");
        Ok(Self::new(
            config,
            Arc::new(store),
            commerce,
            pipeline,
            Arc::new(BcryptHasher::new(config.bcrypt_cost)),
        ))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn products(&self) -> &Products {
        &self.products
    }

    pub fn users(&self) -> &Users {
        &self.users
    }

    pub fn tokens(&self) -> &Tokens {
        &self.tokens
    }

    pub fn blogs(&self) -> &Blogs {
        &self.blogs
    }

    pub fn images(&self) -> &Images {
        &self.images
    }

    pub fn cache(&self) -> &CatalogCache {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn Storer> {
        &self.store
    }

    /// Stream a snapshot of everything. Returns bytes written.
    pub fn backup(&self, sink: &mut dyn BackupSink) -> RepoResult<u64> {
        Ok(self.store.backup(sink)?)
    }
}
