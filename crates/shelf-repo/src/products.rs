//! Product lifecycle: add, update (including moves), delete.
//!
//! A product's metadata lives at `products/<category>/<subcategory>#<title>`
//! and its image renditions under `images/products/<title>`. The external
//! commerce system holds a mirror listing whose id is kept in the record.

use std::sync::Arc;

use shelf_store::{Mutation, Query, StoreError, Storer};
use shelf_types::{Price, Product};
use tracing::{info, warn};

use crate::cache::CatalogCache;
use crate::catalog::{category_price, subcategory_query, validate_name};
use crate::config::{ImageSizes, ShopConfig};
use crate::error::{RepoError, RepoResult};
use crate::external::{CommerceClient, ImagePipeline};
use crate::images;

fn record_query(product: &Product) -> Query {
    subcategory_query(&product.category, &product.subcategory).key(&product.title)
}

pub struct Products {
    store: Arc<dyn Storer>,
    commerce: Arc<dyn CommerceClient>,
    pipeline: Arc<dyn ImagePipeline>,
    cache: Arc<CatalogCache>,
    default_price: Price,
    sizes: ImageSizes,
}

impl Products {
    pub fn new(
        store: Arc<dyn Storer>,
        commerce: Arc<dyn CommerceClient>,
        pipeline: Arc<dyn ImagePipeline>,
        cache: Arc<CatalogCache>,
        config: &ShopConfig,
    ) -> Self {
        Self {
            store,
            commerce,
            pipeline,
            cache,
            default_price: Price::new(&config.default_price, &config.wholesale_price),
            sizes: config.images,
        }
    }

    /// Load a product by location, with its category price attached.
    pub fn fetch(&self, title: &str, category: &str, subcategory: &str) -> RepoResult<Product> {
        if title.is_empty() {
            return Err(RepoError::Validation("product title must be set".into()));
        }
        let located = Product::new(title, category, subcategory);
        let raw = self.store.fetch(&record_query(&located))?;
        let mut product = Product::from_record(title, category, subcategory, &raw)?;
        product.price = Some(category_price(
            self.store.as_ref(),
            category,
            &self.default_price,
        )?);
        Ok(product)
    }

    /// Add a product with its image.
    ///
    /// Order: provision the external listing, render both image sizes,
    /// check the title is free, then insert metadata and renditions in one
    /// batch and attach the image to the listing. Titles are unique across
    /// the whole catalog because renditions are stored by title alone. The
    /// batch only inserts, so a product written concurrently after the
    /// check still makes it fail. A failure after provisioning leaves the
    /// external listing in place.
    pub fn add(&self, product: &Product, upload: &[u8]) -> RepoResult<Product> {
        validate_name("product", &product.title)?;
        validate_name("category", &product.category)?;
        validate_name("subcategory", &product.subcategory)?;

        let external_id =
            self.commerce
                .create(&product.title, &product.category, &self.default_price.retail)?;
        let renditions = images::render(self.pipeline.as_ref(), self.sizes, upload)?;

        if let Err(e) = self.ensure_title_free(product) {
            warn!(
                title = %product.title,
                external_id = %external_id,
                error = %e,
                "product rejected after provisioning; external listing left behind"
            );
            return Err(e);
        }

        let mut stored = product.clone().with_external_id(&external_id);
        stored.price = None;
        let record = record_query(&stored).value(stored.to_record()?);
        let image_writes = images::product_writes(&stored.title, &renditions);
        let mut mutations = vec![Mutation::Insert(&record)];
        mutations.extend(image_writes.iter().map(Mutation::Insert));
        if let Err(e) = self.store.batch(&mutations) {
            warn!(
                title = %stored.title,
                external_id = %external_id,
                error = %e,
                "product write failed after provisioning; external listing left behind"
            );
            return Err(e.into());
        }

        self.commerce.attach_image(&external_id, &renditions.full)?;
        self.cache.invalidate();
        info!(
            title = %stored.title,
            category = %stored.category,
            subcategory = %stored.subcategory,
            external_id = %external_id,
            "product added"
        );
        Ok(stored)
    }

    /// Fails if the subcategory is missing, already holds the title, or
    /// another product anywhere in the catalog has stored images under it.
    fn ensure_title_free(&self, product: &Product) -> RepoResult<()> {
        let image_namespace = images::product_namespace(&product.title);
        match self.store.get_all(&image_namespace, &mut |_, _| Ok(())) {
            Ok(()) => {
                return Err(RepoError::AlreadyExists(format!(
                    "product title {:?} is in use ({image_namespace})",
                    product.title
                )))
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        let namespace = subcategory_query(&product.category, &product.subcategory);
        self.store.get_all(&namespace, &mut |key, _| {
            if key == product.title.as_bytes() {
                return Err(StoreError::already_exists(format!(
                    "{namespace}#{}",
                    product.title
                )));
            }
            Ok(())
        })?;
        Ok(())
    }

    /// Apply `next` to the stored product at `current`'s location.
    ///
    /// Descriptions are overwritten. A different category or subcategory
    /// moves the record: the old entry is deleted and the new one written in
    /// the same batch, so the product is never missing from both places.
    /// A new upload re-renders both image sizes. Titles are storage keys and
    /// cannot change here.
    pub fn update(
        &self,
        current: &Product,
        next: &Product,
        upload: Option<&[u8]>,
    ) -> RepoResult<Product> {
        if next.title != current.title {
            return Err(RepoError::Validation(format!(
                "product title cannot change ({} -> {})",
                current.title, next.title
            )));
        }
        let stored = self.fetch(&current.title, &current.category, &current.subcategory)?;

        let mut updated = stored.clone();
        updated.description = next.description.clone();
        updated.category = next.category.clone();
        updated.subcategory = next.subcategory.clone();
        updated.price = None;

        let moved =
            updated.category != stored.category || updated.subcategory != stored.subcategory;
        if moved {
            validate_name("category", &updated.category)?;
            validate_name("subcategory", &updated.subcategory)?;
            if self.store.exists(&record_query(&updated))? {
                return Err(RepoError::AlreadyExists(record_query(&updated).to_string()));
            }
        }

        let renditions = upload
            .map(|bytes| images::render(self.pipeline.as_ref(), self.sizes, bytes))
            .transpose()?;

        let old_location = record_query(&stored);
        let new_record = record_query(&updated).value(updated.to_record()?);
        let image_writes = renditions
            .as_ref()
            .map(|r| images::product_writes(&updated.title, r));

        let mut mutations = Vec::new();
        if moved {
            mutations.push(Mutation::Delete(&old_location));
            mutations.push(Mutation::Insert(&new_record));
        } else {
            mutations.push(Mutation::Put(&new_record));
        }
        if let Some(writes) = &image_writes {
            mutations.extend(writes.iter().map(Mutation::Put));
        }
        self.store.batch(&mutations)?;

        self.cache.invalidate();
        if moved {
            info!(
                title = %updated.title,
                from = %format!("{}/{}", stored.category, stored.subcategory),
                to = %format!("{}/{}", updated.category, updated.subcategory),
                "product moved"
            );
        } else {
            info!(title = %updated.title, images = renditions.is_some(), "product updated");
        }

        updated.price = Some(category_price(
            self.store.as_ref(),
            &updated.category,
            &self.default_price,
        )?);
        Ok(updated)
    }

    /// Remove the external listing, then the record and every rendition.
    pub fn delete(&self, product: &Product) -> RepoResult<()> {
        let stored = self.fetch(&product.title, &product.category, &product.subcategory)?;
        self.commerce.delete(&stored.external_id)?;

        let mut doomed = vec![record_query(&stored)];
        let image_namespace = images::product_namespace(&stored.title);
        match self.store.get_all(&image_namespace, &mut |_, _| Ok(())) {
            Ok(()) => doomed.push(image_namespace),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        self.store.delete(&doomed)?;

        self.cache.invalidate();
        info!(
            title = %stored.title,
            external_id = %stored.external_id,
            "product deleted"
        );
        Ok(())
    }
}
