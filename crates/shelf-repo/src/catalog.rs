//! Categories and subcategories.
//!
//! A category is the namespace `products/<category>`, a subcategory the
//! namespace `products/<category>/<subcategory>`. Neither has a record of
//! its own; the only leaf at category level is the reserved `_price_`
//! entry.

use std::sync::Arc;

use shelf_store::{Mutation, Query, StoreError, Storer};
use shelf_types::{Price, Product};
use tracing::info;

use crate::cache::{CatalogCache, NavLink};
use crate::error::{RepoError, RepoResult};
use crate::images;

pub(crate) const PRODUCTS: &str = "products";

/// Reserved entry holding a category's prices.
pub const PRICE_KEY: &str = "_price_";

pub(crate) fn category_query(category: &str) -> Query {
    Query::at([PRODUCTS, category])
}

pub(crate) fn subcategory_query(category: &str, subcategory: &str) -> Query {
    Query::at([PRODUCTS, category, subcategory])
}

pub(crate) fn validate_name(what: &str, name: &str) -> RepoResult<()> {
    if name.trim().is_empty() {
        return Err(RepoError::Validation(format!("{what} name must not be empty")));
    }
    if name == PRICE_KEY {
        return Err(RepoError::Validation(format!("{what} name {PRICE_KEY} is reserved")));
    }
    Ok(())
}

fn utf8(raw: &[u8]) -> Result<String, StoreError> {
    String::from_utf8(raw.to_vec()).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Price of `category`, falling back to `default` when none was set.
pub(crate) fn category_price(
    store: &dyn Storer,
    category: &str,
    default: &Price,
) -> RepoResult<Price> {
    match store.fetch(&category_query(category).key(PRICE_KEY)) {
        Ok(raw) => Ok(serde_json::from_slice(&raw)?),
        Err(e) if e.is_not_found() => {
            // a missing category must still be an error
            names(store, &category_query(category))?;
            Ok(default.clone())
        }
        Err(e) => Err(e.into()),
    }
}

fn names(store: &dyn Storer, namespace: &Query) -> RepoResult<Vec<String>> {
    let mut out = Vec::new();
    store.get_buckets(namespace, &mut |name| {
        out.push(utf8(name)?);
        Ok(())
    })?;
    Ok(out)
}

fn titles(store: &dyn Storer, namespace: &Query) -> RepoResult<Vec<String>> {
    let mut out = Vec::new();
    store.get_all(namespace, &mut |key, _| {
        out.push(utf8(key)?);
        Ok(())
    })?;
    Ok(out)
}

pub struct Catalog {
    store: Arc<dyn Storer>,
    cache: Arc<CatalogCache>,
    default_price: Price,
}

impl Catalog {
    pub fn new(store: Arc<dyn Storer>, cache: Arc<CatalogCache>, default_price: Price) -> Self {
        Self {
            store,
            cache,
            default_price,
        }
    }

    pub fn categories(&self) -> RepoResult<Vec<String>> {
        names(self.store.as_ref(), &Query::at([PRODUCTS]))
    }

    pub fn subcategories(&self, category: &str) -> RepoResult<Vec<String>> {
        names(self.store.as_ref(), &category_query(category))
    }

    pub fn product_titles(&self, category: &str, subcategory: &str) -> RepoResult<Vec<String>> {
        titles(self.store.as_ref(), &subcategory_query(category, subcategory))
    }

    /// Every product of a subcategory, in title order, with the category
    /// price attached.
    pub fn products(&self, category: &str, subcategory: &str) -> RepoResult<Vec<Product>> {
        let price = self.price(category)?;
        let mut products = Vec::new();
        self.store.get_all(
            &subcategory_query(category, subcategory),
            &mut |key, value| {
                let title = utf8(key)?;
                let mut product = Product::from_record(&title, category, subcategory, value)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                product.price = Some(price.clone());
                products.push(product);
                Ok(())
            },
        )?;
        Ok(products)
    }

    pub fn add_category(&self, name: &str) -> RepoResult<()> {
        validate_name("category", name)?;
        self.store.add_bucket(&Query::at([PRODUCTS]).key(name))?;
        self.cache.invalidate();
        info!(category = name, "category added");
        Ok(())
    }

    pub fn add_subcategory(&self, category: &str, name: &str) -> RepoResult<()> {
        validate_name("subcategory", name)?;
        // the category must exist; add_bucket alone would create it
        self.subcategories(category)?;
        self.store.add_bucket(&category_query(category).key(name))?;
        self.cache.invalidate();
        info!(category, subcategory = name, "subcategory added");
        Ok(())
    }

    /// Rename a category, moving every subcategory and product with it.
    pub fn rename_category(&self, old: &str, new: &str) -> RepoResult<()> {
        validate_name("category", new)?;
        self.store.rename_bucket(
            &Query::at([PRODUCTS]).key(old),
            &Query::at([PRODUCTS]).key(new),
        )?;
        self.cache.invalidate();
        info!(from = old, to = new, "category renamed");
        Ok(())
    }

    pub fn rename_subcategory(&self, category: &str, old: &str, new: &str) -> RepoResult<()> {
        validate_name("subcategory", new)?;
        self.store.rename_bucket(
            &category_query(category).key(old),
            &category_query(category).key(new),
        )?;
        self.cache.invalidate();
        info!(category, from = old, to = new, "subcategory renamed");
        Ok(())
    }

    /// Delete a subcategory with its products and their images.
    pub fn delete_subcategory(&self, category: &str, subcategory: &str) -> RepoResult<()> {
        let namespace = subcategory_query(category, subcategory);
        let mut doomed = vec![namespace.clone()];
        doomed.extend(self.image_namespaces(&[namespace])?);
        self.store.delete(&doomed)?;
        self.cache.invalidate();
        info!(category, subcategory, "subcategory deleted");
        Ok(())
    }

    /// Delete a category with every subcategory, product and product image.
    pub fn delete_category(&self, category: &str) -> RepoResult<()> {
        let subcategories: Vec<Query> = self
            .subcategories(category)?
            .iter()
            .map(|sub| subcategory_query(category, sub))
            .collect();
        let mut doomed = vec![category_query(category)];
        doomed.extend(self.image_namespaces(&subcategories)?);
        self.store.delete(&doomed)?;
        self.cache.invalidate();
        info!(category, "category deleted");
        Ok(())
    }

    /// Wipe the whole catalog, including every product image, in one
    /// transaction. Both namespaces are left present and empty.
    pub fn delete_all_products(&self) -> RepoResult<()> {
        let products = Query::at([PRODUCTS]);
        let product_images = Query::at([images::IMAGES, images::ImageKind::Products.as_str()]);
        self.store.batch(&[
            Mutation::Delete(&products),
            Mutation::Put(&products),
            // the image namespace may never have been created
            Mutation::Put(&product_images),
            Mutation::Delete(&product_images),
            Mutation::Put(&product_images),
        ])?;
        self.cache.invalidate();
        info!("catalog wiped");
        Ok(())
    }

    /// Image namespaces of the products in `subcategories` that exist.
    fn image_namespaces(&self, subcategories: &[Query]) -> RepoResult<Vec<Query>> {
        let mut stored = Vec::new();
        let listed = self.store.get_buckets(
            &Query::at([images::IMAGES, images::ImageKind::Products.as_str()]),
            &mut |name| {
                stored.push(name.to_vec());
                Ok(())
            },
        );
        match listed {
            Ok(()) => {}
            // no product image was ever stored
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        }

        let mut out = Vec::new();
        for subcategory in subcategories {
            for title in titles(self.store.as_ref(), subcategory)? {
                if stored.iter().any(|s| s == title.as_bytes()) {
                    out.push(images::product_namespace(&title));
                }
            }
        }
        Ok(out)
    }

    pub fn set_price(&self, category: &str, price: &Price) -> RepoResult<()> {
        self.subcategories(category)?;
        let record = serde_json::to_vec(price)?;
        self.store
            .put(&[category_query(category).key(PRICE_KEY).value(record)])?;
        info!(category, retail = %price.retail, wholesale = %price.wholesale, "category price set");
        Ok(())
    }

    pub fn price(&self, category: &str) -> RepoResult<Price> {
        category_price(self.store.as_ref(), category, &self.default_price)
    }

    /// Category links for the navigation bar, cached until the next
    /// catalog mutation.
    pub fn navbar_links(&self) -> RepoResult<Vec<NavLink>> {
        self.cache.navbar_links(|| {
            self.categories()?
                .into_iter()
                .map(|category| -> RepoResult<NavLink> {
                    let subcategories = self.subcategories(&category)?;
                    Ok(NavLink {
                        category,
                        subcategories,
                    })
                })
                .collect()
        })
    }
}
