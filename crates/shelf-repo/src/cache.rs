use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::RepoResult;

/// One navbar entry: a category and its subcategories.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavLink {
    pub category: String,
    pub subcategories: Vec<String>,
}

/// Caches derived from the catalog.
///
/// Both maps are dropped by [`CatalogCache::invalidate`], which every
/// catalog mutation calls, and rebuilt on the next read. Readers may see a
/// value that is stale by one mutation, never a partially built one.
#[derive(Debug, Default)]
pub struct CatalogCache {
    links: Mutex<Option<Vec<NavLink>>>,
    etags: Mutex<HashMap<String, String>>,
}

impl CatalogCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached navbar links, built with `load` when absent.
    ///
    /// The lock is held while loading so concurrent readers wait for one
    /// build instead of racing their own.
    pub fn navbar_links(
        &self,
        load: impl FnOnce() -> RepoResult<Vec<NavLink>>,
    ) -> RepoResult<Vec<NavLink>> {
        let mut links = self.links.lock().expect("navbar cache mutex poisoned");
        if let Some(cached) = links.as_ref() {
            return Ok(cached.clone());
        }
        let fresh = load()?;
        *links = Some(fresh.clone());
        Ok(fresh)
    }

    /// Compute and remember the entity tag of an image.
    pub fn etag(&self, name: &str, bytes: &[u8]) -> String {
        let tag = hex::encode(blake3::hash(bytes).as_bytes());
        self.etags
            .lock()
            .expect("etag cache mutex poisoned")
            .insert(name.to_string(), tag.clone());
        tag
    }

    /// Whether an `If-None-Match` header value names the remembered tag.
    pub fn etag_matches(&self, name: &str, if_none_match: &str) -> bool {
        if if_none_match.is_empty() {
            return false;
        }
        let etags = self.etags.lock().expect("etag cache mutex poisoned");
        etags
            .get(name)
            .is_some_and(|tag| if_none_match.contains(tag.as_str()))
    }

    pub fn invalidate(&self) {
        *self.links.lock().expect("navbar cache mutex poisoned") = None;
        self.etags.lock().expect("etag cache mutex poisoned").clear();
    }
}
