use std::sync::{Arc, Mutex};

use chrono::Utc;
use shelf_store::{Mutation, Query, StoreError, Storer};
use shelf_types::{BlogKey, BlogPost};
use tracing::{info, warn};

use crate::config::ImageSizes;
use crate::error::RepoResult;
use crate::external::ImagePipeline;
use crate::images::{self, render_full};

pub(crate) const BLOGS: &str = "blogs";

fn post_query(key: &BlogKey) -> Query {
    Query::at([BLOGS]).key(key.id())
}

/// Blog posts, keyed `"<date>:<title>"`, with an optional image each.
pub struct Blogs {
    store: Arc<dyn Storer>,
    pipeline: Arc<dyn ImagePipeline>,
    sizes: ImageSizes,
    current: Mutex<Option<BlogPost>>,
}

impl Blogs {
    pub fn new(store: Arc<dyn Storer>, pipeline: Arc<dyn ImagePipeline>, sizes: ImageSizes) -> Self {
        Self {
            store,
            pipeline,
            sizes,
            current: Mutex::new(None),
        }
    }

    /// Every post key, newest first.
    pub fn list(&self) -> RepoResult<Vec<BlogKey>> {
        let mut keys = Vec::new();
        self.store.get_all(&Query::at([BLOGS]), &mut |key, _| {
            let raw = String::from_utf8_lossy(key);
            match BlogKey::parse(&raw) {
                Ok(parsed) => keys.push(parsed),
                Err(e) => warn!(key = %raw, error = %e, "skipping malformed blog key"),
            }
            Ok(())
        })?;
        keys.sort_by(|a, b| b.cmp(a));
        Ok(keys)
    }

    pub fn get(&self, key: &BlogKey) -> RepoResult<BlogPost> {
        let raw = self.store.fetch(&post_query(key))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// The newest post, cached until the next save, update or delete.
    /// `None` when there are no posts.
    pub fn current(&self) -> RepoResult<Option<BlogPost>> {
        let mut current = self.current.lock().expect("blog cache mutex poisoned");
        if let Some(post) = current.as_ref() {
            return Ok(Some(post.clone()));
        }
        let Some(newest) = self.list()?.into_iter().next() else {
            return Ok(None);
        };
        let post = self.get(&newest)?;
        *current = Some(post.clone());
        Ok(Some(post))
    }

    fn forget_current(&self) {
        *self.current.lock().expect("blog cache mutex poisoned") = None;
    }

    fn record(post: &BlogPost) -> RepoResult<Query> {
        Ok(post_query(&post.key()).value(serde_json::to_vec(post)?))
    }

    /// Publish a post dated now, with an optional image.
    pub fn save(&self, post: &BlogPost, image: Option<&[u8]>) -> RepoResult<BlogPost> {
        let mut post = post.clone();
        post.date = Utc::now();

        let mut writes = vec![Self::record(&post)?];
        if let Some(upload) = image {
            let rendered = render_full(self.pipeline.as_ref(), self.sizes, upload)?;
            writes.push(images::blog_query(&post.key()).value(rendered));
        }
        self.store.put(&writes)?;
        self.forget_current();
        info!(key = %post.key(), "blog post saved");
        Ok(post)
    }

    /// Replace the post stored at `old` with `next`.
    ///
    /// A changed title or date changes the key: the old post is removed
    /// and, unless a new image is given, its image moves to the new key.
    /// Re-keying onto another post's key fails with `AlreadyExists`.
    /// Everything happens in one batch.
    pub fn update(
        &self,
        old: &BlogKey,
        next: &BlogPost,
        image: Option<&[u8]>,
    ) -> RepoResult<BlogPost> {
        self.get(old)?;
        let new_key = next.key();
        let rekeyed = &new_key != old;

        let old_post = post_query(old);
        let old_image = images::blog_query(old);
        let new_post = Self::record(next)?;

        let carried = if rekeyed {
            match self.store.fetch(&old_image) {
                Ok(bytes) => Some(bytes),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e.into()),
            }
        } else {
            None
        };
        let had_image = carried.is_some();

        let new_image = match image {
            Some(upload) => Some(render_full(self.pipeline.as_ref(), self.sizes, upload)?),
            None => carried,
        }
        .map(|bytes| images::blog_query(&new_key).value(bytes));

        let mut mutations = Vec::new();
        if rekeyed {
            mutations.push(Mutation::Delete(&old_post));
            if had_image {
                mutations.push(Mutation::Delete(&old_image));
            }
            mutations.push(Mutation::Insert(&new_post));
        } else {
            mutations.push(Mutation::Put(&new_post));
        }
        if let Some(write) = &new_image {
            mutations.push(Mutation::Put(write));
        }
        self.store.batch(&mutations)?;

        self.forget_current();
        info!(from = %old, to = %new_key, "blog post updated");
        Ok(next.clone())
    }

    /// Delete a post and its image.
    pub fn delete(&self, key: &BlogKey) -> RepoResult<()> {
        if !self.store.exists(&post_query(key))? {
            return Err(StoreError::not_found(format!("{BLOGS}#{key}")).into());
        }
        let mut doomed = vec![post_query(key)];
        let image = images::blog_query(key);
        if self.store.exists(&image)? {
            doomed.push(image);
        }
        self.store.delete(&doomed)?;
        self.forget_current();
        info!(key = %key, "blog post deleted");
        Ok(())
    }
}
