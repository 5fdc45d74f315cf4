use std::fmt;
use std::sync::Arc;

use shelf_store::{Query, Storer};
use shelf_types::BlogKey;

use crate::config::ImageSizes;
use crate::error::RepoResult;
use crate::external::ImagePipeline;

pub(crate) const IMAGES: &str = "images";

/// Owner of an image sub-namespace under `images/`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageKind {
    Products,
    Blogs,
}

impl ImageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Products => "products",
            Self::Blogs => "blogs",
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored rendition of a product image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageSize {
    Full,
    Thumb,
}

impl ImageSize {
    /// Entry key inside `images/products/<title>`.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Full => "image",
            Self::Thumb => "thumb",
        }
    }
}

/// Full and thumbnail renditions of one upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Renditions {
    pub full: Vec<u8>,
    pub thumb: Vec<u8>,
}

pub(crate) fn render(
    pipeline: &dyn ImagePipeline,
    sizes: ImageSizes,
    upload: &[u8],
) -> RepoResult<Renditions> {
    let decoded = pipeline.decode(upload)?;
    Ok(Renditions {
        full: pipeline.resize(&decoded, sizes.full)?,
        thumb: pipeline.resize(&decoded, sizes.thumb)?,
    })
}

pub(crate) fn render_full(
    pipeline: &dyn ImagePipeline,
    sizes: ImageSizes,
    upload: &[u8],
) -> RepoResult<Vec<u8>> {
    let decoded = pipeline.decode(upload)?;
    pipeline.resize(&decoded, sizes.full)
}

/// Namespace holding every rendition of a product's image.
pub(crate) fn product_namespace(title: &str) -> Query {
    Query::at([IMAGES, ImageKind::Products.as_str(), title])
}

pub(crate) fn product_writes(title: &str, renditions: &Renditions) -> [Query; 2] {
    [
        product_namespace(title)
            .key(ImageSize::Full.key())
            .value(renditions.full.clone()),
        product_namespace(title)
            .key(ImageSize::Thumb.key())
            .value(renditions.thumb.clone()),
    ]
}

pub(crate) fn blog_query(key: &BlogKey) -> Query {
    Query::at([IMAGES, ImageKind::Blogs.as_str()]).key(key.id())
}

/// Read access to stored images.
pub struct Images {
    store: Arc<dyn Storer>,
}

impl Images {
    pub fn new(store: Arc<dyn Storer>) -> Self {
        Self { store }
    }

    /// Raw bytes of `images/<kind>/<title>/<size>`.
    pub fn image(&self, kind: ImageKind, title: &str, size: &str) -> RepoResult<Vec<u8>> {
        let query = Query::at([IMAGES, kind.as_str(), title]).key(size);
        Ok(self.store.fetch(&query)?)
    }

    pub fn product_image(&self, title: &str, size: ImageSize) -> RepoResult<Vec<u8>> {
        self.image(ImageKind::Products, title, size.key())
    }

    pub fn blog_image(&self, key: &BlogKey) -> RepoResult<Vec<u8>> {
        Ok(self.store.fetch(&blog_query(key))?)
    }
}
