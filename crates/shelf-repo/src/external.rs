//! Collaborators the repositories call out to: the external commerce
//! system, the image pipeline and password hashing.

use crate::error::{RepoError, RepoResult};

/// Client for the external commerce system that mirrors product listings
/// for checkout.
pub trait CommerceClient: Send + Sync {
    /// Create a listing and return its id in the external system.
    fn create(&self, title: &str, category: &str, price: &str) -> RepoResult<String>;

    fn delete(&self, external_id: &str) -> RepoResult<()>;

    fn attach_image(&self, external_id: &str, image: &[u8]) -> RepoResult<()>;
}

/// A decoded raster image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Decoding and resizing of uploaded images.
pub trait ImagePipeline: Send + Sync {
    /// Decode an encoded image. Malformed input is an [`RepoError::Image`].
    fn decode(&self, bytes: &[u8]) -> RepoResult<DecodedImage>;

    /// Scale to `width` pixels wide, keeping the aspect ratio, and encode.
    fn resize(&self, image: &DecodedImage, width: u32) -> RepoResult<Vec<u8>>;
}

pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> RepoResult<String>;

    fn verify(&self, password: &str, hashed: &str) -> RepoResult<bool>;
}

/// bcrypt password hashing.
#[derive(Clone, Copy, Debug)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash(&self, password: &str) -> RepoResult<String> {
        bcrypt::hash(password, self.cost).map_err(|e| RepoError::Password(e.to_string()))
    }

    fn verify(&self, password: &str, hashed: &str) -> RepoResult<bool> {
        bcrypt::verify(password, hashed).map_err(|e| RepoError::Password(e.to_string()))
    }
}
