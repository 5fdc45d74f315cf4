use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid blog key: {0}")]
    InvalidBlogKey(String),

    #[error("invalid permission: {0}")]
    InvalidPermission(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
