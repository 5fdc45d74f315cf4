use shelf_store::StoreError;
use shelf_types::TypeError;
use thiserror::Error;

/// Errors surfaced by the domain repositories.
///
/// `NotFound`, `AlreadyExists` and `Validation` are caller errors; the rest
/// are faults of a collaborator or of the store itself.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("validation failed: {0}")]
    Validation(String),

    /// The external commerce system refused or failed a request.
    #[error("commerce system error: {0}")]
    External(String),

    #[error("image error: {0}")]
    Image(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("password hashing error: {0}")]
    Password(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Store(StoreError),
}

impl RepoError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

impl From<StoreError> for RepoError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { path } => Self::NotFound(path),
            StoreError::AlreadyExists { path } => Self::AlreadyExists(path),
            other => Self::Store(other),
        }
    }
}

impl From<TypeError> for RepoError {
    fn from(e: TypeError) -> Self {
        match e {
            TypeError::Serialization(msg) => Self::Serialization(msg),
            other => Self::Validation(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result alias for repository operations.
pub type RepoResult<T> = Result<T, RepoError>;
