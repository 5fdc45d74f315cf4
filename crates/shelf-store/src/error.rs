/// Errors from namespace store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The key or one of the namespaces on the path does not exist.
    #[error("not found: {path}")]
    NotFound { path: String },

    /// The target namespace or entry already exists.
    #[error("already exists: {path}")]
    AlreadyExists { path: String },

    /// A name refers to a namespace where an entry was expected, or the
    /// other way round.
    #[error("incompatible value at {path}: {reason}")]
    IncompatibleValue { path: String, reason: String },

    /// The query cannot be executed as written (e.g. empty path).
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Snapshot data is malformed.
    #[error("corrupt snapshot at record {record}: {reason}")]
    CorruptSnapshot { record: u64, reason: String },

    #[error("invalid snapshot magic: expected {expected}, got {actual}")]
    InvalidMagic { expected: String, actual: String },

    #[error("unsupported snapshot version: {0}")]
    UnsupportedVersion(u32),

    #[error("snapshot checksum mismatch")]
    ChecksumMismatch,

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("commit error: {0}")]
    Commit(#[from] redb::CommitError),
}

impl StoreError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists { path: path.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
