use std::path::PathBuf;

/// Errors from datastore operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted snapshot could not be decoded.
    #[error("corrupt snapshot {path}: {reason}")]
    CorruptSnapshot { path: PathBuf, reason: String },

    /// A backend lock was poisoned by a panicking writer.
    #[error("datastore lock poisoned")]
    LockPoisoned,

    /// The backend cannot serve requests.
    #[error("datastore unavailable: {0}")]
    Unavailable(String),
}

/// Errors from building a query.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("filter field must not be empty")]
    EmptyField,

    #[error("unsupported filter operator {operator:?} on {field:?}: only equality is supported")]
    UnsupportedOperator { field: String, operator: String },
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
