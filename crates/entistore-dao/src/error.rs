use entistore_store::{QueryError, StoreError};
use entistore_types::EntityKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaoError {
    /// An authoritative read found no record.
    #[error("entity not found: {0}")]
    NotFound(EntityKey),

    #[error("{kind} entity has no id")]
    IncompleteKey { kind: String },

    #[error("expected a {expected} key, got {key}")]
    KindMismatch { expected: String, key: EntityKey },

    #[error("{kind} entity must serialize to an object, got {found}")]
    NotAnObject { kind: String, found: String },

    #[error("cannot map {kind} entity: {reason}")]
    Serialization { kind: String, reason: String },

    #[error("chunk size must be at least one byte")]
    InvalidChunkSize,

    #[error("chunk {0} is missing")]
    MissingChunk(EntityKey),

    #[error("chunk {key} is corrupt: {reason}")]
    CorruptChunk { key: EntityKey, reason: String },

    #[error("DAO lock poisoned for kind {0}")]
    LockPoisoned(String),

    #[error("query error: {0}")]
    Query(#[from] QueryError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl DaoError {
    /// Returns `true` for the recoverable "no such record" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns `true` if the error was raised by the underlying store.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

pub type DaoResult<T> = Result<T, DaoError>;
