use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid kind {kind:?}: {reason}")]
    InvalidKind { kind: String, reason: String },

    #[error("malformed key {input:?} at byte {offset}: {reason}")]
    MalformedKey {
        input: String,
        offset: usize,
        reason: String,
    },
}
