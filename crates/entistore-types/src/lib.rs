//! Foundation types for entistore.
//!
//! Every record in an entistore datastore is addressed by an [`EntityKey`]:
//! a kind, an id and an optional parent key. Parent chains make keys
//! hierarchical, which is what ancestor-scoped queries walk.
//!
//! # Key Types
//!
//! - [`KeyId`] -- numeric or named identifier within a kind
//! - [`EntityKey`] -- hierarchical key with a printable, parseable text form

pub mod error;
pub mod key;

pub use error::TypeError;
pub use key::{validate_kind, Ancestors, EntityKey, KeyId};
