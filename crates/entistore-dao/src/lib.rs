//! Typed data-access layer for entistore.
//!
//! [`GenericDao<T>`] is the façade application code talks to: typed CRUD,
//! batch reads and writes, ancestor-scoped and filtered loads with optional
//! projections, and chunked binary payloads. DAOs are handed out by a
//! [`DaoService`], which owns the underlying [`Datastore`] and the shared
//! store-side cache.
//!
//! # Read policies
//!
//! Tolerant reads ([`GenericDao::get`], [`GenericDao::get_all`]) leave
//! missing keys out of their result. Authoritative reads
//! ([`GenericDao::find`], [`GenericDao::load_one`]) fail with
//! [`DaoError::NotFound`].
//!
//! # Concurrency
//!
//! Every public operation on one DAO instance holds that instance's mutex
//! for its whole duration, including multi-step binary operations. Separate
//! instances are not coordinated.

pub mod blob;
pub mod chunk;
pub mod config;
pub mod dao;
pub mod entity;
pub mod error;
pub mod policy;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use blob::{BinaryDeletion, BlobAssembler};
pub use chunk::{BinaryProvider, ChunkFile, CHUNK_KIND};
pub use config::DaoConfig;
pub use dao::GenericDao;
pub use entity::{from_raw, to_raw, Entity, LoadGroup};
pub use error::{DaoError, DaoResult};
pub use policy::{CachePolicy, DaoPolicy};
pub use service::DaoService;

// Re-export key types
pub use entistore_store::{Conditions, Consistency, Datastore};
pub use entistore_types::{EntityKey, KeyId};
