//! Schemaless key-value entity storage for entistore.
//!
//! This crate is the opaque store the data-access layer talks to. A record
//! is a [`RawEntity`]: an [`EntityKey`](entistore_types::EntityKey) plus a
//! property map of JSON values. The store never interprets properties except
//! when evaluating equality filters.
//!
//! # Storage Backends
//!
//! All backends implement the [`Datastore`] trait:
//!
//! - [`InMemoryDatastore`] -- `BTreeMap`-based store for tests and embedding,
//!   optionally with a lagging replica that serves eventual reads
//! - [`CachingDatastore`] -- write-through cache wrapped around another store
//! - [`FileDatastore`] -- in-memory store persisted as a JSON snapshot
//!
//! # Design Rules
//!
//! 1. Keys are complete when they reach the store; ids come from
//!    [`Datastore::allocate_ids`].
//! 2. Strong reads always observe the latest successful write.
//! 3. Eventual reads may observe an older state.
//! 4. Queries are flat conjunctions of equality filters, optionally scoped to
//!    a kind and an ancestor.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod cache;
pub mod entity;
pub mod error;
pub mod file;
pub mod memory;
pub mod query;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use cache::{CacheBypass, CacheStats, CachingDatastore};
pub use entity::{Properties, RawEntity};
pub use error::{QueryError, StoreError, StoreResult};
pub use file::FileDatastore;
pub use memory::{InMemoryDatastore, MemorySnapshot};
pub use query::{Conditions, Filter, Query, QueryBuilder};
pub use traits::{Consistency, Datastore};
