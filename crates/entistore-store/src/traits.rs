use std::fmt;

use entistore_types::EntityKey;
use serde::{Deserialize, Serialize};

use crate::entity::RawEntity;
use crate::error::StoreResult;
use crate::query::Query;

/// Read consistency requested from the store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Consistency {
    /// Reads observe the latest successful write.
    Strong,
    /// Reads may observe an older state.
    #[default]
    Eventual,
}

impl fmt::Display for Consistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strong => write!(f, "strong"),
            Self::Eventual => write!(f, "eventual"),
        }
    }
}

/// Schemaless key-value entity store.
///
/// All implementations must satisfy these invariants:
/// - Keys handed to `put` are complete; a put on an existing key overwrites
///   the record.
/// - `Consistency::Strong` reads observe every write that returned `Ok`.
/// - Deleting a missing key is not an error.
/// - All I/O errors are propagated, never silently ignored.
pub trait Datastore: Send + Sync {
    /// Read a record by key.
    ///
    /// Returns `Ok(None)` if the record does not exist.
    fn get(&self, key: &EntityKey, consistency: Consistency) -> StoreResult<Option<RawEntity>>;

    /// Write a record, overwriting any record with the same key.
    fn put(&self, entity: RawEntity) -> StoreResult<EntityKey>;

    /// Delete a record by key. Returns `true` if the record existed.
    fn delete(&self, key: &EntityKey) -> StoreResult<bool>;

    /// Run a query and return every matching record in key order.
    fn query(&self, query: &Query, consistency: Consistency) -> StoreResult<Vec<RawEntity>>;

    /// Reserve `count` numeric ids for new records of `kind`.
    ///
    /// Allocated ids are never handed out twice by the same store.
    fn allocate_ids(&self, kind: &str, count: usize) -> StoreResult<Vec<i64>>;

    /// Read multiple records in a batch, positionally aligned with `keys`.
    ///
    /// Default implementation calls `get()` for each key. Backends may
    /// override for fewer round-trips.
    fn get_batch(
        &self,
        keys: &[EntityKey],
        consistency: Consistency,
    ) -> StoreResult<Vec<Option<RawEntity>>> {
        keys.iter().map(|key| self.get(key, consistency)).collect()
    }

    /// Write multiple records in a batch and return their keys in order.
    ///
    /// Default implementation calls `put()` for each record, so a failure
    /// part-way leaves the earlier records written.
    fn put_batch(&self, entities: Vec<RawEntity>) -> StoreResult<Vec<EntityKey>> {
        entities.into_iter().map(|entity| self.put(entity)).collect()
    }

    /// Delete multiple records and return how many existed.
    fn delete_batch(&self, keys: &[EntityKey]) -> StoreResult<usize> {
        let mut removed = 0;
        for key in keys {
            if self.delete(key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
