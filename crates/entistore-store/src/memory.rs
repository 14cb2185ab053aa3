use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use entistore_types::EntityKey;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entity::RawEntity;
use crate::error::{StoreError, StoreResult};
use crate::query::Query;
use crate::traits::{Consistency, Datastore};

type EntityMap = BTreeMap<EntityKey, RawEntity>;

/// Serializable copy of an in-memory store's full state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    /// Next id the allocator hands out.
    pub next_id: i64,
    /// Every record, in key order.
    pub entities: Vec<RawEntity>,
}

/// In-memory, `BTreeMap`-based datastore.
///
/// Intended for tests and embedding. Records are held behind a `RwLock` and
/// cloned on read/write.
///
/// A store built with [`with_replication_lag`](Self::with_replication_lag)
/// keeps a second copy of the data that serves eventual reads. The replica
/// only catches up when [`apply_pending`](Self::apply_pending) is called, so
/// tests can observe stale eventual reads deterministically.
pub struct InMemoryDatastore {
    primary: RwLock<EntityMap>,
    replica: Option<RwLock<EntityMap>>,
    next_id: AtomicI64,
}

impl InMemoryDatastore {
    /// Create a new empty store whose eventual reads are never stale.
    pub fn new() -> Self {
        Self {
            primary: RwLock::new(EntityMap::new()),
            replica: None,
            next_id: AtomicI64::new(1),
        }
    }

    /// Create a new empty store whose eventual reads lag behind writes until
    /// [`apply_pending`](Self::apply_pending) is called.
    pub fn with_replication_lag() -> Self {
        Self {
            replica: Some(RwLock::new(EntityMap::new())),
            ..Self::new()
        }
    }

    /// Rebuild a store from a snapshot.
    pub fn from_snapshot(snapshot: MemorySnapshot) -> Self {
        let entities: EntityMap = snapshot
            .entities
            .into_iter()
            .map(|entity| (entity.key.clone(), entity))
            .collect();
        let next_id = snapshot.next_id.max(1);
        Self {
            primary: RwLock::new(entities),
            replica: None,
            next_id: AtomicI64::new(next_id),
        }
    }

    /// Copy the full state of the store.
    pub fn snapshot(&self) -> StoreResult<MemorySnapshot> {
        let primary = read(&self.primary)?;
        Ok(MemorySnapshot {
            next_id: self.next_id.load(Ordering::SeqCst),
            entities: primary.values().cloned().collect(),
        })
    }

    /// Replace the full state of the store with `snapshot`. A replica, if
    /// present, is replaced as well.
    pub fn restore(&self, snapshot: MemorySnapshot) -> StoreResult<()> {
        let entities: EntityMap = snapshot
            .entities
            .into_iter()
            .map(|entity| (entity.key.clone(), entity))
            .collect();
        if let Some(ref replica) = self.replica {
            *write(replica)? = entities.clone();
        }
        *write(&self.primary)? = entities;
        self.next_id.store(snapshot.next_id.max(1), Ordering::SeqCst);
        Ok(())
    }

    /// Bring the replica up to date with the primary. No-op without lag.
    pub fn apply_pending(&self) -> StoreResult<()> {
        if let Some(ref replica) = self.replica {
            let primary = read(&self.primary)?;
            let mut replica = write(replica)?;
            *replica = primary.clone();
            debug!(entities = replica.len(), "replica caught up");
        }
        Ok(())
    }

    /// Number of records currently stored (strongly consistent).
    pub fn len(&self) -> usize {
        self.primary.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return every stored key in key order.
    pub fn all_keys(&self) -> StoreResult<Vec<EntityKey>> {
        Ok(read(&self.primary)?.keys().cloned().collect())
    }

    fn view(&self, consistency: Consistency) -> StoreResult<RwLockReadGuard<'_, EntityMap>> {
        match (consistency, &self.replica) {
            (Consistency::Eventual, Some(replica)) => read(replica),
            _ => read(&self.primary),
        }
    }

    fn observe_id(&self, key: &EntityKey) {
        if let Some(id) = key.id().as_id() {
            self.next_id.fetch_max(id.saturating_add(1), Ordering::SeqCst);
        }
    }
}

impl Default for InMemoryDatastore {
    fn default() -> Self {
        Self::new()
    }
}

impl Datastore for InMemoryDatastore {
    fn get(&self, key: &EntityKey, consistency: Consistency) -> StoreResult<Option<RawEntity>> {
        Ok(self.view(consistency)?.get(key).cloned())
    }

    fn put(&self, entity: RawEntity) -> StoreResult<EntityKey> {
        let key = entity.key.clone();
        self.observe_id(&key);
        write(&self.primary)?.insert(key.clone(), entity);
        Ok(key)
    }

    fn delete(&self, key: &EntityKey) -> StoreResult<bool> {
        Ok(write(&self.primary)?.remove(key).is_some())
    }

    fn query(&self, query: &Query, consistency: Consistency) -> StoreResult<Vec<RawEntity>> {
        let view = self.view(consistency)?;
        Ok(view
            .values()
            .filter(|entity| query.matches(entity))
            .cloned()
            .collect())
    }

    fn allocate_ids(&self, _kind: &str, count: usize) -> StoreResult<Vec<i64>> {
        let count = i64::try_from(count)
            .map_err(|_| StoreError::Unavailable(format!("cannot allocate {count} ids")))?;
        let first = self.next_id.fetch_add(count, Ordering::SeqCst);
        Ok((first..first + count).collect())
    }

    fn put_batch(&self, entities: Vec<RawEntity>) -> StoreResult<Vec<EntityKey>> {
        let mut map = write(&self.primary)?;
        let mut keys = Vec::with_capacity(entities.len());
        for entity in entities {
            self.observe_id(&entity.key);
            keys.push(entity.key.clone());
            map.insert(entity.key.clone(), entity);
        }
        Ok(keys)
    }

    fn delete_batch(&self, keys: &[EntityKey]) -> StoreResult<usize> {
        let mut map = write(&self.primary)?;
        Ok(keys.iter().filter(|key| map.remove(*key).is_some()).count())
    }
}

impl std::fmt::Debug for InMemoryDatastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryDatastore")
            .field("entity_count", &self.len())
            .field("replicated", &self.replica.is_some())
            .finish()
    }
}

fn read(lock: &RwLock<EntityMap>) -> StoreResult<RwLockReadGuard<'_, EntityMap>> {
    lock.read().map_err(|_| StoreError::LockPoisoned)
}

fn write(lock: &RwLock<EntityMap>) -> StoreResult<RwLockWriteGuard<'_, EntityMap>> {
    lock.write().map_err(|_| StoreError::LockPoisoned)
}
