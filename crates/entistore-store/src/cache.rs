use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use entistore_types::EntityKey;
use tracing::debug;

use crate::entity::RawEntity;
use crate::error::{StoreError, StoreResult};
use crate::query::Query;
use crate::traits::{Consistency, Datastore};

/// Hit/miss counters of a [`CachingDatastore`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<EntityKey, RawEntity>,
    order: VecDeque<EntityKey>,
}

impl CacheState {
    fn insert(&mut self, entity: RawEntity, capacity: usize) {
        if capacity == 0 {
            return;
        }
        let key = entity.key.clone();
        if self.entries.insert(key.clone(), entity).is_none() {
            self.order.push_back(key);
        }
        while self.entries.len() > capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    fn invalidate(&mut self, key: &EntityKey) {
        if self.entries.remove(key).is_some() {
            self.order.retain(|cached| cached != key);
        }
    }

    /// Replace the cached copy of `key` with what the inner store returned.
    fn refresh(&mut self, key: &EntityKey, fetched: Option<&RawEntity>, capacity: usize) {
        match fetched {
            Some(entity) => self.insert(entity.clone(), capacity),
            None => self.invalidate(key),
        }
    }
}

/// Write-through record cache in front of another [`Datastore`].
///
/// Eventual key lookups are answered from the cache when possible. Strong
/// lookups always read the inner store and refresh the cached copy with the
/// result. Writes go to the inner store first and then refresh the cached
/// copy; deletes invalidate it. Queries always go to the inner
/// store. The cache holds at most `capacity` records and evicts the oldest
/// insertion first.
pub struct CachingDatastore {
    inner: Arc<dyn Datastore>,
    state: Mutex<CacheState>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CachingDatastore {
    /// Wrap `inner` with a cache of at most `capacity` records.
    pub fn new(inner: Arc<dyn Datastore>, capacity: usize) -> Self {
        Self {
            inner,
            state: Mutex::new(CacheState::default()),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &Arc<dyn Datastore> {
        &self.inner
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.state.lock().expect("lock poisoned").entries.len(),
        }
    }

    /// Drop every cached record.
    pub fn clear(&self) -> StoreResult<()> {
        let mut state = self.lock()?;
        state.entries.clear();
        state.order.clear();
        Ok(())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, CacheState>> {
        self.state.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn cached(&self, key: &EntityKey) -> StoreResult<Option<RawEntity>> {
        let hit = self.lock()?.entries.get(key).cloned();
        if hit.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(hit)
    }
}

impl Datastore for CachingDatastore {
    fn get(&self, key: &EntityKey, consistency: Consistency) -> StoreResult<Option<RawEntity>> {
        if consistency == Consistency::Strong {
            let fetched = self.inner.get(key, consistency)?;
            self.lock()?.refresh(key, fetched.as_ref(), self.capacity);
            return Ok(fetched);
        }
        if let Some(entity) = self.cached(key)? {
            return Ok(Some(entity));
        }
        let fetched = self.inner.get(key, consistency)?;
        if let Some(ref entity) = fetched {
            self.lock()?.insert(entity.clone(), self.capacity);
        }
        Ok(fetched)
    }

    fn put(&self, entity: RawEntity) -> StoreResult<EntityKey> {
        let key = self.inner.put(entity.clone())?;
        self.lock()?.insert(entity, self.capacity);
        Ok(key)
    }

    fn delete(&self, key: &EntityKey) -> StoreResult<bool> {
        let existed = self.inner.delete(key)?;
        self.lock()?.invalidate(key);
        Ok(existed)
    }

    fn query(&self, query: &Query, consistency: Consistency) -> StoreResult<Vec<RawEntity>> {
        self.inner.query(query, consistency)
    }

    fn allocate_ids(&self, kind: &str, count: usize) -> StoreResult<Vec<i64>> {
        self.inner.allocate_ids(kind, count)
    }

    fn get_batch(
        &self,
        keys: &[EntityKey],
        consistency: Consistency,
    ) -> StoreResult<Vec<Option<RawEntity>>> {
        if consistency == Consistency::Strong {
            let fetched = self.inner.get_batch(keys, consistency)?;
            let mut state = self.lock()?;
            for (key, entity) in keys.iter().zip(&fetched) {
                state.refresh(key, entity.as_ref(), self.capacity);
            }
            return Ok(fetched);
        }

        let mut results = Vec::with_capacity(keys.len());
        let mut missing = Vec::new();
        for (index, key) in keys.iter().enumerate() {
            let cached = self.cached(key)?;
            if cached.is_none() {
                missing.push(index);
            }
            results.push(cached);
        }
        if missing.is_empty() {
            return Ok(results);
        }

        let missing_keys: Vec<EntityKey> = missing.iter().map(|&i| keys[i].clone()).collect();
        let fetched = self.inner.get_batch(&missing_keys, consistency)?;
        debug!(
            requested = keys.len(),
            fetched = missing_keys.len(),
            "cache batch lookup"
        );

        let mut state = self.lock()?;
        for (index, entity) in missing.into_iter().zip(fetched) {
            if let Some(ref entity) = entity {
                state.insert(entity.clone(), self.capacity);
            }
            results[index] = entity;
        }
        Ok(results)
    }

    fn put_batch(&self, entities: Vec<RawEntity>) -> StoreResult<Vec<EntityKey>> {
        let keys = self.inner.put_batch(entities.clone())?;
        let mut state = self.lock()?;
        for entity in entities {
            state.insert(entity, self.capacity);
        }
        Ok(keys)
    }

    fn delete_batch(&self, keys: &[EntityKey]) -> StoreResult<usize> {
        let removed = self.inner.delete_batch(keys)?;
        let mut state = self.lock()?;
        for key in keys {
            state.invalidate(key);
        }
        Ok(removed)
    }
}

/// Uncached view of a shared [`CachingDatastore`].
///
/// Reads and queries go straight to the inner store. Writes and deletes go
/// through the cache so that cached copies held for other sessions stay
/// current.
pub struct CacheBypass {
    cache: Arc<CachingDatastore>,
}

impl CacheBypass {
    pub fn new(cache: Arc<CachingDatastore>) -> Self {
        Self { cache }
    }
}

impl Datastore for CacheBypass {
    fn get(&self, key: &EntityKey, consistency: Consistency) -> StoreResult<Option<RawEntity>> {
        self.cache.inner.get(key, consistency)
    }

    fn put(&self, entity: RawEntity) -> StoreResult<EntityKey> {
        self.cache.put(entity)
    }

    fn delete(&self, key: &EntityKey) -> StoreResult<bool> {
        self.cache.delete(key)
    }

    fn query(&self, query: &Query, consistency: Consistency) -> StoreResult<Vec<RawEntity>> {
        self.cache.inner.query(query, consistency)
    }

    fn allocate_ids(&self, kind: &str, count: usize) -> StoreResult<Vec<i64>> {
        self.cache.inner.allocate_ids(kind, count)
    }

    fn get_batch(
        &self,
        keys: &[EntityKey],
        consistency: Consistency,
    ) -> StoreResult<Vec<Option<RawEntity>>> {
        self.cache.inner.get_batch(keys, consistency)
    }

    fn put_batch(&self, entities: Vec<RawEntity>) -> StoreResult<Vec<EntityKey>> {
        self.cache.put_batch(entities)
    }

    fn delete_batch(&self, keys: &[EntityKey]) -> StoreResult<usize> {
        self.cache.delete_batch(keys)
    }
}

impl std::fmt::Debug for CachingDatastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingDatastore")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}
