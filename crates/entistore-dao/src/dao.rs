use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard};

use entistore_store::{Conditions, Consistency, Datastore, Query, QueryBuilder, StoreError};
use entistore_types::{EntityKey, KeyId};
use tracing::{debug, error, info};

use crate::blob::{BinaryDeletion, BlobAssembler};
use crate::chunk::BinaryProvider;
use crate::entity::{check_kind, from_raw, key_of, to_raw, Entity, LoadGroup};
use crate::error::{DaoError, DaoResult};
use crate::policy::DaoPolicy;

/// Typed data-access object for entities of type `T`.
///
/// Every public method takes the instance's mutex for its whole duration, so
/// two calls on the same DAO never overlap, even on unrelated keys. Nothing
/// here is transactional across keys, and no call is retried.
pub struct GenericDao<T: Entity> {
    /// Uncached store, used to resolve owners before binary deletion.
    store: Arc<dyn Datastore>,
    /// Store every other call goes through (cached or not, per policy).
    session: Arc<dyn Datastore>,
    blobs: BlobAssembler,
    policy: DaoPolicy,
    lock: Mutex<()>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> GenericDao<T> {
    pub(crate) fn new(
        store: Arc<dyn Datastore>,
        session: Arc<dyn Datastore>,
        policy: DaoPolicy,
        chunk_size: usize,
    ) -> Self {
        let blobs = BlobAssembler::new(Arc::clone(&session), policy.consistency, chunk_size);
        Self {
            store,
            session,
            blobs,
            policy,
            lock: Mutex::new(()),
            _entity: PhantomData,
        }
    }

    pub fn policy(&self) -> DaoPolicy {
        self.policy
    }

    /// Kind of the entities this DAO manages.
    pub fn kind(&self) -> &'static str {
        T::KIND
    }

    // ---- Writes ----

    /// Save one entity and return its key.
    ///
    /// An entity without an id gets a freshly allocated one, written back
    /// into it. An existing record with the same key is overwritten.
    pub fn put(&self, entity: &mut T) -> DaoResult<EntityKey> {
        let _guard = self.guard()?;
        self.put_locked(entity)
    }

    /// Save a batch of entities with one store write.
    ///
    /// Atomic only as far as the store's batch write is.
    pub fn put_all(&self, entities: Vec<T>) -> DaoResult<BTreeMap<EntityKey, T>> {
        let _guard = self.guard()?;
        Ok(self.put_batch_locked(entities)?.into_iter().collect())
    }

    /// Like [`put_all`](Self::put_all) but returns only the keys, in input
    /// order.
    pub fn put_all_keys(&self, entities: Vec<T>) -> DaoResult<Vec<EntityKey>> {
        let _guard = self.guard()?;
        Ok(self
            .put_batch_locked(entities)?
            .into_iter()
            .map(|(key, _)| key)
            .collect())
    }

    // ---- Tolerant reads ----

    /// Fetch the stored versions of `entities`. Missing records are left
    /// out of the result.
    pub fn get(&self, entities: &[T]) -> DaoResult<BTreeMap<EntityKey, T>> {
        let keys = entities.iter().map(key_of).collect::<DaoResult<Vec<_>>>()?;
        let _guard = self.guard()?;
        self.fetch(&keys)
    }

    /// Fetch records by key. Missing records are left out of the result.
    pub fn get_keys(&self, keys: &[EntityKey]) -> DaoResult<BTreeMap<EntityKey, T>> {
        keys.iter().try_for_each(check_kind::<T>)?;
        let _guard = self.guard()?;
        self.fetch(keys)
    }

    /// Fetch records for any collection of keys.
    pub fn get_all<I>(&self, keys: I) -> DaoResult<BTreeMap<EntityKey, T>>
    where
        I: IntoIterator<Item = EntityKey>,
    {
        let keys: Vec<EntityKey> = keys.into_iter().collect();
        self.get_keys(&keys)
    }

    // ---- Deletes ----

    /// Delete one entity, returning the stored value it replaced, if any.
    ///
    /// Deleting a missing record is not an error.
    pub fn delete(&self, entity: &T) -> DaoResult<Option<T>> {
        let key = key_of(entity)?;
        let _guard = self.guard()?;
        self.delete_locked(&key)
    }

    /// Delete a batch of entities, returning how many existed.
    pub fn delete_entities(&self, entities: &[T]) -> DaoResult<usize> {
        let keys = entities.iter().map(key_of).collect::<DaoResult<Vec<_>>>()?;
        let _guard = self.guard()?;
        self.delete_batch_locked(&keys)
    }

    /// Delete records by key, returning how many existed.
    pub fn delete_keys(&self, keys: &[EntityKey]) -> DaoResult<usize> {
        keys.iter().try_for_each(check_kind::<T>)?;
        let _guard = self.guard()?;
        self.delete_batch_locked(keys)
    }

    /// Delete records for any collection of keys.
    pub fn delete_all<I>(&self, keys: I) -> DaoResult<usize>
    where
        I: IntoIterator<Item = EntityKey>,
    {
        let keys: Vec<EntityKey> = keys.into_iter().collect();
        self.delete_keys(&keys)
    }

    // ---- Queries ----

    /// Every `T` whose key chain contains `ancestor`.
    pub fn get_children(&self, ancestor: &EntityKey) -> DaoResult<Vec<T>> {
        let query = QueryBuilder::kind(T::KIND)
            .ancestor(ancestor.clone())
            .build();
        let _guard = self.guard()?;
        self.query_locked(&query, &[])
    }

    /// Every `T`, projected to `groups`.
    pub fn load(&self, groups: &[LoadGroup]) -> DaoResult<Vec<T>> {
        let query = QueryBuilder::kind(T::KIND).build();
        let _guard = self.guard()?;
        self.query_locked(&query, groups)
    }

    /// Every `T` matching all `conditions`, projected to `groups`.
    pub fn load_where(&self, conditions: &Conditions, groups: &[LoadGroup]) -> DaoResult<Vec<T>> {
        let query = QueryBuilder::kind(T::KIND).conditions(conditions)?.build();
        let _guard = self.guard()?;
        self.query_locked(&query, groups)
    }

    /// Every `T`. Unbounded; callers limit what they ask for.
    pub fn list(&self) -> DaoResult<Vec<T>> {
        self.load(&[])
    }

    // ---- Authoritative reads ----

    /// The stored record with the template's key, projected to `groups`.
    pub fn load_one(&self, template: &T, groups: &[LoadGroup]) -> DaoResult<T> {
        let key = key_of(template)?;
        let _guard = self.guard()?;
        self.find_locked(&key, groups)
    }

    /// The stored version of `entity`, or `NotFound`.
    pub fn find(&self, entity: &T) -> DaoResult<T> {
        let key = key_of(entity)?;
        let _guard = self.guard()?;
        self.find_locked(&key, &[])
    }

    /// The record at `key`, or `NotFound`.
    pub fn find_key(&self, key: &EntityKey) -> DaoResult<T> {
        check_kind::<T>(key)?;
        let _guard = self.guard()?;
        self.find_locked(key, &[])
    }

    // ---- Binary payloads ----

    /// Store `bytes` as independently keyed chunks of the configured size.
    ///
    /// The caller persists the returned keys on the owning entity with a
    /// separate `put`; the two writes are not atomic.
    pub fn save_binary(&self, bytes: &[u8]) -> DaoResult<Vec<EntityKey>> {
        let _guard = self.guard()?;
        self.blobs.save(bytes, self.blobs.chunk_size(), None)
    }

    /// Like [`save_binary`](Self::save_binary) with an explicit chunk size.
    pub fn save_binary_with_chunk_size(
        &self,
        bytes: &[u8],
        chunk_size: usize,
    ) -> DaoResult<Vec<EntityKey>> {
        let _guard = self.guard()?;
        self.blobs.save(bytes, chunk_size, None)
    }

    /// Store `bytes` as chunks nested under `owner`.
    pub fn save_binary_under(&self, owner: &EntityKey, bytes: &[u8]) -> DaoResult<Vec<EntityKey>> {
        let _guard = self.guard()?;
        self.blobs.save(bytes, self.blobs.chunk_size(), Some(owner))
    }

    /// Reassemble the payload recorded on `provider`.
    pub fn load_binary<P: BinaryProvider>(&self, provider: &P) -> DaoResult<Vec<u8>> {
        let _guard = self.guard()?;
        self.blobs.load(provider.chunk_keys())
    }

    fn guard(&self) -> DaoResult<MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| DaoError::LockPoisoned(T::KIND.to_string()))
    }

    /// Give every id-less entity an allocated id and return all keys.
    fn complete_keys(&self, entities: &mut [T]) -> DaoResult<Vec<EntityKey>> {
        let missing = entities.iter().filter(|e| e.id().is_none()).count();
        let mut ids = if missing > 0 {
            self.session.allocate_ids(T::KIND, missing)?.into_iter()
        } else {
            Vec::new().into_iter()
        };
        entities
            .iter_mut()
            .map(|entity| {
                if entity.id().is_none() {
                    let id = ids.next().ok_or_else(|| {
                        StoreError::Unavailable(format!("allocator returned too few {} ids", T::KIND))
                    })?;
                    entity.set_id(KeyId::Id(id));
                }
                key_of(&*entity)
            })
            .collect()
    }

    fn put_locked(&self, entity: &mut T) -> DaoResult<EntityKey> {
        let key = self
            .complete_keys(std::slice::from_mut(entity))?
            .pop()
            .ok_or_else(|| DaoError::IncompleteKey {
                kind: T::KIND.to_string(),
            })?;
        let key = self.session.put(to_raw(&*entity, key)?)?;
        debug!(kind = T::KIND, key = %key, "entity saved");
        Ok(key)
    }

    fn put_batch_locked(&self, mut entities: Vec<T>) -> DaoResult<Vec<(EntityKey, T)>> {
        let keys = self.complete_keys(&mut entities)?;
        let records = entities
            .iter()
            .zip(&keys)
            .map(|(entity, key)| to_raw(entity, key.clone()))
            .collect::<DaoResult<Vec<_>>>()?;
        let stored = self.session.put_batch(records)?;
        debug!(kind = T::KIND, count = stored.len(), "entities saved");
        Ok(stored.into_iter().zip(entities).collect())
    }

    fn fetch(&self, keys: &[EntityKey]) -> DaoResult<BTreeMap<EntityKey, T>> {
        let records = self.session.get_batch(keys, self.policy.consistency)?;
        records
            .into_iter()
            .flatten()
            .map(|raw| {
                let key = raw.key.clone();
                Ok((key, from_raw(raw, &[])?))
            })
            .collect()
    }

    fn find_locked(&self, key: &EntityKey, groups: &[LoadGroup]) -> DaoResult<T> {
        let raw = self
            .session
            .get(key, self.policy.consistency)?
            .ok_or_else(|| DaoError::NotFound(key.clone()))?;
        from_raw(raw, groups)
    }

    fn query_locked(&self, query: &Query, groups: &[LoadGroup]) -> DaoResult<Vec<T>> {
        let records = self.session.query(query, self.policy.consistency)?;
        debug!(
            kind = T::KIND,
            filters = query.filters().len(),
            results = records.len(),
            "query executed"
        );
        records.into_iter().map(|raw| from_raw(raw, groups)).collect()
    }

    fn delete_locked(&self, key: &EntityKey) -> DaoResult<Option<T>> {
        let previous = self.session.get(key, Consistency::Strong)?;
        let existed = self.session.delete(key)?;
        debug!(kind = T::KIND, key = %key, existed, "entity deleted");
        match previous {
            Some(raw) if existed => Ok(Some(from_raw(raw, &[])?)),
            _ => Ok(None),
        }
    }

    fn delete_batch_locked(&self, keys: &[EntityKey]) -> DaoResult<usize> {
        let removed = self.session.delete_batch(keys)?;
        debug!(kind = T::KIND, requested = keys.len(), removed, "entities deleted");
        Ok(removed)
    }
}

impl<T: BinaryProvider> GenericDao<T> {
    /// Save `bytes` as chunks, record their keys on `owner` and save it.
    ///
    /// The chunk write and the owner write are separate: a crash between
    /// them orphans the new chunks. Chunks the owner referenced before are
    /// deleted only after the owner has been rewritten.
    pub fn store_binary(&self, owner: &mut T, bytes: &[u8]) -> DaoResult<EntityKey> {
        let _guard = self.guard()?;
        let keys = self.blobs.save(bytes, self.blobs.chunk_size(), None)?;
        let replaced = owner.chunk_keys().to_vec();
        owner.set_chunk_keys(keys);
        let key = self.put_locked(owner)?;
        if !replaced.is_empty() {
            let removed = self.blobs.delete(&replaced)?;
            debug!(kind = T::KIND, key = %key, removed, "replaced chunks deleted");
        }
        Ok(key)
    }

    /// Delete the owner of a binary payload together with its chunks.
    ///
    /// The owner is first looked up directly in the uncached store with a
    /// strong read. If it has no id or cannot be found, the failure is
    /// logged and nothing is deleted. Otherwise every chunk is deleted, then
    /// the owner. Store failures propagate.
    pub fn delete_binary(&self, provider: &T) -> DaoResult<BinaryDeletion> {
        let _guard = self.guard()?;
        let Some(key) = provider.key() else {
            error!(kind = T::KIND, "binary delete failed: entity has no id");
            return Ok(BinaryDeletion::Aborted { key: None });
        };

        if self.store.get(&key, Consistency::Strong)?.is_none() {
            error!(
                kind = T::KIND,
                id = %key.id(),
                key = %key,
                "binary delete failed: no entity was found with this id"
            );
            return Ok(BinaryDeletion::Aborted { key: Some(key) });
        }

        let chunks = self.blobs.delete(provider.chunk_keys())?;
        self.session.delete(&key)?;
        info!(kind = T::KIND, key = %key, chunks, "binary deleted");
        Ok(BinaryDeletion::Deleted { key, chunks })
    }
}

impl<T: Entity> std::fmt::Debug for GenericDao<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericDao")
            .field("kind", &T::KIND)
            .field("policy", &self.policy)
            .finish()
    }
}
