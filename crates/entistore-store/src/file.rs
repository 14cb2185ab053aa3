use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use entistore_types::EntityKey;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::entity::RawEntity;
use crate::error::{StoreError, StoreResult};
use crate::memory::{InMemoryDatastore, MemorySnapshot};
use crate::query::Query;
use crate::traits::{Consistency, Datastore};

/// Datastore persisted as a single JSON snapshot file.
///
/// Reads are served from memory. Every mutation rewrites the snapshot
/// through a temporary file in the same directory, which is then renamed
/// over the target, so a crash leaves either the old or the new snapshot on
/// disk, never a torn one. Reads are always strongly consistent.
pub struct FileDatastore {
    path: PathBuf,
    memory: InMemoryDatastore,
    write_lock: Mutex<()>,
}

impl FileDatastore {
    /// Open the snapshot at `path`, or start empty if it does not exist.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let memory = if path.exists() {
            let bytes = std::fs::read(&path)?;
            let snapshot: MemorySnapshot =
                serde_json::from_slice(&bytes).map_err(|e| StoreError::CorruptSnapshot {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            InMemoryDatastore::from_snapshot(snapshot)
        } else {
            InMemoryDatastore::new()
        };
        info!(path = %path.display(), entities = memory.len(), "file datastore opened");
        Ok(Self {
            path,
            memory,
            write_lock: Mutex::new(()),
        })
    }

    /// Location of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.memory.len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, ()>> {
        self.write_lock.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Apply `change` in memory and persist the result. If nothing changed
    /// nothing is written; if persisting fails the in-memory state is rolled
    /// back, so a failed mutation is never visible to later reads.
    fn commit<R>(
        &self,
        change: impl FnOnce(&InMemoryDatastore) -> StoreResult<R>,
        changed: impl FnOnce(&R) -> bool,
    ) -> StoreResult<R> {
        let _guard = self.lock()?;
        let before = self.memory.snapshot()?;
        let result = change(&self.memory)?;
        if !changed(&result) {
            return Ok(result);
        }
        if let Err(e) = self.persist() {
            warn!(path = %self.path.display(), error = %e, "snapshot write failed, rolling back");
            self.memory.restore(before)?;
            return Err(e);
        }
        Ok(result)
    }

    /// Write the current state to disk. Callers hold `write_lock`.
    fn persist(&self) -> StoreResult<()> {
        let snapshot = self.memory.snapshot()?;
        let data = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;

        debug!(
            path = %self.path.display(),
            entities = snapshot.entities.len(),
            bytes = data.len(),
            "snapshot written"
        );
        Ok(())
    }
}

impl Datastore for FileDatastore {
    fn get(&self, key: &EntityKey, consistency: Consistency) -> StoreResult<Option<RawEntity>> {
        self.memory.get(key, consistency)
    }

    fn put(&self, entity: RawEntity) -> StoreResult<EntityKey> {
        self.commit(|memory| memory.put(entity), |_| true)
    }

    fn delete(&self, key: &EntityKey) -> StoreResult<bool> {
        self.commit(|memory| memory.delete(key), |existed| *existed)
    }

    fn query(&self, query: &Query, consistency: Consistency) -> StoreResult<Vec<RawEntity>> {
        self.memory.query(query, consistency)
    }

    fn allocate_ids(&self, kind: &str, count: usize) -> StoreResult<Vec<i64>> {
        self.commit(|memory| memory.allocate_ids(kind, count), |_| true)
    }

    fn put_batch(&self, entities: Vec<RawEntity>) -> StoreResult<Vec<EntityKey>> {
        self.commit(|memory| memory.put_batch(entities), |_| true)
    }

    fn delete_batch(&self, keys: &[EntityKey]) -> StoreResult<usize> {
        self.commit(|memory| memory.delete_batch(keys), |removed| *removed > 0)
    }
}

impl std::fmt::Debug for FileDatastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDatastore")
            .field("path", &self.path)
            .field("entity_count", &self.len())
            .finish()
    }
}
