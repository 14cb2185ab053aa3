//! Chunked binary payloads built on ordinary entities.
//!
//! A payload is split into fixed-size [`ChunkFile`] records. The owning
//! entity keeps the ordered chunk keys; reassembly reads them back in that
//! order and concatenates the bytes.
//!
//! Saving chunks and saving the owner's key list are two separate writes. A
//! crash between them leaves orphaned chunks, and a reader will see the
//! previous key list (or none). Deletion removes chunks before the owner, so
//! an interrupted delete leaves an owner whose chunks are missing, which
//! [`BlobAssembler::load`] reports as [`DaoError::MissingChunk`].

use std::sync::Arc;

use entistore_store::{Consistency, Datastore};
use entistore_types::{EntityKey, KeyId};
use tracing::debug;

use crate::chunk::{ChunkFile, CHUNK_KIND};
use crate::entity::{from_raw, to_raw, Entity};
use crate::error::{DaoError, DaoResult};

/// Outcome of [`GenericDao::delete_binary`](crate::GenericDao::delete_binary).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BinaryDeletion {
    /// The owner and `chunks` chunk records were deleted.
    Deleted { key: EntityKey, chunks: usize },
    /// The owner could not be resolved in the store; nothing was deleted.
    Aborted { key: Option<EntityKey> },
}

impl BinaryDeletion {
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}

/// Splits, stores, reassembles and deletes chunked payloads.
pub struct BlobAssembler {
    session: Arc<dyn Datastore>,
    consistency: Consistency,
    chunk_size: usize,
}

impl BlobAssembler {
    pub fn new(session: Arc<dyn Datastore>, consistency: Consistency, chunk_size: usize) -> Self {
        Self {
            session,
            consistency,
            chunk_size,
        }
    }

    /// Default chunk size for [`save`](Self::save).
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split `bytes` into ordered chunks of at most `chunk_size` bytes.
    ///
    /// An empty payload yields no chunks.
    pub fn split(bytes: &[u8], chunk_size: usize) -> DaoResult<Vec<ChunkFile>> {
        if chunk_size == 0 {
            return Err(DaoError::InvalidChunkSize);
        }
        Ok(bytes
            .chunks(chunk_size)
            .enumerate()
            .map(|(order, piece)| ChunkFile::new(order as u32, piece.to_vec()))
            .collect())
    }

    /// Store `bytes` as chunks and return their keys in payload order.
    ///
    /// Chunks get freshly allocated ids; with an `owner` they are created as
    /// its children. All chunks are written in one batch.
    pub fn save(
        &self,
        bytes: &[u8],
        chunk_size: usize,
        owner: Option<&EntityKey>,
    ) -> DaoResult<Vec<EntityKey>> {
        let mut chunks = Self::split(bytes, chunk_size)?;
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let ids = self.session.allocate_ids(CHUNK_KIND, chunks.len())?;
        let mut records = Vec::with_capacity(chunks.len());
        for (chunk, id) in chunks.iter_mut().zip(ids) {
            chunk.set_parent(owner.cloned());
            chunk.set_id(KeyId::Id(id));
            let key = EntityKey::with_parent(owner.cloned(), CHUNK_KIND, id);
            records.push(to_raw(chunk, key)?);
        }
        let keys = self.session.put_batch(records)?;

        debug!(
            chunks = keys.len(),
            bytes = bytes.len(),
            chunk_size,
            owner = ?owner,
            "binary saved"
        );
        Ok(keys)
    }

    /// Read the chunks at `keys` and concatenate them in order.
    pub fn load(&self, keys: &[EntityKey]) -> DaoResult<Vec<u8>> {
        let records = self.session.get_batch(keys, self.consistency)?;
        let mut bytes = Vec::new();
        for (position, (key, record)) in keys.iter().zip(records).enumerate() {
            let raw = record.ok_or_else(|| DaoError::MissingChunk(key.clone()))?;
            let chunk: ChunkFile = from_raw(raw, &[])?;
            if chunk.order as usize != position {
                return Err(DaoError::CorruptChunk {
                    key: key.clone(),
                    reason: format!("expected order {position}, found {}", chunk.order),
                });
            }
            if !chunk.verify() {
                return Err(DaoError::CorruptChunk {
                    key: key.clone(),
                    reason: "checksum mismatch".to_string(),
                });
            }
            bytes.extend_from_slice(&chunk.bytes);
        }
        debug!(chunks = keys.len(), bytes = bytes.len(), "binary loaded");
        Ok(bytes)
    }

    /// Delete the chunks at `keys`, returning how many existed.
    pub fn delete(&self, keys: &[EntityKey]) -> DaoResult<usize> {
        Ok(self.session.delete_batch(keys)?)
    }
}

impl std::fmt::Debug for BlobAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobAssembler")
            .field("consistency", &self.consistency)
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}
