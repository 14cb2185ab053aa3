use serde::{Deserialize, Serialize};

/// Default size of one binary chunk (512 KiB, 1 MiB once hex-encoded).
pub const DEFAULT_CHUNK_SIZE: usize = 512 * 1024;

/// Default number of records held by the shared store-side cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Configuration shared by every DAO a [`DaoService`](crate::DaoService)
/// hands out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaoConfig {
    /// Bytes per chunk when saving binary payloads.
    pub chunk_size: usize,
    /// Maximum number of records in the shared cache.
    pub cache_capacity: usize,
}

impl Default for DaoConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl DaoConfig {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_cache_capacity(mut self, cache_capacity: usize) -> Self {
        self.cache_capacity = cache_capacity;
        self
    }
}
