use entistore_types::{EntityKey, KeyId};
use serde::{Deserialize, Serialize};

use crate::entity::Entity;

/// Kind name of chunk records.
pub const CHUNK_KIND: &str = "ChunkFile";

/// One bounded-size piece of a binary payload, stored as its own record.
///
/// `order` is the chunk's position in the payload and `crc32` the checksum
/// of `bytes`; both are checked when the payload is reassembled. The bytes
/// are persisted hex-encoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkFile {
    #[serde(skip)]
    id: Option<KeyId>,
    #[serde(skip)]
    parent: Option<EntityKey>,
    pub order: u32,
    pub crc32: u32,
    #[serde(with = "hex_payload")]
    pub bytes: Vec<u8>,
}

impl ChunkFile {
    /// Create an unsaved chunk at position `order`.
    pub fn new(order: u32, bytes: Vec<u8>) -> Self {
        Self {
            id: None,
            parent: None,
            order,
            crc32: crc32fast::hash(&bytes),
            bytes,
        }
    }

    /// Returns `true` if the payload matches its checksum.
    pub fn verify(&self) -> bool {
        crc32fast::hash(&self.bytes) == self.crc32
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Entity for ChunkFile {
    const KIND: &'static str = CHUNK_KIND;

    fn id(&self) -> Option<KeyId> {
        self.id.clone()
    }

    fn set_id(&mut self, id: KeyId) {
        self.id = Some(id);
    }

    fn parent(&self) -> Option<EntityKey> {
        self.parent.clone()
    }

    fn set_parent(&mut self, parent: Option<EntityKey>) {
        self.parent = parent;
    }
}

/// An entity that owns a binary payload stored as chunks.
///
/// The owner persists the ordered chunk keys as one of its own properties;
/// its identity comes from [`Entity`].
pub trait BinaryProvider: Entity {
    /// Chunk keys in payload order.
    fn chunk_keys(&self) -> &[EntityKey];

    fn set_chunk_keys(&mut self, keys: Vec<EntityKey>);
}

mod hex_payload {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{from_raw, to_raw};
    use serde_json::json;

    #[test]
    fn checksum_tracks_payload() {
        let mut chunk = ChunkFile::new(0, b"hello".to_vec());
        assert!(chunk.verify());
        chunk.bytes[0] = b'j';
        assert!(!chunk.verify());
    }

    #[test]
    fn payload_is_hex_encoded() {
        let mut chunk = ChunkFile::new(2, vec![0xde, 0xad, 0xbe, 0xef]);
        chunk.set_id(KeyId::Id(9));
        let raw = to_raw(&chunk, chunk.key().unwrap()).unwrap();
        assert_eq!(raw.get("bytes"), Some(&json!("deadbeef")));
        assert_eq!(raw.get("order"), Some(&json!(2)));

        let decoded: ChunkFile = from_raw(raw, &[]).unwrap();
        assert_eq!(decoded, chunk);
    }

    #[test]
    fn invalid_hex_fails_to_decode() {
        let mut chunk = ChunkFile::new(0, vec![1]);
        chunk.set_id(KeyId::Id(1));
        let mut raw = to_raw(&chunk, chunk.key().unwrap()).unwrap();
        raw.set("bytes", json!("zz"));
        assert!(from_raw::<ChunkFile>(raw, &[]).is_err());
    }

    #[test]
    fn chunk_keys_nest_under_parent() {
        let owner = EntityKey::new("ImageData", 4);
        let mut chunk = ChunkFile::new(0, vec![]);
        chunk.set_parent(Some(owner.clone()));
        chunk.set_id(KeyId::Id(11));
        assert_eq!(chunk.key(), Some(owner.child(CHUNK_KIND, 11)));
        assert!(chunk.is_empty());
    }
}
