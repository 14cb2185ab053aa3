//! Entity fixtures shared by the unit tests.

use std::io;
use std::sync::{Arc, Mutex};

use entistore_store::{Consistency, Datastore, Query, RawEntity, StoreError, StoreResult};
use entistore_types::{EntityKey, KeyId};
use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt::MakeWriter;

use crate::chunk::BinaryProvider;
use crate::entity::{Entity, LoadGroup};

pub const SUMMARY: LoadGroup = LoadGroup::new("summary", &["name", "category"]);
pub const DETAIL: LoadGroup = LoadGroup::new("detail", &["description", "tags"]);

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Product {
    #[serde(skip)]
    pub id: Option<KeyId>,
    pub name: String,
    pub category: String,
    pub price: i64,
    pub description: String,
    pub tags: Vec<String>,
}

impl Product {
    pub fn new(name: &str, category: &str, price: i64) -> Self {
        Self {
            name: name.to_string(),
            category: category.to_string(),
            price,
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(KeyId::Id(id));
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }
}

impl Entity for Product {
    const KIND: &'static str = "Product";

    fn id(&self) -> Option<KeyId> {
        self.id.clone()
    }

    fn set_id(&mut self, id: KeyId) {
        self.id = Some(id);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageData {
    #[serde(skip)]
    pub id: Option<KeyId>,
    #[serde(skip)]
    pub parent: Option<EntityKey>,
    pub content_type: String,
    pub chunk_keys: Vec<EntityKey>,
}

impl ImageData {
    pub fn new(content_type: &str) -> Self {
        Self {
            content_type: content_type.to_string(),
            ..Self::default()
        }
    }
}

impl Entity for ImageData {
    const KIND: &'static str = "ImageData";

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

impl BinaryProvider for ImageData {
    fn chunk_keys(&self) -> &[EntityKey] {
        &self.chunk_keys
    }

    fn set_chunk_keys(&mut self, keys: Vec<EntityKey>) {
        self.chunk_keys = keys;
    }
}

/// A store whose every call fails, for pass-through error tests.
pub struct FailingDatastore;

impl FailingDatastore {
    fn fail<T>() -> StoreResult<T> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

impl Datastore for FailingDatastore {
    fn get(&self, _key: &EntityKey, _consistency: Consistency) -> StoreResult<Option<RawEntity>> {
        Self::fail()
    }

    fn put(&self, _entity: RawEntity) -> StoreResult<EntityKey> {
        Self::fail()
    }

    fn delete(&self, _key: &EntityKey) -> StoreResult<bool> {
        Self::fail()
    }

    fn query(&self, _query: &Query, _consistency: Consistency) -> StoreResult<Vec<RawEntity>> {
        Self::fail()
    }

    fn allocate_ids(&self, _kind: &str, _count: usize) -> StoreResult<Vec<i64>> {
        Self::fail()
    }
}

/// In-memory log sink for asserting on `tracing` output.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    /// Run `f` with a subscriber that writes into this buffer.
    pub fn capture<R>(&self, f: impl FnOnce() -> R) -> R {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, f)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
