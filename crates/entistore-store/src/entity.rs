use std::collections::BTreeMap;

use entistore_types::EntityKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Named property values of one record.
pub type Properties = BTreeMap<String, Value>;

/// A stored record: a complete key plus its properties.
///
/// `RawEntity` is the unit of storage. The store only looks inside the
/// property map to evaluate equality filters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawEntity {
    pub key: EntityKey,
    #[serde(default)]
    pub properties: Properties,
}

impl RawEntity {
    /// Create a record with no properties.
    pub fn new(key: EntityKey) -> Self {
        Self {
            key,
            properties: Properties::new(),
        }
    }

    /// Create a record with the given properties.
    pub fn with_properties(key: EntityKey, properties: Properties) -> Self {
        Self { key, properties }
    }

    pub fn kind(&self) -> &str {
        self.key.kind()
    }

    /// Look up a property by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Set a property, returning the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.properties.insert(name.into(), value)
    }

    /// Equality test used by query filters.
    ///
    /// An array property matches when any element equals `value` (unless
    /// `value` is itself an array, which must then match as a whole). A
    /// missing property never matches.
    pub fn property_matches(&self, name: &str, value: &Value) -> bool {
        match self.properties.get(name) {
            Some(Value::Array(items)) if !value.is_array() => items.contains(value),
            Some(stored) => stored == value,
            None => false,
        }
    }
}
