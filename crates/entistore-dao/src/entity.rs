//! The [`Entity`] trait and the mapping between entities and raw records.

use entistore_store::{Properties, RawEntity};
use entistore_types::{EntityKey, KeyId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{DaoError, DaoResult};

/// An application record managed by a [`GenericDao`](crate::GenericDao).
///
/// The key lives outside the property map: implementors keep their id (and
/// parent, if any) in fields marked `#[serde(skip)]` and expose them through
/// the accessors below. Every other serialized field becomes a property.
///
/// Types that are loaded with [`LoadGroup`] projections should derive
/// `Default` and use `#[serde(default)]`, so fields left out of a projection
/// fall back to their defaults instead of failing to deserialize.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    /// Stable kind name used in keys.
    const KIND: &'static str;

    /// The id, or `None` before the entity is first saved.
    fn id(&self) -> Option<KeyId>;

    fn set_id(&mut self, id: KeyId);

    /// Parent key for entities stored under another entity.
    fn parent(&self) -> Option<EntityKey> {
        None
    }

    fn set_parent(&mut self, _parent: Option<EntityKey>) {}

    /// The complete key, or `None` while the entity has no id.
    fn key(&self) -> Option<EntityKey> {
        self.id()
            .map(|id| EntityKey::with_parent(self.parent(), Self::KIND, id))
    }
}

/// Projection hint naming the fields populated on read.
///
/// Loading with no groups yields full records. Loading with groups keeps
/// only the union of their fields; the rest take their serde defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LoadGroup {
    pub name: &'static str,
    pub fields: &'static [&'static str],
}

impl LoadGroup {
    pub const fn new(name: &'static str, fields: &'static [&'static str]) -> Self {
        Self { name, fields }
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains(&field)
    }
}

/// Map an entity to a raw record stored under `key`.
pub fn to_raw<T: Entity>(entity: &T, key: EntityKey) -> DaoResult<RawEntity> {
    let value = serde_json::to_value(entity).map_err(|e| DaoError::Serialization {
        kind: T::KIND.to_string(),
        reason: e.to_string(),
    })?;
    match value {
        Value::Object(map) => Ok(RawEntity::with_properties(key, map.into_iter().collect())),
        other => Err(DaoError::NotAnObject {
            kind: T::KIND.to_string(),
            found: json_type(&other).to_string(),
        }),
    }
}

/// Map a raw record back to an entity, keeping only the fields selected by
/// `groups` (all fields when `groups` is empty).
pub fn from_raw<T: Entity>(raw: RawEntity, groups: &[LoadGroup]) -> DaoResult<T> {
    check_kind::<T>(&raw.key)?;
    let properties = project(raw.properties, groups);
    let object: serde_json::Map<String, Value> = properties.into_iter().collect();
    let mut entity: T =
        serde_json::from_value(Value::Object(object)).map_err(|e| DaoError::Serialization {
            kind: T::KIND.to_string(),
            reason: format!("{} ({e})", raw.key),
        })?;
    entity.set_id(raw.key.id().clone());
    entity.set_parent(raw.key.parent().cloned());
    Ok(entity)
}

/// The entity's key, or `IncompleteKey` if it has no id yet.
pub(crate) fn key_of<T: Entity>(entity: &T) -> DaoResult<EntityKey> {
    entity.key().ok_or_else(|| DaoError::IncompleteKey {
        kind: T::KIND.to_string(),
    })
}

pub(crate) fn check_kind<T: Entity>(key: &EntityKey) -> DaoResult<()> {
    if key.kind() == T::KIND {
        Ok(())
    } else {
        Err(DaoError::KindMismatch {
            expected: T::KIND.to_string(),
            key: key.clone(),
        })
    }
}

fn project(mut properties: Properties, groups: &[LoadGroup]) -> Properties {
    if !groups.is_empty() {
        properties.retain(|name, _| groups.iter().any(|group| group.contains(name)));
    }
    properties
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
