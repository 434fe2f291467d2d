//! Typed entities and their stored document form.
//!
//! The store itself is schemaless: it persists [`Document`]s, which pair an
//! [`EntityKey`] with a JSON property map. Domain types implement [`Entity`]
//! and convert to and from documents through serde, so filters and sort
//! orders can address properties by their serialized names.

use crate::entity_store::StoreError;
use crate::key::EntityKey;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// A domain type that can be persisted in the entity store.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    /// Kind name used in keys and queries.
    const KIND: &'static str;

    /// The key this entity is stored under.
    fn key(&self) -> &EntityKey;
}

/// A stored entity: key plus serialized properties.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    key: EntityKey,
    properties: Map<String, Value>,
}

impl Document {
    /// Create a document from raw properties.
    #[must_use]
    pub const fn new(key: EntityKey, properties: Map<String, Value>) -> Self {
        Self { key, properties }
    }

    /// Serialize an entity into a document.
    ///
    /// # Errors
    ///
    /// Returns `SerializationError` if the entity does not serialize to a
    /// JSON object.
    pub fn from_entity<E: Entity>(entity: &E) -> Result<Self, StoreError> {
        match serde_json::to_value(entity) {
            Ok(Value::Object(properties)) => Ok(Self {
                key: entity.key().clone(),
                properties,
            }),
            Ok(other) => Err(StoreError::SerializationError(format!(
                "{} serialized to a non-object value: {other}",
                E::KIND
            ))),
            Err(e) => Err(StoreError::SerializationError(e.to_string())),
        }
    }

    /// Deserialize this document into an entity.
    ///
    /// # Errors
    ///
    /// Returns `SerializationError` if the kind does not match or the
    /// properties do not fit the entity type.
    pub fn to_entity<E: Entity>(&self) -> Result<E, StoreError> {
        if self.key.kind() != E::KIND {
            return Err(StoreError::SerializationError(format!(
                "expected kind {}, found {}",
                E::KIND,
                self.key
            )));
        }
        serde_json::from_value(Value::Object(self.properties.clone()))
            .map_err(|e| StoreError::SerializationError(format!("{}: {e}", self.key)))
    }

    /// The document key.
    #[must_use]
    pub const fn key(&self) -> &EntityKey {
        &self.key
    }

    /// Look up a property by its serialized name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// All properties.
    #[must_use]
    pub const fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    /// A copy of this document restricted to the named properties.
    #[must_use]
    pub fn project(&self, fields: &[String]) -> Self {
        let properties = fields
            .iter()
            .filter_map(|field| {
                self.properties
                    .get(field)
                    .map(|value| (field.clone(), value.clone()))
            })
            .collect();
        Self {
            key: self.key.clone(),
            properties,
        }
    }
}
