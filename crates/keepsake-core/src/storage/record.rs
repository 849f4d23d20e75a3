use serde_json::{Map, Value as Json};

use crate::error::CoreError;

/// The stored form of one entity: a flat JSON object of field name to
/// encoded value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageRecord {
    fields: Map<String, Json>,
}

impl StorageRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Json) {
        self.fields.insert(field.into(), value);
    }

    pub fn get(&self, field: &str) -> Option<&Json> {
        self.fields.get(field)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn to_bytes(&self, pretty: bool) -> Result<Vec<u8>, CoreError> {
        let bytes = if pretty {
            serde_json::to_vec_pretty(&self.fields)?
        } else {
            serde_json::to_vec(&self.fields)?
        };
        Ok(bytes)
    }

    /// Parse a stored record. Anything but a JSON object is `CorruptRecord`.
    pub fn from_bytes(entity_type: &str, id: &str, bytes: &[u8]) -> Result<Self, CoreError> {
        let json: Json = serde_json::from_slice(bytes)
            .map_err(|e| CoreError::corrupt(entity_type, id, e.to_string()))?;
        match json {
            Json::Object(fields) => Ok(Self { fields }),
            other => Err(CoreError::corrupt(
                entity_type,
                id,
                format!("expected a JSON object, found {other}"),
            )),
        }
    }
}
