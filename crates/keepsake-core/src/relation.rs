//! Storage form of relationship fields: identifiers instead of inline values.

use serde_json::Value as Json;

use crate::error::CoreError;
use crate::model::{CollectionOrder, EntityId, FieldKind};
use crate::transcode::json_type_name;

/// A single reference is stored as the target's ID, or `null` when unset.
pub fn encode_one(target: Option<&EntityId>) -> Json {
    match target {
        Some(id) => Json::String(id.as_str().to_string()),
        None => Json::Null,
    }
}

/// A collection is stored as the list of member IDs, in membership order.
pub fn encode_many(members: &[EntityId]) -> Json {
    Json::Array(
        members
            .iter()
            .map(|id| Json::String(id.as_str().to_string()))
            .collect(),
    )
}

pub fn decode_one(field: &str, json: &Json) -> Result<Option<EntityId>, CoreError> {
    match json {
        Json::Null => Ok(None),
        Json::String(s) => Ok(Some(EntityId::parse(s)?)),
        other => Err(mismatch(field, "entity ID or null", other)),
    }
}

/// Decode stored member IDs. Set collections drop repeated IDs, keeping the
/// first occurrence.
pub fn decode_many(
    field: &str,
    json: &Json,
    order: CollectionOrder,
) -> Result<Vec<EntityId>, CoreError> {
    let items = json
        .as_array()
        .ok_or_else(|| mismatch(field, "array of entity IDs", json))?;
    let mut ids = Vec::with_capacity(items.len());
    for item in items {
        let s = item
            .as_str()
            .ok_or_else(|| mismatch(field, "entity ID", item))?;
        let id = EntityId::parse(s)?;
        if order == CollectionOrder::Set && ids.contains(&id) {
            continue;
        }
        ids.push(id);
    }
    Ok(ids)
}

/// Decode any relationship field into its raw member IDs.
pub fn decode_ids(field: &str, json: &Json, kind: &FieldKind) -> Result<Vec<EntityId>, CoreError> {
    match kind {
        FieldKind::Reference(_) => Ok(decode_one(field, json)?.into_iter().collect()),
        FieldKind::Many { order, .. } => decode_many(field, json, *order),
        other => Err(CoreError::UnsupportedType {
            kind: format!("{other} is not a relationship"),
        }),
    }
}

fn mismatch(field: &str, expected: &str, found: &Json) -> CoreError {
    CoreError::TypeMismatch {
        field: field.to_string(),
        expected: expected.to_string(),
        found: json_type_name(found).to_string(),
    }
}
