//! Conversion between in-memory slots and storage records.

use std::collections::HashMap;

use keepsake_core::error::CoreError;
use keepsake_core::model::{EntityId, EntitySchema, FieldDefault, FieldDescriptor, FieldKind, Value};
use keepsake_core::relation;
use keepsake_core::storage::StorageRecord;
use keepsake_core::transcode;

use crate::registry::{FieldState, Slot};

/// Encode every schema field of a slot.
pub(crate) fn encode_slot(schema: &EntitySchema, slot: &Slot) -> Result<StorageRecord, CoreError> {
    let mut record = StorageRecord::new();
    for field in &schema.fields {
        let state = slot
            .fields
            .get(&field.name)
            .ok_or_else(|| CoreError::MissingField {
                entity_type: schema.name.clone(),
                field: field.name.clone(),
            })?;
        let json = match (state, &field.kind) {
            (FieldState::Link { ids, .. }, FieldKind::Reference(_)) => relation::encode_one(ids.first()),
            (FieldState::Link { ids, .. }, FieldKind::Many { .. }) => relation::encode_many(ids),
            (FieldState::Value(value), kind) => transcode::encode(&field.name, value, kind)?,
            (FieldState::Link { .. }, kind) => {
                return Err(CoreError::TypeMismatch {
                    field: field.name.clone(),
                    expected: kind.to_string(),
                    found: "relationship".into(),
                })
            }
        };
        record.insert(field.name.clone(), json);
    }
    Ok(record)
}

/// Decode a stored record into a persisted slot.
///
/// Keys the schema does not declare are ignored. A declared field missing
/// from the record takes its default, or fails with `MissingField`.
pub(crate) fn decode_slot(
    schema: &EntitySchema,
    id: &EntityId,
    bytes: &[u8],
) -> Result<Slot, CoreError> {
    let record = StorageRecord::from_bytes(&schema.name, id.as_str(), bytes)?;
    let corrupt = |e: CoreError| match e {
        CoreError::TypeMismatch { .. } | CoreError::InvalidId(_) | CoreError::InvalidValue { .. } => {
            CoreError::corrupt(&schema.name, id.as_str(), e.to_string())
        }
        other => other,
    };

    for key in record.field_names() {
        if schema.field(key).is_none() {
            tracing::debug!("Ignoring undeclared key `{key}` in {}/{id}", schema.name);
        }
    }

    let mut fields = HashMap::with_capacity(schema.fields.len());
    for field in &schema.fields {
        let state = match record.get(&field.name) {
            Some(json) if field.is_relationship() => FieldState::Link {
                ids: relation::decode_ids(&field.name, json, &field.kind).map_err(corrupt)?,
                resolved: false,
            },
            Some(json) => {
                FieldState::Value(transcode::decode(&field.name, json, &field.kind).map_err(corrupt)?)
            }
            None => default_state(field).ok_or_else(|| CoreError::MissingField {
                entity_type: schema.name.clone(),
                field: field.name.clone(),
            })?,
        };
        fields.insert(field.name.clone(), state);
    }

    Ok(Slot {
        fields,
        persisted: true,
    })
}

/// Initial state of a field that was not supplied, `None` if it is required.
pub(crate) fn default_state(field: &FieldDescriptor) -> Option<FieldState> {
    let state = match field.default.as_ref()? {
        FieldDefault::Value(v) => FieldState::Value(v.clone()),
        FieldDefault::Factory(make) => FieldState::Value(make()),
        FieldDefault::Empty if field.is_relationship() => FieldState::Link {
            ids: Vec::new(),
            resolved: true,
        },
        FieldDefault::Empty => FieldState::Value(Value::List(Vec::new())),
    };
    Some(state)
}
