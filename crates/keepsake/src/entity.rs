use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use keepsake_core::error::CoreError;
use keepsake_core::model::{EntityId, FieldKind, Value};
use keepsake_core::transcode;
use keepsake_query::Queryable;
use serde_json::{json, Map, Value as Json};

use crate::collection::Collection;
use crate::error::Error;
use crate::store::Store;
use crate::value::{FieldInput, FieldValue};

/// Handle to one live entity.
///
/// Handles are cheap to clone. Two handles are equal when they come from
/// the same store and name the same type and ID, so there is exactly one
/// identity per record no matter how often it is looked up.
#[derive(Clone)]
pub struct Entity {
    store: Store,
    entity_type: Arc<str>,
    id: EntityId,
}

impl Entity {
    pub(crate) fn new(store: Store, entity_type: Arc<str>, id: EntityId) -> Self {
        Self {
            store,
            entity_type,
            id,
        }
    }

    pub fn id(&self) -> &EntityId {
        &self.id
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Read a field. Relationships are resolved on first access and fail
    /// with `DanglingReference` if a member no longer exists.
    pub fn get(&self, field: &str) -> Result<FieldValue, Error> {
        self.store.read_field(self, field)
    }

    /// Read a non-relationship field.
    pub fn value(&self, field: &str) -> Result<Value, Error> {
        let value = self.get(field)?;
        let found = value.type_name();
        value.into_value().ok_or_else(|| {
            CoreError::TypeMismatch {
                field: field.to_string(),
                expected: "value".into(),
                found: found.into(),
            }
            .into()
        })
    }

    pub fn get_str(&self, field: &str) -> Result<String, Error> {
        self.typed(field, "string", |v| match v {
            Value::Str(s) => Some(s),
            _ => None,
        })
    }

    pub fn get_int(&self, field: &str) -> Result<i64, Error> {
        self.typed(field, "integer", |v| v.as_int())
    }

    pub fn get_bool(&self, field: &str) -> Result<bool, Error> {
        self.typed(field, "boolean", |v| v.as_bool())
    }

    pub fn get_float(&self, field: &str) -> Result<f64, Error> {
        self.typed(field, "float", |v| v.as_float())
    }

    pub fn get_datetime(&self, field: &str) -> Result<DateTime<Utc>, Error> {
        self.typed(field, "datetime", |v| v.as_datetime())
    }

    pub fn get_path(&self, field: &str) -> Result<PathBuf, Error> {
        self.typed(field, "path", |v| match v {
            Value::Path(p) => Some(p),
            _ => None,
        })
    }

    pub fn get_list(&self, field: &str) -> Result<Vec<Value>, Error> {
        self.typed(field, "list", |v| match v {
            Value::List(items) => Some(items),
            _ => None,
        })
    }

    fn typed<T>(
        &self,
        field: &str,
        expected: &str,
        extract: impl FnOnce(Value) -> Option<T>,
    ) -> Result<T, Error> {
        let value = self.value(field)?;
        let found = value.type_name();
        extract(value).ok_or_else(|| {
            CoreError::TypeMismatch {
                field: field.to_string(),
                expected: expected.to_string(),
                found: found.into(),
            }
            .into()
        })
    }

    /// The target of a single reference, `None` when unset.
    pub fn get_ref(&self, field: &str) -> Result<Option<Entity>, Error> {
        match self.get(field)? {
            FieldValue::One(target) => Ok(target),
            other => Err(CoreError::TypeMismatch {
                field: field.to_string(),
                expected: "reference".into(),
                found: other.type_name().into(),
            }
            .into()),
        }
    }

    /// The bound collection behind a one-to-many field. Structural changes
    /// made through it save this entity.
    pub fn collection(&self, field: &str) -> Result<Collection, Error> {
        let schema = self.store.schema(&self.entity_type)?;
        let descriptor = schema.require(field)?;
        match &descriptor.kind {
            FieldKind::Many { target, order } => Ok(Collection::new(
                self.clone(),
                field,
                target,
                *order,
            )),
            kind => Err(CoreError::TypeMismatch {
                field: field.to_string(),
                expected: "collection".into(),
                found: kind.to_string(),
            }
            .into()),
        }
    }

    /// Assign a field and save. On a failed save the new value is kept in
    /// memory and written by the next successful save.
    pub fn set(&self, field: &str, value: impl Into<FieldInput>) -> Result<(), Error> {
        self.store.write_field(self, field, value.into())
    }

    /// Write this entity, first saving any unsaved entity it references.
    pub fn save(&self) -> Result<(), Error> {
        self.store.save_entity(self)
    }

    /// Remove the stored record. The handle stays readable but can no longer
    /// be modified.
    pub fn delete(&self) -> Result<(), Error> {
        self.store.delete_entity(self)
    }

    pub fn is_deleted(&self) -> bool {
        self.store.is_deleted(self)
    }

    /// When the stored record was last written.
    pub fn saved_at(&self) -> Result<Option<DateTime<Utc>>, Error> {
        self.store.saved_at(self)
    }

    /// Render this entity as JSON, expanding relationships `depth` levels
    /// deep. Unexpanded or already rendered entities become `{"$ref": id}`.
    pub fn to_tree(&self, depth: usize) -> Result<Json, Error> {
        self.tree(depth, &mut HashSet::new())
    }

    fn tree(&self, depth: usize, seen: &mut HashSet<Entity>) -> Result<Json, Error> {
        if !seen.insert(self.clone()) {
            return Ok(self.reference());
        }
        let schema = self.store.schema(&self.entity_type)?;
        let mut out = Map::new();
        out.insert("$type".into(), Json::from(self.entity_type()));
        out.insert("$id".into(), Json::from(self.id.as_str()));

        let expand = |member: &Entity, seen: &mut HashSet<Entity>| match depth {
            0 => Ok(member.reference()),
            _ => member.tree(depth - 1, seen),
        };
        for field in &schema.fields {
            let json = match self.get(&field.name)? {
                FieldValue::Value(v) => transcode::encode(&field.name, &v, &field.kind)?,
                FieldValue::One(None) => Json::Null,
                FieldValue::One(Some(member)) => expand(&member, seen)?,
                FieldValue::Many(members) => Json::Array(
                    members
                        .iter()
                        .map(|m| expand(m, seen))
                        .collect::<Result<_, Error>>()?,
                ),
            };
            out.insert(field.name.clone(), json);
        }
        Ok(Json::Object(out))
    }

    fn reference(&self) -> Json {
        json!({ "$ref": self.id.as_str() })
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.entity_type == other.entity_type
            && self.store.same_store(&other.store)
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.entity_type.hash(state);
        self.id.hash(state);
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}:{})", self.entity_type, self.id)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.entity_type, self.id)
    }
}

impl Queryable for Entity {
    type Value = FieldValue;
    type Error = Error;

    fn field_value(&self, field: &str) -> Result<FieldValue, Error> {
        self.get(field)
    }
}
