use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use keepsake_core::model::Value;

use crate::entity::Entity;

/// The live value of one field as read from an entity.
///
/// Relationship fields come back resolved into entity handles.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Value(Value),
    One(Option<Entity>),
    Many(Vec<Entity>),
}

impl FieldValue {
    /// Short name of the variant held, used in type mismatch errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Value(v) => v.type_name(),
            FieldValue::One(_) => "reference",
            FieldValue::Many(_) => "collection",
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            FieldValue::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            FieldValue::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }

    pub fn as_int(&self) -> Option<i64> {
        self.as_value().and_then(Value::as_int)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_value().and_then(Value::as_bool)
    }

    pub fn as_float(&self) -> Option<f64> {
        self.as_value().and_then(Value::as_float)
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        self.as_value().and_then(Value::as_datetime)
    }

    pub fn as_path(&self) -> Option<&Path> {
        self.as_value().and_then(Value::as_path)
    }

    /// The referenced entity. `None` both for an empty reference and for a
    /// field that is not a reference.
    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            FieldValue::One(target) => target.as_ref(),
            _ => None,
        }
    }

    pub fn as_entities(&self) -> Option<&[Entity]> {
        match self {
            FieldValue::Many(members) => Some(members),
            _ => None,
        }
    }

    /// Whether a reference field is empty.
    pub fn is_none(&self) -> bool {
        matches!(self, FieldValue::One(None))
    }
}

/// A value supplied for a field at construction or assignment.
#[derive(Debug, Clone)]
pub enum FieldInput {
    Value(Value),
    One(Option<Entity>),
    Many(Vec<Entity>),
}

impl From<FieldValue> for FieldInput {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::Value(v) => FieldInput::Value(v),
            FieldValue::One(target) => FieldInput::One(target),
            FieldValue::Many(members) => FieldInput::Many(members),
        }
    }
}

macro_rules! impl_from_scalar {
    ($target:ident: $($ty:ty),+ $(,)?) => {
        $(
            impl From<$ty> for $target {
                fn from(v: $ty) -> Self {
                    $target::Value(Value::from(v))
                }
            }
        )+
    };
}

impl_from_scalar!(FieldValue: bool, i64, i32, f64, &str, String, DateTime<Utc>, PathBuf, &Path);
impl_from_scalar!(FieldInput: bool, i64, i32, f64, &str, String, DateTime<Utc>, PathBuf, &Path);

// Plain lists.
impl_from_scalar!(FieldValue: Vec<Value>, Vec<&str>, Vec<String>, Vec<i64>, Vec<PathBuf>);
impl_from_scalar!(FieldInput: Vec<Value>, Vec<&str>, Vec<String>, Vec<i64>, Vec<PathBuf>);

macro_rules! impl_from_entities {
    ($target:ident) => {
        impl From<Value> for $target {
            fn from(v: Value) -> Self {
                $target::Value(v)
            }
        }

        impl From<Entity> for $target {
            fn from(e: Entity) -> Self {
                $target::One(Some(e))
            }
        }

        impl From<&Entity> for $target {
            fn from(e: &Entity) -> Self {
                $target::One(Some(e.clone()))
            }
        }

        impl From<Option<Entity>> for $target {
            fn from(e: Option<Entity>) -> Self {
                $target::One(e)
            }
        }

        impl From<Option<&Entity>> for $target {
            fn from(e: Option<&Entity>) -> Self {
                $target::One(e.cloned())
            }
        }

        impl From<Vec<Entity>> for $target {
            fn from(members: Vec<Entity>) -> Self {
                $target::Many(members)
            }
        }

        impl From<&[Entity]> for $target {
            fn from(members: &[Entity]) -> Self {
                $target::Many(members.to_vec())
            }
        }
    };
}

impl_from_entities!(FieldValue);
impl_from_entities!(FieldInput);
