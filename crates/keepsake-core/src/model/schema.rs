use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use super::value::Value;
use crate::error::CoreError;

/// How the members of a one-to-many relationship are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionOrder {
    /// Unique members, insertion order preserved.
    Set,
    /// Duplicates allowed, positional operations available.
    Sequence,
}

/// The declared kind of a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldKind {
    String,
    Integer,
    Boolean,
    Float,
    DateTime,
    Path,
    /// Plain collection of non-entity values.
    List(Box<FieldKind>),
    /// At most one entity of the named type.
    Reference(String),
    /// Any number of entities of the named type.
    Many {
        target: String,
        order: CollectionOrder,
    },
    /// A named kind no transcoder understands.
    Custom(String),
}

impl FieldKind {
    pub fn list_of(inner: FieldKind) -> Self {
        FieldKind::List(Box::new(inner))
    }

    pub fn reference(target: impl Into<String>) -> Self {
        FieldKind::Reference(target.into())
    }

    pub fn set_of(target: impl Into<String>) -> Self {
        FieldKind::Many {
            target: target.into(),
            order: CollectionOrder::Set,
        }
    }

    pub fn sequence_of(target: impl Into<String>) -> Self {
        FieldKind::Many {
            target: target.into(),
            order: CollectionOrder::Sequence,
        }
    }

    /// Whether values of this kind are stored as entity identifiers.
    pub fn is_relationship(&self) -> bool {
        matches!(self, FieldKind::Reference(_) | FieldKind::Many { .. })
    }

    /// The target entity type of a relationship kind.
    pub fn target(&self) -> Option<&str> {
        match self {
            FieldKind::Reference(t) | FieldKind::Many { target: t, .. } => Some(t),
            _ => None,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::String => write!(f, "string"),
            FieldKind::Integer => write!(f, "integer"),
            FieldKind::Boolean => write!(f, "boolean"),
            FieldKind::Float => write!(f, "float"),
            FieldKind::DateTime => write!(f, "datetime"),
            FieldKind::Path => write!(f, "path"),
            FieldKind::List(inner) => write!(f, "list<{inner}>"),
            FieldKind::Reference(t) => write!(f, "{t}"),
            FieldKind::Many {
                target,
                order: CollectionOrder::Set,
            } => write!(f, "set<{target}>"),
            FieldKind::Many {
                target,
                order: CollectionOrder::Sequence,
            } => write!(f, "sequence<{target}>"),
            FieldKind::Custom(name) => write!(f, "{name}"),
        }
    }
}

/// Default for a field that was not supplied at construction.
#[derive(Clone)]
pub enum FieldDefault {
    Value(Value),
    Factory(Arc<dyn Fn() -> Value + Send + Sync>),
    /// No reference, an empty collection or an empty list.
    Empty,
}

impl fmt::Debug for FieldDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldDefault::Value(v) => f.debug_tuple("Value").field(v).finish(),
            FieldDefault::Factory(_) => f.write_str("Factory(..)"),
            FieldDefault::Empty => f.write_str("Empty"),
        }
    }
}

/// One declared field of an entity type.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    pub default: Option<FieldDefault>,
}

impl FieldDescriptor {
    /// A required field with no default.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
        }
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(FieldDefault::Value(value.into()));
        self
    }

    /// Default produced fresh for every construction (e.g. "now").
    ///
    /// On construction the factory runs before the store is locked. It also
    /// fills the field when a stored record lacks it, and then runs under the
    /// store lock, where it must not call back into the store.
    pub fn with_factory(mut self, factory: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(FieldDefault::Factory(Arc::new(factory)));
        self
    }

    /// Default to no reference / an empty collection.
    pub fn empty_by_default(mut self) -> Self {
        self.default = Some(FieldDefault::Empty);
        self
    }

    pub fn is_relationship(&self) -> bool {
        self.kind.is_relationship()
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// The schema of one entity type: a name and its ordered fields.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

impl EntitySchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Like [`field`](Self::field) but fails with `UnknownField`.
    pub fn require(&self, name: &str) -> Result<&FieldDescriptor, CoreError> {
        self.field(name).ok_or_else(|| CoreError::UnknownField {
            entity_type: self.name.clone(),
            field: name.to_string(),
        })
    }

    pub fn relationships(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.is_relationship())
    }

    /// Check names and defaults. Relationship targets are checked lazily
    /// since mutually referencing types register one after the other.
    pub fn validate(&self) -> Result<(), CoreError> {
        let invalid = |reason: String| CoreError::InvalidSchema {
            entity_type: self.name.clone(),
            reason,
        };

        if self.name.is_empty()
            || !self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(invalid(format!(
                "type name {:?} must be non-empty ASCII alphanumerics, '_' or '-'",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.is_empty() {
                return Err(invalid("empty field name".into()));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(invalid(format!("duplicate field `{}`", field.name)));
            }
            if let FieldKind::List(inner) = &field.kind {
                if inner.is_relationship() {
                    return Err(invalid(format!(
                        "list field `{}` holds entities, declare it as a set or sequence",
                        field.name
                    )));
                }
            }
            match (&field.default, &field.kind) {
                (Some(FieldDefault::Value(v)), kind) if !v.fits(kind) => {
                    return Err(invalid(format!(
                        "default for `{}` is a {}, expected {kind}",
                        field.name,
                        v.type_name()
                    )));
                }
                (Some(FieldDefault::Value(_)), kind) if kind.is_relationship() => {
                    return Err(invalid(format!(
                        "relationship `{}` can only default to empty",
                        field.name
                    )));
                }
                (Some(FieldDefault::Empty), kind)
                    if !kind.is_relationship() && !matches!(kind, FieldKind::List(_)) =>
                {
                    return Err(invalid(format!(
                        "scalar `{}` cannot default to empty",
                        field.name
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_schema() -> EntitySchema {
        EntitySchema::new("Post")
            .with_field(FieldDescriptor::new("title", FieldKind::String))
            .with_field(FieldDescriptor::new("views", FieldKind::Integer).with_default(0))
            .with_field(FieldDescriptor::new("author", FieldKind::reference("User")))
            .with_field(FieldDescriptor::new("tags", FieldKind::set_of("Tag")).empty_by_default())
    }

    #[test]
    fn test_valid_schema() {
        let schema = post_schema();
        assert!(schema.validate().is_ok());
        assert_eq!(schema.relationships().count(), 2);
        assert!(schema.field("title").unwrap().is_required());
        assert!(!schema.field("views").unwrap().is_required());
    }

    #[test]
    fn test_require_unknown_field() {
        let err = post_schema().require("body").unwrap_err();
        assert!(matches!(err, CoreError::UnknownField { field, .. } if field == "body"));
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let schema = post_schema().with_field(FieldDescriptor::new("title", FieldKind::String));
        assert!(matches!(
            schema.validate(),
            Err(CoreError::InvalidSchema { .. })
        ));
    }

    #[test]
    fn test_bad_type_name_rejected() {
        assert!(EntitySchema::new("../etc").validate().is_err());
        assert!(EntitySchema::new("").validate().is_err());
    }

    #[test]
    fn test_default_must_fit_kind() {
        let schema = EntitySchema::new("Post")
            .with_field(FieldDescriptor::new("views", FieldKind::Integer).with_default("many"));
        assert!(schema.validate().is_err());

        let schema = EntitySchema::new("Post")
            .with_field(FieldDescriptor::new("title", FieldKind::String).empty_by_default());
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_list_of_entities_rejected() {
        let schema = EntitySchema::new("Post").with_field(FieldDescriptor::new(
            "authors",
            FieldKind::list_of(FieldKind::reference("User")),
        ));
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(FieldKind::set_of("B").to_string(), "set<B>");
        assert_eq!(FieldKind::list_of(FieldKind::Path).to_string(), "list<path>");
        assert_eq!(FieldKind::reference("A").to_string(), "A");
    }
}
