use crate::entity::Entity;
use crate::error::Error;
use crate::store::Store;
use crate::value::FieldInput;

/// A fluent builder for a new entity.
///
/// Collects field values, then constructs, registers and saves the entity
/// in one step with [`create`](Self::create).
#[derive(Debug)]
pub struct EntityBuilder {
    store: Store,
    entity_type: String,
    fields: Vec<(String, FieldInput)>,
}

impl EntityBuilder {
    pub(crate) fn new(store: Store, entity_type: &str) -> Self {
        Self {
            store,
            entity_type: entity_type.to_string(),
            fields: Vec::new(),
        }
    }

    /// Set a field. Setting the same field twice keeps the last value.
    pub fn with(&mut self, name: &str, value: impl Into<FieldInput>) -> &mut Self {
        self.fields.push((name.to_string(), value.into()));
        self
    }

    /// Create the entity. Fields left unset take their defaults.
    pub fn create(&mut self) -> Result<Entity, Error> {
        let fields = std::mem::take(&mut self.fields);
        self.store.create(&self.entity_type, fields)
    }
}
