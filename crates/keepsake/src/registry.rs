use std::collections::HashMap;
use std::sync::Arc;

use keepsake_core::error::CoreError;
use keepsake_core::model::{EntityId, EntitySchema, Value};
use keepsake_core::storage::BlobStore;

use crate::codec;

/// In-memory state of one field.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FieldState {
    Value(Value),
    /// Identifiers of a relationship. `resolved` is set once every target
    /// has been found in memory or storage.
    Link { ids: Vec<EntityId>, resolved: bool },
}

/// In-memory state of one entity.
#[derive(Debug, Clone)]
pub(crate) struct Slot {
    pub fields: HashMap<String, FieldState>,
    /// False while the stored record lags behind the in-memory fields.
    pub persisted: bool,
}

impl Slot {
    pub fn links(&self, field: &str) -> Option<(&[EntityId], bool)> {
        match self.fields.get(field) {
            Some(FieldState::Link { ids, resolved }) => Some((ids, *resolved)),
            _ => None,
        }
    }
}

/// Identity map of one entity type: at most one slot per identifier.
///
/// Deleted entities move to the tombstones so that handles still held by
/// callers keep reading their last state.
#[derive(Debug)]
pub(crate) struct EntityRegistry {
    name: Arc<str>,
    schema: Arc<EntitySchema>,
    live: HashMap<EntityId, Slot>,
    tombstones: HashMap<EntityId, Slot>,
}

impl EntityRegistry {
    pub fn new(schema: EntitySchema) -> Self {
        Self {
            name: Arc::from(schema.name.as_str()),
            schema: Arc::new(schema),
            live: HashMap::new(),
            tombstones: HashMap::new(),
        }
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn schema(&self) -> &Arc<EntitySchema> {
        &self.schema
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.live.contains_key(id)
    }

    pub fn is_deleted(&self, id: &EntityId) -> bool {
        self.tombstones.contains_key(id)
    }

    /// Slot of a live or deleted entity.
    pub fn slot(&self, id: &EntityId) -> Option<&Slot> {
        self.live.get(id).or_else(|| self.tombstones.get(id))
    }

    pub fn slot_mut(&mut self, id: &EntityId) -> Option<&mut Slot> {
        match self.live.get_mut(id) {
            Some(slot) => Some(slot),
            None => self.tombstones.get_mut(id),
        }
    }

    /// Slot of a live entity, `Deleted` for a tombstone.
    pub fn live_mut(&mut self, id: &EntityId) -> Result<&mut Slot, CoreError> {
        if self.tombstones.contains_key(id) {
            return Err(self.deleted(id));
        }
        self.live.get_mut(id).ok_or_else(|| CoreError::DanglingReference {
            entity_type: self.name.to_string(),
            id: id.to_string(),
        })
    }

    pub fn live(&self, id: &EntityId) -> Result<&Slot, CoreError> {
        if self.tombstones.contains_key(id) {
            return Err(self.deleted(id));
        }
        self.live.get(id).ok_or_else(|| CoreError::DanglingReference {
            entity_type: self.name.to_string(),
            id: id.to_string(),
        })
    }

    pub fn register(&mut self, id: EntityId, slot: Slot) {
        self.live.insert(id, slot);
    }

    /// Drop a slot that never reached storage.
    pub fn discard(&mut self, id: &EntityId) {
        self.live.remove(id);
    }

    /// Move a live entity to the tombstones. Returns whether it was live.
    pub fn forget(&mut self, id: &EntityId) -> bool {
        match self.live.remove(id) {
            Some(slot) => {
                self.tombstones.insert(id.clone(), slot);
                true
            }
            None => false,
        }
    }

    /// Identifiers of every live entity, sorted.
    pub fn ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.live.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// The live slot for `id`, loading it from `backend` on first access.
    ///
    /// `None` when no record exists or the entity was deleted.
    pub fn get_or_load(
        &mut self,
        backend: &dyn BlobStore,
        id: &EntityId,
    ) -> Result<Option<&Slot>, CoreError> {
        if self.tombstones.contains_key(id) {
            return Ok(None);
        }
        if !self.live.contains_key(id) {
            let Some(bytes) = backend.read(&self.name, id)? else {
                return Ok(None);
            };
            let slot = codec::decode_slot(&self.schema, id, &bytes)?;
            tracing::debug!("Loaded {}/{}", self.name, id);
            self.live.insert(id.clone(), slot);
        }
        Ok(self.live.get(id))
    }

    fn deleted(&self, id: &EntityId) -> CoreError {
        CoreError::Deleted {
            entity_type: self.name.to_string(),
            id: id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keepsake_core::model::{FieldDescriptor, FieldKind};
    use keepsake_core::storage::FileStore;
    use keepsake_core::StoreConfig;
    use tempfile::TempDir;

    fn note_registry() -> EntityRegistry {
        EntityRegistry::new(
            EntitySchema::new("Note").with_field(FieldDescriptor::new("text", FieldKind::String)),
        )
    }

    fn note_slot(text: &str) -> Slot {
        Slot {
            fields: HashMap::from([("text".to_string(), FieldState::Value(Value::from(text)))]),
            persisted: false,
        }
    }

    #[test]
    fn test_forget_keeps_tombstone() {
        let mut registry = note_registry();
        let id = EntityId::new();
        registry.register(id.clone(), note_slot("hi"));
        assert!(registry.contains(&id));
        assert_eq!(registry.ids(), vec![id.clone()]);

        assert!(registry.forget(&id));
        assert!(!registry.forget(&id));
        assert!(!registry.contains(&id));
        assert!(registry.is_deleted(&id));
        assert!(registry.slot(&id).is_some());
        assert!(matches!(
            registry.live_mut(&id),
            Err(CoreError::Deleted { .. })
        ));
        assert!(registry.ids().is_empty());
    }

    #[test]
    fn test_get_or_load_from_storage() {
        let tmp = TempDir::new().unwrap();
        let backend = FileStore::open(&StoreConfig::new(tmp.path())).unwrap();
        let id = EntityId::new();
        backend.write("Note", &id, br#"{"text": "stored"}"#).unwrap();

        let mut registry = note_registry();
        let slot = registry.get_or_load(&backend, &id).unwrap().unwrap();
        assert!(slot.persisted);
        assert_eq!(
            slot.fields.get("text"),
            Some(&FieldState::Value(Value::from("stored")))
        );

        // Served from memory afterwards
        backend.delete("Note", &id).unwrap();
        assert!(registry.get_or_load(&backend, &id).unwrap().is_some());

        assert!(registry.get_or_load(&backend, &EntityId::new()).unwrap().is_none());
    }

    #[test]
    fn test_get_or_load_skips_tombstones() {
        let tmp = TempDir::new().unwrap();
        let backend = FileStore::open(&StoreConfig::new(tmp.path())).unwrap();
        let id = EntityId::new();
        backend.write("Note", &id, br#"{"text": "stored"}"#).unwrap();

        let mut registry = note_registry();
        registry.get_or_load(&backend, &id).unwrap();
        registry.forget(&id);
        assert!(registry.get_or_load(&backend, &id).unwrap().is_none());
    }
}
