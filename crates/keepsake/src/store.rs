use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use keepsake_core::error::CoreError;
use keepsake_core::model::{EntityId, EntitySchema, FieldDescriptor, FieldKind, CollectionOrder};
use keepsake_core::storage::{BlobStore, FileStore};
use keepsake_core::{transcode, StoreConfig};
use keepsake_query::Query;

use crate::builder::EntityBuilder;
use crate::codec;
use crate::collection::Selection;
use crate::entity::Entity;
use crate::error::Error;
use crate::registry::{EntityRegistry, FieldState, Slot};
use crate::value::{FieldInput, FieldValue};

/// Entry point: owns the schemas, the identity maps and the blob store.
///
/// Cloning is cheap and every clone shares the same state. All access to
/// the identity maps goes through one lock, so loads and writes from
/// several threads are serialized.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

struct Inner {
    config: StoreConfig,
    backend: Box<dyn BlobStore>,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    registries: HashMap<String, EntityRegistry>,
}

type Visited = HashSet<(String, EntityId)>;

impl State {
    fn registry(&self, entity_type: &str) -> Result<&EntityRegistry, CoreError> {
        self.registries
            .get(entity_type)
            .ok_or_else(|| CoreError::UnknownType(entity_type.to_string()))
    }

    fn registry_mut(&mut self, entity_type: &str) -> Result<&mut EntityRegistry, CoreError> {
        self.registries
            .get_mut(entity_type)
            .ok_or_else(|| CoreError::UnknownType(entity_type.to_string()))
    }

    fn slot(&self, entity_type: &str, id: &EntityId) -> Result<&Slot, CoreError> {
        self.registry(entity_type)?
            .slot(id)
            .ok_or_else(|| CoreError::DanglingReference {
                entity_type: entity_type.to_string(),
                id: id.to_string(),
            })
    }

    /// Fail with `Deleted` if `member` was deleted from this store.
    fn require_live(&self, member: &Entity) -> Result<(), CoreError> {
        let registry = self.registry(member.entity_type())?;
        if registry.is_deleted(member.id()) {
            return Err(CoreError::Deleted {
                entity_type: member.entity_type().to_string(),
                id: member.id().to_string(),
            });
        }
        Ok(())
    }

    /// Member IDs of a relationship field, checking on first access that
    /// every member exists. Deleted members still resolve to their last
    /// state.
    fn resolve(
        &mut self,
        backend: &dyn BlobStore,
        entity_type: &str,
        id: &EntityId,
        field: &str,
    ) -> Result<Vec<EntityId>, CoreError> {
        let registry = self.registry(entity_type)?;
        let descriptor = registry.schema().require(field)?;
        let target = descriptor
            .kind
            .target()
            .ok_or_else(|| not_a_relationship(descriptor))?
            .to_string();
        let (ids, resolved) = self
            .slot(entity_type, id)?
            .links(field)
            .map(|(ids, resolved)| (ids.to_vec(), resolved))
            .ok_or_else(|| CoreError::MissingField {
                entity_type: entity_type.to_string(),
                field: field.to_string(),
            })?;
        if resolved {
            return Ok(ids);
        }

        let targets = self.registry_mut(&target)?;
        for member in &ids {
            if targets.is_deleted(member) {
                continue;
            }
            if targets.get_or_load(backend, member)?.is_none() {
                return Err(CoreError::DanglingReference {
                    entity_type: target,
                    id: member.to_string(),
                });
            }
        }

        let state = self
            .registry_mut(entity_type)?
            .slot_mut(id)
            .and_then(|slot| slot.fields.get_mut(field));
        if let Some(FieldState::Link { resolved, .. }) = state {
            *resolved = true;
        }
        tracing::trace!("Resolved {entity_type}/{id}.{field} ({} members)", ids.len());
        Ok(ids)
    }
}

fn not_a_relationship(descriptor: &FieldDescriptor) -> CoreError {
    CoreError::TypeMismatch {
        field: descriptor.name.clone(),
        expected: "relationship".into(),
        found: descriptor.kind.to_string(),
    }
}

impl Store {
    /// Open a store backed by JSON files under `config.data_dir`.
    pub fn open(config: StoreConfig) -> Result<Self, Error> {
        let backend = FileStore::open(&config)?;
        tracing::info!("Opened store at {}", backend.root().display());
        Ok(Self::with_backend(config, backend))
    }

    /// Use a custom blob store. Only the write options of `config` apply.
    pub fn with_backend(config: StoreConfig, backend: impl BlobStore + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                backend: Box::new(backend),
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Register an entity type. Relationship targets may be registered
    /// later, but before the relationship is first resolved.
    pub fn register(&self, schema: EntitySchema) -> Result<(), Error> {
        schema.validate()?;
        let mut state = self.state();
        if state.registries.contains_key(&schema.name) {
            return Err(CoreError::DuplicateType(schema.name).into());
        }
        self.inner.backend.prepare(&schema.name)?;
        tracing::debug!("Registered type {}", schema.name);
        state
            .registries
            .insert(schema.name.clone(), EntityRegistry::new(schema));
        Ok(())
    }

    pub fn schema(&self, entity_type: &str) -> Result<Arc<EntitySchema>, Error> {
        Ok(self.state().registry(entity_type)?.schema().clone())
    }

    /// Names of every registered type, sorted.
    pub fn types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state().registries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Start building a new entity of `entity_type`.
    pub fn build(&self, entity_type: &str) -> EntityBuilder {
        EntityBuilder::new(self.clone(), entity_type)
    }

    /// Construct, register and save a new entity.
    ///
    /// Every field without a default must be supplied. If the first save
    /// fails the entity is not kept. Default factories run before the store
    /// is locked.
    pub fn create<I, K>(&self, entity_type: &str, fields: I) -> Result<Entity, Error>
    where
        I: IntoIterator<Item = (K, FieldInput)>,
        K: Into<String>,
    {
        let schema = self.schema(entity_type)?;

        let mut supplied = HashMap::new();
        for (field, input) in fields {
            let field: String = field.into();
            if schema.field(&field).is_none() {
                return Err(CoreError::UnexpectedField {
                    entity_type: entity_type.to_string(),
                    field,
                }
                .into());
            }
            supplied.insert(field, input);
        }

        let mut values = HashMap::with_capacity(schema.fields.len());
        for descriptor in &schema.fields {
            if supplied.contains_key(&descriptor.name) {
                continue;
            }
            let value = codec::default_state(descriptor).ok_or_else(|| CoreError::MissingField {
                entity_type: entity_type.to_string(),
                field: descriptor.name.clone(),
            })?;
            values.insert(descriptor.name.clone(), value);
        }

        let mut state = self.state();
        for descriptor in &schema.fields {
            if let Some(input) = supplied.remove(&descriptor.name) {
                let value = self.field_state(&state, descriptor, input)?;
                values.insert(descriptor.name.clone(), value);
            }
        }

        let name = state.registry(entity_type)?.name().clone();
        let id = EntityId::new();
        state.registry_mut(entity_type)?.register(
            id.clone(),
            Slot {
                fields: values,
                persisted: false,
            },
        );
        if let Err(e) = self.save_locked(&mut state, entity_type, &id, &mut Visited::new()) {
            if let Ok(registry) = state.registry_mut(entity_type) {
                registry.discard(&id);
            }
            return Err(e.into());
        }
        tracing::debug!("Created {entity_type}/{id}");
        Ok(Entity::new(self.clone(), name, id))
    }

    /// Look up one entity, loading it from storage if needed.
    ///
    /// `None` when no record exists or the entity was deleted.
    pub fn get(&self, entity_type: &str, id: &EntityId) -> Result<Option<Entity>, Error> {
        let mut state = self.state();
        let registry = state.registry_mut(entity_type)?;
        let found = registry
            .get_or_load(&*self.inner.backend, id)?
            .is_some();
        Ok(found.then(|| Entity::new(self.clone(), registry.name().clone(), id.clone())))
    }

    /// Look up an ID across every registered type.
    pub fn find(&self, id: &EntityId) -> Result<Option<Entity>, Error> {
        for entity_type in self.types() {
            if let Some(entity) = self.get(&entity_type, id)? {
                return Ok(Some(entity));
            }
        }
        Ok(None)
    }

    /// Every live entity of a type, stored or not yet stored, ordered by ID.
    pub fn all(&self, entity_type: &str) -> Result<Selection, Error> {
        let backend = &*self.inner.backend;
        let mut state = self.state();
        let registry = state.registry_mut(entity_type)?;
        for id in backend.list(entity_type)? {
            registry.get_or_load(backend, &id)?;
        }
        let name = registry.name().clone();
        Ok(registry
            .ids()
            .into_iter()
            .map(|id| Entity::new(self.clone(), name.clone(), id))
            .collect())
    }

    pub fn count(&self, entity_type: &str) -> Result<usize, Error> {
        Ok(self.all(entity_type)?.len())
    }

    /// Entities of a type the query matches.
    pub fn filter(&self, entity_type: &str, query: &Query<FieldValue>) -> Result<Selection, Error> {
        self.check_query(entity_type, query)?;
        self.all(entity_type)?.filter(query)
    }

    /// Entities of a type for which every predicate of the query is false.
    pub fn exclude(&self, entity_type: &str, query: &Query<FieldValue>) -> Result<Selection, Error> {
        self.check_query(entity_type, query)?;
        self.all(entity_type)?.exclude(query)
    }

    /// Fail with `UnknownField` if the query names a field the type lacks.
    pub(crate) fn check_query(
        &self,
        entity_type: &str,
        query: &Query<FieldValue>,
    ) -> Result<(), Error> {
        let schema = self.schema(entity_type)?;
        for field in query.fields() {
            schema.require(field)?;
        }
        Ok(())
    }

    pub(crate) fn same_store(&self, other: &Store) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn read_field(&self, entity: &Entity, field: &str) -> Result<FieldValue, Error> {
        let (entity_type, id) = (entity.entity_type(), entity.id());
        let mut state = self.state();
        let kind = state
            .registry(entity_type)?
            .schema()
            .require(field)?
            .kind
            .clone();

        let Some(target) = kind.target() else {
            return match state.slot(entity_type, id)?.fields.get(field) {
                Some(FieldState::Value(v)) => Ok(FieldValue::Value(v.clone())),
                _ => Err(CoreError::MissingField {
                    entity_type: entity_type.to_string(),
                    field: field.to_string(),
                }
                .into()),
            };
        };

        let ids = state.resolve(&*self.inner.backend, entity_type, id, field)?;
        let name = state.registry(target)?.name().clone();
        let mut members = ids
            .into_iter()
            .map(|id| Entity::new(self.clone(), name.clone(), id));
        Ok(match kind {
            FieldKind::Reference(_) => FieldValue::One(members.next()),
            _ => FieldValue::Many(members.collect()),
        })
    }

    /// Raw member IDs of a relationship, resolving them first if asked.
    pub(crate) fn link_ids(
        &self,
        entity: &Entity,
        field: &str,
        resolve: bool,
    ) -> Result<Vec<EntityId>, Error> {
        let mut state = self.state();
        if resolve {
            return Ok(state.resolve(
                &*self.inner.backend,
                entity.entity_type(),
                entity.id(),
                field,
            )?);
        }
        let slot = state.slot(entity.entity_type(), entity.id())?;
        match slot.links(field) {
            Some((ids, _)) => Ok(ids.to_vec()),
            None => {
                let schema = state.registry(entity.entity_type())?.schema();
                Err(not_a_relationship(schema.require(field)?).into())
            }
        }
    }

    pub(crate) fn write_field(
        &self,
        entity: &Entity,
        field: &str,
        input: FieldInput,
    ) -> Result<(), Error> {
        let (entity_type, id) = (entity.entity_type(), entity.id());
        let mut state = self.state();
        let registry = state.registry(entity_type)?;
        registry.live(id)?;
        let schema = registry.schema().clone();
        let value = self.field_state(&state, schema.require(field)?, input)?;

        let slot = state.registry_mut(entity_type)?.live_mut(id)?;
        slot.fields.insert(field.to_string(), value);
        slot.persisted = false;
        Ok(self.save_locked(&mut state, entity_type, id, &mut Visited::new())?)
    }

    /// Apply `update` to the member IDs of a collection field and save the
    /// owner if the membership changed. Every entity in `added` must still
    /// be live.
    pub(crate) fn update_links<R>(
        &self,
        owner: &Entity,
        field: &str,
        added: &[&Entity],
        update: impl FnOnce(&mut Vec<EntityId>) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let (entity_type, id) = (owner.entity_type(), owner.id());
        let mut state = self.state();
        for member in added {
            state.require_live(member)?;
        }
        let slot = state.registry_mut(entity_type)?.live_mut(id)?;
        let Some(FieldState::Link { ids, .. }) = slot.fields.get_mut(field) else {
            return Err(CoreError::TypeMismatch {
                field: field.to_string(),
                expected: "relationship".into(),
                found: "value".into(),
            }
            .into());
        };
        let before = ids.clone();
        let out = update(&mut *ids)?;
        if *ids == before {
            return Ok(out);
        }
        slot.persisted = false;
        self.on_change(&mut state, entity_type, id, field)?;
        Ok(out)
    }

    pub(crate) fn save_entity(&self, entity: &Entity) -> Result<(), Error> {
        let mut state = self.state();
        Ok(self.save_locked(
            &mut state,
            entity.entity_type(),
            entity.id(),
            &mut Visited::new(),
        )?)
    }

    /// Delete the stored record and move the entity to the tombstones.
    /// References to it elsewhere are left in place.
    pub(crate) fn delete_entity(&self, entity: &Entity) -> Result<(), Error> {
        let (entity_type, id) = (entity.entity_type(), entity.id());
        let mut state = self.state();
        let registry = state.registry_mut(entity_type)?;
        registry.live(id)?;
        if !self.inner.backend.delete(entity_type, id)? {
            tracing::warn!("Deleting {entity_type}/{id} which had no stored record");
        }
        registry.forget(id);
        tracing::debug!("Deleted {entity_type}/{id}");
        Ok(())
    }

    pub(crate) fn is_deleted(&self, entity: &Entity) -> bool {
        self.state()
            .registries
            .get(entity.entity_type())
            .is_some_and(|registry| registry.is_deleted(entity.id()))
    }

    pub(crate) fn saved_at(&self, entity: &Entity) -> Result<Option<DateTime<Utc>>, Error> {
        Ok(self
            .inner
            .backend
            .saved_at(entity.entity_type(), entity.id())?)
    }

    /// Fail unless `member` is an entity of `target` held by this store.
    pub(crate) fn check_member(
        &self,
        field: &str,
        target: &str,
        member: &Entity,
    ) -> Result<(), CoreError> {
        if member.entity_type() == target && self.same_store(member.store()) {
            return Ok(());
        }
        let found = if self.same_store(member.store()) {
            member.entity_type().to_string()
        } else {
            format!("{} from another store", member.entity_type())
        };
        Err(CoreError::TypeMismatch {
            field: field.to_string(),
            expected: target.to_string(),
            found,
        })
    }

    /// Validate an input against a field and turn it into slot state.
    /// Deleted entities are refused as members.
    fn field_state(
        &self,
        state: &State,
        descriptor: &FieldDescriptor,
        input: FieldInput,
    ) -> Result<FieldState, CoreError> {
        let field = descriptor.name.as_str();
        match (input, &descriptor.kind) {
            (FieldInput::Value(value), kind) if !kind.is_relationship() => {
                transcode::encode(field, &value, kind)?;
                Ok(FieldState::Value(value))
            }
            (FieldInput::One(target), FieldKind::Reference(target_type)) => {
                if let Some(member) = &target {
                    self.check_member(field, target_type, member)?;
                    state.require_live(member)?;
                }
                Ok(FieldState::Link {
                    ids: target.map(|e| e.id().clone()).into_iter().collect(),
                    resolved: true,
                })
            }
            (FieldInput::Many(members), FieldKind::Many { target, order }) => {
                let mut ids: Vec<EntityId> = Vec::with_capacity(members.len());
                for member in &members {
                    self.check_member(field, target, member)?;
                    state.require_live(member)?;
                    if *order == CollectionOrder::Set && ids.contains(member.id()) {
                        continue;
                    }
                    ids.push(member.id().clone());
                }
                Ok(FieldState::Link {
                    ids,
                    resolved: true,
                })
            }
            (input, kind) => Err(CoreError::TypeMismatch {
                field: field.to_string(),
                expected: kind.to_string(),
                found: input_type_name(&input).to_string(),
            }),
        }
    }

    /// Called by bound collections after their membership changed.
    fn on_change(
        &self,
        state: &mut State,
        entity_type: &str,
        id: &EntityId,
        field: &str,
    ) -> Result<(), CoreError> {
        tracing::trace!("Collection {entity_type}/{id}.{field} changed");
        self.save_locked(state, entity_type, id, &mut Visited::new())
    }

    /// Write an entity, first saving any not yet persisted entity it
    /// references. `visited` guards against reference cycles.
    fn save_locked(
        &self,
        state: &mut State,
        entity_type: &str,
        id: &EntityId,
        visited: &mut Visited,
    ) -> Result<(), CoreError> {
        if !visited.insert((entity_type.to_string(), id.clone())) {
            return Ok(());
        }

        let registry = state.registry(entity_type)?;
        let schema = registry.schema().clone();
        let slot = registry.live(id)?;
        let mut pending = Vec::new();
        for field in schema.relationships() {
            let (Some(target), Some((ids, _))) = (field.kind.target(), slot.links(&field.name))
            else {
                continue;
            };
            let Some(targets) = state.registries.get(target) else {
                continue;
            };
            for member in ids {
                if targets.contains(member)
                    && targets.slot(member).is_some_and(|s| !s.persisted)
                {
                    pending.push((target.to_string(), member.clone()));
                }
            }
        }
        for (target, member) in pending {
            tracing::debug!("Cascading save from {entity_type}/{id} to {target}/{member}");
            self.save_locked(state, &target, &member, visited)?;
        }

        let slot = state.registry(entity_type)?.live(id)?;
        let bytes = codec::encode_slot(&schema, slot)?.to_bytes(self.inner.config.pretty)?;
        self.inner.backend.write(entity_type, id, &bytes)?;
        if let Some(slot) = state.registry_mut(entity_type)?.slot_mut(id) {
            slot.persisted = true;
        }
        tracing::debug!("Saved {entity_type}/{id}");
        Ok(())
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn input_type_name(input: &FieldInput) -> &'static str {
    match input {
        FieldInput::Value(v) => v.type_name(),
        FieldInput::One(_) => "reference",
        FieldInput::Many(_) => "collection",
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("data_dir", &self.inner.config.data_dir)
            .field("types", &self.types())
            .finish()
    }
}
