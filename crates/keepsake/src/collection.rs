use std::cmp::Ordering;
use std::collections::HashSet;

use keepsake_core::model::{CollectionOrder, EntityId};
use keepsake_query::Query;
use rand::seq::SliceRandom;

use crate::entity::Entity;
use crate::error::Error;
use crate::value::FieldValue;

/// The live members of one collection field, bound to the entity that owns
/// it.
///
/// Every structural change is applied to the owner's field and saves the
/// owner. Changes that leave the membership as it was do not write. Reads
/// resolve the members on first access.
#[derive(Debug, Clone)]
pub struct Collection {
    owner: Entity,
    field: String,
    target: String,
    order: CollectionOrder,
}

impl Collection {
    pub(crate) fn new(owner: Entity, field: &str, target: &str, order: CollectionOrder) -> Self {
        Self {
            owner,
            field: field.to_string(),
            target: target.to_string(),
            order,
        }
    }

    pub fn owner(&self) -> &Entity {
        &self.owner
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Type name of the members.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn order(&self) -> CollectionOrder {
        self.order
    }

    /// Member IDs as stored, without resolving them.
    pub fn ids(&self) -> Result<Vec<EntityId>, Error> {
        self.owner.store().link_ids(&self.owner, &self.field, false)
    }

    pub fn len(&self) -> Result<usize, Error> {
        Ok(self.ids()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.ids()?.is_empty())
    }

    pub fn contains(&self, member: &Entity) -> Result<bool, Error> {
        if member.entity_type() != self.target || !member.store().same_store(self.owner.store()) {
            return Ok(false);
        }
        Ok(self.ids()?.contains(member.id()))
    }

    /// The resolved members, in membership order.
    pub fn members(&self) -> Result<Vec<Entity>, Error> {
        match self.owner.get(&self.field)? {
            FieldValue::Many(members) => Ok(members),
            _ => Ok(Vec::new()),
        }
    }

    /// Iterate over a snapshot of the members. Call again to restart.
    pub fn iter(&self) -> Result<std::vec::IntoIter<Entity>, Error> {
        Ok(self.members()?.into_iter())
    }

    /// The members as a detached [`Selection`].
    pub fn selection(&self) -> Result<Selection, Error> {
        Ok(Selection::new(self.members()?))
    }

    /// Add a member. Sets ignore a member that is already present; sequences
    /// append. Returns whether the membership changed.
    pub fn add(&self, member: &Entity) -> Result<bool, Error> {
        self.check(member)?;
        let order = self.order;
        self.update(&[member], |ids| {
            if order == CollectionOrder::Set && ids.contains(member.id()) {
                return Ok(false);
            }
            ids.push(member.id().clone());
            Ok(true)
        })
    }

    /// Add several members with a single save.
    pub fn extend<'a>(&self, members: impl IntoIterator<Item = &'a Entity>) -> Result<(), Error> {
        let members: Vec<&Entity> = members.into_iter().collect();
        for member in &members {
            self.check(member)?;
        }
        let order = self.order;
        self.update(&members, |ids| {
            for member in &members {
                if order == CollectionOrder::Set && ids.contains(member.id()) {
                    continue;
                }
                ids.push(member.id().clone());
            }
            Ok(())
        })
    }

    /// Remove the first occurrence of a member. Returns whether it was
    /// present.
    pub fn remove(&self, member: &Entity) -> Result<bool, Error> {
        if member.entity_type() != self.target {
            return Ok(false);
        }
        self.update(&[], |ids| match ids.iter().position(|id| id == member.id()) {
            Some(index) => {
                ids.remove(index);
                Ok(true)
            }
            None => Ok(false),
        })
    }

    pub fn clear(&self) -> Result<(), Error> {
        self.update(&[], |ids| {
            ids.clear();
            Ok(())
        })
    }

    /// Remove and return the last member.
    pub fn pop(&self) -> Result<Option<Entity>, Error> {
        // Resolve first so a dangling member is reported, not handed out.
        self.owner.store().link_ids(&self.owner, &self.field, true)?;
        let popped = self.update(&[], |ids| Ok(ids.pop()))?;
        Ok(popped.map(|id| self.member(id)))
    }

    /// Insert a member at `index`. Sequences only.
    pub fn insert(&self, index: usize, member: &Entity) -> Result<(), Error> {
        self.require_sequence()?;
        self.check(member)?;
        let field = self.field.clone();
        self.update(&[member], |ids| {
            if index > ids.len() {
                return Err(Error::IndexOutOfBounds {
                    field,
                    index,
                    len: ids.len(),
                });
            }
            ids.insert(index, member.id().clone());
            Ok(())
        })
    }

    /// The member at `index`. Sequences only.
    pub fn at(&self, index: usize) -> Result<Option<Entity>, Error> {
        self.require_sequence()?;
        Ok(self.members()?.into_iter().nth(index))
    }

    pub fn filter(&self, query: &Query<FieldValue>) -> Result<Selection, Error> {
        self.owner.store().check_query(&self.target, query)?;
        self.selection()?.filter(query)
    }

    pub fn exclude(&self, query: &Query<FieldValue>) -> Result<Selection, Error> {
        self.owner.store().check_query(&self.target, query)?;
        self.selection()?.exclude(query)
    }

    fn check(&self, member: &Entity) -> Result<(), Error> {
        Ok(self
            .owner
            .store()
            .check_member(&self.field, &self.target, member)?)
    }

    fn require_sequence(&self) -> Result<(), Error> {
        match self.order {
            CollectionOrder::Sequence => Ok(()),
            CollectionOrder::Set => Err(Error::NotASequence {
                entity_type: self.owner.entity_type().to_string(),
                field: self.field.clone(),
            }),
        }
    }

    fn update<R>(
        &self,
        added: &[&Entity],
        update: impl FnOnce(&mut Vec<EntityId>) -> Result<R, Error>,
    ) -> Result<R, Error> {
        self.owner
            .store()
            .update_links(&self.owner, &self.field, added, update)
    }

    fn member(&self, id: EntityId) -> Entity {
        Entity::new(
            self.owner.store().clone(),
            self.target.as_str().into(),
            id,
        )
    }
}

/// A detached list of entities produced by a query.
///
/// Changing a selection never touches storage; it can be filtered further,
/// sorted or sampled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    items: Vec<Entity>,
}

impl Selection {
    pub fn new(items: Vec<Entity>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Entity] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<Entity> {
        self.items
    }

    pub fn first(&self) -> Option<&Entity> {
        self.items.first()
    }

    pub fn get(&self, index: usize) -> Option<&Entity> {
        self.items.get(index)
    }

    pub fn contains(&self, entity: &Entity) -> bool {
        self.items.contains(entity)
    }

    /// The IDs of every entity, in order.
    pub fn ids(&self) -> Vec<EntityId> {
        self.items.iter().map(|e| e.id().clone()).collect()
    }

    /// Keep the entities the query matches.
    pub fn filter(&self, query: &Query<FieldValue>) -> Result<Selection, Error> {
        self.check_query(query)?;
        Ok(Self::new(keepsake_query::filter(
            self.items.iter().cloned(),
            query,
        )?))
    }

    /// Keep the entities for which every predicate is false.
    pub fn exclude(&self, query: &Query<FieldValue>) -> Result<Selection, Error> {
        self.check_query(query)?;
        Ok(Self::new(keepsake_query::exclude(
            self.items.iter().cloned(),
            query,
        )?))
    }

    /// Stable sort with a comparator.
    pub fn sort_by(mut self, compare: impl FnMut(&Entity, &Entity) -> Ordering) -> Self {
        self.items.sort_by(compare);
        self
    }

    pub fn sort_by_key<K: Ord>(mut self, key: impl FnMut(&Entity) -> K) -> Self {
        self.items.sort_by_key(key);
        self
    }

    /// Up to `amount` distinct entities chosen at random.
    pub fn sample(&self, amount: usize) -> Self {
        let mut rng = rand::thread_rng();
        Self::new(
            self.items
                .choose_multiple(&mut rng, amount)
                .cloned()
                .collect(),
        )
    }

    // Selections collected by hand may mix types.
    fn check_query(&self, query: &Query<FieldValue>) -> Result<(), Error> {
        let mut checked = HashSet::new();
        for entity in &self.items {
            if checked.insert(entity.entity_type()) {
                entity.store().check_query(entity.entity_type(), query)?;
            }
        }
        Ok(())
    }
}

impl FromIterator<Entity> for Selection {
    fn from_iter<I: IntoIterator<Item = Entity>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for Selection {
    type Item = Entity;
    type IntoIter = std::vec::IntoIter<Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Selection {
    type Item = &'a Entity;
    type IntoIter = std::slice::Iter<'a, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl From<Selection> for Vec<Entity> {
    fn from(selection: Selection) -> Self {
        selection.items
    }
}
