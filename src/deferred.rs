// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Deferred structural mutations.
//!
//! Every structural change to the world (entity creation/removal,
//! component or tag add/remove, system registration/removal) is recorded
//! here instead of applied immediately, so that systems running during a
//! tick always see the same frozen archetype layout. Queued entries are
//! drained at fixed points in the tick rather than as soon as they
//! arrive.
//!
//! Per entity, queued actions accumulate into an ordered list. Draining
//! folds the list once: `modify_types` is applied in order to compute
//! the entity's final `TypeSet`, the entity is migrated to the archetype
//! for that set (creating it if necessary), and each action's `apply` is
//! then called against the new row to write its value. A queued removal
//! collapses the whole list — once an entity is marked for removal,
//! later actions queued against it in the same tick are dropped.

use std::any::TypeId;
use std::marker::PhantomData;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::archetype::{Archetype, TypeSet};
use crate::component::Component;
use crate::entity::EntityId;
use crate::system::SystemHandle;

/// One queued structural change for a single entity.
pub trait EntityAction: Send {
    /// Folds this action's effect into the entity's running type set and
    /// the added/removed logs handed to observers after the drain.
    fn modify_types(&self, types: &mut TypeSet, added: &mut Vec<TypeId>, removed: &mut Vec<TypeId>);

    /// Writes this action's value into the entity's new row, once the
    /// entity has been migrated to its final archetype.
    fn apply(self: Box<Self>, archetype: &mut Archetype, row: usize);
}

struct CreateEntityAction;

impl EntityAction for CreateEntityAction {
    fn modify_types(&self, _types: &mut TypeSet, _added: &mut Vec<TypeId>, _removed: &mut Vec<TypeId>) {}
    fn apply(self: Box<Self>, _archetype: &mut Archetype, _row: usize) {}
}

struct AddComponentAction<T: Component> {
    value: T,
}

impl<T: Component> EntityAction for AddComponentAction<T> {
    fn modify_types(&self, types: &mut TypeSet, added: &mut Vec<TypeId>, removed: &mut Vec<TypeId>) {
        let id = TypeId::of::<T>();
        if !types.contains(&id) {
            types.push(id);
        }
        removed.retain(|&t| t != id);
        added.push(id);
    }

    fn apply(self: Box<Self>, archetype: &mut Archetype, row: usize) {
        let ptr = archetype
            .get_column_mut(TypeId::of::<T>())
            .expect("column registered during migration")
            .get_ptr_mut(row);
        unsafe {
            std::ptr::write(ptr as *mut T, self.value);
        }
    }
}

struct AddTagAction<T: Component> {
    _marker: PhantomData<T>,
}

impl<T: Component> EntityAction for AddTagAction<T> {
    fn modify_types(&self, types: &mut TypeSet, added: &mut Vec<TypeId>, removed: &mut Vec<TypeId>) {
        let id = TypeId::of::<T>();
        if !types.contains(&id) {
            types.push(id);
        }
        removed.retain(|&t| t != id);
        added.push(id);
    }

    fn apply(self: Box<Self>, _archetype: &mut Archetype, _row: usize) {
        // Zero-sized: the column's row already exists with zero bytes,
        // there is nothing to write.
    }
}

struct RemoveComponentAction<T: Component> {
    _marker: PhantomData<T>,
}

impl<T: Component> EntityAction for RemoveComponentAction<T> {
    fn modify_types(&self, types: &mut TypeSet, added: &mut Vec<TypeId>, removed: &mut Vec<TypeId>) {
        let id = TypeId::of::<T>();
        types.retain(|&t| t != id);
        added.retain(|&t| t != id);
        removed.push(id);
    }

    fn apply(self: Box<Self>, _archetype: &mut Archetype, _row: usize) {
        // The old value is dropped when the source archetype's row is
        // swap-removed; the destination archetype never gets a column
        // for this type, so there is nothing to write here. A
        // remove-then-add of the same type within one tick therefore
        // always starts from a fresh value.
    }
}

enum EntityActionList {
    Removed,
    Actions(Vec<Box<dyn EntityAction>>),
}

#[derive(Default)]
struct QueueInner {
    entity_actions: FxHashMap<EntityId, EntityActionList>,
    system_removals: Vec<SystemHandle>,
}

/// Buffers structural mutations until the world drains them. Safe to
/// share across systems running concurrently within a tick: all queueing
/// methods take `&self` and serialize through an internal lock.
#[derive(Default)]
pub struct DeferredQueue {
    inner: Mutex<QueueInner>,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_action(&self, entity: EntityId, action: Box<dyn EntityAction>) {
        let mut inner = self.inner.lock();
        match inner.entity_actions.entry(entity).or_insert_with(|| EntityActionList::Actions(Vec::new())) {
            EntityActionList::Removed => {}
            EntityActionList::Actions(list) => list.push(action),
        }
    }

    pub fn queue_create(&self, entity: EntityId) {
        self.push_action(entity, Box::new(CreateEntityAction));
    }

    pub fn queue_remove_entity(&self, entity: EntityId) {
        let mut inner = self.inner.lock();
        inner.entity_actions.insert(entity, EntityActionList::Removed);
    }

    pub fn queue_add_component<T: Component>(&self, entity: EntityId, value: T) {
        self.push_action(entity, Box::new(AddComponentAction { value }));
    }

    pub fn queue_add_tag<T: Component>(&self, entity: EntityId) {
        self.push_action(
            entity,
            Box::new(AddTagAction {
                _marker: PhantomData::<T>,
            }),
        );
    }

    pub fn queue_remove_component<T: Component>(&self, entity: EntityId) {
        self.push_action(
            entity,
            Box::new(RemoveComponentAction {
                _marker: PhantomData::<T>,
            }),
        );
    }

    pub fn queue_system_removal(&self, handle: SystemHandle) {
        self.inner.lock().system_removals.push(handle);
    }

    pub fn is_empty(&self) -> bool {
        let inner = self.inner.lock();
        inner.entity_actions.is_empty()
    }

    /// Removes and returns every queued per-entity action list, leaving
    /// the queue empty for the next tick.
    pub fn take_entity_actions(&self) -> Vec<(EntityId, EntityDrainItem)> {
        let mut inner = self.inner.lock();
        inner
            .entity_actions
            .drain()
            .map(|(entity, list)| {
                let item = match list {
                    EntityActionList::Removed => EntityDrainItem::Remove,
                    EntityActionList::Actions(actions) => EntityDrainItem::Modify(actions),
                };
                (entity, item)
            })
            .collect()
    }

    pub fn take_system_removals(&self) -> Vec<SystemHandle> {
        std::mem::take(&mut self.inner.lock().system_removals)
    }
}

/// What a drained entity entry resolves to.
pub enum EntityDrainItem {
    Remove,
    Modify(Vec<Box<dyn EntityAction>>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::Key;

    #[test]
    fn remove_after_queued_actions_collapses_the_list() {
        let queue = DeferredQueue::new();
        let e = EntityId::null();
        queue.queue_add_component(e, 7u32);
        queue.queue_remove_entity(e);
        queue.queue_add_component(e, 9u32);

        let items = queue.take_entity_actions();
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0].1, EntityDrainItem::Remove));
    }

    #[test]
    fn unrelated_entities_keep_independent_lists() {
        let queue = DeferredQueue::new();
        let a = EntityId::null();
        queue.queue_create(a);
        queue.queue_add_component(a, 1u32);
        let items = queue.take_entity_actions();
        assert_eq!(items.len(), 1);
        match &items[0].1 {
            EntityDrainItem::Modify(actions) => assert_eq!(actions.len(), 2),
            EntityDrainItem::Remove => panic!("expected Modify"),
        }
    }
}
