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

//! Entity identifiers and the allocator that owns their generational
//! lifecycle.

use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Unique entity identifier. Carries a generation internally so a
    /// released and reissued index is never mistaken for its predecessor.
    pub struct EntityId;
}

/// Where a live entity's row data. `None` until the deferred queue has
/// placed the entity into an archetype for the first time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityLocation {
    pub archetype_id: usize,
    pub row: usize,
}

/// Owns the generational id space. Creation and release are immediate;
/// archetype placement is recorded separately once the deferred queue
/// has migrated the entity into a concrete archetype.
#[derive(Default)]
pub struct EntityAllocator {
    slots: SlotMap<EntityId, Option<EntityLocation>>,
}

impl EntityAllocator {
    pub fn new() -> Self {
        Self {
            slots: SlotMap::with_key(),
        }
    }

    /// Mints a fresh id. The entity has no archetype row until
    /// `set_location` is called.
    pub fn create(&mut self) -> EntityId {
        self.slots.insert(None)
    }

    /// Releases the id's slot, bumping its generation so any copy of the
    /// old `EntityId` is now stale. Returns whether the entity was alive.
    pub fn release(&mut self, entity: EntityId) -> bool {
        self.slots.remove(entity).is_some()
    }

    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.slots.contains_key(entity)
    }

    pub fn location(&self, entity: EntityId) -> Option<EntityLocation> {
        self.slots.get(entity).copied().flatten()
    }

    /// Records the entity's current archetype row. Returns `false` if the
    /// entity is not alive.
    pub fn set_location(&mut self, entity: EntityId, location: EntityLocation) -> bool {
        match self.slots.get_mut(entity) {
            Some(slot) => {
                *slot = Some(location);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
