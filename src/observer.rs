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

//! Observers: callbacks notified once per affected entity per drain,
//! after its archetype migration has completed, with only the
//! component types it actually cares about.

use std::any::TypeId;

use smallvec::SmallVec;

use crate::entity::EntityId;
use crate::world::World;

/// Context handed to an interested observer for one entity.
pub struct ObserverContext<'a> {
    pub world: &'a World,
    pub entity: EntityId,
    pub added: &'a [TypeId],
    pub removed: &'a [TypeId],
}

pub trait Observer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Component types this observer wants to hear about on addition.
    fn watched_additions(&self) -> &[TypeId] {
        &[]
    }

    /// Component types this observer wants to hear about on removal.
    fn watched_removals(&self) -> &[TypeId] {
        &[]
    }

    fn on_change(&self, ctx: &ObserverContext<'_>);
}

pub(crate) struct ObserverRegistry {
    observers: Vec<Box<dyn Observer>>,
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    pub fn register(&mut self, observer: Box<dyn Observer>) {
        self.observers.push(observer);
    }

    /// Calls every observer whose watch list overlaps `added`/`removed`,
    /// passing only the overlapping subset, matching each observer's
    /// declared interest.
    pub fn notify(&self, world: &World, entity: EntityId, added: &[TypeId], removed: &[TypeId]) {
        for observer in &self.observers {
            let interested_added: SmallVec<[TypeId; 4]> = added
                .iter()
                .copied()
                .filter(|t| observer.watched_additions().contains(t))
                .collect();
            let interested_removed: SmallVec<[TypeId; 4]> = removed
                .iter()
                .copied()
                .filter(|t| observer.watched_removals().contains(t))
                .collect();
            if interested_added.is_empty() && interested_removed.is_empty() {
                continue;
            }
            let ctx = ObserverContext {
                world,
                entity,
                added: &interested_added,
                removed: &interested_removed,
            };
            observer.on_change(&ctx);
        }
    }
}
