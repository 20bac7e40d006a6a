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

//! The world: owns every archetype, the entity allocator, registered
//! systems and observers, and drives the tick state machine.
//!
//! A tick runs, in order:
//!
//! 1. Drain the deferred queue — entity mutations first (migrating
//!    archetypes and notifying observers as entities settle into their
//!    new rows), then pending system additions.
//! 2. `PreTick`, `OnTick`, `PostTick` — each phase's systems run
//!    according to its dependency tree, rebuilt if the phase's system
//!    roster changed since the last tick.
//! 3. Apply queued system removals, including self-removal requests
//!    from systems that just ran one-shot.
//!
//! These are fixed steps of `tick`, not registered systems themselves —
//! there is no phase a user system can occupy that runs before the
//! queue drains or after removals are processed.

use std::any::TypeId;

use ahash::AHashMap;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use crate::archetype::{canonical_type_set, Archetype, ComponentColumn, TypeSet};
use crate::component::{validate_tag, Component};
use crate::deferred::{DeferredQueue, EntityDrainItem};
use crate::dependency::build_dependency_tree;
pub use crate::entity::EntityId;
use crate::entity::{EntityAllocator, EntityLocation};
use crate::error::{EcsError, Result};
use crate::executor::{self, CancellationToken};
use crate::observer::{Observer, ObserverRegistry};
use crate::system::{Phase, System, SystemEntry, SystemHandle, SystemOptions, PHASES};

#[cfg(feature = "profiling")]
use tracing::info_span;

type ColumnFactory = fn() -> ComponentColumn;

pub struct World {
    entities: EntityAllocator,
    archetypes: Vec<Archetype>,
    archetype_index: AHashMap<TypeSet, usize>,
    type_registry: FxHashMap<TypeId, ColumnFactory>,

    systems: [Vec<SystemEntry>; 3],
    // `add_system` may be called from inside a running system, where the
    // `&mut World` it receives is really an alias shared with every other
    // system the executor is currently running concurrently (see the
    // safety note on `executor::execute`). Nothing in a system's declared
    // `SystemAccess` guards against two such calls racing on the handle
    // map or the pending-registration list, so both are locked
    // independently of the rest of `World`'s otherwise-exclusive `&mut
    // self` mutations.
    system_handles: Mutex<SlotMap<SystemHandle, ()>>,
    dep_trees: [Option<crate::dependency::DependencyTree>; 3],
    dirty: [bool; 3],
    pending_systems: Mutex<Vec<(SystemHandle, Phase, SystemOptions, Box<dyn System>)>>,

    observers: ObserverRegistry,
    deferred: DeferredQueue,

    cancellation: CancellationToken,
    tick_count: u64,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

fn phase_index(phase: Phase) -> usize {
    match phase {
        Phase::PreTick => 0,
        Phase::OnTick => 1,
        Phase::PostTick => 2,
    }
}

/// Borrows two distinct elements of a slice mutably at once. Panics if
/// `a == b`.
fn index_two_mut(slice: &mut [Archetype], a: usize, b: usize) -> (&mut Archetype, &mut Archetype) {
    assert_ne!(a, b);
    if a < b {
        let (left, right) = slice.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = slice.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

impl World {
    pub fn new() -> Self {
        let mut archetype_index = AHashMap::default();
        let empty = TypeSet::new();
        archetype_index.insert(empty.clone(), 0);
        Self {
            entities: EntityAllocator::new(),
            archetypes: vec![Archetype::new(empty)],
            archetype_index,
            type_registry: FxHashMap::default(),
            systems: [Vec::new(), Vec::new(), Vec::new()],
            system_handles: Mutex::new(SlotMap::with_key()),
            dep_trees: [None, None, None],
            dirty: [false, false, false],
            pending_systems: Mutex::new(Vec::new()),
            observers: ObserverRegistry::new(),
            deferred: DeferredQueue::new(),
            cancellation: CancellationToken::new(),
            tick_count: 0,
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub(crate) fn deferred(&self) -> &DeferredQueue {
        &self.deferred
    }

    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    // ---- entity lifecycle ---------------------------------------------

    /// Mints an id immediately; the entity is placed into the empty
    /// archetype (or wherever a same-tick component addition lands it)
    /// once the deferred queue drains.
    pub fn create_entity(&mut self) -> EntityId {
        let entity = self.entities.create();
        self.deferred.queue_create(entity);
        entity
    }

    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.entities.is_alive(entity)
    }

    pub fn despawn(&mut self, entity: EntityId) -> Result<()> {
        if !self.entities.is_alive(entity) {
            return Err(EcsError::StaleEntity);
        }
        self.deferred.queue_remove_entity(entity);
        Ok(())
    }

    // ---- structural component mutation (deferred) ----------------------

    fn register_type<T: Component>(&mut self) {
        self.type_registry
            .entry(TypeId::of::<T>())
            .or_insert_with(|| ComponentColumn::new::<T>);
    }

    pub fn add_component<T: Component>(&mut self, entity: EntityId, value: T) -> Result<()> {
        if !self.entities.is_alive(entity) {
            return Err(EcsError::StaleEntity);
        }
        self.register_type::<T>();
        self.deferred.queue_add_component(entity, value);
        Ok(())
    }

    pub fn add_tag<T: Component>(&mut self, entity: EntityId) -> Result<()> {
        validate_tag::<T>()?;
        if !self.entities.is_alive(entity) {
            return Err(EcsError::StaleEntity);
        }
        self.register_type::<T>();
        self.deferred.queue_add_tag::<T>(entity);
        Ok(())
    }

    pub fn remove_component<T: Component>(&mut self, entity: EntityId) -> Result<()> {
        if !self.entities.is_alive(entity) {
            return Err(EcsError::StaleEntity);
        }
        self.deferred.queue_remove_component::<T>(entity);
        Ok(())
    }

    // ---- direct component access (immediate) ----------------------------

    pub fn has_component<T: Component>(&self, entity: EntityId) -> bool {
        let Some(loc) = self.entities.location(entity) else {
            return false;
        };
        self.archetypes[loc.archetype_id].contains_type(TypeId::of::<T>())
    }

    pub fn has_tag<T: Component>(&self, entity: EntityId) -> bool {
        self.has_component::<T>(entity)
    }

    /// Reads a component through the entity's current archetype. `None`
    /// covers both a stale/unknown entity and a live one whose archetype
    /// lacks `T` — callers test presence rather than handle an error, per
    /// the read contract (writes still surface `MissingComponent`).
    pub fn get_component<T: Component>(&self, entity: EntityId) -> Option<&T> {
        let loc = self.entities.location(entity)?;
        self.archetypes[loc.archetype_id]
            .get_column(TypeId::of::<T>())
            .and_then(|c| c.get::<T>(loc.row))
    }

    pub fn get_component_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        let loc = self.entities.location(entity)?;
        self.archetypes[loc.archetype_id]
            .get_column_mut(TypeId::of::<T>())
            .and_then(|c| c.get_mut::<T>(loc.row))
    }

    /// Overwrites an existing component's value in place. Returns
    /// `MissingComponent` if the entity does not currently carry `T` —
    /// use `add_component` to introduce the type for the first time.
    pub fn set_component<T: Component>(&mut self, entity: EntityId, value: T) -> Result<()> {
        *self
            .get_component_mut::<T>(entity)
            .ok_or(EcsError::MissingComponent)? = value;
        Ok(())
    }

    // ---- systems ----------------------------------------------------------

    pub fn add_system<S: System + 'static>(&mut self, phase: Phase, system: S) -> SystemBuilder<'_> {
        self.add_system_with(phase, system, SystemOptions::default())
    }

    /// Registration is deferred like any other structural change: the
    /// system starts running from the next tick's phase it belongs to,
    /// never mid-tick. The returned builder's handle is valid immediately;
    /// chained calls (`priority`, `interval`, `dependency_read`, …) edit
    /// the pending registration in place before it is picked up by the
    /// next drain.
    pub fn add_system_with<S: System + 'static>(
        &mut self,
        phase: Phase,
        system: S,
        options: SystemOptions,
    ) -> SystemBuilder<'_> {
        let handle = self.system_handles.lock().insert(());
        let mut pending = self.pending_systems.lock();
        pending.push((handle, phase, options, Box::new(system)));
        let index = pending.len() - 1;
        drop(pending);
        SystemBuilder { world: self, index }
    }

    pub fn remove_system(&mut self, handle: SystemHandle) {
        self.deferred.queue_system_removal(handle);
    }

    pub fn add_observer(&mut self, observer: Box<dyn Observer>) {
        self.observers.register(observer);
    }

    // ---- tick ---------------------------------------------------------------

    pub fn tick(&mut self, dt: f32) -> Result<()> {
        if self.cancellation.is_cancelled() {
            return Err(EcsError::Cancelled);
        }

        #[cfg(feature = "profiling")]
        let span = info_span!("world.tick", tick = self.tick_count, archetype_count = self.archetypes.len());
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        self.drain_deferred_entities();
        self.drain_pending_systems();

        for &phase in &PHASES {
            self.run_phase(phase, dt)?;
        }

        self.process_system_removals();
        self.tick_count += 1;
        Ok(())
    }

    fn drain_deferred_entities(&mut self) {
        #[cfg(feature = "profiling")]
        let span = info_span!("world.drain_deferred_entities");
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        for (entity, item) in self.deferred.take_entity_actions() {
            match item {
                EntityDrainItem::Remove => self.apply_remove_entity(entity),
                EntityDrainItem::Modify(actions) => self.apply_entity_actions(entity, actions),
            }
        }
    }

    fn drain_pending_systems(&mut self) {
        let drained = std::mem::take(&mut *self.pending_systems.lock());
        for (handle, phase, options, system) in drained {
            let idx = phase_index(phase);
            let mut access = system.access();
            access.reads.extend(options.extra_reads.iter().copied());
            access.writes.extend(options.extra_writes.iter().copied());
            self.systems[idx].push(SystemEntry {
                handle,
                phase,
                priority: options.priority,
                interval: options.interval,
                one_shot: options.one_shot,
                accumulator: 0.0,
                access,
                system,
            });
            self.dirty[idx] = true;
        }
    }

    fn process_system_removals(&mut self) {
        let removals = self.deferred.take_system_removals();
        if removals.is_empty() {
            return;
        }
        for handle in removals {
            self.system_handles.lock().remove(handle);
            for phase_systems in &mut self.systems {
                if let Some(pos) = phase_systems.iter().position(|e| e.handle == handle) {
                    phase_systems.remove(pos);
                }
            }
        }
        self.dirty = [true, true, true];
    }

    fn run_phase(&mut self, phase: Phase, dt: f32) -> Result<()> {
        let idx = phase_index(phase);
        if self.dirty[idx] || self.dep_trees[idx].is_none() {
            self.rebuild_phase(idx)?;
        }

        #[cfg(feature = "profiling")]
        let span = info_span!("world.run_phase", phase = ?phase, systems = self.systems[idx].len());
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        // `execute` needs `&mut World` to run systems against, but the
        // roster and tree it also needs both live inside that same
        // `World` — take them out into owned locals first so the `&mut
        // self` passed as `world` below doesn't overlap any borrow of
        // `self.systems`/`self.dep_trees`, then put them back.
        let tree = self.dep_trees[idx].take().expect("rebuilt above");
        let mut entries = std::mem::take(&mut self.systems[idx]);
        let token = self.cancellation.clone();

        let result = executor::execute(&tree, &mut entries, self, dt, &token);

        self.systems[idx] = entries;
        self.dep_trees[idx] = Some(tree);
        result
    }

    fn rebuild_phase(&mut self, idx: usize) -> Result<()> {
        let priorities: Vec<i32> = self.systems[idx].iter().map(|e| e.priority).collect();
        let interests: Vec<usize> = self.systems[idx]
            .iter()
            .map(|e| e.interest_component_count())
            .collect();
        let order = crate::dependency::sort_order(&priorities, &interests);

        let drained: Vec<SystemEntry> = std::mem::take(&mut self.systems[idx]);
        let mut slots: Vec<Option<SystemEntry>> = drained.into_iter().map(Some).collect();
        self.systems[idx] = order.into_iter().map(|i| slots[i].take().unwrap()).collect();

        let accesses: Vec<_> = self.systems[idx].iter().map(|e| e.access.clone()).collect();
        self.dep_trees[idx] = Some(build_dependency_tree(&accesses)?);
        self.dirty[idx] = false;
        Ok(())
    }

    // ---- archetype migration --------------------------------------------------

    fn get_or_create_archetype(&mut self, types: TypeSet) -> usize {
        if let Some(&id) = self.archetype_index.get(&types) {
            return id;
        }
        let id = self.archetypes.len();
        let mut archetype = Archetype::new(types.clone());
        for &type_id in &types {
            if let Some(&factory) = self.type_registry.get(&type_id) {
                archetype.register_column_erased(type_id, factory());
            }
        }
        self.archetypes.push(archetype);
        self.archetype_index.insert(types, id);
        id
    }

    fn apply_remove_entity(&mut self, entity: EntityId) {
        let Some(loc) = self.entities.location(entity) else {
            self.entities.release(entity);
            return;
        };
        let old_types: Vec<TypeId> = self.archetypes[loc.archetype_id].types().to_vec();
        if let Some(swapped) = self.archetypes[loc.archetype_id].remove_row(loc.row) {
            self.entities.set_location(swapped, loc);
        }
        self.entities.release(entity);
        self.observers.notify(self, entity, &[], &old_types);
    }

    fn apply_entity_actions(&mut self, entity: EntityId, actions: Vec<Box<dyn crate::deferred::EntityAction>>) {
        let current_location = self.entities.location(entity);
        let old_types: TypeSet = match current_location {
            Some(loc) => self.archetypes[loc.archetype_id].types().clone(),
            None => TypeSet::new(),
        };

        let mut folded = old_types.clone();
        let mut added: Vec<TypeId> = Vec::new();
        let mut removed: Vec<TypeId> = Vec::new();
        for action in &actions {
            action.modify_types(&mut folded, &mut added, &mut removed);
        }
        let new_types = canonical_type_set(folded.into_vec());

        // Folding can land back on the entity's current archetype (e.g. a
        // same-tick remove-then-readd of the same type cancels out at the
        // type-set level). Writing in place then avoids reallocating a row
        // in the same archetype it already occupies.
        if let Some(loc) = current_location {
            if new_types == *self.archetypes[loc.archetype_id].types() {
                let archetype = &mut self.archetypes[loc.archetype_id];
                for action in actions {
                    action.apply(archetype, loc.row);
                }
                self.observers.notify(self, entity, &added, &removed);
                return;
            }
        }

        let new_archetype_id = self.get_or_create_archetype(new_types.clone());
        let new_row = self.archetypes[new_archetype_id].allocate_row(entity);

        if let Some(loc) = current_location {
            let shared: Vec<TypeId> = new_types
                .iter()
                .copied()
                .filter(|t| self.archetypes[loc.archetype_id].contains_type(*t))
                .collect();
            for type_id in shared {
                let (old_arch, new_arch) =
                    index_two_mut(&mut self.archetypes, loc.archetype_id, new_archetype_id);
                old_arch.copy_component_to(loc.row, type_id, new_arch, new_row);
            }
        }

        for action in actions {
            action.apply(&mut self.archetypes[new_archetype_id], new_row);
        }

        if let Some(loc) = current_location {
            if let Some(swapped) = self.archetypes[loc.archetype_id].remove_row(loc.row) {
                self.entities.set_location(swapped, loc);
            }
        }

        self.entities.set_location(
            entity,
            EntityLocation {
                archetype_id: new_archetype_id,
                row: new_row,
            },
        );
        self.observers.notify(self, entity, &added, &removed);
    }
}

/// Handle returned by `World::add_system`. Chained setters edit the
/// pending registration in place; nothing takes effect until the next
/// drain picks it up, matching every other structural mutation.
pub struct SystemBuilder<'w> {
    world: &'w mut World,
    index: usize,
}

impl<'w> SystemBuilder<'w> {
    fn with_options_mut(&mut self, f: impl FnOnce(&mut SystemOptions)) {
        f(&mut self.world.pending_systems.lock()[self.index].2);
    }

    pub fn handle(&self) -> SystemHandle {
        self.world.pending_systems.lock()[self.index].0
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.with_options_mut(|o| o.priority = priority);
        self
    }

    pub fn interval(mut self, seconds: f32) -> Self {
        self.with_options_mut(|o| o.interval = Some(seconds));
        self
    }

    pub fn one_shot(mut self) -> Self {
        self.with_options_mut(|o| o.one_shot = true);
        self
    }

    /// Declares a type this system reads through the world API (not a
    /// query) so the scheduler still serializes it against writers.
    pub fn dependency_read<T: Component>(mut self) -> Self {
        self.with_options_mut(|o| o.extra_reads.push(TypeId::of::<T>()));
        self
    }

    /// Declares a type this system writes through the world API.
    pub fn dependency_write<T: Component>(mut self) -> Self {
        self.with_options_mut(|o| o.extra_writes.push(TypeId::of::<T>()));
        self
    }
}
