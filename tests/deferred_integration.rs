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

//! Integration tests for the deferred queue: structural changes queued
//! from inside a system only take effect at the next drain, and a
//! system that registers another system lets the new one run starting
//! the tick after.

use std::any::TypeId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use archetype_ecs::{EntityId, Phase, Query, Result, System, SystemAccess, World};

#[derive(Debug, Clone, Copy, PartialEq)]
struct A(i32);
#[derive(Debug, Clone, Copy, PartialEq)]
struct B(i32);

struct Spawner {
    spawned: Arc<std::sync::Mutex<Vec<EntityId>>>,
}

impl System for Spawner {
    fn name(&self) -> &'static str {
        "Spawner"
    }
    fn access(&self) -> SystemAccess {
        SystemAccess::empty()
    }
    fn run(&mut self, world: &mut World) -> Result<()> {
        let e = world.create_entity();
        world.add_component(e, A(1)).unwrap();
        world.add_component(e, B(2)).unwrap();
        self.spawned.lock().unwrap().push(e);
        Ok(())
    }
}

#[test]
fn entity_spawned_by_a_system_is_queryable_next_tick_not_the_same_one() {
    let mut world = World::new();
    let spawned = Arc::new(std::sync::Mutex::new(Vec::new()));
    world.add_system(
        Phase::PreTick,
        Spawner {
            spawned: spawned.clone(),
        },
    );

    world.tick(0.0).unwrap();
    assert_eq!(Query::<(&A, &B)>::new(&world).count(), 0);

    world.tick(0.0).unwrap();
    assert_eq!(Query::<(&A, &B)>::new(&world).count(), 1);

    let e = spawned.lock().unwrap()[0];
    assert!(world.is_alive(e));
    assert_eq!(*world.get_component::<A>(e).unwrap(), A(1));
    assert_eq!(*world.get_component::<B>(e).unwrap(), B(2));
}

struct Mutator;

impl System for Mutator {
    fn name(&self) -> &'static str {
        "Mutator"
    }
    fn access(&self) -> SystemAccess {
        let mut access = SystemAccess::empty();
        access.reads.push(TypeId::of::<A>());
        access
    }
    fn run(&mut self, world: &mut World) -> Result<()> {
        // Re-derive ids by walking archetypes directly since Query yields
        // component data, not entity identities.
        let mut to_touch = Vec::new();
        for archetype in world.archetypes() {
            if archetype.contains_type(TypeId::of::<A>()) && !archetype.contains_type(TypeId::of::<B>()) {
                to_touch.extend(archetype.entities().iter().copied());
            }
        }
        for e in to_touch {
            world.add_component(e, B(10)).unwrap();
        }
        Ok(())
    }
}

#[test]
fn component_added_through_the_world_api_mid_tick_migrates_on_the_next_drain() {
    let mut world = World::new();
    let e = world.create_entity();
    world.add_component(e, A(1)).unwrap();
    world.tick(0.0).unwrap();
    assert!(!world.has_component::<B>(e));

    world.add_system(Phase::OnTick, Mutator);
    world.tick(0.0).unwrap();
    assert!(!world.has_component::<B>(e), "migration is deferred to the next drain");

    world.tick(0.0).unwrap();
    assert!(world.has_component::<B>(e));
    assert_eq!(*world.get_component::<B>(e).unwrap(), B(10));
}

struct Despawner {
    target: EntityId,
}

impl System for Despawner {
    fn name(&self) -> &'static str {
        "Despawner"
    }
    fn access(&self) -> SystemAccess {
        SystemAccess::empty()
    }
    fn run(&mut self, world: &mut World) -> Result<()> {
        world.despawn(self.target).unwrap();
        Ok(())
    }
}

#[test]
fn despawn_requested_by_a_system_removes_the_entity_after_drain() {
    let mut world = World::new();
    let e = world.create_entity();
    world.add_component(e, A(7)).unwrap();
    world.tick(0.0).unwrap();
    assert_eq!(Query::<&A>::new(&world).count(), 1);

    world.add_system(Phase::OnTick, Despawner { target: e });
    world.tick(0.0).unwrap();

    assert!(!world.is_alive(e));
    assert_eq!(Query::<&A>::new(&world).count(), 0);
}

struct RegistersAnotherSystem {
    registered: Arc<std::sync::atomic::AtomicBool>,
    spawned_runs: Arc<AtomicUsize>,
}

struct CountRuns {
    runs: Arc<AtomicUsize>,
}

impl System for CountRuns {
    fn name(&self) -> &'static str {
        "CountRuns"
    }
    fn access(&self) -> SystemAccess {
        SystemAccess::empty()
    }
    fn run(&mut self, _world: &mut World) -> Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl System for RegistersAnotherSystem {
    fn name(&self) -> &'static str {
        "RegistersAnotherSystem"
    }
    fn access(&self) -> SystemAccess {
        SystemAccess::empty()
    }
    fn run(&mut self, world: &mut World) -> Result<()> {
        if !self.registered.swap(true, Ordering::SeqCst) {
            world.add_system(
                Phase::OnTick,
                CountRuns {
                    runs: self.spawned_runs.clone(),
                },
            );
        }
        Ok(())
    }
}

/// Registering a system from inside a running system is itself a
/// structural change: the new system's first run happens no earlier
/// than the tick after it was registered, same as any other deferred
/// action, and the scheduler's dependency tree is rebuilt to include it.
#[test]
fn system_registered_from_within_a_system_runs_starting_the_next_tick() {
    let mut world = World::new();
    let spawned_runs = Arc::new(AtomicUsize::new(0));
    world.add_system(
        Phase::PreTick,
        RegistersAnotherSystem {
            registered: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            spawned_runs: spawned_runs.clone(),
        },
    );

    // Tick 1: RegistersAnotherSystem runs in PreTick and queues CountRuns's
    // registration; that registration is only picked up by the next
    // tick's `drain_pending_systems`, so CountRuns does not run this tick.
    world.tick(0.0).unwrap();
    assert_eq!(spawned_runs.load(Ordering::SeqCst), 0);

    // Tick 2: CountRuns is now in the OnTick roster and runs once.
    world.tick(0.0).unwrap();
    assert_eq!(spawned_runs.load(Ordering::SeqCst), 1);

    // Tick 3: RegistersAnotherSystem no longer re-registers (its guard
    // flag is set), CountRuns keeps running every tick thereafter.
    world.tick(0.0).unwrap();
    assert_eq!(spawned_runs.load(Ordering::SeqCst), 2);
}

struct ConcurrentRegistrar {
    spawned_runs: Arc<AtomicUsize>,
}

impl System for ConcurrentRegistrar {
    fn name(&self) -> &'static str {
        "ConcurrentRegistrar"
    }
    fn access(&self) -> SystemAccess {
        // Empty access on every instance: none of these systems conflict
        // with any other, so the scheduler is free to place all of them
        // under the synthetic root and the executor may run them
        // concurrently on rayon's pool.
        SystemAccess::empty()
    }
    fn run(&mut self, world: &mut World) -> Result<()> {
        world.add_system(
            Phase::OnTick,
            CountRuns {
                runs: self.spawned_runs.clone(),
            },
        );
        Ok(())
    }
}

/// Many non-conflicting systems all call `add_system` from inside their
/// own `run`, in the same tick, with the executor free to run them
/// concurrently. `add_system` is not covered by any system's declared
/// `SystemAccess`, so this only stays race-free because `World` guards
/// `system_handles` and `pending_systems` with their own locks rather
/// than mutating them as bare fields. A lost or corrupted registration
/// would show up as `spawned_runs` incrementing by fewer than
/// `REGISTRARS` on the first tick after the drain.
#[test]
fn concurrent_non_conflicting_systems_can_register_systems_in_the_same_tick() {
    let mut world = World::new();

    const REGISTRARS: usize = 64;
    let spawned_runs = Arc::new(AtomicUsize::new(0));
    for _ in 0..REGISTRARS {
        world.add_system(
            Phase::OnTick,
            ConcurrentRegistrar {
                spawned_runs: spawned_runs.clone(),
            },
        );
    }

    // Tick 1: all REGISTRARS instances run concurrently and each queues
    // its own CountRuns; none have run yet.
    world.tick(0.0).unwrap();
    assert_eq!(spawned_runs.load(Ordering::SeqCst), 0);

    // Tick 2: every queued CountRuns starts running, one increment each.
    world.tick(0.0).unwrap();
    assert_eq!(spawned_runs.load(Ordering::SeqCst), REGISTRARS);
}
