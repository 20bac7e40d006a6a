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

//! Integration tests driving the scheduler and query machinery at a
//! scale large enough to exercise more than one archetype and more than
//! one rayon stage per tick.

use std::any::TypeId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use archetype_ecs::{Phase, Query, Result, System, SystemAccess, World};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Velocity {
    x: f32,
    y: f32,
}

struct Health(i32);

struct IntegrateVelocity;

impl System for IntegrateVelocity {
    fn name(&self) -> &'static str {
        "IntegrateVelocity"
    }
    fn access(&self) -> SystemAccess {
        let mut access = SystemAccess::empty();
        access.writes.push(TypeId::of::<Position>());
        access.reads.push(TypeId::of::<Velocity>());
        access
    }
    fn run(&mut self, world: &mut World) -> Result<()> {
        for (pos, vel) in Query::<(&mut Position, &Velocity)>::new(world).iter() {
            pos.x += vel.x;
            pos.y += vel.y;
        }
        Ok(())
    }
}

struct CountHealthy {
    count: Arc<AtomicUsize>,
}

impl System for CountHealthy {
    fn name(&self) -> &'static str {
        "CountHealthy"
    }
    fn access(&self) -> SystemAccess {
        let mut access = SystemAccess::empty();
        access.reads.push(TypeId::of::<Health>());
        access
    }
    fn run(&mut self, world: &mut World) -> Result<()> {
        let n = Query::<&Health>::new(world).count();
        self.count.store(n, Ordering::SeqCst);
        Ok(())
    }
}

/// Spawns entities across two disjoint archetypes (moving entities with
/// `Position`+`Velocity`, stationary entities with only `Health`) and
/// runs both a mover and a reader system in the same phase. Since
/// neither system's access set conflicts, the scheduler places both
/// under the synthetic root and the executor may run them concurrently;
/// the test only asserts the end state, which is independent of which
/// thread got there first.
#[test]
fn independent_systems_cover_all_matching_archetypes_over_many_ticks() {
    let mut world = World::new();

    let mut movers = Vec::new();
    for i in 0..5_000 {
        let e = world.create_entity();
        world
            .add_component(
                e,
                Position {
                    x: i as f32,
                    y: 0.0,
                },
            )
            .unwrap();
        world.add_component(e, Velocity { x: 1.0, y: 2.0 }).unwrap();
        movers.push(e);
    }

    let mut stationary = Vec::new();
    for _ in 0..2_000 {
        let e = world.create_entity();
        world.add_component(e, Health(100)).unwrap();
        stationary.push(e);
    }

    let healthy_count = Arc::new(AtomicUsize::new(0));
    world.add_system(Phase::OnTick, IntegrateVelocity);
    world.add_system(
        Phase::OnTick,
        CountHealthy {
            count: healthy_count.clone(),
        },
    );

    const TICKS: usize = 10;
    for _ in 0..TICKS {
        world.tick(1.0).unwrap();
    }

    assert_eq!(healthy_count.load(Ordering::SeqCst), 2_000);
    for (i, &e) in movers.iter().enumerate() {
        let pos = world.get_component::<Position>(e).unwrap();
        assert_eq!(pos.x, i as f32 + TICKS as f32);
        assert_eq!(pos.y, 2.0 * TICKS as f32);
    }
}

struct WriteAll {
    amount: f32,
}

impl System for WriteAll {
    fn name(&self) -> &'static str {
        "WriteAll"
    }
    fn access(&self) -> SystemAccess {
        let mut access = SystemAccess::empty();
        access.writes.push(TypeId::of::<Position>());
        access
    }
    fn run(&mut self, world: &mut World) -> Result<()> {
        for pos in Query::<&mut Position>::new(world).iter() {
            pos.x += self.amount;
        }
        Ok(())
    }
}

/// Three systems all write `Position`: the dependency graph must
/// serialize all three rather than letting any pair run concurrently,
/// so the final value is the deterministic sum of all three additions
/// applied in priority order regardless of how many worker threads the
/// executor has available.
#[test]
fn three_way_write_conflict_still_serializes_under_load() {
    let mut world = World::new();
    let mut entities = Vec::new();
    for i in 0..1_000 {
        let e = world.create_entity();
        world
            .add_component(
                e,
                Position {
                    x: i as f32,
                    y: 0.0,
                },
            )
            .unwrap();
        entities.push(e);
    }
    world.tick(0.0).unwrap();

    world.add_system(Phase::OnTick, WriteAll { amount: 1.0 }).priority(3);
    world.add_system(Phase::OnTick, WriteAll { amount: 10.0 }).priority(2);
    world.add_system(Phase::OnTick, WriteAll { amount: 100.0 }).priority(1);

    world.tick(0.0).unwrap();

    for (i, &e) in entities.iter().enumerate() {
        let pos = world.get_component::<Position>(e).unwrap();
        assert_eq!(pos.x, i as f32 + 111.0);
    }
}
