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

use archetype_ecs::Query;
use criterion::{criterion_group, criterion_main, Criterion};

struct Position {
    x: f32,
    y: f32,
}

struct Velocity {
    dx: f32,
    dy: f32,
}

struct Tag;

fn build_world(count: usize) -> archetype_ecs::World {
    let mut world = archetype_ecs::World::new();
    for i in 0..count {
        let e = world.create_entity();
        world.add_component(e, Position { x: 0.0, y: 0.0 }).unwrap();
        world.add_component(e, Velocity { dx: 1.0, dy: 1.0 }).unwrap();
        if i % 10 == 0 {
            world.add_tag::<Tag>(e).unwrap();
        }
    }
    world.tick(0.0).unwrap();
    world
}

fn query_readonly(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_readonly");
    for count in [1_000usize, 10_000, 100_000] {
        let world = build_world(count);
        group.bench_function(format!("{count}_entities"), |b| {
            b.iter(|| {
                let query = Query::<(&Position, &Velocity)>::new(&world);
                let mut sum = 0.0f32;
                for (pos, vel) in query.iter() {
                    sum += pos.x + vel.dx;
                }
                std::hint::black_box(sum)
            })
        });
    }
    group.finish();
}

fn query_mutable(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_mutable");
    for count in [1_000usize, 10_000, 100_000] {
        group.bench_function(format!("{count}_entities"), |b| {
            b.iter_batched(
                || build_world(count),
                |world| {
                    let query = Query::<&mut Position>::new(&world);
                    for pos in query.iter() {
                        pos.x += 1.0;
                    }
                },
                criterion::BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

fn query_over_fragmented_archetypes(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_fragmented");
    let world = build_world(10_000);
    group.bench_function("position_only_across_tagged_and_untagged", |b| {
        b.iter(|| {
            let query = Query::<&Position>::new(&world);
            std::hint::black_box(query.count())
        })
    });
    group.finish();
}

criterion_group!(benches, query_readonly, query_mutable, query_over_fragmented_archetypes);
criterion_main!(benches);
