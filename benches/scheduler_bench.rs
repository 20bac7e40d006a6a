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

use std::any::TypeId;

use archetype_ecs::{Phase, Result, System, SystemAccess, World};
use criterion::{criterion_group, criterion_main, Criterion};

struct BusyWork {
    reads: Vec<TypeId>,
    writes: Vec<TypeId>,
}

impl System for BusyWork {
    fn name(&self) -> &'static str {
        "BusyWork"
    }

    fn access(&self) -> SystemAccess {
        SystemAccess {
            reads: self.reads.iter().copied().collect(),
            writes: self.writes.iter().copied().collect(),
        }
    }

    fn run(&mut self, _world: &mut World) -> Result<()> {
        let mut x: u64 = 0;
        for i in 0..10_000u64 {
            x = x.wrapping_add(i);
        }
        std::hint::black_box(x);
        Ok(())
    }
}

struct MarkerA;
struct MarkerB;

fn independent_systems(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler_independent_systems");
    for count in [10usize, 50, 100] {
        group.bench_function(format!("{count}_systems"), |b| {
            b.iter(|| {
                let mut world = World::new();
                for _ in 0..count {
                    world.add_system(
                        Phase::OnTick,
                        BusyWork {
                            reads: vec![],
                            writes: vec![],
                        },
                    );
                }
                world.tick(0.016).unwrap();
            })
        });
    }
    group.finish();
}

fn contended_systems(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler_contended_systems");
    for count in [10usize, 50, 100] {
        group.bench_function(format!("{count}_systems_share_one_write"), |b| {
            b.iter(|| {
                let mut world = World::new();
                for _ in 0..count {
                    world.add_system(
                        Phase::OnTick,
                        BusyWork {
                            reads: vec![],
                            writes: vec![TypeId::of::<MarkerA>()],
                        },
                    );
                }
                world.tick(0.016).unwrap();
            })
        });
    }
    group.finish();
}

fn two_group_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler_two_independent_groups");
    group.bench_function("50_plus_50", |b| {
        b.iter(|| {
            let mut world = World::new();
            for _ in 0..50 {
                world.add_system(
                    Phase::OnTick,
                    BusyWork {
                        reads: vec![],
                        writes: vec![TypeId::of::<MarkerA>()],
                    },
                );
            }
            for _ in 0..50 {
                world.add_system(
                    Phase::OnTick,
                    BusyWork {
                        reads: vec![],
                        writes: vec![TypeId::of::<MarkerB>()],
                    },
                );
            }
            world.tick(0.016).unwrap();
        })
    });
    group.finish();
}

criterion_group!(benches, independent_systems, contended_systems, two_group_pipeline);
criterion_main!(benches);
