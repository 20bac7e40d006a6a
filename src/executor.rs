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

//! Walks a phase's dependency tree, running ready nodes concurrently on
//! rayon's global pool.
//!
//! A node becomes ready the instant its last remaining parent finishes,
//! regardless of whether that parent ran its system or skipped it on an
//! interval gate. A system error poisons the run's cancellation token
//! and is recorded, but siblings already in flight are still allowed to
//! finish their own node before the tick unwinds — mirroring the
//! upstream worker-pool behavior this executor is modeled on, where a
//! node always releases its children before propagating its error.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::dependency::{DependencyTree, ROOT};
use crate::error::{EcsError, Result};
use crate::system::SystemEntry;
use crate::world::World;

/// Shared, one-way cancellation flag. Once poisoned it stays poisoned —
/// there is no per-tick reset, so cancelling a world's executor stops
/// every future tick's execution as well.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

struct EntriesPtr(*mut SystemEntry);
unsafe impl Send for EntriesPtr {}
unsafe impl Sync for EntriesPtr {}

struct WorldPtr(*mut World);
unsafe impl Send for WorldPtr {}
unsafe impl Sync for WorldPtr {}

/// Runs every system in `entries` according to `tree`, in the order
/// established by the tree's conflict resolution, skipping any whose
/// interval gate has not elapsed. `entries` must be in the same order
/// the tree was built from.
///
/// # Safety-relevant invariant
/// Two nodes run concurrently only when `tree` has no path between
/// them, which `dependency::build_dependency_tree` only allows for
/// systems whose `SystemAccess` does not conflict. The raw pointers
/// below therefore never alias a live `&mut` with another live
/// reference to the same component column.
pub fn execute(
    tree: &DependencyTree,
    entries: &mut [SystemEntry],
    world: &mut World,
    dt: f32,
    token: &CancellationToken,
) -> Result<()> {
    if token.is_cancelled() {
        return Err(EcsError::Cancelled);
    }

    let wait_counts: Vec<AtomicUsize> = tree
        .nodes
        .iter()
        .map(|n| AtomicUsize::new(n.wait_count))
        .collect();
    let visited: Vec<AtomicBool> = (0..tree.nodes.len()).map(|_| AtomicBool::new(false)).collect();
    let error_slot: Mutex<Option<String>> = Mutex::new(None);

    let entries_ptr = EntriesPtr(entries.as_mut_ptr());
    let world_ptr = WorldPtr(world as *mut World);

    rayon::scope(|scope| {
        run_node(
            scope,
            tree,
            ROOT,
            &wait_counts,
            &visited,
            token,
            &error_slot,
            &entries_ptr,
            &world_ptr,
            dt,
        );
    });

    if let Some(cause) = error_slot.into_inner() {
        return Err(EcsError::SystemFailure(cause));
    }
    if token.is_cancelled() {
        return Err(EcsError::Cancelled);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_node<'a>(
    scope: &rayon::Scope<'a>,
    tree: &'a DependencyTree,
    idx: usize,
    wait_counts: &'a [AtomicUsize],
    visited: &'a [AtomicBool],
    token: &'a CancellationToken,
    error_slot: &'a Mutex<Option<String>>,
    entries_ptr: &'a EntriesPtr,
    world_ptr: &'a WorldPtr,
    dt: f32,
) {
    if token.is_cancelled() {
        return;
    }

    let node = &tree.nodes[idx];
    if let Some(entry_idx) = node.entry_index {
        // SAFETY: see the invariant documented on `execute`.
        let entry: &mut SystemEntry = unsafe { &mut *entries_ptr.0.add(entry_idx) };

        let should_run = match entry.interval {
            None => true,
            Some(interval) => {
                entry.accumulator += dt;
                if entry.accumulator >= interval {
                    entry.accumulator -= interval;
                    true
                } else {
                    false
                }
            }
        };

        if should_run {
            #[cfg(feature = "profiling")]
            let span = tracing::info_span!("system.run", name = entry.name());
            #[cfg(feature = "profiling")]
            let _span_guard = span.enter();

            let world: &mut World = unsafe { &mut *world_ptr.0 };
            match entry.system.run(world) {
                Ok(()) => {
                    if entry.one_shot {
                        world.deferred().queue_system_removal(entry.handle);
                    }
                }
                Err(e) => {
                    *error_slot.lock() = Some(e.to_string());
                    token.cancel();
                }
            }
        }
    }

    // Children are released whether or not this node errored, so a
    // sibling subtree already running is never starved mid-flight.
    for &child in &node.children {
        let prev = wait_counts[child].fetch_sub(1, Ordering::AcqRel);
        if prev == 1 && !visited[child].swap(true, Ordering::AcqRel) {
            scope.spawn(move |scope| {
                run_node(
                    scope,
                    tree,
                    child,
                    wait_counts,
                    visited,
                    token,
                    error_slot,
                    entries_ptr,
                    world_ptr,
                    dt,
                );
            });
        }
    }
}
