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

//! System trait, registration handles and access metadata.
//!
//! A system's `SystemAccess` is the sole input to the scheduler's
//! conflict analysis — there is no separate "depends on" declaration.
//! Two systems conflict exactly when one writes a component type the
//! other reads or writes.

use std::any::TypeId;

use slotmap::new_key_type;
use smallvec::SmallVec;

use crate::error::Result;
use crate::world::World;

new_key_type! {
    /// Handle returned by `World::add_system`, used to remove it later.
    pub struct SystemHandle;
}

/// The three user-visible points in a tick a system can run at. Draining
/// the deferred queue and processing one-shot removals happen outside
/// any of these, as fixed driver steps rather than registered systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    PreTick,
    OnTick,
    PostTick,
}

pub const PHASES: [Phase; 3] = [Phase::PreTick, Phase::OnTick, Phase::PostTick];

#[derive(Debug, Clone, Default)]
pub struct SystemAccess {
    pub reads: SmallVec<[TypeId; 8]>,
    pub writes: SmallVec<[TypeId; 8]>,
}

impl SystemAccess {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn interest_component_count(&self) -> usize {
        self.reads.len() + self.writes.len()
    }

    /// True when the two accesses touch a shared type and at least one
    /// side writes it. Read/read sharing never conflicts.
    pub fn conflicts_with(&self, other: &SystemAccess) -> bool {
        self.writes.iter().any(|w| other.writes.contains(w) || other.reads.contains(w))
            || self.reads.iter().any(|r| other.writes.contains(r))
    }
}

/// A unit of per-tick work. `run` receives an exclusive `World`
/// reference even though systems may execute concurrently: the executor
/// only ever runs two systems at once when their `SystemAccess`es do not
/// conflict, so the aliasing this implies is never actually observed.
pub trait System: Send + Sync {
    fn name(&self) -> &'static str;
    fn access(&self) -> SystemAccess;
    fn run(&mut self, world: &mut World) -> Result<()>;
}

pub type BoxedSystem = Box<dyn System>;

/// Scheduling knobs for a registered system, set at registration time.
#[derive(Debug, Clone, Default)]
pub struct SystemOptions {
    /// Sorts ascending; ties broken by descending interest component
    /// count, then registration order.
    pub priority: i32,
    /// When set, the system only runs once this many seconds have
    /// accumulated since its last run, and the accumulator resets.
    pub interval: Option<f32>,
    /// Queues the system's own removal immediately after it runs once.
    pub one_shot: bool,
    /// Types touched through the world API rather than through a query —
    /// spec's "dependency-only" types. Folded into the system's
    /// `SystemAccess` at drain time so they still participate in the
    /// scheduler's conflict detection.
    pub extra_reads: SmallVec<[TypeId; 4]>,
    pub extra_writes: SmallVec<[TypeId; 4]>,
}

pub(crate) struct SystemEntry {
    pub handle: SystemHandle,
    pub phase: Phase,
    pub priority: i32,
    pub interval: Option<f32>,
    pub one_shot: bool,
    pub accumulator: f32,
    pub access: SystemAccess,
    pub system: BoxedSystem,
}

impl SystemEntry {
    pub fn name(&self) -> &'static str {
        self.system.name()
    }

    pub fn interest_component_count(&self) -> usize {
        self.access.interest_component_count()
    }
}
