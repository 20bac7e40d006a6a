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

//! Archetype ECS - an in-memory, data-oriented entity/component/system
//! runtime.
//!
//! Per-entity state lives in archetype-partitioned columnar tables
//! (`archetype`); structural changes go through a deferred queue
//! (`deferred`) so a running tick always sees a frozen world; systems
//! (`system`) declare their component access and are scheduled onto a
//! dependency DAG (`dependency`) that the parallel executor (`executor`)
//! walks with maximum safe concurrency.

pub mod archetype;
pub mod component;
pub mod deferred;
pub mod dependency;
pub mod entity;
pub mod error;
pub mod executor;
pub mod observer;
pub mod prelude;
pub mod query;
pub mod runtime;
pub mod system;
pub mod time;
pub mod world;

pub use archetype::Archetype;
pub use component::Component;
pub use entity::EntityId;
pub use error::{EcsError, Result};
pub use executor::CancellationToken;
pub use observer::{Observer, ObserverContext};
pub use query::{Fetch, Query, QueryDesc, QueryIter, QueryState};
pub use runtime::{run, RunOptions};
pub use system::{BoxedSystem, Phase, System, SystemAccess, SystemHandle, SystemOptions};
pub use world::{SystemBuilder, World};
