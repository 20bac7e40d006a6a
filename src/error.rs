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

//! Error types

use std::fmt;

/// ECS error type
#[derive(Debug, Clone)]
pub enum EcsError {
    /// A component or tag type broke the size rule at its first use
    /// (a tag must be zero-sized, a component must not be).
    InvalidComponentType(&'static str),

    /// Operation referenced a released or never-issued `EntityId`.
    StaleEntity,

    /// Read or write of a component the entity's current archetype lacks.
    MissingComponent,

    /// The scheduler's conflict graph could not be reduced to a tree.
    CircularDependency,

    /// A system callback returned an error; the triggering system's
    /// siblings still finish their current node before the tick aborts.
    SystemFailure(String),

    /// The tick was cancelled before all phases completed.
    Cancelled,
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::InvalidComponentType(name) => {
                write!(f, "invalid component type: {name}")
            }
            EcsError::StaleEntity => write!(f, "stale or unknown entity"),
            EcsError::MissingComponent => write!(f, "entity does not have that component"),
            EcsError::CircularDependency => write!(f, "system dependency cycle detected"),
            EcsError::SystemFailure(cause) => write!(f, "system failure: {cause}"),
            EcsError::Cancelled => write!(f, "tick cancelled"),
        }
    }
}

impl std::error::Error for EcsError {}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;
