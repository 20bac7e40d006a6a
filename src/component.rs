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

//! Component marker trait and the type-rule checks enforced the moment a
//! type is first registered into an archetype column.

use std::any::type_name;

use crate::error::{EcsError, Result};

/// Marker trait for component payloads. `'static + Send + Sync` rules out
/// borrowed data and non-thread-safe interior state, which is as close as
/// Rust gets to "no reference-like fields" at the type level.
pub trait Component: 'static + Send + Sync {}

impl<T: 'static + Send + Sync> Component for T {}

/// Tags are components with no payload. `add_tag::<T>()` only accepts
/// zero-sized `T`; anything else is a caller bug, reported at the first
/// attempt to register it rather than silently storing a byte column.
pub fn validate_tag<T: Component>() -> Result<()> {
    if std::mem::size_of::<T>() == 0 {
        Ok(())
    } else {
        Err(EcsError::InvalidComponentType(type_name::<T>()))
    }
}

pub fn is_zero_sized<T: Component>() -> bool {
    std::mem::size_of::<T>() == 0
}
