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

//! Runtime query predicates and their incrementally-maintained archetype
//! matches.
//!
//! A query is built up from include/exclude/optional/at-least-one
//! clauses and evaluated against an archetype's `TypeSet`. Matching is
//! cached per query: `QueryState::refresh` only re-tests archetypes
//! created since the query was last evaluated, since a `TypeSet` is
//! immutable for the lifetime of its archetype.

use std::any::TypeId;
use std::marker::PhantomData;

use smallvec::SmallVec;

use crate::archetype::{Archetype, ComponentColumn};
use crate::component::Component;
use crate::system::SystemAccess;
use crate::world::World;

/// A group of types for an at-least-one clause: the archetype must carry
/// at least one member of the group.
pub type TypeGroup = SmallVec<[TypeId; 4]>;

/// A runtime, data-driven query predicate.
#[derive(Debug, Clone, Default)]
pub struct QueryDesc {
    pub include: SmallVec<[TypeId; 8]>,
    pub exclude: SmallVec<[TypeId; 8]>,
    pub optional: SmallVec<[TypeId; 8]>,
    pub at_least_one: Vec<TypeGroup>,
    /// Subset of `include`/`optional` this query only reads. Used by the
    /// scheduler's conflict analysis, not by matching itself.
    pub readonly: SmallVec<[TypeId; 8]>,
}

impl QueryDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(mut self, type_id: TypeId) -> Self {
        self.include.push(type_id);
        self
    }

    pub fn exclude(mut self, type_id: TypeId) -> Self {
        self.exclude.push(type_id);
        self
    }

    pub fn optional(mut self, type_id: TypeId) -> Self {
        self.optional.push(type_id);
        self
    }

    pub fn at_least_one(mut self, group: TypeGroup) -> Self {
        self.at_least_one.push(group);
        self
    }

    pub fn readonly(mut self, type_id: TypeId) -> Self {
        self.readonly.push(type_id);
        self
    }

    /// All component types this query ever touches (include + optional),
    /// used to build a system's read/write access set.
    pub fn touched_types(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.include.iter().chain(self.optional.iter()).copied()
    }

    /// Derives a `SystemAccess` from this predicate's touched types: a
    /// touched type not marked `readonly` is treated as a write. Systems
    /// that build their queries data-driven can hand this straight back
    /// as their declared `access()`, so `exclude`/`readonly` feed the
    /// scheduler's conflict analysis instead of only filtering matches.
    pub fn to_access(&self) -> SystemAccess {
        let mut access = SystemAccess::empty();
        for t in self.touched_types() {
            if self.readonly.contains(&t) {
                access.reads.push(t);
            } else {
                access.writes.push(t);
            }
        }
        access
    }

    pub fn matches(&self, archetype: &Archetype) -> bool {
        for &t in &self.include {
            if !archetype.contains_type(t) {
                return false;
            }
        }
        for &t in &self.exclude {
            if archetype.contains_type(t) {
                return false;
            }
        }
        for group in &self.at_least_one {
            if !group.iter().any(|&t| archetype.contains_type(t)) {
                return false;
            }
        }
        true
    }
}

/// Incrementally-maintained set of archetype indices matching a query.
pub struct QueryState {
    desc: QueryDesc,
    matches: Vec<usize>,
    seen_archetypes: usize,
}

impl QueryState {
    pub fn new(desc: QueryDesc, archetypes: &[Archetype]) -> Self {
        let matches = archetypes
            .iter()
            .enumerate()
            .filter_map(|(id, arch)| desc.matches(arch).then_some(id))
            .collect();
        Self {
            desc,
            matches,
            seen_archetypes: archetypes.len(),
        }
    }

    pub fn desc(&self) -> &QueryDesc {
        &self.desc
    }

    pub fn matches(&self) -> &[usize] {
        &self.matches
    }

    /// Re-tests only archetypes created since the last refresh. New
    /// archetypes are always appended, never inserted, so a watermark is
    /// sufficient to avoid re-scanning the whole archetype list.
    pub fn refresh(&mut self, archetypes: &[Archetype]) {
        if archetypes.len() <= self.seen_archetypes {
            return;
        }
        for (id, arch) in archetypes.iter().enumerate().skip(self.seen_archetypes) {
            if self.desc.matches(arch) {
                self.matches.push(id);
            }
        }
        self.seen_archetypes = archetypes.len();
    }
}

/// Borrows typed component data out of a matched archetype row.
/// Implemented for `&T`, `&mut T`, and tuples of up to four such borrows,
/// so a system can write `Query::<(&Position, &mut Velocity)>::new(world)`
/// instead of hand-rolling a `QueryDesc` and walking columns itself.
///
/// # Safety
/// `fetch` may only be called with a `row` the `State` was `prepare`d
/// against, and a caller must not hold two live mutable fetches into the
/// same column — the scheduler's conflict analysis is what actually
/// guarantees that, the same way `executor.rs` hands out raw `World`
/// pointers across threads it has already proven won't collide.
pub unsafe trait Fetch<'w> {
    type Item;
    type State;

    /// Appends every type this fetch touches, so `Query::new` can build
    /// the `include` clause without the caller repeating it.
    fn type_ids(ids: &mut SmallVec<[TypeId; 8]>);

    fn prepare(archetype: &'w Archetype) -> Option<Self::State>;

    unsafe fn fetch(state: &mut Self::State, row: usize) -> Self::Item;
}

unsafe impl<'w, T: Component> Fetch<'w> for &'w T {
    type Item = &'w T;
    type State = &'w ComponentColumn;

    fn type_ids(ids: &mut SmallVec<[TypeId; 8]>) {
        ids.push(TypeId::of::<T>());
    }

    fn prepare(archetype: &'w Archetype) -> Option<Self::State> {
        archetype.get_column(TypeId::of::<T>())
    }

    unsafe fn fetch(state: &mut Self::State, row: usize) -> Self::Item {
        state.get::<T>(row).expect("row within archetype bounds")
    }
}

unsafe impl<'w, T: Component> Fetch<'w> for &'w mut T {
    type Item = &'w mut T;
    type State = *mut ComponentColumn;

    fn type_ids(ids: &mut SmallVec<[TypeId; 8]>) {
        ids.push(TypeId::of::<T>());
    }

    fn prepare(archetype: &'w Archetype) -> Option<Self::State> {
        let column = archetype.get_column(TypeId::of::<T>())?;
        // SAFETY: see the trait's safety note — exclusivity is the
        // scheduler's job, not the borrow checker's, for the same reason
        // `Archetype::row_ptr_mut` casts away `&self`.
        Some(column as *const ComponentColumn as *mut ComponentColumn)
    }

    unsafe fn fetch(state: &mut Self::State, row: usize) -> Self::Item {
        let column: &mut ComponentColumn = unsafe { &mut **state };
        column.get_mut::<T>(row).expect("row within archetype bounds")
    }
}

macro_rules! impl_fetch_tuple {
    ($($name:ident),+) => {
        unsafe impl<'w, $($name: Fetch<'w>),+> Fetch<'w> for ($($name,)+) {
            type Item = ($($name::Item,)+);
            type State = ($($name::State,)+);

            fn type_ids(ids: &mut SmallVec<[TypeId; 8]>) {
                $($name::type_ids(ids);)+
            }

            fn prepare(archetype: &'w Archetype) -> Option<Self::State> {
                Some(($($name::prepare(archetype)?,)+))
            }

            #[allow(non_snake_case)]
            unsafe fn fetch(state: &mut Self::State, row: usize) -> Self::Item {
                let ($($name,)+) = state;
                ($(unsafe { $name::fetch($name, row) },)+)
            }
        }
    };
}

impl_fetch_tuple!(A);
impl_fetch_tuple!(A, B);
impl_fetch_tuple!(A, B, C);
impl_fetch_tuple!(A, B, C, D);

/// A ready-to-iterate query over one world's archetypes. Built fresh from
/// `world.archetypes()` each time — with archetype counts typical of a
/// real game (tens, not thousands), re-scanning is cheaper than the
/// bookkeeping a persistent cache would need here; `QueryState` above is
/// the persistent-cache building block for callers (the scheduler, a
/// future change-tracked query) that do need one.
pub struct Query<'w, Q: Fetch<'w>> {
    archetypes: &'w [Archetype],
    matches: Vec<usize>,
    _marker: PhantomData<Q>,
}

impl<'w, Q: Fetch<'w>> Query<'w, Q> {
    pub fn new(world: &'w World) -> Self {
        Self::with_exclude(world, &[])
    }

    /// Like `new`, but archetypes carrying any of `exclude` never match —
    /// the data-driven counterpart of `QueryDesc::exclude`.
    pub fn with_exclude(world: &'w World, exclude: &[TypeId]) -> Self {
        let mut include = SmallVec::new();
        Q::type_ids(&mut include);
        let desc = QueryDesc {
            include,
            exclude: exclude.iter().copied().collect(),
            ..QueryDesc::new()
        };
        let archetypes = world.archetypes();
        let state = QueryState::new(desc, archetypes);
        Self {
            archetypes,
            matches: state.matches().to_vec(),
            _marker: PhantomData,
        }
    }

    pub fn count(&self) -> usize {
        self.matches.iter().map(|&id| self.archetypes[id].len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn iter(self) -> QueryIter<'w, Q> {
        QueryIter {
            archetypes: self.archetypes,
            matches: self.matches,
            pos: 0,
            row: 0,
            state: None,
        }
    }
}

pub struct QueryIter<'w, Q: Fetch<'w>> {
    archetypes: &'w [Archetype],
    matches: Vec<usize>,
    pos: usize,
    row: usize,
    state: Option<Q::State>,
}

impl<'w, Q: Fetch<'w>> Iterator for QueryIter<'w, Q> {
    type Item = Q::Item;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.state.is_none() {
                let &arch_id = self.matches.get(self.pos)?;
                let archetype = &self.archetypes[arch_id];
                self.row = 0;
                self.state = Q::prepare(archetype);
                if self.state.is_none() {
                    self.pos += 1;
                    continue;
                }
            }

            let arch_id = self.matches[self.pos];
            let archetype = &self.archetypes[arch_id];
            if self.row >= archetype.len() {
                self.state = None;
                self.pos += 1;
                continue;
            }

            let row = self.row;
            self.row += 1;
            // SAFETY: `row < archetype.len()` just above, and `state` was
            // prepared from this exact archetype.
            return Some(unsafe { Q::fetch(self.state.as_mut().unwrap(), row) });
        }
    }
}
