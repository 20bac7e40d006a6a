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

//! Columnar, archetype-partitioned component storage.
//!
//! Every live entity belongs to exactly one archetype: the one whose
//! `TypeSet` equals the entity's current set of component types. Rows
//! within an archetype are kept dense — `remove_row` always swaps the
//! last row into the hole it leaves, across the entity list and every
//! column in lockstep, so every column's length equals the entity
//! count at all times.

use std::any::TypeId;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::component::Component;
use crate::entity::EntityId;

/// Canonical, sorted, deduplicated set of component type ids. Two
/// archetypes with equal `TypeSet`s are the same archetype.
pub type TypeSet = SmallVec<[TypeId; 8]>;

pub fn canonical_type_set(mut types: Vec<TypeId>) -> TypeSet {
    types.sort_unstable();
    types.dedup();
    TypeSet::from_vec(types)
}

pub struct Archetype {
    types: TypeSet,
    entities: Vec<EntityId>,
    components: Vec<ComponentColumn>,
    column_index: FxHashMap<TypeId, usize>,
}

impl Archetype {
    pub fn new(types: TypeSet) -> Self {
        Self {
            types,
            entities: Vec::new(),
            components: Vec::new(),
            column_index: FxHashMap::default(),
        }
    }

    pub fn types(&self) -> &TypeSet {
        &self.types
    }

    pub fn contains_type(&self, type_id: TypeId) -> bool {
        self.column_index.contains_key(&type_id)
    }

    /// Creates a column for `T` if this archetype's type set includes it
    /// and the column does not already exist. Idempotent.
    pub fn register_component<T: Component>(&mut self) {
        let type_id = TypeId::of::<T>();
        if self.column_index.contains_key(&type_id) {
            return;
        }
        let idx = self.components.len();
        self.components.push(ComponentColumn::new::<T>());
        self.column_index.insert(type_id, idx);
        // Back-fill zeroed rows so every column's length matches the
        // entity count right away, even for columns registered late.
        self.components[idx].grow_to(self.entities.len());
    }

    /// Inserts an already-constructed column for `type_id`, used when
    /// assembling a brand-new archetype from a type registry that knows
    /// how to build every column but not the concrete `T` behind it.
    /// No-op if the column already exists.
    pub fn register_column_erased(&mut self, type_id: TypeId, column: ComponentColumn) {
        if self.column_index.contains_key(&type_id) {
            return;
        }
        let idx = self.components.len();
        self.components.push(column);
        self.column_index.insert(type_id, idx);
    }

    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get_column(&self, type_id: TypeId) -> Option<&ComponentColumn> {
        let idx = *self.column_index.get(&type_id)?;
        self.components.get(idx)
    }

    pub fn get_column_mut(&mut self, type_id: TypeId) -> Option<&mut ComponentColumn> {
        let idx = *self.column_index.get(&type_id)?;
        self.components.get_mut(idx)
    }

    /// Appends a new, zero-filled row for `entity` to every column and
    /// the entity list. Returns the new row index. Callers overwrite the
    /// zeroed bytes of any column that should hold a real value.
    pub fn allocate_row(&mut self, entity: EntityId) -> usize {
        let row = self.entities.len();
        self.entities.push(entity);
        for column in &mut self.components {
            column.grow_to(self.entities.len());
        }
        row
    }

    /// Removes `row`, swapping the last row into its place across the
    /// entity list and every column. Returns the entity that used to
    /// occupy the last row, if one had to be moved.
    pub fn remove_row(&mut self, row: usize) -> Option<EntityId> {
        debug_assert!(row < self.entities.len());
        let last = self.entities.len() - 1;
        self.entities.swap_remove(row);
        for column in &mut self.components {
            column.swap_remove(row, last);
        }
        if row < self.entities.len() {
            Some(self.entities[row])
        } else {
            None
        }
    }

    /// Copies the value of `type_id` at `src_row` in `self` into
    /// `dst_row` of `other`. Both archetypes must have a column for
    /// `type_id` and `dst_row` must already exist in `other`.
    pub fn copy_component_to(
        &self,
        src_row: usize,
        type_id: TypeId,
        other: &mut Archetype,
        dst_row: usize,
    ) {
        let Some(src_col) = self.get_column(type_id) else {
            return;
        };
        let item_size = src_col.item_size;
        if item_size == 0 {
            return;
        }
        let src_ptr = src_col.byte_ptr(src_row);
        let Some(dst_col) = other.get_column_mut(type_id) else {
            return;
        };
        let dst_ptr = dst_col.byte_ptr_mut(dst_row);
        unsafe {
            std::ptr::copy_nonoverlapping(src_ptr, dst_ptr, item_size);
        }
    }
}

/// Type-erased component storage for one archetype column. Bytes are
/// addressed as `row * item_size`; `count` (not `data.len()`) is the
/// authoritative row count so zero-sized components (tags) still
/// answer `len()` correctly.
pub struct ComponentColumn {
    data: Vec<u8>,
    item_size: usize,
    count: usize,
    drop_fn: Option<unsafe fn(*mut u8)>,
}

impl ComponentColumn {
    pub fn new<T: Component>() -> Self {
        Self {
            data: Vec::new(),
            item_size: std::mem::size_of::<T>(),
            count: 0,
            drop_fn: if std::mem::needs_drop::<T>() {
                Some(|ptr| unsafe {
                    std::ptr::drop_in_place(ptr as *mut T);
                })
            } else {
                None
            },
        }
    }

    fn grow_to(&mut self, new_count: usize) {
        if new_count <= self.count {
            return;
        }
        self.data.resize(new_count * self.item_size, 0);
        self.count = new_count;
    }

    fn byte_ptr(&self, row: usize) -> *const u8 {
        if self.item_size == 0 {
            self.data.as_ptr()
        } else {
            unsafe { self.data.as_ptr().add(row * self.item_size) }
        }
    }

    fn byte_ptr_mut(&mut self, row: usize) -> *mut u8 {
        if self.item_size == 0 {
            self.data.as_mut_ptr()
        } else {
            unsafe { self.data.as_mut_ptr().add(row * self.item_size) }
        }
    }

    /// Raw pointer for writing a value into `row`. The row must already
    /// exist (the archetype backs it with zeroed bytes via `allocate_row`).
    pub fn get_ptr_mut(&mut self, row: usize) -> *mut u8 {
        self.byte_ptr_mut(row)
    }

    pub fn get<T: Component>(&self, row: usize) -> Option<&T> {
        if row >= self.count {
            return None;
        }
        Some(unsafe { &*(self.byte_ptr(row) as *const T) })
    }

    pub fn get_mut<T: Component>(&mut self, row: usize) -> Option<&mut T> {
        if row >= self.count {
            return None;
        }
        Some(unsafe { &mut *(self.byte_ptr_mut(row) as *mut T) })
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Swap-removes the logical element at `row` (the destructor for the
    /// old value there runs first), then moves `last`'s bytes into its
    /// place and shrinks by one, mirroring `Vec::swap_remove` at the byte
    /// level. `last` must equal `len() - 1`.
    fn swap_remove(&mut self, row: usize, last: usize) {
        debug_assert_eq!(last, self.count - 1);
        if self.item_size == 0 {
            self.count -= 1;
            return;
        }
        let row_ptr = unsafe { self.data.as_mut_ptr().add(row * self.item_size) };
        if let Some(drop_fn) = self.drop_fn {
            unsafe { drop_fn(row_ptr) };
        }
        if row != last {
            let last_ptr = unsafe { self.data.as_ptr().add(last * self.item_size) };
            unsafe { std::ptr::copy_nonoverlapping(last_ptr, row_ptr, self.item_size) };
        }
        self.count -= 1;
        self.data.truncate(self.count * self.item_size);
    }
}

impl Drop for ComponentColumn {
    fn drop(&mut self) {
        if let Some(drop_fn) = self.drop_fn {
            for i in 0..self.count {
                let offset = i * self.item_size;
                unsafe {
                    drop_fn(self.data.as_mut_ptr().add(offset));
                }
            }
        }
    }
}
