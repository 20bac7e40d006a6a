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

//! Turns a phase's systems into an execution tree the parallel executor
//! can walk.
//!
//! Systems are sorted by `(priority asc, -interest_component_count)`,
//! then a conflict graph is built: an edge `i -> j` (`i < j`) whenever
//! systems `i` and `j` share a write — `i` must run before `j`. That
//! graph is collapsed into a tree by repeatedly resolving the first node
//! whose conflicting predecessors (the earlier-order systems it shares a
//! write with) are all already resolved, and attaching it as a child of
//! each of those predecessors (or directly under a synthetic root if it
//! has none). A node with several parents only becomes ready once every
//! parent has run, so it always executes after every earlier-order
//! system it conflicts with.

use crate::error::{EcsError, Result};
use crate::system::SystemAccess;

pub const ROOT: usize = 0;

#[derive(Debug)]
pub struct DepTreeNode {
    /// Index into the phase's sorted system list. `None` only for the
    /// synthetic root.
    pub entry_index: Option<usize>,
    pub children: Vec<usize>,
    pub wait_count: usize,
}

#[derive(Debug)]
pub struct DependencyTree {
    pub nodes: Vec<DepTreeNode>,
}

impl DependencyTree {
    pub fn root(&self) -> &DepTreeNode {
        &self.nodes[ROOT]
    }
}

fn resolve(
    idx: usize,
    preds_of: &[Vec<usize>],
    resolved: &mut [bool],
    on_stack: &mut [bool],
) -> Result<usize> {
    on_stack[idx] = true;
    for &next in &preds_of[idx] {
        if !resolved[next] {
            if on_stack[next] {
                return Err(EcsError::CircularDependency);
            }
            return resolve(next, preds_of, resolved, on_stack);
        }
    }
    resolved[idx] = true;
    on_stack[idx] = false;
    Ok(idx)
}

/// Builds the execution tree for a phase already sorted into scheduling
/// order. `accesses[i]` must correspond to the `i`-th system in that
/// order.
pub fn build_dependency_tree(accesses: &[SystemAccess]) -> Result<DependencyTree> {
    let n = accesses.len();
    // `preds_of[j]` holds every `i < j` that `j` conflicts with — the
    // earlier-order systems `j` must wait for. Edges only ever point from
    // a smaller index to a larger one, so this graph is acyclic by
    // construction; `resolve` still checks `on_stack` defensively.
    let mut preds_of: Vec<Vec<usize>> = vec![Vec::new(); n];
    for j in 0..n {
        for i in 0..j {
            if accesses[i].conflicts_with(&accesses[j]) {
                preds_of[j].push(i);
            }
        }
    }

    let mut remaining: Vec<usize> = (0..n).collect();
    let mut resolved = vec![false; n];
    let mut tree_index_of: Vec<Option<usize>> = vec![None; n];

    let mut nodes = vec![DepTreeNode {
        entry_index: None,
        children: Vec::new(),
        wait_count: 0,
    }];

    while let Some(&seed) = remaining.first() {
        let mut on_stack = vec![false; n];
        let least = resolve(seed, &preds_of, &mut resolved, &mut on_stack)?;

        let tree_idx = nodes.len();
        nodes.push(DepTreeNode {
            entry_index: Some(least),
            children: Vec::new(),
            wait_count: 0,
        });
        tree_index_of[least] = Some(tree_idx);

        if preds_of[least].is_empty() {
            nodes[ROOT].children.push(tree_idx);
            nodes[tree_idx].wait_count += 1;
        } else {
            for &parent_original in &preds_of[least] {
                let parent_tree_idx = tree_index_of[parent_original]
                    .expect("a resolved node's conflicting predecessors are already in the tree");
                nodes[parent_tree_idx].children.push(tree_idx);
                nodes[tree_idx].wait_count += 1;
            }
        }

        remaining.retain(|&x| x != least);
    }

    Ok(DependencyTree { nodes })
}

/// Sorts system indices `0..accesses.len()` by `(priority asc,
/// -interest_component_count)`, stable on ties so registration order
/// still breaks them.
pub fn sort_order(priorities: &[i32], interest_counts: &[usize]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..priorities.len()).collect();
    order.sort_by(|&a, &b| {
        priorities[a]
            .cmp(&priorities[b])
            .then_with(|| interest_counts[b].cmp(&interest_counts[a]))
    });
    order
}
