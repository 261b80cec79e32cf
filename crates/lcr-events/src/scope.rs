// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Expands an `Event`'s `Scope` into a concrete set of target component ids,
//! walking the hierarchy through `ComponentTree` rather than any concrete
//! registry type.

use crate::error::EventError;
use crate::event::Scope;
use crate::tree::ComponentTree;
use lcr_core::{ComponentId, MAX_HIERARCHY_DEPTH};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

pub type CustomResolver = Arc<dyn Fn(&ComponentId, &dyn ComponentTree) -> HashSet<ComponentId> + Send + Sync>;

pub fn resolve_targets(
    scope: &Scope,
    source_id: &ComponentId,
    tree: &dyn ComponentTree,
    custom_resolvers: &HashMap<String, CustomResolver>,
) -> Result<HashSet<ComponentId>, EventError> {
    let targets = match scope {
        Scope::Local => std::iter::once(source_id.clone()).collect(),
        Scope::Parent => tree.parent_of(source_id).into_iter().collect(),
        Scope::Children => tree.children_of(source_id).into_iter().collect(),
        Scope::Descendants => bfs(tree, source_id, None, false)?,
        Scope::Siblings => match tree.parent_of(source_id) {
            Some(parent) => tree
                .children_of(&parent)
                .into_iter()
                .filter(|id| id != source_id)
                .collect(),
            None => HashSet::new(),
        },
        Scope::Ancestors => ancestors(tree, source_id)?,
        Scope::Global => tree.all_ids().into_iter().collect(),
        Scope::Subtree { max_depth } => bfs(tree, source_id, *max_depth, true)?,
        Scope::Custom(name) => {
            let resolver = custom_resolvers
                .get(name)
                .ok_or_else(|| EventError::UnknownScopeResolver(name.clone()))?;
            resolver(source_id, tree)
        }
    };
    Ok(targets)
}

fn ancestors(tree: &dyn ComponentTree, source_id: &ComponentId) -> Result<HashSet<ComponentId>, EventError> {
    let mut result = HashSet::new();
    let mut current = source_id.clone();
    for _ in 0..MAX_HIERARCHY_DEPTH {
        match tree.parent_of(&current) {
            Some(parent) => {
                result.insert(parent.clone());
                current = parent;
            }
            None => return Ok(result),
        }
    }
    Err(EventError::CyclicHierarchy(MAX_HIERARCHY_DEPTH))
}

fn bfs(
    tree: &dyn ComponentTree,
    source_id: &ComponentId,
    max_depth: Option<usize>,
    include_source: bool,
) -> Result<HashSet<ComponentId>, EventError> {
    let bound = max_depth.unwrap_or(MAX_HIERARCHY_DEPTH);
    let mut result = HashSet::new();
    let mut seen = HashSet::new();
    seen.insert(source_id.clone());
    if include_source {
        result.insert(source_id.clone());
    }
    let mut frontier: VecDeque<ComponentId> = VecDeque::from([source_id.clone()]);
    for _ in 0..bound {
        if frontier.is_empty() {
            break;
        }
        let mut next = VecDeque::new();
        for id in frontier {
            for child in tree.children_of(&id) {
                if seen.insert(child.clone()) {
                    result.insert(child.clone());
                    next.push_back(child);
                }
            }
        }
        frontier = next;
    }
    Ok(result)
}

#[cfg(test)]
#[path = "scope_tests.rs"]
mod tests;
