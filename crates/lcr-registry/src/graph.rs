// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cycle detection and topological ordering over the `component`-kind
//! dependency graph declared between registered types. `service`/`state`/
//! `event` dependencies don't name other component types, so they never
//! participate here.

use crate::component_type::{ComponentType, DependencyKind};
use crate::error::RegistryError;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Mark {
    #[default]
    Unvisited,
    InProgress,
    Done,
}

/// Depth-first search for a cycle in `edges` starting from every node.
/// `edges` maps a type name to the component-kind dependency targets it
/// declares.
pub fn find_cycle(edges: &HashMap<String, Vec<String>>) -> Option<String> {
    let mut marks: HashMap<&str, Mark> = HashMap::new();

    fn visit<'a>(
        node: &'a str,
        edges: &'a HashMap<String, Vec<String>>,
        marks: &mut HashMap<&'a str, Mark>,
    ) -> Option<String> {
        match marks.get(node).copied().unwrap_or_default() {
            Mark::Done => return None,
            Mark::InProgress => return Some(node.to_string()),
            Mark::Unvisited => {}
        }
        marks.insert(node, Mark::InProgress);
        if let Some(targets) = edges.get(node) {
            for target in targets {
                if let Some(cycle_at) = visit(target, edges, marks) {
                    return Some(cycle_at);
                }
            }
        }
        marks.insert(node, Mark::Done);
        None
    }

    for node in edges.keys() {
        if let Some(cycle_at) = visit(node, edges, &mut marks) {
            return Some(cycle_at);
        }
    }
    None
}

/// Topological order of `edges` (dependencies before dependents), or a
/// `CyclicDependency` error naming the type where the cycle was found.
pub fn topological_order(edges: &HashMap<String, Vec<String>>) -> Result<Vec<String>, RegistryError> {
    if let Some(cycle_at) = find_cycle(edges) {
        return Err(RegistryError::CyclicDependency(cycle_at));
    }
    let mut order = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();

    fn visit(
        node: &str,
        edges: &HashMap<String, Vec<String>>,
        visited: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) {
        if visited.contains(node) {
            return;
        }
        visited.insert(node.to_string());
        if let Some(targets) = edges.get(node) {
            for target in targets {
                visit(target, edges, visited, order);
            }
        }
        order.push(node.to_string());
    }

    for node in edges.keys() {
        visit(node, edges, &mut visited, &mut order);
    }
    Ok(order)
}

/// Builds the `name -> [required component-kind target names]` edge map
/// from a set of registered types.
pub fn component_edges<'a>(types: impl Iterator<Item = &'a ComponentType>) -> HashMap<String, Vec<String>> {
    let mut edges = HashMap::new();
    for ct in types {
        let targets = ct
            .dependencies
            .iter()
            .filter(|d| d.kind == DependencyKind::Component)
            .map(|d| d.target_type.clone())
            .collect();
        edges.insert(ct.name.clone(), targets);
    }
    edges
}

#[cfg(test)]
#[path = "graph_tests.rs"]
mod tests;
