// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::error::EventError;
use crate::event::Scope;
use crate::tree::ComponentTree;
use lcr_core::ComponentId;
use std::collections::{HashMap as StdHashMap, HashSet};
use std::sync::Arc;

/// A hierarchy built entirely in memory for scope-resolution tests:
/// `dashboard -> { widget1, widget2 }`, `widget1 -> { gadget }`.
struct FakeTree {
    parent: StdHashMap<ComponentId, ComponentId>,
    children: StdHashMap<ComponentId, Vec<ComponentId>>,
}

impl FakeTree {
    fn dashboard_with_widgets() -> Self {
        let dashboard = ComponentId::from("dashboard");
        let widget1 = ComponentId::from("widget1");
        let widget2 = ComponentId::from("widget2");
        let gadget = ComponentId::from("gadget");

        let mut parent = StdHashMap::new();
        parent.insert(widget1.clone(), dashboard.clone());
        parent.insert(widget2.clone(), dashboard.clone());
        parent.insert(gadget.clone(), widget1.clone());

        let mut children = StdHashMap::new();
        children.insert(dashboard, vec![widget1.clone(), widget2]);
        children.insert(widget1, vec![gadget]);

        Self { parent, children }
    }
}

impl ComponentTree for FakeTree {
    fn parent_of(&self, id: &ComponentId) -> Option<ComponentId> {
        self.parent.get(id).cloned()
    }

    fn children_of(&self, id: &ComponentId) -> Vec<ComponentId> {
        self.children.get(id).cloned().unwrap_or_default()
    }

    fn all_ids(&self) -> Vec<ComponentId> {
        let mut ids: HashSet<ComponentId> = self.parent.keys().cloned().collect();
        ids.extend(self.parent.values().cloned());
        ids.into_iter().collect()
    }
}

fn resolve(scope: Scope, source: &str) -> HashSet<ComponentId> {
    let tree = FakeTree::dashboard_with_widgets();
    resolve_targets(&scope, &ComponentId::from(source), &tree, &StdHashMap::new()).unwrap()
}

#[test]
fn local_scope_targets_only_the_source() {
    let targets = resolve(Scope::Local, "widget1");
    assert_eq!(targets, HashSet::from([ComponentId::from("widget1")]));
}

#[test]
fn parent_scope_targets_the_parent() {
    let targets = resolve(Scope::Parent, "widget1");
    assert_eq!(targets, HashSet::from([ComponentId::from("dashboard")]));
}

#[test]
fn parent_scope_of_a_root_is_empty() {
    let targets = resolve(Scope::Parent, "dashboard");
    assert!(targets.is_empty());
}

#[test]
fn children_scope_targets_direct_children_only() {
    let targets = resolve(Scope::Children, "dashboard");
    assert_eq!(targets, HashSet::from([ComponentId::from("widget1"), ComponentId::from("widget2")]));
}

#[test]
fn descendants_scope_is_transitive_and_excludes_the_source() {
    let targets = resolve(Scope::Descendants, "dashboard");
    assert_eq!(
        targets,
        HashSet::from([ComponentId::from("widget1"), ComponentId::from("widget2"), ComponentId::from("gadget")])
    );
}

#[test]
fn siblings_scope_excludes_the_source_itself() {
    let targets = resolve(Scope::Siblings, "widget1");
    assert_eq!(targets, HashSet::from([ComponentId::from("widget2")]));
}

#[test]
fn ancestors_scope_walks_to_the_root() {
    let targets = resolve(Scope::Ancestors, "gadget");
    assert_eq!(targets, HashSet::from([ComponentId::from("widget1"), ComponentId::from("dashboard")]));
}

#[test]
fn global_scope_targets_every_known_id() {
    let targets = resolve(Scope::Global, "gadget");
    assert_eq!(targets.len(), 4);
}

#[test]
fn subtree_scope_includes_the_source() {
    let targets = resolve(Scope::Subtree { max_depth: None }, "widget1");
    assert!(targets.contains(&ComponentId::from("widget1")));
    assert!(targets.contains(&ComponentId::from("gadget")));
}

#[test]
fn subtree_scope_respects_max_depth() {
    let targets = resolve(Scope::Subtree { max_depth: Some(0) }, "dashboard");
    assert_eq!(targets, HashSet::from([ComponentId::from("dashboard")]));
}

#[test]
fn custom_scope_invokes_the_registered_resolver() {
    let tree = FakeTree::dashboard_with_widgets();
    let mut resolvers: StdHashMap<String, CustomResolver> = StdHashMap::new();
    resolvers.insert(
        "everyone_but_source".to_string(),
        Arc::new(|source: &ComponentId, tree: &dyn ComponentTree| {
            tree.all_ids().into_iter().filter(|id| id != source).collect()
        }),
    );
    let targets =
        resolve_targets(&Scope::Custom("everyone_but_source".to_string()), &ComponentId::from("gadget"), &tree, &resolvers)
            .unwrap();
    assert!(!targets.contains(&ComponentId::from("gadget")));
    assert_eq!(targets.len(), 3);
}

#[test]
fn custom_scope_with_no_registered_resolver_errors() {
    let tree = FakeTree::dashboard_with_widgets();
    let err = resolve_targets(
        &Scope::Custom("missing".to_string()),
        &ComponentId::from("gadget"),
        &tree,
        &StdHashMap::new(),
    )
    .unwrap_err();
    assert!(matches!(err, EventError::UnknownScopeResolver(name) if name == "missing"));
}
