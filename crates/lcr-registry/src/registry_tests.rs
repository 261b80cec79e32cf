// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::component_type::{ComponentType, DependencyDecl, DependencyKind, DependencyResolution};
use crate::error::RegistryError;
use crate::instance::LifecycleState;
use lcr_core::{ClientId, ComponentId, FakeClock, SequentialIdGen};
use lcr_sync::{SyncConfig, SyncEngine};
use serde_json::json;
use std::sync::Arc;

fn test_registry() -> Registry<FakeClock, SequentialIdGen> {
    let clock = FakeClock::new();
    let id_gen = SequentialIdGen::new("id");
    let sync = Arc::new(SyncEngine::new(clock.clone(), id_gen.clone(), SyncConfig::default()));
    Registry::new(clock, id_gen, sync)
}

fn counter_type(name: &str) -> ComponentType {
    ComponentType::typed::<serde_json::Value, serde_json::Value, serde_json::Value>(
        name,
        |props| props.clone(),
        |state, action, _payload| match action {
            "increment" => {
                let count = state.get("count").and_then(|v| v.as_i64()).unwrap_or(0);
                Ok((json!({"count": count + 1}), None))
            }
            "noop" => Ok((state.clone(), None)),
            other => Err(format!("unknown action `{other}`")),
        },
    )
}

#[test]
fn register_type_rejects_duplicates() {
    let registry = test_registry();
    registry.register_type(counter_type("counter")).unwrap();
    let err = registry.register_type(counter_type("counter")).unwrap_err();
    assert!(matches!(err, RegistryError::DuplicateType(name) if name == "counter"));
}

#[test]
fn register_type_rejects_a_cyclic_dependency() {
    let registry = test_registry();
    registry
        .register_type(
            counter_type("a").with_dependency(DependencyDecl::new("b", DependencyKind::Component)),
        )
        .unwrap();
    let err = registry
        .register_type(
            counter_type("b").with_dependency(DependencyDecl::new("a", DependencyKind::Component)),
        )
        .unwrap_err();
    assert!(matches!(err, RegistryError::CyclicDependency(_)));
}

#[test]
fn mount_unknown_type_is_rejected() {
    let registry = test_registry();
    let err = registry.mount(ClientId::from("client-1"), "missing", json!({}), None).unwrap_err();
    assert!(matches!(err, RegistryError::UnknownComponentType(name) if name == "missing"));
}

#[test]
fn mount_returns_initial_state_at_version_zero() {
    let registry = test_registry();
    registry.register_type(counter_type("counter")).unwrap();
    let outcome = registry
        .mount(ClientId::from("client-1"), "counter", json!({"count": 0}), None)
        .unwrap();
    assert_eq!(outcome.state, json!({"count": 0}));
    assert_eq!(outcome.version, 0);
    assert!(!outcome.rebound);
}

#[test]
fn mount_rejects_when_a_required_dependency_has_no_live_instance() {
    let registry = test_registry();
    registry.register_type(counter_type("toolbar")).unwrap();
    registry
        .register_type(
            counter_type("panel").with_dependency(DependencyDecl::new("toolbar", DependencyKind::Component)),
        )
        .unwrap();
    let err = registry.mount(ClientId::from("client-1"), "panel", json!({}), None).unwrap_err();
    assert!(matches!(err, RegistryError::MissingRequiredDependency(name) if name == "toolbar"));
}

#[test]
fn mount_succeeds_once_the_required_dependency_is_live() {
    let registry = test_registry();
    registry.register_type(counter_type("toolbar")).unwrap();
    registry
        .register_type(
            counter_type("panel").with_dependency(DependencyDecl::new("toolbar", DependencyKind::Component)),
        )
        .unwrap();
    registry.mount(ClientId::from("client-1"), "toolbar", json!({}), None).unwrap();
    let outcome = registry.mount(ClientId::from("client-1"), "panel", json!({}), None).unwrap();
    assert!(!outcome.rebound);
}

#[test]
fn optional_dependency_does_not_block_mount() {
    let registry = test_registry();
    registry
        .register_type(
            counter_type("panel").with_dependency(DependencyDecl::new("toolbar", DependencyKind::Component).optional()),
        )
        .unwrap();
    registry.mount(ClientId::from("client-1"), "panel", json!({}), None).unwrap();
}

#[test]
fn lazy_dependency_does_not_block_mount() {
    let registry = test_registry();
    registry
        .register_type(
            counter_type("panel").with_dependency(
                DependencyDecl::new("toolbar", DependencyKind::Component).resolution(DependencyResolution::Lazy),
            ),
        )
        .unwrap();
    registry.mount(ClientId::from("client-1"), "panel", json!({}), None).unwrap();
}

#[test]
fn mount_with_unknown_parent_is_rejected() {
    let registry = test_registry();
    registry.register_type(counter_type("counter")).unwrap();
    let err = registry
        .mount(ClientId::from("client-1"), "counter", json!({}), Some(ComponentId::from("missing")))
        .unwrap_err();
    assert!(matches!(err, RegistryError::ParentNotFound(_)));
}

#[test]
fn mounting_a_child_links_it_into_the_parents_child_ids() {
    let registry = test_registry();
    registry.register_type(counter_type("counter")).unwrap();
    let parent = registry.mount(ClientId::from("client-1"), "counter", json!({}), None).unwrap();
    let child = registry
        .mount(ClientId::from("client-1"), "counter", json!({"child": true}), Some(parent.component_id.clone()))
        .unwrap();
    let parent_instance = registry.instance(&parent.component_id).unwrap();
    assert!(parent_instance.child_ids.contains(&child.component_id));
    let child_instance = registry.instance(&child.component_id).unwrap();
    assert_eq!(child_instance.depth, 1);
}

#[test]
fn remounting_the_same_identity_reuses_the_component_id_while_unmounting() {
    let registry = test_registry();
    registry.register_type(counter_type("counter")).unwrap();
    let first = registry
        .mount(ClientId::from("client-1"), "counter", json!({"seed": 1}), None)
        .unwrap();

    // simulate the instance entering its unmount grace period directly, then
    // reconnecting before it's actually torn down.
    {
        let mut instances = registry.instances.write();
        let instance = instances.get_mut(&first.component_id).unwrap();
        instance.lifecycle = LifecycleState::Unmounting;
    }

    let second = registry
        .mount(ClientId::from("client-2"), "counter", json!({"seed": 1}), None)
        .unwrap();
    assert_eq!(second.component_id, first.component_id);
    assert!(second.rebound);
    let instance = registry.instance(&first.component_id).unwrap();
    assert_eq!(instance.lifecycle, LifecycleState::Ready);
    assert_eq!(instance.client_id, ClientId::from("client-2"));
}

#[test]
fn mounting_distinct_props_produces_distinct_component_ids() {
    let registry = test_registry();
    registry.register_type(counter_type("counter")).unwrap();
    let a = registry.mount(ClientId::from("client-1"), "counter", json!({"seed": 1}), None).unwrap();
    let b = registry.mount(ClientId::from("client-1"), "counter", json!({"seed": 2}), None).unwrap();
    assert_ne!(a.component_id, b.component_id);
}

#[test]
fn call_action_commits_a_state_change() {
    let registry = test_registry();
    registry.register_type(counter_type("counter")).unwrap();
    let mount = registry
        .mount(ClientId::from("client-1"), "counter", json!({"count": 0}), None)
        .unwrap();
    let outcome = registry.call_action(&mount.component_id, "increment", json!({})).unwrap();
    assert!(outcome.state_changed);
    assert_eq!(outcome.state, json!({"count": 1}));
    assert_eq!(outcome.version, 1);
}

#[test]
fn call_action_with_no_state_change_reports_unchanged() {
    let registry = test_registry();
    registry.register_type(counter_type("counter")).unwrap();
    let mount = registry
        .mount(ClientId::from("client-1"), "counter", json!({"count": 0}), None)
        .unwrap();
    let outcome = registry.call_action(&mount.component_id, "noop", json!({})).unwrap();
    assert!(!outcome.state_changed);
    assert_eq!(outcome.version, 0);
}

#[test]
fn call_action_on_unknown_component_is_rejected() {
    let registry = test_registry();
    let err = registry
        .call_action(&ComponentId::from("missing"), "increment", json!({}))
        .unwrap_err();
    assert!(matches!(err, RegistryError::ComponentNotFound(_)));
}

#[test]
fn call_action_surfaces_action_handler_errors() {
    let registry = test_registry();
    registry.register_type(counter_type("counter")).unwrap();
    let mount = registry
        .mount(ClientId::from("client-1"), "counter", json!({"count": 0}), None)
        .unwrap();
    let err = registry.call_action(&mount.component_id, "frobnicate", json!({})).unwrap_err();
    assert!(matches!(err, RegistryError::ActionFailed { .. }));
}

#[test]
fn set_property_commits_directly_without_invoking_an_action() {
    let registry = test_registry();
    registry.register_type(counter_type("counter")).unwrap();
    let mount = registry
        .mount(ClientId::from("client-1"), "counter", json!({"count": 0}), None)
        .unwrap();
    let outcome = registry.set_property(&mount.component_id, "count", json!(42)).unwrap();
    assert_eq!(outcome.state["count"], json!(42));
}

#[test]
fn set_property_on_unknown_component_is_rejected() {
    let registry = test_registry();
    let err = registry.set_property(&ComponentId::from("missing"), "count", json!(1)).unwrap_err();
    assert!(matches!(err, RegistryError::ComponentNotFound(_)));
}

#[test]
fn unmount_removes_the_instance_and_detaches_from_its_parent() {
    let registry = test_registry();
    registry.register_type(counter_type("counter")).unwrap();
    let parent = registry.mount(ClientId::from("client-1"), "counter", json!({}), None).unwrap();
    let child = registry
        .mount(ClientId::from("client-1"), "counter", json!({"child": true}), Some(parent.component_id.clone()))
        .unwrap();

    let unmounted = registry.unmount(&child.component_id, "client disconnected");
    assert_eq!(unmounted, vec![child.component_id.clone()]);
    assert!(registry.instance(&child.component_id).is_none());
    let parent_instance = registry.instance(&parent.component_id).unwrap();
    assert!(!parent_instance.child_ids.contains(&child.component_id));
}

#[test]
fn unmount_cascades_depth_first_to_descendants() {
    let registry = test_registry();
    registry.register_type(counter_type("counter")).unwrap();
    let root = registry.mount(ClientId::from("client-1"), "counter", json!({}), None).unwrap();
    let mid = registry
        .mount(ClientId::from("client-1"), "counter", json!({"a": 1}), Some(root.component_id.clone()))
        .unwrap();
    let leaf = registry
        .mount(ClientId::from("client-1"), "counter", json!({"b": 1}), Some(mid.component_id.clone()))
        .unwrap();

    let unmounted = registry.unmount(&root.component_id, "shutdown");
    assert_eq!(unmounted.len(), 3);
    assert_eq!(unmounted.last(), Some(&root.component_id));
    assert!(unmounted.contains(&leaf.component_id));
    assert!(unmounted.contains(&mid.component_id));
    assert_eq!(registry.instance_count(), 0);
}

#[test]
fn unmount_of_unknown_component_is_a_no_op() {
    let registry = test_registry();
    let unmounted = registry.unmount(&ComponentId::from("missing"), "n/a");
    assert!(unmounted.is_empty());
}

#[test]
fn component_ids_lists_every_mounted_instance() {
    let registry = test_registry();
    registry.register_type(counter_type("counter")).unwrap();
    let a = registry.mount(ClientId::from("client-1"), "counter", json!({"a": 1}), None).unwrap();
    let b = registry.mount(ClientId::from("client-1"), "counter", json!({"a": 2}), None).unwrap();

    let mut ids = registry.component_ids();
    ids.sort();
    let mut expected = vec![a.component_id, b.component_id];
    expected.sort();
    assert_eq!(ids, expected);
}

#[test]
fn cascade_dependents_finds_instances_of_directly_dependent_types() {
    let registry = test_registry();
    registry.register_type(counter_type("toolbar")).unwrap();
    registry
        .register_type(
            counter_type("panel").with_dependency(DependencyDecl::new("toolbar", DependencyKind::Component)),
        )
        .unwrap();
    registry.mount(ClientId::from("client-1"), "toolbar", json!({}), None).unwrap();
    let panel = registry.mount(ClientId::from("client-1"), "panel", json!({}), None).unwrap();

    let dependents = registry.cascade_dependents("toolbar");
    assert_eq!(dependents, vec![panel.component_id]);
}

#[test]
fn cascade_dependents_follows_transitive_chains() {
    let registry = test_registry();
    registry.register_type(counter_type("toolbar")).unwrap();
    registry
        .register_type(
            counter_type("panel").with_dependency(DependencyDecl::new("toolbar", DependencyKind::Component)),
        )
        .unwrap();
    registry
        .register_type(
            counter_type("workspace").with_dependency(DependencyDecl::new("panel", DependencyKind::Component)),
        )
        .unwrap();
    registry.mount(ClientId::from("client-1"), "toolbar", json!({}), None).unwrap();
    registry.mount(ClientId::from("client-1"), "panel", json!({}), None).unwrap();
    let workspace = registry.mount(ClientId::from("client-1"), "workspace", json!({}), None).unwrap();

    let dependents = registry.cascade_dependents("toolbar");
    assert!(dependents.contains(&workspace.component_id));
}

#[test]
fn cascade_dependents_of_an_unreferenced_type_is_empty() {
    let registry = test_registry();
    registry.register_type(counter_type("counter")).unwrap();
    registry.mount(ClientId::from("client-1"), "counter", json!({}), None).unwrap();
    assert!(registry.cascade_dependents("counter").is_empty());
}

#[test]
fn subscribe_adds_a_second_connection_to_the_broadcast_set() {
    let registry = test_registry();
    registry.register_type(counter_type("counter")).unwrap();
    let mount = registry.mount(ClientId::from("client-1"), "counter", json!({}), None).unwrap();

    registry.subscribe(&mount.component_id, ClientId::from("client-2")).unwrap();
    let mut subscribers = registry.subscribers_of(&mount.component_id);
    subscribers.sort();
    assert_eq!(subscribers, vec![ClientId::from("client-1"), ClientId::from("client-2")]);
}

#[test]
fn remove_subscriber_orphans_instances_it_was_the_last_subscriber_of() {
    let registry = test_registry();
    registry.register_type(counter_type("counter")).unwrap();
    let solo = registry.mount(ClientId::from("client-1"), "counter", json!({"a": 1}), None).unwrap();
    let shared = registry.mount(ClientId::from("client-1"), "counter", json!({"a": 2}), None).unwrap();
    registry.subscribe(&shared.component_id, ClientId::from("client-2")).unwrap();

    let orphaned = registry.remove_subscriber(&ClientId::from("client-1"));
    assert_eq!(orphaned, vec![solo.component_id.clone()]);
    assert_eq!(registry.instance(&solo.component_id).unwrap().lifecycle, LifecycleState::Unmounting);
    // the shared instance still has client-2 and stays live
    assert_eq!(registry.instance(&shared.component_id).unwrap().lifecycle, LifecycleState::Ready);
}

#[test]
fn orphaned_instance_can_be_rebound_by_a_fresh_mount() {
    let registry = test_registry();
    registry.register_type(counter_type("counter")).unwrap();
    let first = registry.mount(ClientId::from("client-1"), "counter", json!({"a": 1}), None).unwrap();
    registry.call_action(&first.component_id, "increment", json!({})).unwrap();
    registry.remove_subscriber(&ClientId::from("client-1"));

    let second = registry.mount(ClientId::from("client-2"), "counter", json!({"a": 1}), None).unwrap();
    assert!(second.rebound);
    assert_eq!(second.component_id, first.component_id);
    // rebinding returns current state, not a re-initialized one
    assert_eq!(second.state, json!({"count": 1}));
    assert_eq!(second.version, 1);
}

#[test]
fn action_context_and_commit_action_split_the_synchronous_path() {
    let registry = test_registry();
    registry.register_type(counter_type("counter")).unwrap();
    let mount = registry
        .mount(ClientId::from("client-1"), "counter", json!({"count": 0}), None)
        .unwrap();

    let (behavior, prior) = registry.action_context(&mount.component_id).unwrap();
    let outcome = behavior.call_action(&prior, "increment", &json!({})).unwrap();
    let committed = registry.commit_action(&mount.component_id, &prior, outcome).unwrap();
    assert!(committed.state_changed);
    assert_eq!(committed.state, json!({"count": 1}));
    assert_eq!(committed.version, 1);
}

#[test]
fn abandoning_an_action_context_leaves_state_untouched() {
    let registry = test_registry();
    registry.register_type(counter_type("counter")).unwrap();
    let mount = registry
        .mount(ClientId::from("client-1"), "counter", json!({"count": 0}), None)
        .unwrap();

    // a timed-out handler's context is simply dropped; nothing commits
    let _ = registry.action_context(&mount.component_id).unwrap();
    let instance = registry.instance(&mount.component_id).unwrap();
    assert_eq!(instance.lifecycle, LifecycleState::Ready);
    let outcome = registry.call_action(&mount.component_id, "noop", json!({})).unwrap();
    assert_eq!(outcome.version, 0);
}

#[test]
fn mark_error_moves_the_instance_to_the_terminal_error_substate() {
    let registry = test_registry();
    registry.register_type(counter_type("counter")).unwrap();
    let mount = registry.mount(ClientId::from("client-1"), "counter", json!({}), None).unwrap();

    registry.mark_error(&mount.component_id);
    assert_eq!(registry.instance(&mount.component_id).unwrap().lifecycle, LifecycleState::Error);
    // an errored instance is not reclaimed by a rebinding mount
    let second = registry.mount(ClientId::from("client-2"), "counter", json!({}), None).unwrap();
    assert!(!second.rebound);
}

#[test]
fn detach_from_parent_unlinks_without_tearing_down() {
    let registry = test_registry();
    registry.register_type(counter_type("counter")).unwrap();
    let parent = registry.mount(ClientId::from("client-1"), "counter", json!({}), None).unwrap();
    let child = registry
        .mount(ClientId::from("client-1"), "counter", json!({"child": true}), Some(parent.component_id.clone()))
        .unwrap();

    registry.detach_from_parent(&child.component_id);
    assert!(!registry.instance(&parent.component_id).unwrap().child_ids.contains(&child.component_id));
    assert!(registry.instance(&child.component_id).is_some());
}
