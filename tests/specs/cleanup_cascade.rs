//! Scenario: unmounting a parent with two children, each with a child,
//! removes exactly five instances, descendants first.

use crate::prelude::*;
use serde_json::json;

#[tokio::test]
async fn unmounting_the_root_cascades_post_order_through_five_instances() {
    let runtime = runtime_with(|_| {});
    runtime.register_type(counter_type("Panel")).unwrap();
    let mut client = connect(&runtime).await;

    let (root, _) = mount(&mut client, "Panel", json!({"level": 0})).await;
    let (child_a, _) = mount_under(&mut client, "Panel", json!({"level": 1, "n": 1}), Some(&root)).await;
    let (child_b, _) = mount_under(&mut client, "Panel", json!({"level": 1, "n": 2}), Some(&root)).await;
    let (grandchild_a, _) = mount_under(&mut client, "Panel", json!({"level": 2, "n": 1}), Some(&child_a)).await;
    let (grandchild_b, _) = mount_under(&mut client, "Panel", json!({"level": 2, "n": 2}), Some(&child_b)).await;
    assert_eq!(runtime.registry().instance_count(), 5);

    send(&mut client, &frame("component_unmount", &root, json!({"reason": "spec"}))).await;
    let reply = recv_kind(&mut client, "component_unmounted").await;

    let unmounted: Vec<String> = reply.payload["unmounted"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert_eq!(unmounted.len(), 5);
    assert_eq!(runtime.registry().instance_count(), 0);

    // post-order: every node is finalized after all of its descendants
    let position = |id: &str| unmounted.iter().position(|u| u == id).unwrap();
    assert!(position(&grandchild_a) < position(&child_a));
    assert!(position(&grandchild_b) < position(&child_b));
    assert_eq!(unmounted.last(), Some(&root));
}

#[tokio::test]
async fn mount_then_unmount_leaves_no_residue_anywhere() {
    let runtime = runtime_with(|_| {});
    runtime.register_type(counter_type("Panel")).unwrap();
    let mut client = connect(&runtime).await;

    let (component_id, _) = mount(&mut client, "Panel", json!({})).await;
    send(&mut client, &frame("component_unmount", &component_id, json!({}))).await;
    recv_kind(&mut client, "component_unmounted").await;

    let component = lcr_core::ComponentId::from(component_id.as_str());
    assert!(runtime.registry().instance(&component).is_none());
    assert!(runtime.sync().snapshot(&component).is_none());
    assert!(!runtime.cleanup().is_registered(&component));
}

#[tokio::test]
async fn a_partial_unmount_detaches_cleanly_from_the_surviving_parent() {
    let runtime = runtime_with(|_| {});
    runtime.register_type(counter_type("Panel")).unwrap();
    let mut client = connect(&runtime).await;

    let (root, _) = mount(&mut client, "Panel", json!({})).await;
    let (child, _) = mount_under(&mut client, "Panel", json!({"n": 1}), Some(&root)).await;

    send(&mut client, &frame("component_unmount", &child, json!({}))).await;
    recv_kind(&mut client, "component_unmounted").await;

    let root_id = lcr_core::ComponentId::from(root.as_str());
    let instance = runtime.registry().instance(&root_id).unwrap();
    assert!(instance.child_ids.is_empty());
    assert_eq!(runtime.registry().instance_count(), 1);
}
