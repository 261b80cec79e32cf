//! Scenario: two clients write the same path inside the tolerance window;
//! last-write-wins picks the later timestamp and records the conflict.

use crate::prelude::*;
use lcr_sync::ConflictStatus;
use serde_json::json;

#[tokio::test]
async fn last_write_wins_keeps_the_later_timestamp() {
    let runtime = runtime_with(|_| {});
    runtime.register_type(counter_type("Counter")).unwrap();
    let mut client_a = connect(&runtime).await;
    let mut client_b = connect(&runtime).await;

    let (component_id, _) = mount(&mut client_a, "Counter", json!({})).await;
    send(&mut client_b, &frame("sync_request", &component_id, json!({"current_version": 0}))).await;
    recv_kind(&mut client_b, "sync_response").await;

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64;

    // A's optimistic write carries the later timestamp
    send(
        &mut client_a,
        &frame(
            "state_update",
            &component_id,
            json!({"op": "set", "path": "count", "value": 10, "op_id": "op-a", "optimistic": true, "timestamp": now + 500}),
        ),
    )
    .await;
    recv_kind(&mut client_a, "state_update_confirmed").await;

    send(
        &mut client_b,
        &frame(
            "state_update",
            &component_id,
            json!({"op": "set", "path": "count", "value": 20, "op_id": "op-b", "timestamp": now}),
        ),
    )
    .await;
    recv_kind(&mut client_b, "state_update_confirmed").await;

    // the later write survives; the losing op is kept as a resolved conflict
    let resolved = recv_kind(&mut client_a, "conflict_resolved").await;
    assert_eq!(resolved.payload["conflicting_paths"], json!(["count"]));

    let component = lcr_core::ComponentId::from(component_id.as_str());
    let (state, version) = runtime.sync().snapshot(&component).unwrap();
    assert_eq!(state["count"], json!(10));
    assert!(version >= 2);

    let conflicts = runtime.sync().conflicts();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].status, ConflictStatus::Resolved);
}

#[tokio::test]
async fn writes_on_disjoint_paths_do_not_conflict() {
    let runtime = runtime_with(|_| {});
    runtime.register_type(counter_type("Counter")).unwrap();
    let mut client_a = connect(&runtime).await;
    let mut client_b = connect(&runtime).await;

    let (component_id, _) = mount(&mut client_a, "Counter", json!({})).await;
    send(&mut client_b, &frame("sync_request", &component_id, json!({"current_version": 0}))).await;
    recv_kind(&mut client_b, "sync_response").await;

    send(
        &mut client_a,
        &frame(
            "state_update",
            &component_id,
            json!({"op": "set", "path": "label", "value": "a", "op_id": "op-a", "optimistic": true}),
        ),
    )
    .await;
    recv_kind(&mut client_a, "state_update_confirmed").await;

    send(
        &mut client_b,
        &frame(
            "state_update",
            &component_id,
            json!({"op": "set", "path": "count", "value": 3, "op_id": "op-b"}),
        ),
    )
    .await;
    recv_kind(&mut client_b, "state_update_confirmed").await;

    assert!(runtime.sync().conflicts().is_empty());
    let component = lcr_core::ComponentId::from(component_id.as_str());
    let (state, _) = runtime.sync().snapshot(&component).unwrap();
    assert_eq!(state["label"], json!("a"));
    assert_eq!(state["count"], json!(3));
}
