//! Scenario: optimistic ops are confirmed by op id, rejected ops carry the
//! id back so the client can revert, and sync_request reports the actual
//! server version.

use crate::prelude::*;
use serde_json::json;

#[tokio::test]
async fn a_valid_optimistic_op_is_confirmed_by_op_id() {
    let runtime = runtime_with(|_| {});
    runtime.register_type(counter_type("Counter")).unwrap();
    let mut client = connect(&runtime).await;
    let (component_id, _) = mount(&mut client, "Counter", json!({})).await;

    send(
        &mut client,
        &frame(
            "state_update",
            &component_id,
            json!({"op": "set", "path": "count", "value": 5, "op_id": "X", "optimistic": true}),
        ),
    )
    .await;

    let confirmed = recv_kind(&mut client, "state_update_confirmed").await;
    assert_eq!(confirmed.payload["op_id"], json!("X"));
    assert_eq!(confirmed.payload["version"], json!(1));
}

#[tokio::test]
async fn an_inapplicable_optimistic_op_is_rejected_with_its_op_id() {
    let runtime = runtime_with(|_| {});
    runtime.register_type(counter_type("Counter")).unwrap();
    let mut client = connect(&runtime).await;
    let (component_id, _) = mount(&mut client, "Counter", json!({})).await;

    // `count` is a number; pushing onto it is not a legal state change
    send(
        &mut client,
        &frame(
            "state_update",
            &component_id,
            json!({"op": "push", "path": "count", "value": 1, "op_id": "X", "optimistic": true}),
        ),
    )
    .await;

    let error = recv_kind(&mut client, "error").await;
    assert_eq!(error.payload["kind"], json!("invalid_state_change"));
    assert_eq!(error.payload["op_id"], json!("X"));

    // nothing committed: the client reverts against version 0
    let component = lcr_core::ComponentId::from(component_id.as_str());
    let (state, version) = runtime.sync().snapshot(&component).unwrap();
    similar_asserts::assert_eq!(state, json!({"count": 0}));
    assert_eq!(version, 0);
}

#[tokio::test]
async fn redelivered_ops_are_idempotent_by_op_id() {
    let runtime = runtime_with(|_| {});
    runtime.register_type(counter_type("Counter")).unwrap();
    let mut client = connect(&runtime).await;
    let (component_id, _) = mount(&mut client, "Counter", json!({})).await;

    let op = json!({"op": "inc", "path": "count", "op_id": "once"});
    send(&mut client, &frame("state_update", &component_id, op.clone())).await;
    let first = recv_kind(&mut client, "state_update_confirmed").await;
    send(&mut client, &frame("state_update", &component_id, op)).await;
    let second = recv_kind(&mut client, "state_update_confirmed").await;

    assert_eq!(first.payload["version"], json!(1));
    assert_eq!(second.payload["version"], json!(1));
    let component = lcr_core::ComponentId::from(component_id.as_str());
    assert_eq!(runtime.sync().snapshot(&component).unwrap().0["count"], json!(1));
}

#[tokio::test]
async fn sync_request_reports_the_actual_current_version() {
    let runtime = runtime_with(|_| {});
    runtime.register_type(counter_type("Counter")).unwrap();
    let mut client = connect(&runtime).await;
    let (component_id, _) = mount(&mut client, "Counter", json!({})).await;

    for n in 0..3 {
        send(
            &mut client,
            &frame(
                "state_update",
                &component_id,
                json!({"op": "set", "path": "count", "value": n, "op_id": format!("op-{n}")}),
            ),
        )
        .await;
        recv_kind(&mut client, "state_update_confirmed").await;
    }

    send(&mut client, &frame("sync_request", &component_id, json!({"current_version": 0}))).await;
    let response = recv_kind(&mut client, "sync_response").await;
    // the actual version, not current+1
    assert_eq!(response.payload["version"], json!(3));
    similar_asserts::assert_eq!(response.payload["state"]["count"], json!(2));
}
