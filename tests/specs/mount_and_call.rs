//! Scenario: mount a counter, call its action, watch the version climb.

use crate::prelude::*;
use lcr_core::parse_component_id;
use serde_json::json;

#[tokio::test]
async fn mount_replies_with_initial_state_at_version_zero() {
    let runtime = runtime_with(|_| {});
    runtime.register_type(counter_type("Counter")).unwrap();
    let mut client = connect(&runtime).await;

    let (component_id, reply) = mount(&mut client, "Counter", json!({})).await;
    similar_asserts::assert_eq!(reply.payload["state"], json!({"count": 0}));
    assert_eq!(reply.payload["version"], json!(0));

    // deterministic identity: `counter-<hash36>-<ts36>`
    let parsed = parse_component_id(&component_id).unwrap();
    assert_eq!(parsed.type_slug, "counter");
    assert!(parsed.parent_path.is_none());
}

#[tokio::test]
async fn calling_an_action_broadcasts_the_bumped_state() {
    let runtime = runtime_with(|_| {});
    runtime.register_type(counter_type("Counter")).unwrap();
    let mut client = connect(&runtime).await;
    let (component_id, _) = mount(&mut client, "Counter", json!({})).await;

    let mut call = frame("call_action", &component_id, json!({}));
    call.action = Some("inc".to_string());
    send(&mut client, &call).await;

    let update = recv_kind(&mut client, "state_update").await;
    similar_asserts::assert_eq!(update.payload["state"], json!({"count": 1}));
    assert_eq!(update.version, Some(1));
}

#[tokio::test]
async fn versions_increase_strictly_across_repeated_calls() {
    let runtime = runtime_with(|_| {});
    runtime.register_type(counter_type("Counter")).unwrap();
    let mut client = connect(&runtime).await;
    let (component_id, _) = mount(&mut client, "Counter", json!({})).await;

    let mut last_version = 0;
    for i in 1..=5 {
        let mut call = frame("call_action", &component_id, json!({}));
        call.action = Some("inc".to_string());
        send(&mut client, &call).await;
        let update = recv_kind(&mut client, "state_update").await;
        let version = update.version.unwrap();
        assert!(version > last_version, "version must strictly increase");
        last_version = version;
        assert_eq!(update.payload["state"]["count"], json!(i));
    }
}

#[tokio::test]
async fn remounting_the_same_identity_yields_the_same_component_id() {
    let runtime = runtime_with(|_| {});
    runtime.register_type(counter_type("Counter")).unwrap();
    let mut client_a = connect(&runtime).await;
    let (first, _) = mount(&mut client_a, "Counter", json!({"room": "a"})).await;
    drop(client_a);

    // the prior connection's drop leaves the instance in its grace period
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let mut client_b = connect(&runtime).await;
    let (second, reply) = mount(&mut client_b, "Counter", json!({"room": "a"})).await;
    assert_eq!(first, second);
    assert_eq!(reply.payload["rebound"], json!(true));
}

#[tokio::test]
async fn an_unknown_action_surfaces_action_failed() {
    let runtime = runtime_with(|_| {});
    runtime.register_type(counter_type("Counter")).unwrap();
    let mut client = connect(&runtime).await;
    let (component_id, _) = mount(&mut client, "Counter", json!({})).await;

    let mut call = frame("call_action", &component_id, json!({}));
    call.action = Some("frobnicate".to_string());
    call.request_id = Some("req-1".to_string());
    send(&mut client, &call).await;

    let error = recv_kind(&mut client, "error").await;
    assert_eq!(error.payload["kind"], json!("action_failed"));
    assert_eq!(error.payload["request_id"], json!("req-1"));
}
