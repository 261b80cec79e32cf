//! Scenario: a connection drops abnormally, the instance survives its
//! grace period, and an identical mount from a new connection rebinds to
//! the live state instead of re-initializing.

use crate::prelude::*;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn a_rebind_within_the_grace_period_returns_current_state() {
    let runtime = runtime_with(|config| {
        config.connection.grace_period_ms = 400;
    });
    runtime.register_type(counter_type("Counter")).unwrap();

    let mut client_a = connect(&runtime).await;
    let (component_id, _) = mount(&mut client_a, "Counter", json!({"room": 7})).await;
    let mut call = frame("call_action", &component_id, json!({}));
    call.action = Some("inc".to_string());
    send(&mut client_a, &call).await;
    recv_kind(&mut client_a, "state_update").await;

    // abnormal close: no unmount frame, the transport just goes away
    drop(client_a);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(runtime.registry().instance_count(), 1);

    let mut client_b = connect(&runtime).await;
    let (rebound_id, reply) = mount(&mut client_b, "Counter", json!({"room": 7})).await;
    assert_eq!(rebound_id, component_id);
    assert_eq!(reply.payload["rebound"], json!(true));
    assert_eq!(reply.payload["state"]["count"], json!(1));
    assert_eq!(reply.payload["version"], json!(1));
}

#[tokio::test]
async fn without_a_rebind_the_grace_period_expires_into_cleanup() {
    let runtime = runtime_with(|config| {
        config.connection.grace_period_ms = 80;
    });
    runtime.register_type(counter_type("Counter")).unwrap();

    let mut client = connect(&runtime).await;
    let (component_id, _) = mount(&mut client, "Counter", json!({})).await;
    drop(client);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(runtime.registry().instance_count(), 0);
    let component = lcr_core::ComponentId::from(component_id.as_str());
    assert!(runtime.sync().snapshot(&component).is_none());
}

#[tokio::test]
async fn after_grace_expiry_no_instance_lists_the_closed_connection() {
    let runtime = runtime_with(|config| {
        config.connection.grace_period_ms = 60;
    });
    runtime.register_type(counter_type("Counter")).unwrap();

    // the shared instance keeps a live subscriber, so it must survive with
    // only the closed connection removed from its subscriber set
    let mut client_a = connect(&runtime).await;
    let mut client_b = connect(&runtime).await;
    let (component_id, _) = mount(&mut client_a, "Counter", json!({})).await;
    send(&mut client_b, &frame("sync_request", &component_id, json!({"current_version": 0}))).await;
    recv_kind(&mut client_b, "sync_response").await;

    drop(client_a);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let component = lcr_core::ComponentId::from(component_id.as_str());
    let instance = runtime.registry().instance(&component).unwrap();
    assert_eq!(instance.subscribers.len(), 1);
}
