//! Scenario: a widget emits a sibling-scoped event; only the other widget
//! hears it, not the emitter and not the parent dashboard.

use crate::prelude::*;
use serde_json::json;

#[tokio::test]
async fn sibling_scoped_events_reach_only_the_siblings() {
    let runtime = runtime_with(|_| {});
    runtime.register_type(counter_type("Dashboard")).unwrap();
    runtime.register_type(counter_type("Widget")).unwrap();
    let _pump = runtime.spawn_background();
    let mut client = connect(&runtime).await;

    let (dashboard, _) = mount(&mut client, "Dashboard", json!({})).await;
    let (widget1, _) = mount_under(&mut client, "Widget", json!({"n": 1}), Some(&dashboard)).await;
    let (widget2, _) = mount_under(&mut client, "Widget", json!({"n": 2}), Some(&dashboard)).await;
    assert_ne!(widget1, widget2);

    send(
        &mut client,
        &frame("event_emit", &widget1, json!({"name": "refresh", "scope": "siblings"})),
    )
    .await;

    let broadcast = recv_kind(&mut client, "broadcast").await;
    assert_eq!(broadcast.component_id, widget2);
    assert_eq!(broadcast.payload["name"], json!("refresh"));
    assert_eq!(broadcast.payload["source_component_id"], json!(widget1));
}

#[tokio::test]
async fn child_component_ids_are_nested_under_the_parent_path() {
    let runtime = runtime_with(|_| {});
    runtime.register_type(counter_type("Dashboard")).unwrap();
    runtime.register_type(counter_type("Widget")).unwrap();
    let mut client = connect(&runtime).await;

    let (dashboard, _) = mount(&mut client, "Dashboard", json!({})).await;
    let (widget, _) = mount_under(&mut client, "Widget", json!({}), Some(&dashboard)).await;

    let parsed = lcr_core::parse_component_id(&widget).unwrap();
    assert_eq!(parsed.type_slug, "widget");
    assert_eq!(parsed.parent_path.as_deref(), Some(dashboard.as_str()));

    let component = lcr_core::ComponentId::from(widget.as_str());
    let instance = runtime.registry().instance(&component).unwrap();
    assert_eq!(instance.depth, 1);
    assert_eq!(instance.path, "dashboard.widget");
}

#[tokio::test]
async fn descendant_scoped_events_cover_the_whole_subtree() {
    let runtime = runtime_with(|_| {});
    runtime.register_type(counter_type("Dashboard")).unwrap();
    runtime.register_type(counter_type("Widget")).unwrap();
    let _pump = runtime.spawn_background();
    let mut client = connect(&runtime).await;

    let (dashboard, _) = mount(&mut client, "Dashboard", json!({})).await;
    let (widget, _) = mount_under(&mut client, "Widget", json!({"n": 1}), Some(&dashboard)).await;
    let (leaf, _) = mount_under(&mut client, "Widget", json!({"n": 2}), Some(&widget)).await;

    send(
        &mut client,
        &frame("event_emit", &dashboard, json!({"name": "refresh", "scope": "descendants"})),
    )
    .await;

    let first = recv_kind(&mut client, "broadcast").await;
    let second = recv_kind(&mut client, "broadcast").await;
    let mut targets = vec![first.component_id, second.component_id];
    targets.sort();
    let mut expected = vec![widget, leaf];
    expected.sort();
    assert_eq!(targets, expected);
}

#[tokio::test]
async fn events_from_an_unknown_source_are_rejected() {
    let runtime = runtime_with(|_| {});
    let mut client = connect(&runtime).await;

    send(
        &mut client,
        &frame("event_emit", "ghost-aaaa-bbbb", json!({"name": "refresh", "scope": "global"})),
    )
    .await;

    let error = recv_kind(&mut client, "error").await;
    assert_eq!(error.payload["kind"], json!("component_not_found"));
}
