//! Shared harness for the wire-level specs: a runtime factory, an
//! in-memory client, and the component types the scenarios mount.

use lcr_core::{SystemClock, UuidIdGen};
use lcr_daemon::{serve, Runtime, RuntimeConfig};
use lcr_observability::null_sink;
use lcr_registry::ComponentType;
use lcr_storage::NullPersistenceSink;
use lcr_wire::Message;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::DuplexStream;

pub const READ_TIMEOUT: Duration = Duration::from_secs(2);

static FRAME_IDS: AtomicU64 = AtomicU64::new(1);

pub type SpecRuntime = Arc<Runtime<SystemClock, UuidIdGen>>;

/// A runtime with spec-friendly timing: no outbound debounce, quiet
/// heartbeats, short drain. Individual specs override further via
/// `mutate`.
pub fn runtime_with(mutate: impl FnOnce(&mut RuntimeConfig)) -> SpecRuntime {
    let mut config = RuntimeConfig::default();
    config.sync.debounce_ms = 0;
    config.connection.heartbeat_interval_ms = 60_000;
    config.connection.drain_grace_ms = 200;
    config.events.batch_timeout_ms = 10;
    mutate(&mut config);
    Runtime::new(SystemClock, UuidIdGen, config, null_sink(), Arc::new(NullPersistenceSink))
}

/// The counter from scenario 1: `{ count: 0 }` with an `inc` action.
pub fn counter_type(name: &str) -> ComponentType {
    ComponentType::typed::<Value, Value, Value>(
        name,
        |props| {
            let mut state = json!({"count": 0});
            if let (Some(state_obj), Some(props_obj)) = (state.as_object_mut(), props.as_object()) {
                for (k, v) in props_obj {
                    state_obj.insert(k.clone(), v.clone());
                }
            }
            state
        },
        |state, action, _payload| match action {
            "inc" => {
                let count = state.get("count").and_then(|v| v.as_i64()).unwrap_or(0);
                let mut next = state.clone();
                next["count"] = json!(count + 1);
                Ok((next, None))
            }
            other => Err(format!("unknown action `{other}`")),
        },
    )
}

/// Opens a served connection and consumes the welcome frame.
pub async fn connect(runtime: &SpecRuntime) -> DuplexStream {
    let (client, server) = tokio::io::duplex(64 * 1024);
    tokio::spawn(serve(Arc::clone(runtime), server));
    let mut client = client;
    let welcome = recv(&mut client).await;
    assert_eq!(welcome.kind, "welcome");
    client
}

pub async fn recv(client: &mut DuplexStream) -> Message {
    lcr_wire::read_message(client, READ_TIMEOUT).await.unwrap()
}

/// Reads frames until one of `kind` arrives, skipping heartbeats and any
/// other interleaved traffic.
pub async fn recv_kind(client: &mut DuplexStream, kind: &str) -> Message {
    for _ in 0..32 {
        let frame = recv(client).await;
        if frame.kind == kind {
            return frame;
        }
    }
    panic!("no `{kind}` frame arrived within 32 frames");
}

pub async fn send(client: &mut DuplexStream, message: &Message) {
    lcr_wire::write_message(client, message, READ_TIMEOUT).await.unwrap();
}

pub fn frame(kind: &str, component_id: &str, payload: Value) -> Message {
    let id = FRAME_IDS.fetch_add(1, Ordering::SeqCst);
    Message::new(kind, component_id, format!("spec-{id}"), 0).with_payload(payload)
}

/// Mounts `type_name` with `props` and returns `(component_id, reply)`.
pub async fn mount(client: &mut DuplexStream, type_name: &str, props: Value) -> (String, Message) {
    mount_under(client, type_name, props, None).await
}

pub async fn mount_under(
    client: &mut DuplexStream,
    type_name: &str,
    props: Value,
    parent_id: Option<&str>,
) -> (String, Message) {
    let mut payload = json!({"component": type_name, "props": props});
    if let Some(parent) = parent_id {
        payload["parent_id"] = json!(parent);
    }
    send(client, &frame("component_mount", "system", payload)).await;
    let reply = recv_kind(client, "component_mounted").await;
    let component_id = reply.payload["component_id"].as_str().unwrap().to_string();
    (component_id, reply)
}
