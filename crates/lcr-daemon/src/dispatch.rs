// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Routes one decoded inbound frame to the subsystem that owns it and
//! enqueues whatever replies and broadcasts it produces. This module is
//! where subsystem errors become wire `error` frames; nothing below it
//! ever sees a `Message`.

use crate::connection::Connection;
use crate::error::{event_wire_kind, registry_wire_kind, sync_wire_kind};
use crate::runtime::Runtime;
use lcr_core::{Clock, ComponentId, IdGen, OpId};
use lcr_events::{EmitOptions, Priority, Scope};
use lcr_sync::{ConflictStatus, OpKind, ResolutionStrategy, Severity, StateOperation};
use lcr_wire::{error_payload, ErrorKind, Message};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub async fn handle_frame<C: Clock, G: IdGen + 'static>(
    runtime: &Arc<Runtime<C, G>>,
    connection: &Arc<Connection>,
    frame: Message,
) {
    debug!(client_id = %connection.client_id, kind = %frame.kind, component_id = %frame.component_id, "frame");
    match frame.kind.as_str() {
        "component_mount" => handle_mount(runtime, connection, &frame),
        "component_unmount" => handle_unmount(runtime, connection, &frame).await,
        // `method_call` is the legacy alias some clients still send
        "call_action" | "method_call" => handle_call_action(runtime, connection, &frame).await,
        "property_update" => handle_property_update(runtime, connection, &frame).await,
        "state_update" => handle_state_update(runtime, connection, &frame).await,
        "event_emit" => handle_event_emit(runtime, connection, &frame),
        "sync_request" => handle_sync_request(runtime, connection, &frame),
        // liveness is tracked by the reader loop; nothing further to do
        "heartbeat_response" => {}
        other => {
            send_error(runtime, connection, &frame, ErrorKind::BadFrame, format!("unknown frame type `{other}`"));
        }
    }
}

/// Builds a reply frame correlated to `inbound` via `reply_to`/`request_id`.
fn reply_frame<C: Clock, G: IdGen + 'static>(
    runtime: &Runtime<C, G>,
    kind: &str,
    component_id: &str,
    inbound: &Message,
) -> Message {
    let mut message = runtime.frame(kind, component_id).with_reply_to(inbound.id.clone());
    message.request_id = inbound.request_id.clone();
    message
}

fn send_error<C: Clock, G: IdGen + 'static>(
    runtime: &Runtime<C, G>,
    connection: &Connection,
    inbound: &Message,
    kind: ErrorKind,
    detail: impl Into<String>,
) {
    let mut message = reply_frame(runtime, "error", &inbound.component_id, inbound);
    message.error = Some(kind.to_string());
    message.payload = error_payload(kind, detail, inbound.request_id.as_deref());
    // errors are always critical: they never drop from a full queue
    connection.enqueue(message, true);
}

/// The addressed component id, rejecting frames aimed at `system`.
fn component_id_of(frame: &Message) -> Option<ComponentId> {
    if frame.is_system() || frame.component_id.is_empty() {
        None
    } else {
        Some(ComponentId::from(frame.component_id.as_str()))
    }
}

fn handle_mount<C: Clock, G: IdGen + 'static>(
    runtime: &Arc<Runtime<C, G>>,
    connection: &Arc<Connection>,
    frame: &Message,
) {
    let Some(type_name) = frame.payload.get("component").and_then(Value::as_str) else {
        send_error(runtime, connection, frame, ErrorKind::BadFrame, "component_mount payload missing `component`");
        return;
    };
    let props = frame.payload.get("props").cloned().unwrap_or_else(|| json!({}));
    let parent_id = frame.payload.get("parent_id").and_then(Value::as_str).map(ComponentId::from);

    match runtime.mount(connection, type_name, props, parent_id) {
        Ok(outcome) => {
            let mut reply =
                reply_frame(runtime.as_ref(), "component_mounted", outcome.component_id.as_str(), frame)
                    .with_version(outcome.version);
            reply.payload = json!({
                "component_id": outcome.component_id.as_str(),
                "state": outcome.state,
                "version": outcome.version,
                "rebound": outcome.rebound,
            });
            connection.enqueue(reply, true);
        }
        Err(e) => send_error(runtime, connection, frame, registry_wire_kind(&e), e.to_string()),
    }
}

async fn handle_unmount<C: Clock, G: IdGen + 'static>(
    runtime: &Arc<Runtime<C, G>>,
    connection: &Arc<Connection>,
    frame: &Message,
) {
    let Some(component_id) = component_id_of(frame) else {
        send_error(runtime, connection, frame, ErrorKind::BadFrame, "component_unmount requires a component id");
        return;
    };
    if runtime.registry().instance(&component_id).is_none() {
        send_error(runtime, connection, frame, ErrorKind::ComponentNotFound, format!("component `{component_id}` not found"));
        return;
    }
    let reason = frame
        .payload
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or("client requested unmount")
        .to_string();

    connection.untrack_mount(&component_id);
    let unmounted = runtime.unmount(&component_id, &reason, Some(&connection.client_id)).await;

    let mut reply = reply_frame(runtime.as_ref(), "component_unmounted", component_id.as_str(), frame);
    reply.payload = json!({
        "component_id": component_id.as_str(),
        "reason": reason,
        "unmounted": unmounted.iter().map(|id| id.as_str()).collect::<Vec<_>>(),
    });
    connection.enqueue(reply, true);
}

async fn handle_call_action<C: Clock, G: IdGen + 'static>(
    runtime: &Arc<Runtime<C, G>>,
    connection: &Arc<Connection>,
    frame: &Message,
) {
    let Some(component_id) = component_id_of(frame) else {
        send_error(runtime, connection, frame, ErrorKind::BadFrame, "call_action requires a component id");
        return;
    };
    let action = frame
        .action
        .clone()
        .or_else(|| frame.payload.get("method").and_then(Value::as_str).map(String::from));
    let Some(action) = action else {
        send_error(runtime, connection, frame, ErrorKind::BadFrame, "call_action carries no action name");
        return;
    };
    let args = frame.payload.get("args").cloned().unwrap_or_else(|| frame.payload.clone());

    // per-instance critical section: handler execution and commit must not
    // interleave with another frame for the same component
    let lock = runtime.action_lock(&component_id);
    let _guard = lock.lock().await;

    let (behavior, prior_state) = match runtime.registry().action_context(&component_id) {
        Ok(ctx) => ctx,
        Err(e) => {
            send_error(runtime, connection, frame, registry_wire_kind(&e), e.to_string());
            return;
        }
    };

    let budget = Duration::from_millis(runtime.config().connection.action_timeout_ms);
    let handler = {
        let prior_state = prior_state.clone();
        let action = action.clone();
        tokio::task::spawn_blocking(move || behavior.call_action(&prior_state, &action, &args))
    };

    let outcome = match tokio::time::timeout(budget, handler).await {
        Err(_) => {
            // the handler keeps running on its blocking thread, but its
            // context is dropped here so nothing it computed can commit
            runtime.metrics().incr_counter("actions.timeout", 1);
            send_error(runtime, connection, frame, ErrorKind::ActionTimeout, format!("action `{action}` exceeded its budget"));
            return;
        }
        Ok(Err(join_err)) => {
            warn!(%component_id, action, error = %join_err, "action handler panicked");
            runtime.registry().mark_error(&component_id);
            send_error(runtime, connection, frame, ErrorKind::Internal, "action handler panicked");
            return;
        }
        Ok(Ok(Err(e))) => {
            send_error(runtime, connection, frame, registry_wire_kind(&e), e.to_string());
            return;
        }
        Ok(Ok(Ok(outcome))) => outcome,
    };

    match runtime.registry().commit_action(&component_id, &prior_state, outcome) {
        Ok(committed) => {
            runtime.cleanup().touch(&component_id);
            if committed.state_changed {
                runtime.broadcast_state_update(&component_id, &committed.state, committed.version, None, None);
                runtime.persist_snapshot(&component_id, &committed.state, committed.version);
                runtime.notify_dependents(&component_id);
            }
            if frame.request_id.is_some() {
                let mut reply = reply_frame(runtime.as_ref(), "method_result", component_id.as_str(), frame);
                reply.payload = json!({
                    "request_id": frame.request_id,
                    "value": committed.result.unwrap_or(Value::Null),
                });
                connection.enqueue(reply, true);
            }
        }
        Err(e) => send_error(runtime, connection, frame, registry_wire_kind(&e), e.to_string()),
    }
}

async fn handle_property_update<C: Clock, G: IdGen + 'static>(
    runtime: &Arc<Runtime<C, G>>,
    connection: &Arc<Connection>,
    frame: &Message,
) {
    let Some(component_id) = component_id_of(frame) else {
        send_error(runtime, connection, frame, ErrorKind::BadFrame, "property_update requires a component id");
        return;
    };
    let Some(property) = frame.property.clone() else {
        send_error(runtime, connection, frame, ErrorKind::BadFrame, "property_update carries no property path");
        return;
    };
    let value = frame.payload.get("value").cloned().unwrap_or(Value::Null);

    let lock = runtime.action_lock(&component_id);
    let _guard = lock.lock().await;

    match runtime.registry().set_property(&component_id, &property, value) {
        Ok(committed) => {
            runtime.cleanup().touch(&component_id);
            runtime.broadcast_state_update(&component_id, &committed.state, committed.version, None, None);
            runtime.persist_snapshot(&component_id, &committed.state, committed.version);
            runtime.notify_dependents(&component_id);
        }
        Err(e) => send_error(runtime, connection, frame, registry_wire_kind(&e), e.to_string()),
    }
}

async fn handle_state_update<C: Clock, G: IdGen + 'static>(
    runtime: &Arc<Runtime<C, G>>,
    connection: &Arc<Connection>,
    frame: &Message,
) {
    let Some(component_id) = component_id_of(frame) else {
        send_error(runtime, connection, frame, ErrorKind::BadFrame, "state_update requires a component id");
        return;
    };
    // parsed field-by-field: server-assigned fields (`origin_client_id`,
    // `version`, `prev_value`) are never taken from the client
    let op_kind: OpKind = match frame.payload.get("op").and_then(|v| serde_json::from_value(v.clone()).ok()) {
        Some(kind) => kind,
        None => {
            send_error(runtime, connection, frame, ErrorKind::BadFrame, "state_update payload missing a valid `op`");
            return;
        }
    };
    let Some(op_id) = frame.payload.get("op_id").and_then(Value::as_str) else {
        send_error(runtime, connection, frame, ErrorKind::BadFrame, "state_update payload missing `op_id`");
        return;
    };
    let path = frame.payload.get("path").and_then(Value::as_str).unwrap_or("");
    let value = frame.payload.get("value").cloned().unwrap_or(Value::Null);
    let timestamp = frame
        .payload
        .get("timestamp")
        .and_then(Value::as_u64)
        .unwrap_or_else(|| runtime.clock().now_ms());
    let mut op = StateOperation::new(
        OpId::new(op_id),
        component_id.clone(),
        op_kind,
        path,
        value,
        timestamp,
        connection.client_id.clone(),
    );
    if frame.payload.get("optimistic").and_then(Value::as_bool).unwrap_or(false) {
        op = op.optimistic();
    }

    if op.optimistic && !runtime.config().sync.enable_optimistic {
        send_error(runtime, connection, frame, ErrorKind::InvalidStateChange, "optimistic updates are disabled");
        return;
    }
    if runtime.registry().instance(&component_id).is_none() {
        send_error(runtime, connection, frame, ErrorKind::ComponentNotFound, format!("component `{component_id}` not found"));
        return;
    }

    let lock = runtime.action_lock(&component_id);
    let _guard = lock.lock().await;

    // redelivery of an already committed op confirms without re-applying
    let max_history = runtime.config().sync.max_history;
    let seen = runtime
        .sync()
        .history(&component_id, max_history)
        .iter()
        .any(|committed| committed.op_id == op.op_id);
    if seen {
        let version = runtime.sync().snapshot(&component_id).map(|(_, v)| v).unwrap_or(0);
        confirm_state_update(runtime, connection, frame, &op, version);
        return;
    }

    match runtime.sync().apply_remote(op.clone()) {
        Ok(commit) => {
            runtime.registry().touch(&component_id);
            runtime.cleanup().touch(&component_id);
            let version = commit.op.version.unwrap_or(0);
            confirm_state_update(runtime, connection, frame, &op, version);
            runtime.broadcast_state_update(
                &component_id,
                &commit.state,
                version,
                Some(&commit.op),
                Some(&connection.client_id),
            );
            runtime.persist_snapshot(&component_id, &commit.state, version);
            runtime.notify_dependents(&component_id);
            report_conflicts(runtime, connection, &component_id, &commit.conflicts);
        }
        Err(e) => {
            let mut message = reply_frame(runtime.as_ref(), "error", &frame.component_id, frame);
            let kind = sync_wire_kind(&e);
            message.error = Some(kind.to_string());
            message.payload = error_payload(kind, e.to_string(), frame.request_id.as_deref());
            message.payload["op_id"] = Value::String(op.op_id.as_str().to_string());
            connection.enqueue(message, true);
        }
    }
}

fn confirm_state_update<C: Clock, G: IdGen + 'static>(
    runtime: &Runtime<C, G>,
    connection: &Connection,
    frame: &Message,
    op: &StateOperation,
    version: u64,
) {
    let mut reply =
        reply_frame(runtime, "state_update_confirmed", frame.component_id.as_str(), frame).with_version(version);
    reply.payload = json!({ "op_id": op.op_id.as_str(), "version": version });
    connection.enqueue(reply, true);
}

fn report_conflicts<C: Clock, G: IdGen + 'static>(
    runtime: &Arc<Runtime<C, G>>,
    connection: &Connection,
    component_id: &ComponentId,
    conflicts: &[lcr_sync::Conflict],
) {
    for conflict in conflicts {
        let severity = match conflict.severity {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        runtime.metrics().incr_counter(&format!("conflicts.{severity}"), 1);
        match conflict.status {
            ConflictStatus::Resolved => {
                let mut notice = runtime.frame("conflict_resolved", component_id.as_str());
                notice.payload = serde_json::to_value(conflict).unwrap_or(Value::Null);
                for client_id in runtime.registry().subscribers_of(component_id) {
                    runtime.send_to(&client_id, notice.clone(), false);
                }
            }
            ConflictStatus::Pending => {
                // manual resolution required: tell the source connection once
                let manual = matches!(
                    runtime.config().sync.conflict_strategy,
                    ResolutionStrategy::Manual
                ) || conflict.severity == Severity::Critical;
                if manual {
                    let mut message = runtime.frame("error", component_id.as_str());
                    message.error = Some(ErrorKind::ConflictUnresolved.to_string());
                    message.payload = error_payload(
                        ErrorKind::ConflictUnresolved,
                        format!("conflict `{}` requires manual resolution", conflict.conflict_id),
                        None,
                    );
                    connection.enqueue(message, true);
                }
            }
            ConflictStatus::Failed | ConflictStatus::Ignored => {
                debug!(conflict_id = %conflict.conflict_id, status = ?conflict.status, "conflict left for diagnostics");
            }
        }
    }
}

fn parse_scope(payload: &Value) -> Option<Scope> {
    let scope = payload.get("scope")?;
    let Some(name) = scope.as_str() else {
        // structured form, e.g. {"subtree": {"max_depth": 2}}
        return serde_json::from_value(scope.clone()).ok();
    };
    Some(match name {
        "local" => Scope::Local,
        "parent" => Scope::Parent,
        "children" => Scope::Children,
        "descendants" => Scope::Descendants,
        "siblings" => Scope::Siblings,
        "ancestors" => Scope::Ancestors,
        "global" => Scope::Global,
        "subtree" => Scope::Subtree {
            max_depth: payload.get("max_depth").and_then(Value::as_u64).map(|d| d as usize),
        },
        custom => Scope::Custom(custom.to_string()),
    })
}

fn handle_event_emit<C: Clock, G: IdGen + 'static>(
    runtime: &Arc<Runtime<C, G>>,
    connection: &Arc<Connection>,
    frame: &Message,
) {
    let Some(source_id) = component_id_of(frame) else {
        send_error(runtime, connection, frame, ErrorKind::BadFrame, "event_emit requires a source component id");
        return;
    };
    let Some(name) = frame.payload.get("name").and_then(Value::as_str) else {
        send_error(runtime, connection, frame, ErrorKind::BadFrame, "event_emit payload missing `name`");
        return;
    };
    if runtime.registry().instance(&source_id).is_none() {
        send_error(runtime, connection, frame, ErrorKind::ComponentNotFound, format!("component `{source_id}` not found"));
        return;
    }

    let options = EmitOptions {
        scope: parse_scope(&frame.payload).unwrap_or(Scope::Local),
        priority: frame
            .payload
            .get("priority")
            .and_then(|v| serde_json::from_value::<Priority>(v.clone()).ok())
            .unwrap_or_default(),
        bubbles: frame.payload.get("bubbles").and_then(Value::as_bool).unwrap_or(false),
        cancelable: frame.payload.get("cancelable").and_then(Value::as_bool).unwrap_or(false),
    };
    let event_payload = frame.payload.get("payload").cloned().unwrap_or(Value::Null);

    let tree = runtime.tree();
    match runtime.events().emit(name, source_id.clone(), event_payload, options, &tree) {
        Ok(_) => {
            runtime.registry().touch(&source_id);
            runtime.metrics().incr_counter("events.emitted", 1);
        }
        Err(e) => send_error(runtime, connection, frame, event_wire_kind(&e), e.to_string()),
    }
}

fn handle_sync_request<C: Clock, G: IdGen + 'static>(
    runtime: &Arc<Runtime<C, G>>,
    connection: &Arc<Connection>,
    frame: &Message,
) {
    let Some(component_id) = component_id_of(frame) else {
        send_error(runtime, connection, frame, ErrorKind::BadFrame, "sync_request requires a component id");
        return;
    };
    let Some((state, version)) = runtime.sync().snapshot(&component_id) else {
        send_error(runtime, connection, frame, ErrorKind::ComponentNotFound, format!("component `{component_id}` not found"));
        return;
    };
    let client_version = frame.payload.get("current_version").and_then(Value::as_u64);
    debug!(%component_id, ?client_version, server_version = version, "sync_request");

    // a syncing client wants subsequent updates too
    let _ = runtime.registry().subscribe(&component_id, connection.client_id.clone());
    runtime.registry().touch(&component_id);
    runtime.cleanup().touch(&component_id);

    let mut reply = reply_frame(runtime.as_ref(), "sync_response", component_id.as_str(), frame).with_version(version);
    reply.payload = json!({
        "component_id": component_id.as_str(),
        "state": state,
        "version": version,
    });
    connection.enqueue(reply, true);
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
