// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The on-the-wire frame shape and the enumerated error kinds carried inside
//! `error` frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sentinel used in `Message::component_id` for frames that address the
/// connection itself rather than a mounted component (welcome, heartbeat,
/// global error).
pub const SYSTEM_COMPONENT_ID: &str = "system";

/// One length-delimited JSON frame, in either direction.
///
/// Most fields are optional because a given `type` only populates the ones
/// it needs; `payload` carries the type-specific body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub component_id: String,
    pub timestamp: u64,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Message {
    /// Build a frame addressed to a component with an empty payload, filling
    /// `id`/`timestamp` from the given generator and clock.
    pub fn new(kind: impl Into<String>, component_id: impl Into<String>, id: String, timestamp_ms: u64) -> Self {
        Self {
            id,
            kind: kind.into(),
            component_id: component_id.into(),
            timestamp: timestamp_ms,
            payload: Value::Null,
            reply_to: None,
            request_id: None,
            version: None,
            action: None,
            property: None,
            error: None,
        }
    }

    pub fn system(kind: impl Into<String>, id: String, timestamp_ms: u64) -> Self {
        Self::new(kind, SYSTEM_COMPONENT_ID, id, timestamp_ms)
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn is_system(&self) -> bool {
        self.component_id == SYSTEM_COMPONENT_ID
    }
}

/// The enumerated `error.kind` values a frame can carry. Kept as a closed
/// enum (not a free string) so the multiplexer boundary is the only place
/// that stringifies an error for the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BadFrame,
    UnknownComponentType,
    ComponentNotFound,
    ActionFailed,
    ActionTimeout,
    InvalidStateChange,
    CyclicDependency,
    QueueOverflow,
    ConflictUnresolved,
    IdleTimeout,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::BadFrame => "bad_frame",
            ErrorKind::UnknownComponentType => "unknown_component_type",
            ErrorKind::ComponentNotFound => "component_not_found",
            ErrorKind::ActionFailed => "action_failed",
            ErrorKind::ActionTimeout => "action_timeout",
            ErrorKind::InvalidStateChange => "invalid_state_change",
            ErrorKind::CyclicDependency => "cyclic_dependency",
            ErrorKind::QueueOverflow => "queue_overflow",
            ErrorKind::ConflictUnresolved => "conflict_unresolved",
            ErrorKind::IdleTimeout => "idle_timeout",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{s}")
    }
}

/// Build an `error` frame body: `{ kind, message, request_id? }`.
pub fn error_payload(kind: ErrorKind, message: impl Into<String>, request_id: Option<&str>) -> Value {
    let mut obj = serde_json::json!({
        "kind": kind.to_string(),
        "message": message.into(),
    });
    if let Some(rid) = request_id {
        obj["request_id"] = Value::String(rid.to_string());
    }
    obj
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
