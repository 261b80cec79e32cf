// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use lcr_cleanup::CleanupConfig;
use lcr_events::EventConfig;
use lcr_sync::SyncConfig;
use serde::{Deserialize, Serialize};

/// Knobs owned by the connection multiplexer. The reconnect grace period
/// lives here (not in [`CleanupConfig`]) because it is a property of how
/// connections close; [`crate::Runtime::new`] copies it into the cleanup
/// manager's config so both subsystems agree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub heartbeat_interval_ms: u64,
    /// Close the connection if no inbound frame arrives for this long.
    pub idle_timeout_ms: u64,
    pub grace_period_ms: u64,
    pub max_connections: usize,
    /// Bound on each connection's outbound queue. When full, the oldest
    /// non-critical frame is dropped; critical frames never drop.
    pub send_queue_size: usize,
    /// Budget for one action handler invocation.
    pub action_timeout_ms: u64,
    /// More than `max_parse_errors` bad frames inside
    /// `parse_error_window_ms` terminates the connection.
    pub max_parse_errors: usize,
    pub parse_error_window_ms: u64,
    /// How long a closing connection may keep draining queued replies.
    pub drain_grace_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 30_000,
            idle_timeout_ms: 90_000,
            grace_period_ms: 30_000,
            max_connections: 1000,
            send_queue_size: 256,
            action_timeout_ms: 5_000,
            max_parse_errors: 10,
            parse_error_window_ms: 10_000,
            drain_grace_ms: 2_000,
        }
    }
}

/// Everything one runtime instance is configured by, grouped the way the
/// wire-level configuration keys are grouped. Constructed in-process; the
/// struct is `Deserialize` so an embedding application can load it from
/// TOML/JSON with its own tooling, but the runtime itself never reads files
/// or environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub connection: ConnectionConfig,
    pub cleanup: CleanupConfig,
    pub sync: SyncConfig,
    pub events: EventConfig,
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
