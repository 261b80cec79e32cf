// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use lcr_core::{ClientId, ComponentId, InstanceId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Creating,
    Initializing,
    Ready,
    Updating,
    Unmounting,
    Destroyed,
    Error,
}

/// The live object the registry tracks for one mount. State and version
/// live in `lcr_sync::SyncEngine`, keyed by the same `component_id`, so this
/// struct only holds topology, ownership, and lifecycle bookkeeping.
#[derive(Debug, Clone)]
pub struct ComponentInstance {
    pub instance_id: InstanceId,
    pub component_id: ComponentId,
    pub type_name: String,
    pub client_id: ClientId,
    pub parent_id: Option<ComponentId>,
    pub child_ids: HashSet<ComponentId>,
    pub depth: usize,
    pub path: String,
    pub props: Value,
    pub created_at: u64,
    pub last_activity_at: u64,
    pub fingerprint: String,
    /// `identity_hash(type, props, parent_id)`; the key this instance is
    /// filed under in the registry's reconnect index.
    pub identity_hash: String,
    pub subscribers: HashSet<ClientId>,
    pub lifecycle: LifecycleState,
}

impl ComponentInstance {
    pub fn touch(&mut self, now_ms: u64) {
        self.last_activity_at = now_ms;
    }
}
