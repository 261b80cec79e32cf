// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Point-in-time debug dumps. Constructed on demand by the registry; not
//! part of the wire protocol.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    pub component_id: String,
    pub type_name: String,
    pub depth: usize,
    pub version: u64,
    pub subscriber_count: usize,
    pub child_count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebugSnapshot {
    pub instance_count: usize,
    pub instances: Vec<InstanceSnapshot>,
    pub captured_at_ms: u64,
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
