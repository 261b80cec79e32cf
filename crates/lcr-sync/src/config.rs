// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::conflict::{MergePriorityPolicy, ResolutionStrategy};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub enable_optimistic: bool,
    pub conflict_strategy: ResolutionStrategy,
    pub debounce_ms: u64,
    pub max_history: usize,
    /// Window within which a committed op and a pending optimistic op on
    /// overlapping paths are considered conflicting.
    pub conflict_tolerance_window_ms: u64,
    /// Delay before an auto-resolvable (non-critical) conflict is resolved.
    pub conflict_resolution_delay_ms: u64,
    pub merge_priority_policy: MergePriorityPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enable_optimistic: true,
            conflict_strategy: ResolutionStrategy::LastWriteWins,
            debounce_ms: 100,
            max_history: 50,
            conflict_tolerance_window_ms: 1000,
            conflict_resolution_delay_ms: 5000,
            merge_priority_policy: MergePriorityPolicy::default(),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
