// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use lcr_core::{ComponentId, ConflictId, OpId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Reserved top-level keys that always escalate a conflict to `critical`.
const CRITICAL_KEYS: [&str; 3] = ["id", "version", "type"];
/// Keys that escalate a conflict to `medium` unless already more severe.
const MEDIUM_KEYS: [&str; 3] = ["status", "state", "data"];

pub fn classify(conflicting_paths: &[String]) -> Severity {
    if conflicting_paths.iter().any(|p| CRITICAL_KEYS.contains(&p.as_str())) {
        Severity::Critical
    } else if conflicting_paths.len() > 5 {
        Severity::High
    } else if conflicting_paths.iter().any(|p| MEDIUM_KEYS.contains(&p.as_str())) {
        Severity::Medium
    } else {
        Severity::Low
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    Pending,
    Resolved,
    Failed,
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    LocalWins,
    GlobalWins,
    LastWriteWins,
    Merge,
    MergePriority,
    Manual,
    Custom(String),
}

/// Per-path override table for `ResolutionStrategy::MergePriority`: keys
/// listed in `local_keys` keep the pending optimistic value, everything else
/// takes the newly committed value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergePriorityPolicy {
    pub local_keys: HashSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub conflict_id: ConflictId,
    pub component_id: ComponentId,
    pub local_op: OpId,
    pub remote_op: OpId,
    pub conflicting_paths: Vec<String>,
    pub severity: Severity,
    pub status: ConflictStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_used: Option<ResolutionStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<u64>,
}

#[cfg(test)]
#[path = "conflict_tests.rs"]
mod tests;
