// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured diagnostic records: memory-leak suspicion, excessive update
//! frequency, stale-state detection. No component logic depends on their
//! delivery — they are purely advisory.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MemoryLeakSuspicion,
    ExcessiveUpdateFrequency,
    StaleStateDetected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub component_id: Option<String>,
    pub detail: String,
    pub at_ms: u64,
}

impl Issue {
    pub fn new(kind: IssueKind, detail: impl Into<String>, at_ms: u64) -> Self {
        Self { kind, component_id: None, detail: detail.into(), at_ms }
    }

    pub fn for_component(mut self, component_id: impl Into<String>) -> Self {
        self.component_id = Some(component_id.into());
        self
    }
}

#[cfg(test)]
#[path = "issue_tests.rs"]
mod tests;
