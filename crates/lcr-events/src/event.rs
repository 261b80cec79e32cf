// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The hierarchical message the event engine queues, resolves, and
//! dispatches. `scope` decides *who* hears it (resolved once, at emit time,
//! into `target_component_ids`); `priority` decides *when*, relative to
//! other queued events.

use lcr_core::{ComponentId, EventId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Dispatch urgency. Declared ascending so the derived `Ord` puts `Critical`
/// at the top of the priority queue and `Low` at the bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// How a scope is expanded into a concrete target set; see
/// `crate::scope::resolve_targets`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Local,
    Parent,
    Children,
    Descendants,
    Siblings,
    Ancestors,
    Global,
    Subtree {
        #[serde(default)]
        max_depth: Option<usize>,
    },
    Custom(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: EventId,
    pub name: String,
    pub source_component_id: ComponentId,
    #[serde(default)]
    pub target_component_ids: HashSet<ComponentId>,
    pub scope: Scope,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub bubbles: bool,
    #[serde(default)]
    pub cancelable: bool,
    #[serde(default)]
    pub stopped: bool,
    #[serde(default)]
    pub default_prevented: bool,
    pub timestamp: u64,
}

impl Event {
    /// Sets `default_prevented` if the event is `cancelable`; a no-op
    /// otherwise, matching the client-visible `event.cancel()` contract.
    pub fn cancel(&mut self) {
        if self.cancelable {
            self.default_prevented = true;
        }
    }

    /// Halts the middleware pipeline and suppresses subscriber dispatch.
    pub fn stop(&mut self) {
        self.stopped = true;
    }
}

/// Caller-supplied knobs for one `emit` call; everything else about the
/// `Event` (id, timestamp, resolved targets) is filled in by the engine.
#[derive(Debug, Clone)]
pub struct EmitOptions {
    pub scope: Scope,
    pub priority: Priority,
    pub bubbles: bool,
    pub cancelable: bool,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self { scope: Scope::Local, priority: Priority::Normal, bubbles: false, cancelable: false }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
