// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use lcr_core::{ComponentId, SubscriptionId};
use serde_json::Value;
use std::sync::Arc;

/// Caller-supplied knobs for one `subscribe` call.
#[derive(Clone)]
pub struct SubscriptionOptions {
    /// Inspects the payload; a subscription only matches when this passes.
    pub filter: Option<Arc<dyn Fn(&Value) -> bool + Send + Sync>>,
    /// Higher values are invoked first among subscribers of the same event.
    pub priority: i32,
    /// Auto-unsubscribes after the first successful invocation.
    pub once: bool,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self { filter: None, priority: 0, once: false }
    }
}

/// The bookkeeping record for a registered listener; the listener closure
/// itself lives in `crate::engine::SubscriptionEntry`, kept out of the
/// public record since it can't implement `Clone`/`Debug` usefully.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub subscription_id: SubscriptionId,
    pub component_id: ComponentId,
    pub event_name: String,
    pub priority: i32,
    pub once: bool,
    pub active: bool,
}

#[cfg(test)]
#[path = "subscription_tests.rs"]
mod tests;
