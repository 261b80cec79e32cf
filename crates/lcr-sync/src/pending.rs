// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::operation::StateOperation;

/// An optimistic op the engine has committed but not yet reconciled, kept
/// separate from the committed history ring so the sweep in
/// [`crate::engine::SyncEngine::sweep`] can find stale entries without
/// scanning it.
#[derive(Debug, Clone)]
pub struct PendingOptimisticOp {
    pub op: StateOperation,
    pub received_at_ms: u64,
}
