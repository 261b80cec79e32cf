// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::config::SyncConfig;
use crate::conflict::{self, Conflict, ConflictStatus, ResolutionStrategy, Severity};
use crate::error::SyncError;
use crate::operation::{self, StateOperation};
use crate::pending::PendingOptimisticOp;
use lcr_core::{Clock, ComponentId, ConflictId, IdGen};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Outcome of a successful commit: the op as it was recorded (with
/// server-assigned `version` and `prev_value` filled in) plus any conflicts
/// the commit raised against still-pending optimistic ops.
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub op: StateOperation,
    pub state: Value,
    pub conflicts: Vec<Conflict>,
}

struct Instance {
    state: Value,
    version: u64,
    history: VecDeque<StateOperation>,
    pending: Vec<PendingOptimisticOp>,
}

impl Instance {
    fn new(initial_state: Value) -> Self {
        Self {
            state: initial_state,
            version: 0,
            history: VecDeque::new(),
            pending: Vec::new(),
        }
    }
}

type CustomResolver = Arc<dyn Fn(&Value, &Value) -> Value + Send + Sync>;

/// Owns per-instance state, the authoritative commit protocol, and conflict
/// detection/resolution between committed and still-pending optimistic ops.
pub struct SyncEngine<C: Clock, G: IdGen> {
    clock: C,
    id_gen: G,
    config: SyncConfig,
    instances: RwLock<HashMap<ComponentId, Instance>>,
    conflicts: RwLock<Vec<Conflict>>,
    resolvers: RwLock<HashMap<String, CustomResolver>>,
}

impl<C: Clock, G: IdGen> SyncEngine<C, G> {
    pub fn new(clock: C, id_gen: G, config: SyncConfig) -> Self {
        Self {
            clock,
            id_gen,
            config,
            instances: RwLock::new(HashMap::new()),
            conflicts: RwLock::new(Vec::new()),
            resolvers: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn mount(&self, component_id: ComponentId, initial_state: Value) {
        self.instances.write().insert(component_id, Instance::new(initial_state));
    }

    pub fn unmount(&self, component_id: &ComponentId) {
        self.instances.write().remove(component_id);
    }

    pub fn register_custom_resolver(
        &self,
        name: impl Into<String>,
        resolver: impl Fn(&Value, &Value) -> Value + Send + Sync + 'static,
    ) {
        self.resolvers.write().insert(name.into(), Arc::new(resolver));
    }

    /// Commits an op that originated on the server itself (an action handler
    /// mutating its own component's state). Always authoritative; never
    /// checked against the pending-conflict ledger as the source side of a
    /// conflict, only as the target.
    pub fn apply_local(&self, mut op: StateOperation) -> Result<CommitOutcome, SyncError> {
        op.optimistic = false;
        self.commit(op)
    }

    /// Commits an op that arrived over the wire from a client. If tagged
    /// `optimistic`, it is tracked in the pending ledger until reconciled or
    /// swept.
    pub fn apply_remote(&self, op: StateOperation) -> Result<CommitOutcome, SyncError> {
        self.commit(op)
    }

    fn commit(&self, mut op: StateOperation) -> Result<CommitOutcome, SyncError> {
        let mut instances = self.instances.write();
        let instance = instances
            .entry(op.component_id.clone())
            .or_insert_with(|| Instance::new(Value::Object(serde_json::Map::new())));

        let before = instance.state.clone();
        let prev_value = operation::apply(&mut instance.state, &op)?;
        instance.version += 1;
        op.prev_value = Some(prev_value);
        op.version = Some(instance.version);

        let touched = operation::touched_keys(&op, &before);
        let now = self.clock.now_ms();
        let conflicts = self.detect_and_resolve(instance, &op, &touched, now);
        self.record_conflicts(conflicts.clone());

        instance.history.push_back(op.clone());
        while instance.history.len() > self.config.max_history {
            instance.history.pop_front();
        }

        if op.optimistic {
            instance.pending.push(PendingOptimisticOp { op: op.clone(), received_at_ms: now });
        }

        Ok(CommitOutcome { op, state: instance.state.clone(), conflicts })
    }

    fn detect_and_resolve(
        &self,
        instance: &mut Instance,
        committed: &StateOperation,
        touched: &[String],
        now: u64,
    ) -> Vec<Conflict> {
        let window = self.config.conflict_tolerance_window_ms;
        let mut resolved = Vec::new();
        let mut still_pending = Vec::new();
        let pending = std::mem::take(&mut instance.pending);

        for entry in pending {
            if entry.op.op_id == committed.op_id {
                still_pending.push(entry);
                continue;
            }
            let age = now.saturating_sub(entry.received_at_ms);
            let entry_touched = operation::touched_keys(&entry.op, &instance.state);
            let overlapping: Vec<String> =
                touched.iter().filter(|k| entry_touched.contains(*k)).cloned().collect();

            if age <= window && !overlapping.is_empty() {
                let conflict = self.resolve(instance, &entry, committed, overlapping, now);
                resolved.push(conflict);
            } else {
                still_pending.push(entry);
            }
        }

        instance.pending = still_pending;
        resolved
    }

    fn resolve(
        &self,
        instance: &mut Instance,
        local: &PendingOptimisticOp,
        remote: &StateOperation,
        conflicting_paths: Vec<String>,
        now: u64,
    ) -> Conflict {
        let severity = conflict::classify(&conflicting_paths);
        let strategy = self.config.conflict_strategy.clone();

        let (status, resolved_value, strategy_used) = if severity == Severity::Critical
            && strategy != ResolutionStrategy::Manual
        {
            (ConflictStatus::Pending, None, None)
        } else {
            self.apply_strategy(&strategy, instance, local, remote, &conflicting_paths)
        };

        if let Some(value) = resolved_value {
            for path in &conflicting_paths {
                let set_op = StateOperation::new(
                    local.op.op_id.clone(),
                    remote.component_id.clone(),
                    operation::OpKind::Set,
                    path.clone(),
                    value.clone(),
                    now,
                    remote.origin_client_id.clone(),
                );
                let _ = operation::apply(&mut instance.state, &set_op);
            }
            instance.version += 1;
        }

        Conflict {
            conflict_id: ConflictId::new(self.id_gen.next()),
            component_id: remote.component_id.clone(),
            local_op: local.op.op_id.clone(),
            remote_op: remote.op_id.clone(),
            conflicting_paths,
            severity,
            status,
            strategy_used,
            resolved_at: if status == ConflictStatus::Resolved { Some(now) } else { None },
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_strategy(
        &self,
        strategy: &ResolutionStrategy,
        instance: &Instance,
        local: &PendingOptimisticOp,
        remote: &StateOperation,
        conflicting_paths: &[String],
    ) -> (ConflictStatus, Option<Value>, Option<ResolutionStrategy>) {
        match strategy {
            ResolutionStrategy::LocalWins => {
                (ConflictStatus::Resolved, Some(local.op.value.clone()), Some(strategy.clone()))
            }
            ResolutionStrategy::GlobalWins => {
                (ConflictStatus::Resolved, Some(remote.value.clone()), Some(strategy.clone()))
            }
            ResolutionStrategy::LastWriteWins => {
                let value = if local.op.timestamp >= remote.timestamp {
                    local.op.value.clone()
                } else {
                    remote.value.clone()
                };
                (ConflictStatus::Resolved, Some(value), Some(strategy.clone()))
            }
            ResolutionStrategy::Merge | ResolutionStrategy::MergePriority => {
                let Some(path) = conflicting_paths.first() else {
                    return (ConflictStatus::Resolved, None, Some(strategy.clone()));
                };
                let local_side = value_at_op_path(&local.op, path);
                let global_side = instance
                    .state
                    .as_object()
                    .and_then(|m| m.get(path))
                    .cloned()
                    .unwrap_or(Value::Null);
                let merged = if matches!(strategy, ResolutionStrategy::MergePriority)
                    && self.config.merge_priority_policy.local_keys.contains(path)
                {
                    local_side
                } else {
                    merge_values(&global_side, &local_side)
                };
                (ConflictStatus::Resolved, Some(merged), Some(strategy.clone()))
            }
            ResolutionStrategy::Manual => (ConflictStatus::Pending, None, None),
            ResolutionStrategy::Custom(name) => {
                let resolvers = self.resolvers.read();
                match resolvers.get(name) {
                    Some(resolver) => (
                        ConflictStatus::Resolved,
                        Some(resolver(&remote.value, &local.op.value)),
                        Some(strategy.clone()),
                    ),
                    None => (ConflictStatus::Failed, None, Some(strategy.clone())),
                }
            }
        }
    }

    pub fn snapshot(&self, component_id: &ComponentId) -> Option<(Value, u64)> {
        let instances = self.instances.read();
        instances.get(component_id).map(|i| (i.state.clone(), i.version))
    }

    pub fn history(&self, component_id: &ComponentId, limit: usize) -> Vec<StateOperation> {
        let instances = self.instances.read();
        match instances.get(component_id) {
            Some(instance) => {
                let len = instance.history.len();
                let skip = len.saturating_sub(limit);
                instance.history.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    pub fn conflicts(&self) -> Vec<Conflict> {
        self.conflicts.read().clone()
    }

    fn record_conflicts(&self, mut new_conflicts: Vec<Conflict>) {
        self.conflicts.write().append(&mut new_conflicts);
    }

    /// Scans every instance's pending ledger for entries older than
    /// `timeout_ms` (the caller supplies `conflict_resolution_delay_ms +
    /// processing_timeout_ms`, combining this engine's config with the event
    /// engine's, since this crate has no dependency on the events crate) and
    /// moves them into the conflict ledger as `failed`.
    pub fn sweep(&self, timeout_ms: u64) -> usize {
        let now = self.clock.now_ms();
        let mut instances = self.instances.write();
        let mut swept = 0;
        let mut failed = Vec::new();

        for instance in instances.values_mut() {
            let mut still_pending = Vec::new();
            for entry in instance.pending.drain(..) {
                if now.saturating_sub(entry.received_at_ms) > timeout_ms {
                    swept += 1;
                    failed.push(Conflict {
                        conflict_id: ConflictId::new(self.id_gen.next()),
                        component_id: entry.op.component_id.clone(),
                        local_op: entry.op.op_id.clone(),
                        remote_op: entry.op.op_id.clone(),
                        conflicting_paths: vec![entry.op.path.clone()],
                        severity: Severity::Low,
                        status: ConflictStatus::Failed,
                        strategy_used: None,
                        resolved_at: None,
                    });
                } else {
                    still_pending.push(entry);
                }
            }
            instance.pending = still_pending;
        }
        drop(instances);
        self.record_conflicts(failed);
        swept
    }
}

/// Best-effort extraction of the value a pending op contributed at `path`,
/// without replaying it against a scratch state: exact path match returns
/// the op's value directly; a root-level merge looks up `path` inside it.
fn value_at_op_path(op: &StateOperation, path: &str) -> Value {
    if op.path == path {
        op.value.clone()
    } else if op.path.is_empty() {
        op.value.as_object().and_then(|m| m.get(path)).cloned().unwrap_or(Value::Null)
    } else {
        Value::Null
    }
}

fn merge_values(global: &Value, local: &Value) -> Value {
    match (global, local) {
        (Value::Object(g), Value::Object(l)) => {
            let mut merged = g.clone();
            for (k, v) in l {
                merged.insert(k.clone(), v.clone());
            }
            Value::Object(merged)
        }
        _ => local.clone(),
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
