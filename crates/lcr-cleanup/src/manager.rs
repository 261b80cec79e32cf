// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batches and executes teardown across five triggers: explicit unmount,
//! grace-delayed connection close, periodic idle sweep, collected
//! liveness flags, and an emergency shutdown with a hard wall-clock budget.

use crate::config::CleanupConfig;
use crate::error::CleanupError;
use crate::target::CleanupTarget;
use lcr_core::{Clock, ComponentId};
use lcr_observability::{Issue, IssueKind, MetricsSink};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A registered cleanup hook. Boxed rather than expressed as an
/// `async_trait` object so plain closures can be registered without an
/// intermediate wrapper type.
pub type CleanupHook = Arc<dyn Fn(ComponentId) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send>> + Send + Sync>;

/// Priority reserved for targets that must survive an emergency sweep and
/// finish their own graceful shutdown elsewhere.
pub const CRITICAL_PRIORITY: i32 = i32::MAX;

struct Target {
    priority: i32,
    registered_at_ms: u64,
    last_activity_at_ms: u64,
    hooks: Vec<CleanupHook>,
    liveness: Arc<AtomicBool>,
}

pub struct CleanupManager<C: Clock> {
    clock: C,
    config: CleanupConfig,
    targets: RwLock<HashMap<ComponentId, Target>>,
    in_progress: RwLock<HashSet<ComponentId>>,
    metrics: Arc<dyn MetricsSink>,
}

impl<C: Clock> CleanupManager<C> {
    pub fn new(clock: C, config: CleanupConfig, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            clock,
            config,
            targets: RwLock::new(HashMap::new()),
            in_progress: RwLock::new(HashSet::new()),
            metrics,
        }
    }

    pub fn config(&self) -> &CleanupConfig {
        &self.config
    }

    /// Registers `id` for cleanup tracking and returns its liveness flag.
    /// The owner flips the flag false when its underlying object goes away
    /// out-of-band; the next sweep treats that exactly like a collected
    /// weak reference.
    pub fn register(&self, id: ComponentId, priority: i32) -> Arc<AtomicBool> {
        let now = self.clock.now_ms();
        let liveness = Arc::new(AtomicBool::new(true));
        self.targets.write().insert(
            id,
            Target { priority, registered_at_ms: now, last_activity_at_ms: now, hooks: Vec::new(), liveness: liveness.clone() },
        );
        liveness
    }

    pub fn add_hook(&self, id: &ComponentId, hook: CleanupHook) {
        if let Some(target) = self.targets.write().get_mut(id) {
            target.hooks.push(hook);
        }
    }

    /// Bumps `last_activity_at_ms` so the idle sweep doesn't collect `id`.
    pub fn touch(&self, id: &ComponentId) {
        if let Some(target) = self.targets.write().get_mut(id) {
            target.last_activity_at_ms = self.clock.now_ms();
        }
    }

    pub fn liveness_of(&self, id: &ComponentId) -> Option<Arc<AtomicBool>> {
        self.targets.read().get(id).map(|t| t.liveness.clone())
    }

    pub fn is_registered(&self, id: &ComponentId) -> bool {
        self.targets.read().contains_key(id)
    }

    /// Unmounts `id` and its descendants, post-order: each node detaches
    /// from its parent before its own children are recursed into, runs its
    /// hooks, then is torn down through `tree`. Returns the unmounted ids in
    /// the order they were finalized (descendants before ancestors).
    pub async fn unmount(&self, id: &ComponentId, tree: &dyn CleanupTarget) -> Result<Vec<ComponentId>, CleanupError> {
        let mut unmounted = Vec::new();
        self.unmount_one(id, tree, &mut unmounted).await?;
        Ok(unmounted)
    }

    fn unmount_one<'a>(
        &'a self,
        id: &'a ComponentId,
        tree: &'a dyn CleanupTarget,
        unmounted: &'a mut Vec<ComponentId>,
    ) -> Pin<Box<dyn Future<Output = Result<(), CleanupError>> + Send + 'a>> {
        Box::pin(async move {
            if !self.in_progress.write().insert(id.clone()) {
                return Err(CleanupError::AlreadyInProgress(id.clone()));
            }

            tree.detach_from_parent(id);
            for child in tree.children_of(id) {
                // A child already mid-cleanup from another trigger is
                // skipped, not an error for the cascading parent.
                let _ = self.unmount_one(&child, tree, unmounted).await;
            }

            let start = self.clock.now_ms();
            self.run_hooks(id).await;
            tree.teardown(id).await;
            if let Some(target) = self.targets.write().remove(id) {
                target.liveness.store(false, Ordering::SeqCst);
            }
            self.in_progress.write().remove(id);

            self.metrics.incr_counter("cleanup.success", 1);
            self.metrics.observe_histogram("cleanup.duration_ms", self.clock.now_ms().saturating_sub(start) as f64);
            unmounted.push(id.clone());
            Ok(())
        })
    }

    async fn run_hooks(&self, id: &ComponentId) {
        let hooks = match self.targets.read().get(id) {
            Some(target) => target.hooks.clone(),
            None => return,
        };
        for hook in hooks {
            if let Err(error) = hook(id.clone()).await {
                self.metrics.incr_counter("cleanup.hook_failed", 1);
                self.metrics.record_issue(Issue::new(
                    IssueKind::MemoryLeakSuspicion,
                    format!("cleanup hook failed: {error}"),
                    self.clock.now_ms(),
                ).for_component(id.as_str()));
            }
        }
    }

    /// Connection-close trigger. Sleeps `grace_period_ms` (skip by passing
    /// `0` for an abnormal close), then unmounts `id` unless something else
    /// already reclaimed it in the meantime (liveness flag already false,
    /// or the target was already deregistered).
    pub async fn close_with_grace(&self, id: ComponentId, tree: &dyn CleanupTarget) -> Option<Vec<ComponentId>> {
        if self.config.grace_period_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.grace_period_ms)).await;
        }
        let live = self.liveness_of(&id)?;
        if !live.load(Ordering::SeqCst) {
            return None;
        }
        self.unmount(&id, tree).await.ok()
    }

    /// Idle sweep trigger: targets whose `last_activity_at_ms` exceeds
    /// `stale_threshold_ms`, batched to `max_batch`, priority descending
    /// then age descending (oldest first within a priority class).
    pub async fn idle_sweep(&self, tree: &dyn CleanupTarget) -> Vec<ComponentId> {
        let now = self.clock.now_ms();
        let batch = self.select_batch(|t| now.saturating_sub(t.last_activity_at_ms) > self.config.stale_threshold_ms);
        self.unmount_batch(batch, tree).await
    }

    /// Weak-reference collection trigger: targets whose liveness flag has
    /// already been flipped false by their owner.
    pub async fn collect_dead(&self, tree: &dyn CleanupTarget) -> Vec<ComponentId> {
        if !self.config.enable_weakref {
            return Vec::new();
        }
        let batch = self.select_batch(|t| !t.liveness.load(Ordering::SeqCst));
        self.unmount_batch(batch, tree).await
    }

    /// Emergency trigger: process shutdown. Runs every non-critical
    /// registered target's cleanup, bounded by `emergency_budget_ms`
    /// wall-clock regardless of how many targets remain when it elapses.
    pub async fn emergency_shutdown(&self, tree: &dyn CleanupTarget) -> Vec<ComponentId> {
        let ids: Vec<ComponentId> = {
            let targets = self.targets.read();
            let mut entries: Vec<_> =
                targets.iter().filter(|(_, t)| t.priority < CRITICAL_PRIORITY).map(|(id, t)| (id.clone(), t.priority)).collect();
            entries.sort_by(|a, b| b.1.cmp(&a.1));
            entries.into_iter().map(|(id, _)| id).collect()
        };

        let budget = Duration::from_millis(self.config.emergency_budget_ms);
        let run = async {
            let mut unmounted = Vec::new();
            for id in ids {
                if let Ok(mut done) = self.unmount(&id, tree).await {
                    unmounted.append(&mut done);
                }
            }
            unmounted
        };
        tokio::time::timeout(budget, run).await.unwrap_or_default()
    }

    fn select_batch(&self, predicate: impl Fn(&Target) -> bool) -> Vec<ComponentId> {
        let targets = self.targets.read();
        let in_progress = self.in_progress.read();
        let mut candidates: Vec<(ComponentId, i32, u64)> = targets
            .iter()
            .filter(|(id, t)| !in_progress.contains(*id) && predicate(t))
            .map(|(id, t)| (id.clone(), t.priority, t.registered_at_ms))
            .collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        candidates.into_iter().take(self.config.max_batch).map(|(id, _, _)| id).collect()
    }

    async fn unmount_batch(&self, batch: Vec<ComponentId>, tree: &dyn CleanupTarget) -> Vec<ComponentId> {
        let mut unmounted = Vec::new();
        for id in batch {
            if let Ok(mut done) = self.unmount(&id, tree).await {
                unmounted.append(&mut done);
            }
        }
        unmounted
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
