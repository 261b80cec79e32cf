// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One `Runtime` owns every subsystem for one process: the registry, the
//! sync engine, the event engine, the cleanup manager, and the live
//! connection table. There is no hidden global; tests build as many
//! independent runtimes as they like.

use crate::config::RuntimeConfig;
use crate::connection::{Connection, TransportState};
use crate::error::DaemonError;
use async_trait::async_trait;
use lcr_cleanup::{CleanupManager, CleanupTarget};
use lcr_core::{format_elapsed_ms, ClientId, Clock, ComponentId, IdGen};
use lcr_events::{ComponentTree, EmitOptions, EventEngine, Priority, Scope};
use lcr_observability::{DebugSnapshot, InstanceSnapshot, Issue, IssueKind, MetricsSink};
use lcr_registry::{ComponentType, MountOutcome, Registry, RegistryError};
use lcr_storage::PersistenceSink;
use lcr_sync::{StateOperation, SyncEngine};
use lcr_wire::Message;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Read-only view over the registry's hierarchy, handed to the event
/// engine's scope resolution and the cleanup manager's cascade, both of
/// which are deliberately ignorant of the concrete `Registry` type.
pub struct RegistryTree<C: Clock, G: IdGen + 'static> {
    registry: Arc<Registry<C, G>>,
}

impl<C: Clock, G: IdGen + 'static> ComponentTree for RegistryTree<C, G> {
    fn parent_of(&self, id: &ComponentId) -> Option<ComponentId> {
        self.registry.parent_of(id)
    }

    fn children_of(&self, id: &ComponentId) -> Vec<ComponentId> {
        self.registry.children_of(id)
    }

    fn all_ids(&self) -> Vec<ComponentId> {
        self.registry.component_ids()
    }
}

#[async_trait]
impl<C: Clock, G: IdGen + 'static> CleanupTarget for RegistryTree<C, G> {
    fn children_of(&self, id: &ComponentId) -> Vec<ComponentId> {
        self.registry.children_of(id)
    }

    fn detach_from_parent(&self, id: &ComponentId) {
        self.registry.detach_from_parent(id);
    }

    async fn teardown(&self, id: &ComponentId) {
        // children are already gone by the time the cascade reaches this
        // node, so the registry-level recursion is a no-op beyond `id`.
        self.registry.unmount(id, "cleanup");
    }
}

#[derive(Default)]
struct BroadcastState {
    last_sent_ms: Option<u64>,
    pending: Option<Message>,
    flush_scheduled: bool,
}

pub struct Runtime<C: Clock, G: IdGen + 'static> {
    config: RuntimeConfig,
    clock: C,
    id_gen: G,
    sync: Arc<SyncEngine<C, G>>,
    registry: Arc<Registry<C, G>>,
    events: Arc<EventEngine<C, G>>,
    cleanup: Arc<CleanupManager<C>>,
    metrics: Arc<dyn MetricsSink>,
    persistence: Arc<dyn PersistenceSink>,
    connections: RwLock<HashMap<ClientId, Arc<Connection>>>,
    /// Per-instance critical sections for action/state commits, so two
    /// frames for the same component can't interleave between "run
    /// handler" and "commit + broadcast".
    action_locks: Mutex<HashMap<ComponentId, Arc<tokio::sync::Mutex<()>>>>,
    /// Outbound `state_update` coalescing, keyed by component. Commits are
    /// never debounced; only their broadcasts are.
    broadcasts: Mutex<HashMap<ComponentId, BroadcastState>>,
    shutdown: Notify,
    /// Self-handle for the tasks this runtime spawns (grace timers,
    /// debounce flushes, background loops).
    weak_self: Weak<Self>,
}

impl<C: Clock, G: IdGen + 'static> Runtime<C, G> {
    pub fn new(
        clock: C,
        id_gen: G,
        config: RuntimeConfig,
        metrics: Arc<dyn MetricsSink>,
        persistence: Arc<dyn PersistenceSink>,
    ) -> Arc<Self> {
        // the connection group owns the reconnect grace knob; the cleanup
        // manager works from the same value.
        let mut cleanup_config = config.cleanup.clone();
        cleanup_config.grace_period_ms = config.connection.grace_period_ms;

        let sync = Arc::new(SyncEngine::new(clock.clone(), id_gen.clone(), config.sync.clone()));
        let registry = Arc::new(Registry::new(clock.clone(), id_gen.clone(), Arc::clone(&sync)));
        let events = Arc::new(EventEngine::new(clock.clone(), id_gen.clone(), config.events.clone()));
        let cleanup = Arc::new(CleanupManager::new(clock.clone(), cleanup_config, Arc::clone(&metrics)));

        // the update cascade targets "instances of types that depend on the
        // changed type", which no hierarchy scope expresses
        let registry_for_deps = Arc::clone(&registry);
        events.register_scope_resolver(
            "dependents",
            Arc::new(move |source: &ComponentId, _tree: &dyn ComponentTree| {
                let Some(instance) = registry_for_deps.instance(source) else {
                    return std::collections::HashSet::new();
                };
                registry_for_deps.cascade_dependents(&instance.type_name).into_iter().collect()
            }),
        );

        Arc::new_cyclic(|weak_self| Self {
            config,
            clock,
            id_gen,
            sync,
            registry,
            events,
            cleanup,
            metrics,
            persistence,
            connections: RwLock::new(HashMap::new()),
            action_locks: Mutex::new(HashMap::new()),
            broadcasts: Mutex::new(HashMap::new()),
            shutdown: Notify::new(),
            weak_self: weak_self.clone(),
        })
    }

    /// A strong handle to this runtime, for work that outlives the current
    /// call. `None` only while the last `Arc` is being dropped.
    fn handle(&self) -> Option<Arc<Self>> {
        self.weak_self.upgrade()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn registry(&self) -> &Arc<Registry<C, G>> {
        &self.registry
    }

    pub fn sync(&self) -> &Arc<SyncEngine<C, G>> {
        &self.sync
    }

    pub fn events(&self) -> &Arc<EventEngine<C, G>> {
        &self.events
    }

    pub fn cleanup(&self) -> &Arc<CleanupManager<C>> {
        &self.cleanup
    }

    pub fn metrics(&self) -> &Arc<dyn MetricsSink> {
        &self.metrics
    }

    pub fn register_type(&self, component_type: ComponentType) -> Result<(), RegistryError> {
        self.registry.register_type(component_type)
    }

    pub fn tree(&self) -> RegistryTree<C, G> {
        RegistryTree { registry: Arc::clone(&self.registry) }
    }

    /// Builds an outbound frame stamped with a fresh id and the current
    /// server time.
    pub fn frame(&self, kind: impl Into<String>, component_id: impl Into<String>) -> Message {
        Message::new(kind, component_id, self.id_gen.next(), self.clock.now_ms())
    }

    // ---- connections ----------------------------------------------------

    pub fn register_connection(&self) -> Result<Arc<Connection>, DaemonError> {
        let mut connections = self.connections.write();
        if connections.len() >= self.config.connection.max_connections {
            return Err(DaemonError::ConnectionLimit(self.config.connection.max_connections));
        }
        let client_id = ClientId::new(self.id_gen.next());
        let connection = Arc::new(Connection::new(
            client_id.clone(),
            self.config.connection.send_queue_size,
            self.clock.now_ms(),
        ));
        connections.insert(client_id, Arc::clone(&connection));
        drop(connections);
        self.metrics.incr_counter("connections.accepted", 1);
        Ok(connection)
    }

    pub fn connection(&self, client_id: &ClientId) -> Option<Arc<Connection>> {
        self.connections.read().get(client_id).cloned()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Tears down a connection's runtime presence. Components the closing
    /// connection was the last subscriber of are cleaned up after the
    /// reconnect grace period when the transport simply dropped
    /// (`with_grace`), immediately when the server terminated it for idle
    /// timeout or protocol abuse.
    pub async fn connection_closed(&self, connection: &Arc<Connection>, with_grace: bool) {
        connection.set_state(TransportState::Closed);
        self.connections.write().remove(&connection.client_id);
        self.metrics.incr_counter("connections.closed", 1);

        let orphaned = self.registry.remove_subscriber(&connection.client_id);
        if orphaned.is_empty() {
            return;
        }
        let Some(this) = self.handle() else { return };
        let grace_ms = if with_grace { self.config.connection.grace_period_ms } else { 0 };
        info!(
            client_id = %connection.client_id,
            orphaned = orphaned.len(),
            grace = %format_elapsed_ms(grace_ms),
            "connection closed, scheduling component cleanup"
        );
        for component_id in orphaned {
            let runtime = Arc::clone(&this);
            tokio::spawn(async move {
                if grace_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(grace_ms)).await;
                }
                // a reconnect may have rebound the instance in the meantime
                let rebound = runtime
                    .registry
                    .instance(&component_id)
                    .is_some_and(|i| !i.subscribers.is_empty());
                if rebound {
                    debug!(%component_id, "instance rebound during grace period, skipping cleanup");
                    return;
                }
                runtime.unmount(&component_id, "connection closed", None).await;
            });
        }
    }

    // ---- lifecycle ------------------------------------------------------

    pub fn mount(
        &self,
        connection: &Arc<Connection>,
        type_name: &str,
        props: Value,
        parent_id: Option<ComponentId>,
    ) -> Result<MountOutcome, RegistryError> {
        let outcome = self.registry.mount(connection.client_id.clone(), type_name, props, parent_id)?;
        if self.cleanup.is_registered(&outcome.component_id) {
            self.cleanup.touch(&outcome.component_id);
        } else {
            self.cleanup.register(outcome.component_id.clone(), 0);
        }
        connection.track_mount(outcome.component_id.clone());
        self.metrics.incr_counter("components.mounted", 1);
        Ok(outcome)
    }

    /// Unmounts `component_id` and its descendants through the cleanup
    /// manager (post-order, hooks, metrics) and drops all bookkeeping the
    /// runtime holds for the affected ids. Subscribers other than
    /// `notify_except` (the requester, which gets its own detailed reply)
    /// are told via a `component_unmounted` notice.
    pub async fn unmount(
        &self,
        component_id: &ComponentId,
        reason: &str,
        notify_except: Option<&ClientId>,
    ) -> Vec<ComponentId> {
        let subscribers: Vec<ClientId> = self
            .registry
            .subscribers_of(component_id)
            .into_iter()
            .filter(|c| Some(c) != notify_except)
            .collect();
        let tree = self.tree();
        let unmounted = match self.cleanup.unmount(component_id, &tree).await {
            Ok(ids) => ids,
            Err(e) => {
                debug!(%component_id, error = %e, "unmount skipped");
                return Vec::new();
            }
        };

        for id in &unmounted {
            self.action_locks.lock().remove(id);
            self.broadcasts.lock().remove(id);
            let connections = self.connections.read();
            for connection in connections.values() {
                connection.untrack_mount(id);
            }
        }

        if !unmounted.is_empty() {
            let mut notice = self.frame("component_unmounted", component_id.as_str());
            notice.payload = serde_json::json!({ "component_id": component_id.as_str(), "reason": reason });
            self.send_to_clients(&subscribers, notice, false);
        }
        unmounted
    }

    pub fn action_lock(&self, component_id: &ComponentId) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(
            self.action_locks
                .lock()
                .entry(component_id.clone())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    // ---- outbound -------------------------------------------------------

    pub fn send_to(&self, client_id: &ClientId, message: Message, critical: bool) {
        let Some(connection) = self.connection(client_id) else { return };
        if let Some(dropped) = connection.enqueue(message, critical) {
            warn!(%client_id, kind = %dropped.kind, "send queue overflow, dropped frame");
            self.metrics.incr_counter("send_queue.overflow", 1);
        }
    }

    fn send_to_clients(&self, client_ids: &[ClientId], message: Message, critical: bool) {
        for client_id in client_ids {
            self.send_to(client_id, message.clone(), critical);
        }
    }

    /// Broadcasts a committed state change to every subscriber of
    /// `component_id`, coalescing bursts within `sync.debounce_ms` into the
    /// latest snapshot. Versions stay strictly increasing per subscriber;
    /// debouncing can only skip intermediates, never reorder.
    pub fn broadcast_state_update(
        &self,
        component_id: &ComponentId,
        state: &Value,
        version: u64,
        op: Option<&StateOperation>,
        exclude: Option<&ClientId>,
    ) {
        let mut message = self.frame("state_update", component_id.as_str()).with_version(version);
        let mut payload = serde_json::json!({
            "component_id": component_id.as_str(),
            "state": state,
            "version": version,
        });
        if let Some(op) = op {
            payload["op"] = serde_json::to_value(op).unwrap_or(Value::Null);
        }
        message.payload = payload;

        let debounce_ms = self.config.sync.debounce_ms;
        let now = self.clock.now_ms();
        let mut broadcasts = self.broadcasts.lock();
        let entry = broadcasts.entry(component_id.clone()).or_default();
        let elapsed = entry.last_sent_ms.map(|last| now.saturating_sub(last));

        if debounce_ms == 0 || elapsed.is_none_or(|e| e >= debounce_ms) {
            entry.last_sent_ms = Some(now);
            drop(broadcasts);
            self.fan_out_state_update(component_id, message, exclude);
            return;
        }

        // burst: hold the latest frame and flush once the window closes
        if entry.pending.replace(message).is_some() {
            self.metrics.record_issue(
                Issue::new(IssueKind::ExcessiveUpdateFrequency, "state updates arriving faster than the debounce window", now)
                    .for_component(component_id.as_str()),
            );
        }
        if !entry.flush_scheduled {
            entry.flush_scheduled = true;
            let delay = debounce_ms - elapsed.unwrap_or(0);
            let Some(runtime) = self.handle() else { return };
            let component_id = component_id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                let pending = {
                    let mut broadcasts = runtime.broadcasts.lock();
                    match broadcasts.get_mut(&component_id) {
                        Some(entry) => {
                            entry.flush_scheduled = false;
                            entry.last_sent_ms = Some(runtime.clock.now_ms());
                            entry.pending.take()
                        }
                        None => None,
                    }
                };
                if let Some(message) = pending {
                    runtime.fan_out_state_update(&component_id, message, None);
                }
            });
        }
    }

    fn fan_out_state_update(&self, component_id: &ComponentId, message: Message, exclude: Option<&ClientId>) {
        let subscribers = self.registry.subscribers_of(component_id);
        for client_id in &subscribers {
            if Some(client_id) == exclude {
                continue;
            }
            self.send_to(client_id, message.clone(), false);
        }
    }

    /// Persists a committed snapshot through the pluggable sink,
    /// off-thread so a file-backed sink never stalls a connection task.
    pub fn persist_snapshot(&self, component_id: &ComponentId, state: &Value, version: u64) {
        let sink = Arc::clone(&self.persistence);
        let component_id = component_id.clone();
        let state = state.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = sink.save_snapshot(&component_id, &state, version) {
                warn!(%component_id, error = %e, "snapshot persist failed");
            }
        });
    }

    /// Update cascade: a state change on `component_id` notifies every live
    /// instance of a type that (transitively, depth-bounded) depends on this
    /// one's type, via an internal `dependency.updated` event.
    pub fn notify_dependents(&self, component_id: &ComponentId) {
        let Some(instance) = self.registry.instance(component_id) else { return };
        if self.registry.cascade_dependents(&instance.type_name).is_empty() {
            return;
        }
        let options = EmitOptions {
            scope: Scope::Custom("dependents".into()),
            priority: Priority::Normal,
            bubbles: false,
            cancelable: false,
        };
        let payload = serde_json::json!({
            "component_id": component_id.as_str(),
            "type": instance.type_name,
        });
        let tree = self.tree();
        if let Err(e) = self.events.emit("dependency.updated", component_id.clone(), payload, options, &tree) {
            debug!(%component_id, error = %e, "dependency cascade emit failed");
        }
    }

    // ---- events ---------------------------------------------------------

    /// Drains one batch from the event queue, invokes server-side
    /// subscribers, and forwards each surviving event to the connections
    /// subscribed to its target components as `broadcast` frames.
    pub fn pump_events(&self) -> usize {
        let batch = self.events.dispatch_batch(self.config.events.batch_size);
        for event in &batch {
            self.metrics.incr_counter("events.processed", 1);
            if event.cancelable && event.default_prevented {
                continue;
            }
            let Ok(scope) = serde_json::to_value(&event.scope) else { continue };
            for target in &event.target_component_ids {
                let mut message = self.frame("broadcast", target.as_str());
                message.payload = serde_json::json!({
                    "event_id": event.event_id.as_str(),
                    "name": event.name,
                    "scope": scope,
                    "source_component_id": event.source_component_id.as_str(),
                    "payload": event.payload,
                });
                let subscribers = self.registry.subscribers_of(target);
                self.send_to_clients(&subscribers, message, false);
            }
        }
        batch.len()
    }

    // ---- background tasks -----------------------------------------------

    /// Spawns the event pump and the periodic GC sweep. Both run until
    /// [`Runtime::begin_shutdown`].
    pub fn spawn_background(&self) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();
        let Some(this) = self.handle() else { return handles };

        let runtime = Arc::clone(&this);
        handles.push(tokio::spawn(async move {
            let batch_timeout = Duration::from_millis(runtime.config.events.batch_timeout_ms.max(1));
            loop {
                if runtime.events.queue_len() == 0 {
                    tokio::select! {
                        _ = runtime.events.notified() => {}
                        _ = runtime.shutdown.notified() => break,
                    }
                }
                // let a batch accumulate before draining
                tokio::select! {
                    _ = tokio::time::sleep(batch_timeout) => {}
                    _ = runtime.shutdown.notified() => break,
                }
                runtime.pump_events();
            }
        }));

        let runtime = this;
        handles.push(tokio::spawn(async move {
            let interval = Duration::from_millis(runtime.config.cleanup.gc_interval_ms.max(1));
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = runtime.shutdown.notified() => break,
                }
                runtime.gc_sweep().await;
            }
        }));

        handles
    }

    /// One GC cycle: stale instances, dead liveness flags, and optimistic
    /// ops that outlived their reconciliation budget.
    pub async fn gc_sweep(&self) {
        let tree = self.tree();
        let now = self.clock.now_ms();

        let stale = self.cleanup.idle_sweep(&tree).await;
        for component_id in &stale {
            self.metrics.record_issue(
                Issue::new(IssueKind::StaleStateDetected, "instance exceeded the idle threshold and was unmounted", now)
                    .for_component(component_id.as_str()),
            );
        }

        let collected = self.cleanup.collect_dead(&tree).await;
        let pending_budget =
            self.config.sync.conflict_resolution_delay_ms + self.config.events.processing_timeout_ms;
        let swept = self.sync.sweep(pending_budget);
        if !stale.is_empty() || !collected.is_empty() || swept > 0 {
            info!(stale = stale.len(), collected = collected.len(), pending_swept = swept, "gc sweep");
        }
    }

    pub fn begin_shutdown(&self) {
        self.shutdown.notify_waiters();
    }

    /// Process-shutdown path: stop background work and run every
    /// non-critical cleanup inside the hard emergency budget.
    pub async fn emergency_shutdown(&self) -> Vec<ComponentId> {
        self.begin_shutdown();
        let tree = self.tree();
        self.cleanup.emergency_shutdown(&tree).await
    }

    // ---- diagnostics ----------------------------------------------------

    pub fn debug_snapshot(&self) -> DebugSnapshot {
        let instances: Vec<InstanceSnapshot> = self
            .registry
            .instances()
            .into_iter()
            .map(|i| InstanceSnapshot {
                component_id: i.component_id.as_str().to_string(),
                type_name: i.type_name,
                depth: i.depth,
                version: self.sync.snapshot(&i.component_id).map(|(_, v)| v).unwrap_or(0),
                subscriber_count: i.subscribers.len(),
                child_count: i.child_ids.len(),
            })
            .collect();
        DebugSnapshot {
            instance_count: instances.len(),
            instances,
            captured_at_ms: self.clock.now_ms(),
        }
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
