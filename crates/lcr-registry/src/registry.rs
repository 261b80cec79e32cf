// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::component_type::{ComponentType, DependencyKind};
use crate::error::RegistryError;
use crate::graph::{component_edges, find_cycle};
use crate::instance::{ComponentInstance, LifecycleState};
use lcr_core::{ids, ClientId, Clock, ComponentId, IdGen};
use lcr_sync::{OpKind, StateOperation, SyncEngine};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::warn;

/// Maximum hops the `dependency.updated` cascade will traverse before
/// stopping, so a dense dependency graph can't runaway-propagate.
pub const MAX_CASCADE_DEPTH: usize = 10;

#[derive(Debug, Clone)]
pub struct MountOutcome {
    pub component_id: ComponentId,
    pub state: Value,
    pub version: u64,
    pub rebound: bool,
}

#[derive(Debug, Clone)]
pub struct ActionCallOutcome {
    pub state_changed: bool,
    pub state: Value,
    pub version: u64,
    pub result: Option<Value>,
}

pub struct Registry<C: Clock, G: IdGen> {
    clock: C,
    id_gen: G,
    sync: Arc<SyncEngine<C, G>>,
    types: RwLock<HashMap<String, ComponentType>>,
    instances: RwLock<HashMap<ComponentId, ComponentInstance>>,
    /// `identity_hash` (type+props+parent) -> the currently live
    /// `component_id` minted for it, so a reconnect's fresh `mount` call can
    /// find the instance it should rebind to instead of minting a new id.
    identity_index: RwLock<HashMap<String, ComponentId>>,
}

impl<C: Clock, G: IdGen> Registry<C, G> {
    pub fn new(clock: C, id_gen: G, sync: Arc<SyncEngine<C, G>>) -> Self {
        Self {
            clock,
            id_gen,
            sync,
            types: RwLock::new(HashMap::new()),
            instances: RwLock::new(HashMap::new()),
            identity_index: RwLock::new(HashMap::new()),
        }
    }

    pub fn register_type(&self, component_type: ComponentType) -> Result<(), RegistryError> {
        let mut types = self.types.write();
        if types.contains_key(&component_type.name) {
            return Err(RegistryError::DuplicateType(component_type.name));
        }
        let name = component_type.name.clone();
        types.insert(name.clone(), component_type);
        let edges = component_edges(types.values());
        if let Some(cycle_at) = find_cycle(&edges) {
            types.remove(&name);
            return Err(RegistryError::CyclicDependency(cycle_at));
        }
        Ok(())
    }

    fn has_live_instance_of(&self, type_name: &str) -> bool {
        self.instances.read().values().any(|i| i.type_name == type_name)
    }

    pub fn mount(
        &self,
        client_id: ClientId,
        type_name: &str,
        props: Value,
        parent_id: Option<ComponentId>,
    ) -> Result<MountOutcome, RegistryError> {
        let types = self.types.read();
        let component_type = types
            .get(type_name)
            .ok_or_else(|| RegistryError::UnknownComponentType(type_name.to_string()))?
            .clone();
        drop(types);

        for dep in &component_type.dependencies {
            if dep.kind == DependencyKind::Component
                && dep.required
                && dep.resolution == crate::component_type::DependencyResolution::Immediate
                && !self.has_live_instance_of(&dep.target_type)
            {
                return Err(RegistryError::MissingRequiredDependency(dep.target_type.clone()));
            }
        }

        let parent_snapshot = match &parent_id {
            Some(pid) => {
                let instances = self.instances.read();
                let parent = instances.get(pid).ok_or_else(|| RegistryError::ParentNotFound(pid.clone()))?;
                Some((parent.component_id.clone(), parent.path.clone(), parent.depth))
            }
            None => None,
        };

        let hash36 = ids::identity_hash(type_name, &props, parent_id.as_ref());
        let existing_id = self.identity_index.read().get(&hash36).cloned();

        if let Some(existing_id) = existing_id {
            let mut instances = self.instances.write();
            if let Some(existing) = instances.get_mut(&existing_id) {
                if existing.lifecycle == LifecycleState::Unmounting {
                    existing.client_id = client_id.clone();
                    existing.subscribers.insert(client_id);
                    existing.lifecycle = LifecycleState::Ready;
                    existing.touch(self.clock.now_ms());
                    let (state, version) =
                        self.sync.snapshot(&existing_id).unwrap_or((Value::Null, 0));
                    return Ok(MountOutcome { component_id: existing_id, state, version, rebound: true });
                }
            }
        }

        let now = self.clock.now_ms();
        let component_id = ids::make_component_id(
            type_name,
            &props,
            parent_id.as_ref(),
            parent_snapshot.as_ref().map(|(pid, _, _)| pid.as_str()),
            now,
            None,
        );
        let instance_id = ids::make_instance_id(&component_id, &self.id_gen);
        let initial_state = component_type.behavior.initial_state(&props)?;
        let fingerprint = ids::fingerprint(type_name, &props, &initial_state);
        let depth = parent_snapshot.as_ref().map(|(_, _, d)| d + 1).unwrap_or(0);
        let path = match &parent_snapshot {
            Some((_, parent_path, _)) => format!("{parent_path}.{}", ids::type_slug(type_name)),
            None => ids::type_slug(type_name),
        };

        self.sync.mount(component_id.clone(), initial_state.clone());
        component_type.behavior.on_mount(&initial_state);

        let mut subscribers = HashSet::new();
        subscribers.insert(client_id.clone());
        let instance = ComponentInstance {
            instance_id,
            component_id: component_id.clone(),
            type_name: type_name.to_string(),
            client_id,
            parent_id: parent_id.clone(),
            child_ids: HashSet::new(),
            depth,
            path,
            props,
            created_at: now,
            last_activity_at: now,
            fingerprint,
            identity_hash: hash36.clone(),
            subscribers,
            lifecycle: LifecycleState::Initializing,
        };

        let mut instances = self.instances.write();
        instances.insert(component_id.clone(), instance);
        if let Some(pid) = &parent_id {
            if let Some(parent) = instances.get_mut(pid) {
                parent.child_ids.insert(component_id.clone());
            }
        }
        if let Some(instance) = instances.get_mut(&component_id) {
            instance.lifecycle = LifecycleState::Ready;
        }
        drop(instances);
        self.identity_index.write().insert(hash36, component_id.clone());

        Ok(MountOutcome { component_id, state: initial_state, version: 0, rebound: false })
    }

    /// Looks up the behavior vtable and current state for an action call,
    /// without invoking anything. Callers that need to bound handler
    /// execution (the daemon's 5-second action budget) run the handler
    /// themselves and feed the result back through
    /// [`Registry::commit_action`]; a handler that never returns then never
    /// commits, leaving state untouched.
    pub fn action_context(
        &self,
        component_id: &ComponentId,
    ) -> Result<(Arc<dyn crate::ComponentBehavior>, Value), RegistryError> {
        let behavior = {
            let instances = self.instances.read();
            let instance = instances
                .get(component_id)
                .ok_or_else(|| RegistryError::ComponentNotFound(component_id.clone()))?;
            let types = self.types.read();
            let component_type = types
                .get(&instance.type_name)
                .ok_or_else(|| RegistryError::UnknownComponentType(instance.type_name.clone()))?;
            component_type.behavior.clone()
        };
        let (prior_state, _) = self
            .sync
            .snapshot(component_id)
            .ok_or_else(|| RegistryError::ComponentNotFound(component_id.clone()))?;
        Ok((behavior, prior_state))
    }

    /// Commits the outcome of an action handler run via
    /// [`Registry::action_context`]: a synthetic root `set` op with a
    /// version bump when the state changed, a touch-only no-op otherwise.
    pub fn commit_action(
        &self,
        component_id: &ComponentId,
        prior_state: &Value,
        outcome: crate::ActionOutcome,
    ) -> Result<ActionCallOutcome, RegistryError> {
        if &outcome.state == prior_state {
            self.touch(component_id);
            return Ok(ActionCallOutcome {
                state_changed: false,
                state: prior_state.clone(),
                version: self.sync.snapshot(component_id).map(|(_, v)| v).unwrap_or(0),
                result: outcome.result,
            });
        }

        let op = StateOperation::new(
            lcr_core::OpId::new(self.id_gen.next()),
            component_id.clone(),
            OpKind::Set,
            "",
            outcome.state,
            self.clock.now_ms(),
            ClientId::from("system"),
        );
        self.set_lifecycle(component_id, LifecycleState::Updating);
        let commit = match self.sync.apply_local(op) {
            Ok(commit) => commit,
            Err(e) => {
                // the commit aborted; the instance is still usable
                self.set_lifecycle(component_id, LifecycleState::Ready);
                return Err(e.into());
            }
        };
        self.set_lifecycle(component_id, LifecycleState::Ready);
        self.touch(component_id);

        Ok(ActionCallOutcome {
            state_changed: true,
            state: commit.state,
            version: commit.op.version.unwrap_or(0),
            result: outcome.result,
        })
    }

    fn set_lifecycle(&self, component_id: &ComponentId, lifecycle: LifecycleState) {
        if let Some(instance) = self.instances.write().get_mut(component_id) {
            instance.lifecycle = lifecycle;
        }
    }

    /// Synchronous action invocation: look up, run, commit. Callers that
    /// need a handler execution budget use [`Registry::action_context`] /
    /// [`Registry::commit_action`] directly.
    pub fn call_action(
        &self,
        component_id: &ComponentId,
        action_name: &str,
        payload: Value,
    ) -> Result<ActionCallOutcome, RegistryError> {
        let (behavior, prior_state) = self.action_context(component_id)?;
        let outcome = behavior.call_action(&prior_state, action_name, &payload)?;
        self.commit_action(component_id, &prior_state, outcome)
    }

    pub fn set_property(
        &self,
        component_id: &ComponentId,
        path: &str,
        value: Value,
    ) -> Result<ActionCallOutcome, RegistryError> {
        if !self.instances.read().contains_key(component_id) {
            return Err(RegistryError::ComponentNotFound(component_id.clone()));
        }
        let op = StateOperation::new(
            lcr_core::OpId::new(self.id_gen.next()),
            component_id.clone(),
            OpKind::Set,
            path,
            value,
            self.clock.now_ms(),
            ClientId::from("system"),
        );
        let commit = self.sync.apply_local(op)?;
        self.touch(component_id);
        Ok(ActionCallOutcome {
            state_changed: true,
            state: commit.state,
            version: commit.op.version.unwrap_or(0),
            result: None,
        })
    }

    /// Bumps `last_activity_at` so the idle sweep doesn't collect an
    /// instance a client is still talking to.
    pub fn touch(&self, component_id: &ComponentId) {
        let now = self.clock.now_ms();
        if let Some(instance) = self.instances.write().get_mut(component_id) {
            instance.touch(now);
        }
    }

    /// Adds `client_id` as a subscriber of `component_id`, so subsequent
    /// `state_update` broadcasts reach it.
    pub fn subscribe(&self, component_id: &ComponentId, client_id: ClientId) -> Result<(), RegistryError> {
        let mut instances = self.instances.write();
        let instance = instances
            .get_mut(component_id)
            .ok_or_else(|| RegistryError::ComponentNotFound(component_id.clone()))?;
        instance.subscribers.insert(client_id);
        Ok(())
    }

    pub fn subscribers_of(&self, component_id: &ComponentId) -> Vec<ClientId> {
        self.instances
            .read()
            .get(component_id)
            .map(|i| i.subscribers.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drops `client_id` from every instance's subscriber set. Instances
    /// left with no subscribers move to `Unmounting` (the grace-period
    /// state a reconnecting mount can rebind out of) and are returned so
    /// the caller can schedule their grace-delayed cleanup.
    pub fn remove_subscriber(&self, client_id: &ClientId) -> Vec<ComponentId> {
        let mut orphaned = Vec::new();
        let mut instances = self.instances.write();
        for instance in instances.values_mut() {
            if instance.subscribers.remove(client_id) && instance.subscribers.is_empty() {
                instance.lifecycle = LifecycleState::Unmounting;
                orphaned.push(instance.component_id.clone());
            }
        }
        orphaned
    }

    /// Moves `component_id` to the terminal `Error` substate after an
    /// internal failure. The instance stays in the table (still eligible
    /// for cleanup) but a rebinding mount will no longer reclaim it.
    pub fn mark_error(&self, component_id: &ComponentId) {
        self.set_lifecycle(component_id, LifecycleState::Error);
    }

    pub fn parent_of(&self, component_id: &ComponentId) -> Option<ComponentId> {
        self.instances.read().get(component_id).and_then(|i| i.parent_id.clone())
    }

    pub fn children_of(&self, component_id: &ComponentId) -> Vec<ComponentId> {
        self.instances
            .read()
            .get(component_id)
            .map(|i| i.child_ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Detaches `component_id` from its parent's child set without tearing
    /// anything down; the cleanup manager calls this at the top of a
    /// cascade so a half-collected subtree never dangles off a live parent.
    pub fn detach_from_parent(&self, component_id: &ComponentId) {
        let parent_id = self.parent_of(component_id);
        if let Some(pid) = parent_id {
            if let Some(parent) = self.instances.write().get_mut(&pid) {
                parent.child_ids.remove(component_id);
            }
        }
    }

    pub fn instances(&self) -> Vec<ComponentInstance> {
        self.instances.read().values().cloned().collect()
    }

    /// Unmounts `component_id` and, depth-first post-order, every
    /// descendant. Returns the component ids that were actually unmounted.
    pub fn unmount(&self, component_id: &ComponentId, reason: &str) -> Vec<ComponentId> {
        let children: Vec<ComponentId> = self
            .instances
            .read()
            .get(component_id)
            .map(|i| i.child_ids.iter().cloned().collect())
            .unwrap_or_default();

        let mut unmounted = Vec::new();
        for child in children {
            unmounted.extend(self.unmount(&child, reason));
        }

        let removed = self.instances.write().remove(component_id);
        let Some(instance) = removed else {
            return unmounted;
        };

        if let Some((state, _)) = self.sync.snapshot(component_id) {
            let types = self.types.read();
            if let Some(component_type) = types.get(&instance.type_name) {
                component_type.behavior.on_unmount(&state);
            }
        }

        if let Some(parent_id) = &instance.parent_id {
            if let Some(parent) = self.instances.write().get_mut(parent_id) {
                parent.child_ids.remove(component_id);
            }
        }

        self.sync.unmount(component_id);
        {
            let mut index = self.identity_index.write();
            if index.get(&instance.identity_hash) == Some(component_id) {
                index.remove(&instance.identity_hash);
            }
        }
        warn!(target: "lcr_registry", %component_id, reason, "unmounted");
        unmounted.push(component_id.clone());
        unmounted
    }

    pub fn instance(&self, component_id: &ComponentId) -> Option<ComponentInstance> {
        self.instances.read().get(component_id).cloned()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.read().len()
    }

    /// Every currently mounted component id, for adapters that need to walk
    /// the whole tree (e.g. resolving a `global` event scope).
    pub fn component_ids(&self) -> Vec<ComponentId> {
        self.instances.read().keys().cloned().collect()
    }

    /// BFS over the type-level `component` dependency graph starting from
    /// `changed_type`, returning the live instances of every dependent type
    /// reached within `MAX_CASCADE_DEPTH` hops.
    pub fn cascade_dependents(&self, changed_type: &str) -> Vec<ComponentId> {
        let types = self.types.read();
        let mut dependents_of: HashMap<&str, Vec<&str>> = HashMap::new();
        for ct in types.values() {
            for dep in &ct.dependencies {
                if dep.kind == DependencyKind::Component {
                    dependents_of.entry(dep.target_type.as_str()).or_default().push(ct.name.as_str());
                }
            }
        }

        let mut frontier = vec![changed_type.to_string()];
        let mut seen_types = HashSet::new();
        let mut result = Vec::new();
        for _ in 0..MAX_CASCADE_DEPTH {
            if frontier.is_empty() {
                break;
            }
            let mut next = Vec::new();
            for t in &frontier {
                if let Some(deps) = dependents_of.get(t.as_str()) {
                    for d in deps {
                        if seen_types.insert(d.to_string()) {
                            next.push(d.to_string());
                        }
                    }
                }
            }
            frontier = next;
        }

        let instances = self.instances.read();
        for instance in instances.values() {
            if seen_types.contains(&instance.type_name) {
                result.push(instance.component_id.clone());
            }
        }
        result
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
