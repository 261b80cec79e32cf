// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ties scope resolution, the priority queue, middleware, and subscriber
//! bookkeeping together. `emit` resolves targets and enqueues; `dispatch_batch`
//! drains the queue and invokes matching subscribers — kept as two steps so a
//! daemon accept loop can run its own pacing between them.

use crate::config::EventConfig;
use crate::error::EventError;
use crate::event::{EmitOptions, Event};
use crate::middleware::{run_pipeline, Middleware};
use crate::queue::EventQueue;
use crate::scope::{resolve_targets, CustomResolver};
use crate::subscription::{Subscription, SubscriptionOptions};
use crate::tree::ComponentTree;
use lcr_core::{Clock, ComponentId, EventId, IdGen, SubscriptionId};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

struct SubscriptionEntry {
    subscription: Subscription,
    filter: Option<Arc<dyn Fn(&Value) -> bool + Send + Sync>>,
    listener: Listener,
}

/// Owns the priority queue, subscriber registry, middleware stack, and
/// custom scope resolvers for one runtime. Knows nothing about the
/// component hierarchy beyond what callers hand it through `ComponentTree`.
pub struct EventEngine<C: Clock, G: IdGen> {
    clock: C,
    id_gen: G,
    config: EventConfig,
    queue: EventQueue,
    subscriptions: RwLock<HashMap<String, Vec<SubscriptionEntry>>>,
    middleware: RwLock<Vec<Middleware>>,
    scope_resolvers: RwLock<HashMap<String, CustomResolver>>,
    history: RwLock<VecDeque<Event>>,
}

impl<C: Clock, G: IdGen> EventEngine<C, G> {
    pub fn new(clock: C, id_gen: G, config: EventConfig) -> Self {
        let queue = EventQueue::new(config.max_queue, config.dead_letter);
        Self {
            clock,
            id_gen,
            config,
            queue,
            subscriptions: RwLock::new(HashMap::new()),
            middleware: RwLock::new(Vec::new()),
            scope_resolvers: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::new()),
        }
    }

    pub fn config(&self) -> &EventConfig {
        &self.config
    }

    pub fn use_middleware(&self, middleware: Middleware) {
        self.middleware.write().push(middleware);
    }

    pub fn register_scope_resolver(&self, name: impl Into<String>, resolver: CustomResolver) {
        self.scope_resolvers.write().insert(name.into(), resolver);
    }

    /// Registers `listener` against `event_name` for `component_id`. Entries
    /// are kept sorted by descending `priority` so higher-priority
    /// subscribers of the same event run first.
    pub fn subscribe(
        &self,
        component_id: ComponentId,
        event_name: impl Into<String>,
        options: SubscriptionOptions,
        listener: impl Fn(&Event) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let event_name = event_name.into();
        let subscription_id = SubscriptionId::new(self.id_gen.next());
        let subscription = Subscription {
            subscription_id: subscription_id.clone(),
            component_id,
            event_name: event_name.clone(),
            priority: options.priority,
            once: options.once,
            active: true,
        };
        let entry = SubscriptionEntry { subscription, filter: options.filter, listener: Arc::new(listener) };
        let mut subs = self.subscriptions.write();
        let list = subs.entry(event_name).or_default();
        list.push(entry);
        list.sort_by(|a, b| b.subscription.priority.cmp(&a.subscription.priority));
        subscription_id
    }

    pub fn unsubscribe(&self, subscription_id: &SubscriptionId) -> bool {
        let mut subs = self.subscriptions.write();
        for list in subs.values_mut() {
            if let Some(pos) = list.iter().position(|e| &e.subscription.subscription_id == subscription_id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Resolves `options.scope` against `tree`, runs the event through the
    /// middleware stack, records it to history, and enqueues it unless a
    /// middleware stopped it. Dispatch to subscribers happens later, via
    /// [`EventEngine::dispatch_batch`].
    pub fn emit(
        &self,
        name: impl Into<String>,
        source_component_id: ComponentId,
        payload: Value,
        options: EmitOptions,
        tree: &dyn ComponentTree,
    ) -> Result<Event, EventError> {
        let targets = {
            let resolvers = self.scope_resolvers.read();
            resolve_targets(&options.scope, &source_component_id, tree, &resolvers)?
        };

        let mut event = Event {
            event_id: EventId::new(self.id_gen.next()),
            name: name.into(),
            source_component_id,
            target_component_ids: targets,
            scope: options.scope,
            priority: options.priority,
            payload,
            bubbles: options.bubbles,
            cancelable: options.cancelable,
            stopped: false,
            default_prevented: false,
            timestamp: self.clock.now_ms(),
        };

        let middleware = self.middleware.read().clone();
        run_pipeline(&middleware, &mut event);

        self.push_history(event.clone());
        if !event.stopped {
            self.queue.push(event.clone());
        }
        Ok(event)
    }

    fn push_history(&self, event: Event) {
        let mut history = self.history.write();
        history.push_back(event);
        while history.len() > self.config.max_history {
            history.pop_front();
        }
    }

    /// Pops up to `max` queued events, in priority order, and invokes every
    /// active subscriber whose `event_name` matches and whose
    /// `component_id` is in the event's (possibly empty, meaning
    /// unrestricted) target set. A listener that panics is caught via
    /// `catch_unwind` so one bad subscriber can't drop the rest of the
    /// batch.
    pub fn dispatch_batch(&self, max: usize) -> Vec<Event> {
        let events = self.queue.pop_batch(max);
        for event in &events {
            self.dispatch_one(event);
        }
        events
    }

    fn dispatch_one(&self, event: &Event) {
        let mut subs = self.subscriptions.write();
        let Some(list) = subs.get_mut(&event.name) else { return };
        let mut to_remove = Vec::new();
        for (idx, entry) in list.iter().enumerate() {
            if !entry.subscription.active {
                continue;
            }
            if !event.target_component_ids.is_empty()
                && !event.target_component_ids.contains(&entry.subscription.component_id)
            {
                continue;
            }
            if let Some(filter) = &entry.filter {
                if !filter(&event.payload) {
                    continue;
                }
            }
            let listener = entry.listener.clone();
            let event_clone = event.clone();
            if catch_unwind(AssertUnwindSafe(|| listener(&event_clone))).is_err() {
                tracing::warn!(event_id = %event.event_id, "subscriber panicked during dispatch");
            }
            if entry.subscription.once {
                to_remove.push(idx);
            }
        }
        for idx in to_remove.into_iter().rev() {
            list.remove(idx);
        }
    }

    pub fn history(&self, limit: usize) -> Vec<Event> {
        let history = self.history.read();
        let len = history.len();
        let skip = len.saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }

    pub fn dead_letter(&self) -> Vec<Event> {
        self.queue.dead_letter()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub async fn notified(&self) {
        self.queue.notified().await;
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
