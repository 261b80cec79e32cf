// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Component state is heterogeneous per registered type, which a
//! statically-typed table can't hold directly. [`ComponentBehavior`] is the
//! erased seam: state crosses it as `serde_json::Value`, and
//! [`TypedBehavior`] (built by [`crate::ComponentType::typed`]) does the
//! serde round-trip so callers write plain Rust types and closures.

use crate::error::RegistryError;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::marker::PhantomData;

/// Result of a successful action invocation: the (possibly unchanged) state
/// and an optional value to return to the caller as `method_result`.
#[derive(Debug)]
pub struct ActionOutcome {
    pub state: Value,
    pub result: Option<Value>,
}

pub trait ComponentBehavior: Send + Sync {
    fn initial_state(&self, props: &Value) -> Result<Value, RegistryError>;
    fn call_action(
        &self,
        state: &Value,
        action: &str,
        payload: &Value,
    ) -> Result<ActionOutcome, RegistryError>;
    fn on_mount(&self, _state: &Value) {}
    fn on_unmount(&self, _state: &Value) {}
}

type InitialStateFn<S, P> = Box<dyn Fn(&P) -> S + Send + Sync>;
type ActionFn<S, P, R> = Box<dyn Fn(&S, &str, &P) -> Result<(S, Option<R>), String> + Send + Sync>;
type MountHookFn<S> = Box<dyn Fn(&S) + Send + Sync>;

/// Adapts a typed `(State, Props, Result)` triple into the erased
/// [`ComponentBehavior`] the registry stores.
pub struct TypedBehavior<S, P, R> {
    initial_state: InitialStateFn<S, P>,
    action: ActionFn<S, P, R>,
    on_mount: Option<MountHookFn<S>>,
    on_unmount: Option<MountHookFn<S>>,
    _marker: PhantomData<fn() -> (S, P, R)>,
}

impl<S, P, R> TypedBehavior<S, P, R>
where
    S: Serialize + DeserializeOwned + Send + Sync + 'static,
    P: DeserializeOwned + Send + Sync + 'static,
    R: Serialize + Send + Sync + 'static,
{
    pub fn new(
        initial_state: impl Fn(&P) -> S + Send + Sync + 'static,
        action: impl Fn(&S, &str, &P) -> Result<(S, Option<R>), String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            initial_state: Box::new(initial_state),
            action: Box::new(action),
            on_mount: None,
            on_unmount: None,
            _marker: PhantomData,
        }
    }

    pub fn on_mount(mut self, hook: impl Fn(&S) + Send + Sync + 'static) -> Self {
        self.on_mount = Some(Box::new(hook));
        self
    }

    pub fn on_unmount(mut self, hook: impl Fn(&S) + Send + Sync + 'static) -> Self {
        self.on_unmount = Some(Box::new(hook));
        self
    }
}

impl<S, P, R> ComponentBehavior for TypedBehavior<S, P, R>
where
    S: Serialize + DeserializeOwned + Send + Sync + 'static,
    P: DeserializeOwned + Send + Sync + 'static,
    R: Serialize + Send + Sync + 'static,
{
    fn initial_state(&self, props: &Value) -> Result<Value, RegistryError> {
        let props: P = serde_json::from_value(props.clone())
            .map_err(|e| RegistryError::ActionFailed { action: "mount".into(), message: e.to_string() })?;
        let state = (self.initial_state)(&props);
        serde_json::to_value(state)
            .map_err(|e| RegistryError::ActionFailed { action: "mount".into(), message: e.to_string() })
    }

    fn call_action(
        &self,
        state: &Value,
        action: &str,
        payload: &Value,
    ) -> Result<ActionOutcome, RegistryError> {
        let typed_state: S = serde_json::from_value(state.clone())
            .map_err(|e| RegistryError::ActionFailed { action: action.into(), message: e.to_string() })?;
        let typed_payload: P = serde_json::from_value(payload.clone())
            .map_err(|e| RegistryError::ActionFailed { action: action.into(), message: e.to_string() })?;
        let (next_state, result) = (self.action)(&typed_state, action, &typed_payload)
            .map_err(|message| RegistryError::ActionFailed { action: action.into(), message })?;
        let state = serde_json::to_value(next_state)
            .map_err(|e| RegistryError::ActionFailed { action: action.into(), message: e.to_string() })?;
        let result = result
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| RegistryError::ActionFailed { action: action.into(), message: e.to_string() })?;
        Ok(ActionOutcome { state, result })
    }

    fn on_mount(&self, state: &Value) {
        if let (Some(hook), Ok(typed)) = (&self.on_mount, serde_json::from_value::<S>(state.clone())) {
            hook(&typed);
        }
    }

    fn on_unmount(&self, state: &Value) {
        if let (Some(hook), Ok(typed)) = (&self.on_unmount, serde_json::from_value::<S>(state.clone())) {
            hook(&typed);
        }
    }
}

#[cfg(test)]
#[path = "behavior_tests.rs"]
mod tests;
