// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::behavior::{ComponentBehavior, TypedBehavior};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    Component,
    Service,
    State,
    Event,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyResolution {
    Immediate,
    Lazy,
    Conditional,
    Async,
}

#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct DependencyDecl {
    pub target_type: String,
    pub kind: DependencyKind,
    pub required: bool,
    pub resolution: DependencyResolution,
}

impl DependencyDecl {
    pub fn new(target_type: impl Into<String>, kind: DependencyKind) -> Self {
        Self { target_type: target_type.into(), kind, required: true, resolution: DependencyResolution::Immediate }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn resolution(mut self, resolution: DependencyResolution) -> Self {
        self.resolution = resolution;
        self
    }
}

/// A registered template: the behavior vtable plus declared dependencies.
/// `name` is the registry's lookup key; component_id hashing uses it too
/// (see `lcr_core::ids`).
#[derive(Clone)]
pub struct ComponentType {
    pub name: String,
    pub behavior: Arc<dyn ComponentBehavior>,
    pub dependencies: Vec<DependencyDecl>,
}

impl ComponentType {
    pub fn new(name: impl Into<String>, behavior: Arc<dyn ComponentBehavior>) -> Self {
        Self { name: name.into(), behavior, dependencies: Vec::new() }
    }

    /// Builds a `ComponentType` from a typed initial-state factory and
    /// action dispatcher, erasing `S`/`P`/`R` behind [`ComponentBehavior`]
    /// via [`TypedBehavior`].
    pub fn typed<S, P, R>(
        name: impl Into<String>,
        initial_state: impl Fn(&P) -> S + Send + Sync + 'static,
        action: impl Fn(&S, &str, &P) -> Result<(S, Option<R>), String> + Send + Sync + 'static,
    ) -> Self
    where
        S: Serialize + DeserializeOwned + Send + Sync + 'static,
        P: DeserializeOwned + Send + Sync + 'static,
        R: Serialize + Send + Sync + 'static,
    {
        Self::new(name, Arc::new(TypedBehavior::new(initial_state, action)))
    }

    pub fn with_dependency(mut self, dependency: DependencyDecl) -> Self {
        self.dependencies.push(dependency);
        self
    }
}

#[cfg(test)]
#[path = "component_type_tests.rs"]
mod tests;
