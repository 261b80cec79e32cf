// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use lcr_core::ComponentId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("component type `{0}` is already registered")]
    DuplicateType(String),
    #[error("unknown component type `{0}`")]
    UnknownComponentType(String),
    #[error("component `{0}` not found")]
    ComponentNotFound(ComponentId),
    #[error("required dependency `{0}` has no mounted instance")]
    MissingRequiredDependency(String),
    #[error("dependency graph has a cycle through `{0}`")]
    CyclicDependency(String),
    #[error("parent `{0}` not found")]
    ParentNotFound(ComponentId),
    #[error("action `{action}` not found on type `{type_name}`")]
    UnknownAction { type_name: String, action: String },
    #[error("action `{action}` failed: {message}")]
    ActionFailed { action: String, message: String },
    #[error(transparent)]
    Sync(#[from] lcr_sync::SyncError),
}
