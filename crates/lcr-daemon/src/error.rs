// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The multiplexer boundary is the only place subsystem errors turn into
//! wire-level `error` frames; the `*_wire_kind` functions are that single
//! translation.

use lcr_registry::RegistryError;
use lcr_sync::SyncError;
use lcr_wire::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("connection limit of {0} reached")]
    ConnectionLimit(usize),
}

/// Maps a registry failure onto the closed set of wire error kinds.
pub fn registry_wire_kind(err: &RegistryError) -> ErrorKind {
    match err {
        RegistryError::UnknownComponentType(_) => ErrorKind::UnknownComponentType,
        RegistryError::ComponentNotFound(_)
        | RegistryError::ParentNotFound(_)
        // the dependency names a component type with no mounted instance
        | RegistryError::MissingRequiredDependency(_) => ErrorKind::ComponentNotFound,
        RegistryError::CyclicDependency(_) => ErrorKind::CyclicDependency,
        RegistryError::UnknownAction { .. } | RegistryError::ActionFailed { .. } => {
            ErrorKind::ActionFailed
        }
        RegistryError::DuplicateType(_) => ErrorKind::Internal,
        RegistryError::Sync(e) => sync_wire_kind(e),
    }
}

/// Every state-operation failure is a rejected state change from the
/// client's point of view.
pub fn sync_wire_kind(_err: &SyncError) -> ErrorKind {
    ErrorKind::InvalidStateChange
}

pub fn event_wire_kind(err: &lcr_events::EventError) -> ErrorKind {
    match err {
        // no dedicated wire kind exists for a hierarchy cycle; it is a
        // dependency-shaped failure from the client's point of view
        lcr_events::EventError::CyclicHierarchy(_) => ErrorKind::CyclicDependency,
        lcr_events::EventError::UnknownScopeResolver(_) => ErrorKind::Internal,
    }
}
