// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("no scope resolver registered under `{0}`")]
    UnknownScopeResolver(String),
    #[error("hierarchy walk exceeded {0} hops while resolving scope, suspect a cycle")]
    CyclicHierarchy(usize),
}
