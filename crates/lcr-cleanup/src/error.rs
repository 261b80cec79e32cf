// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use lcr_core::ComponentId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("component `{0}` is already being cleaned up")]
    AlreadyInProgress(ComponentId),
}
