// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use lcr_core::ComponentId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no instance tracked for {0}")]
    UnknownInstance(ComponentId),
    #[error("merge target at path `{0}` is not an object")]
    MergeTargetNotObject(String),
    #[error("{op} target at path `{path}` is not an array")]
    ArrayTargetRequired { op: &'static str, path: String },
    #[error("inc/dec target at path `{0}` is not numeric")]
    NotNumeric(String),
    #[error("splice value must be `[start, delete_count, ...items]`")]
    MalformedSplice,
    #[error("path `{0}` has no parent to resolve a key against")]
    EmptyPathSegment(String),
    #[error("no resolver registered under the name `{0}`")]
    UnknownResolver(String),
}
