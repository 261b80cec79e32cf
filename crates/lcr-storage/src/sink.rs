// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The pluggable durability seam: an embedder opts into persistence by
//! supplying a [`PersistenceSink`]; the runtime core never depends on any
//! particular store. [`NullPersistenceSink`] is the in-memory-by-default
//! no-op, [`FileSnapshotSink`] a real one backed by per-component files on
//! disk.

use crate::error::StorageError;
use crate::snapshot::{self, FsSnapshotWriter, Snapshot, SnapshotWriter};
use chrono::Utc;
use lcr_core::ComponentId;
use serde_json::Value;
use std::path::PathBuf;

pub trait PersistenceSink: Send + Sync {
    fn save_snapshot(&self, component_id: &ComponentId, state: &Value, version: u64) -> Result<(), StorageError>;

    fn load_snapshot(&self, component_id: &ComponentId) -> Result<Option<(Value, u64)>, StorageError>;
}

/// The default sink: every write is dropped, every read is empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPersistenceSink;

impl PersistenceSink for NullPersistenceSink {
    fn save_snapshot(&self, _component_id: &ComponentId, _state: &Value, _version: u64) -> Result<(), StorageError> {
        Ok(())
    }

    fn load_snapshot(&self, _component_id: &ComponentId) -> Result<Option<(Value, u64)>, StorageError> {
        Ok(None)
    }
}

const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Persists one zstd-compressed snapshot file per component under `root`,
/// written atomically (tmp file, fsync, rename, directory fsync).
pub struct FileSnapshotSink<W: SnapshotWriter = FsSnapshotWriter> {
    root: PathBuf,
    compression_level: i32,
    writer: W,
}

impl FileSnapshotSink<FsSnapshotWriter> {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), compression_level: DEFAULT_COMPRESSION_LEVEL, writer: FsSnapshotWriter }
    }
}

impl<W: SnapshotWriter> FileSnapshotSink<W> {
    pub fn with_writer(root: impl Into<PathBuf>, writer: W) -> Self {
        Self { root: root.into(), compression_level: DEFAULT_COMPRESSION_LEVEL, writer }
    }

    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    fn path_for(&self, component_id: &ComponentId) -> PathBuf {
        self.root.join(format!("{component_id}.snap"))
    }
}

impl<W: SnapshotWriter> PersistenceSink for FileSnapshotSink<W> {
    fn save_snapshot(&self, component_id: &ComponentId, state: &Value, version: u64) -> Result<(), StorageError> {
        let snapshot = Snapshot { state: state.clone(), version, created_at: Utc::now() };
        snapshot::save(&self.writer, &self.path_for(component_id), &snapshot, self.compression_level)
    }

    fn load_snapshot(&self, component_id: &ComponentId) -> Result<Option<(Value, u64)>, StorageError> {
        Ok(snapshot::load(&self.path_for(component_id))?.map(|s| (s.state, s.version)))
    }
}

#[cfg(test)]
#[path = "sink_tests.rs"]
mod tests;
