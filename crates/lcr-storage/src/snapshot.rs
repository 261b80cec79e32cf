// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable, zstd-compressed, crash-safe snapshot files: one per component.
//!
//! Writes go to a `.tmp` file, are fsynced, then atomically renamed into
//! place, with a final directory fsync so the rename itself survives a
//! crash. A snapshot that fails to parse on load is rotated to a `.bak`
//! file rather than treated as fatal, so a corrupt file degrades to "no
//! snapshot" instead of blocking startup.

use crate::error::StorageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub state: Value,
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

/// Abstracts the filesystem operations a snapshot write needs, so tests can
/// inject I/O failures without touching a real disk.
pub trait SnapshotWriter: Send + Sync + 'static {
    fn write_tmp(&self, path: &Path, data: &[u8]) -> Result<(), StorageError>;
    fn fsync_file(&self, path: &Path) -> Result<(), StorageError>;
    fn rename(&self, from: &Path, to: &Path) -> Result<(), StorageError>;
    fn fsync_dir(&self, path: &Path) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FsSnapshotWriter;

impl SnapshotWriter for FsSnapshotWriter {
    fn write_tmp(&self, path: &Path, data: &[u8]) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = File::create(path)?;
        file.write_all(data)?;
        Ok(())
    }

    fn fsync_file(&self, path: &Path) -> Result<(), StorageError> {
        File::open(path)?.sync_all()?;
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), StorageError> {
        std::fs::rename(from, to)?;
        Ok(())
    }

    fn fsync_dir(&self, path: &Path) -> Result<(), StorageError> {
        File::open(path)?.sync_all()?;
        Ok(())
    }
}

/// Serializes, zstd-compresses, and durably writes `snapshot` to `path`.
pub fn save(writer: &impl SnapshotWriter, path: &Path, snapshot: &Snapshot, compression_level: i32) -> Result<(), StorageError> {
    let tmp_path = path.with_extension("tmp");
    let json_bytes = serde_json::to_vec(snapshot)?;
    let compressed =
        zstd::encode_all(json_bytes.as_slice(), compression_level).map_err(|e| StorageError::Compress(e.to_string()))?;

    writer.write_tmp(&tmp_path, &compressed)?;
    writer.fsync_file(&tmp_path)?;
    writer.rename(&tmp_path, path)?;
    if let Some(parent) = path.parent() {
        writer.fsync_dir(parent)?;
    }
    Ok(())
}

/// Loads and decompresses the snapshot at `path`. A missing file is `Ok(None)`;
/// a corrupt one is rotated to `.bak` and also treated as `Ok(None)`.
pub fn load(path: &Path) -> Result<Option<Snapshot>, StorageError> {
    if !path.exists() {
        return Ok(None);
    }
    let file = File::open(path)?;
    let decoder = zstd::stream::read::Decoder::new(file).map_err(|e| StorageError::Compress(e.to_string()))?;
    match serde_json::from_reader(decoder) {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(e) => {
            let bak_path = rotate_bak_path(path);
            warn!(error = %e, path = %path.display(), bak = %bak_path.display(), "corrupt snapshot, rotating to .bak");
            std::fs::rename(path, &bak_path)?;
            Ok(None)
        }
    }
}

const MAX_BAK_FILES: u32 = 3;

/// Picks the next `.bak` / `.bak.N` path, rotating older backups out. Keeps
/// up to [`MAX_BAK_FILES`] generations.
fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| if n == 1 { path.with_extension("bak") } else { path.with_extension(format!("bak.{n}")) };

    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = std::fs::remove_file(&oldest);
    }
    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = std::fs::rename(&src, bak(n + 1));
        }
    }
    bak(1)
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
