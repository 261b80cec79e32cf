// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    pub max_queue: usize,
    pub processing_timeout_ms: u64,
    pub batch_size: usize,
    pub batch_timeout_ms: u64,
    pub max_history: usize,
    pub dead_letter: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            max_queue: 1000,
            processing_timeout_ms: 5000,
            batch_size: 10,
            batch_timeout_ms: 50,
            max_history: 100,
            dead_letter: 50,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
