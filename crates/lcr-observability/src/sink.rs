// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Metrics sink seam. Every subsystem constructor takes an
//! `Arc<dyn MetricsSink>` rather than reading a process-wide metrics
//! registry, so tests can assert on an [`InMemoryMetricsSink`] and
//! embedders can wire in Prometheus/OpenTelemetry without this crate
//! knowing about either.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::issue::Issue;

/// Where counters, histograms, and structured issues go.
pub trait MetricsSink: Send + Sync {
    fn incr_counter(&self, name: &str, by: u64);
    fn observe_histogram(&self, name: &str, value_ms: f64);
    fn record_issue(&self, issue: Issue);
}

/// Discards everything. The default for embedders that don't run a metrics
/// exporter.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMetricsSink;

impl MetricsSink for NullMetricsSink {
    fn incr_counter(&self, _name: &str, _by: u64) {}
    fn observe_histogram(&self, _name: &str, _value_ms: f64) {}
    fn record_issue(&self, _issue: Issue) {}
}

/// Captures everything in memory, bounded by `max_issues`. Used by tests and
/// by embedders without a real exporter.
pub struct InMemoryMetricsSink {
    counters: Mutex<HashMap<String, u64>>,
    histograms: Mutex<HashMap<String, Vec<f64>>>,
    issues: Mutex<Vec<Issue>>,
    max_issues: usize,
}

impl InMemoryMetricsSink {
    pub fn new(max_issues: usize) -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
            histograms: Mutex::new(HashMap::new()),
            issues: Mutex::new(Vec::new()),
            max_issues,
        }
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.lock().get(name).copied().unwrap_or(0)
    }

    pub fn histogram_samples(&self, name: &str) -> Vec<f64> {
        self.histograms.lock().get(name).cloned().unwrap_or_default()
    }

    pub fn histogram_avg(&self, name: &str) -> Option<f64> {
        let samples = self.histogram_samples(name);
        if samples.is_empty() {
            None
        } else {
            Some(samples.iter().sum::<f64>() / samples.len() as f64)
        }
    }

    pub fn issues(&self) -> Vec<Issue> {
        self.issues.lock().clone()
    }
}

impl Default for InMemoryMetricsSink {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl MetricsSink for InMemoryMetricsSink {
    fn incr_counter(&self, name: &str, by: u64) {
        *self.counters.lock().entry(name.to_string()).or_insert(0) += by;
    }

    fn observe_histogram(&self, name: &str, value_ms: f64) {
        self.histograms.lock().entry(name.to_string()).or_default().push(value_ms);
    }

    fn record_issue(&self, issue: Issue) {
        let mut issues = self.issues.lock();
        issues.push(issue);
        if issues.len() > self.max_issues {
            let overflow = issues.len() - self.max_issues;
            issues.drain(0..overflow);
        }
    }
}

/// Convenience so call sites can pass `Arc<dyn MetricsSink>` interchangeably
/// with a concrete sink without boilerplate `as Arc<dyn _>` casts.
pub fn null_sink() -> Arc<dyn MetricsSink> {
    Arc::new(NullMetricsSink)
}

#[cfg(test)]
#[path = "sink_tests.rs"]
mod tests;
