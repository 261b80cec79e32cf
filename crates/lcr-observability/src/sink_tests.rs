// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::issue::IssueKind;

#[test]
fn null_sink_accepts_everything_silently() {
    let sink = NullMetricsSink;
    sink.incr_counter("connections", 1);
    sink.observe_histogram("commit_latency_ms", 3.2);
    sink.record_issue(Issue::new(IssueKind::StaleStateDetected, "x", 0));
}

#[test]
fn in_memory_sink_accumulates_counters() {
    let sink = InMemoryMetricsSink::default();
    sink.incr_counter("connections", 1);
    sink.incr_counter("connections", 2);
    assert_eq!(sink.counter("connections"), 3);
    assert_eq!(sink.counter("unknown"), 0);
}

#[test]
fn in_memory_sink_tracks_histogram_average() {
    let sink = InMemoryMetricsSink::default();
    sink.observe_histogram("event_processing_ms", 10.0);
    sink.observe_histogram("event_processing_ms", 20.0);
    assert_eq!(sink.histogram_avg("event_processing_ms"), Some(15.0));
    assert_eq!(sink.histogram_avg("missing"), None);
}

#[test]
fn in_memory_sink_bounds_issue_history() {
    let sink = InMemoryMetricsSink::new(2);
    for i in 0..5 {
        sink.record_issue(Issue::new(IssueKind::MemoryLeakSuspicion, format!("issue {i}"), i));
    }
    let issues = sink.issues();
    assert_eq!(issues.len(), 2);
    assert_eq!(issues[0].detail, "issue 3");
    assert_eq!(issues[1].detail, "issue 4");
}

#[test]
fn null_sink_helper_builds_trait_object() {
    let sink: std::sync::Arc<dyn MetricsSink> = null_sink();
    sink.incr_counter("x", 1);
}
