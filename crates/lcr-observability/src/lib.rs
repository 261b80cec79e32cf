// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! lcr-observability: the metrics sink and structured issue ledger every
//! subsystem reports through instead of talking to a global registry.

mod issue;
mod sink;
mod snapshot;

pub use issue::{Issue, IssueKind};
pub use sink::{null_sink, InMemoryMetricsSink, MetricsSink, NullMetricsSink};
pub use snapshot::{DebugSnapshot, InstanceSnapshot};
