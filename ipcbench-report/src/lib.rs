// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! ipcbench Report Library
//!
//! Turns the metric files of a finished sweep into throughput and memory
//! summaries, persisted as `summary.json` and rendered as console tables.

pub mod aggregate;
pub mod metrics;
pub mod reporter;

pub use aggregate::{find_metric_file, AggregateError, Aggregator, RunIdentity};
pub use metrics::{
    MemorySample, MethodSummary, SkippedFile, SweepSummary, SystemInfo, ThroughputSample,
};
pub use reporter::{render_table, ReporterError, SummaryReporter, SUMMARY_FILE};
