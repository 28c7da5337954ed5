// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Aggregated result types written to `summary.json`.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use ipcbench_core::Role;
use serde::{Deserialize, Serialize};
use sysinfo::System;

/// Throughput of one endpoint in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputSample {
    pub run_tag: String,
    /// Short display label such as `shm_py->c++`.
    pub label: String,
    pub role: Role,
    /// MB (2^20 bytes) per second of active time.
    pub mb_per_sec: f64,
    pub bytes: u64,
    pub active_time_sec: f64,
}

impl ThroughputSample {
    /// Format throughput in human-readable form.
    pub fn format_mb_per_sec(mbps: f64) -> String {
        if mbps < 1.0 {
            format!("{:.2} KB/s", mbps * 1024.0)
        } else if mbps < 1024.0 {
            format!("{:.2} MB/s", mbps)
        } else {
            format!("{:.2} GB/s", mbps / 1024.0)
        }
    }
}

/// Peak resident memory of one endpoint in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySample {
    pub run_tag: String,
    pub label: String,
    pub role: Role,
    pub peak_mb: f64,
}

/// Samples of one method that offers language variants.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodSummary {
    pub method: String,
    pub throughput: Vec<ThroughputSample>,
    pub memory: Vec<MemorySample>,
}

/// A metrics file that could not be used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub run_tag: String,
    pub path: PathBuf,
    pub reason: String,
}

/// Host the sweep ran on, as seen when the summary is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub hostname: String,
    /// e.g. `Ubuntu 24.04`
    pub os: String,
    pub kernel: Option<String>,
    pub cpu_model: String,
    pub logical_cpus: usize,
    pub total_memory_mb: f64,
}

impl SystemInfo {
    pub fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu();
        sys.refresh_memory();

        let unknown = || "unknown".to_string();
        let os = match (System::name(), System::os_version()) {
            (Some(name), Some(version)) => format!("{} {}", name, version),
            (Some(name), None) => name,
            _ => unknown(),
        };

        Self {
            hostname: System::host_name().unwrap_or_else(unknown),
            os,
            kernel: System::kernel_version(),
            cpu_model: sys
                .cpus()
                .first()
                .map(|cpu| cpu.brand().trim().to_string())
                .unwrap_or_else(unknown),
            logical_cpus: sys.cpus().len(),
            total_memory_mb: sys.total_memory() as f64 / (1024.0 * 1024.0),
        }
    }
}

/// Everything the aggregation step learned about one sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepSummary {
    /// Tool version that produced the summary
    pub version: String,
    /// When the summary was produced
    pub timestamp: DateTime<Utc>,
    pub sweep_dir: PathBuf,
    pub system_info: SystemInfo,
    /// Number of run directories visited
    pub runs: usize,
    pub throughput: Vec<ThroughputSample>,
    pub memory: Vec<MemorySample>,
    /// Per-method groups; methods without language variants are left out.
    pub by_method: Vec<MethodSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedFile>,
}

impl SweepSummary {
    pub fn new(sweep_dir: PathBuf) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            sweep_dir,
            system_info: SystemInfo::collect(),
            runs: 0,
            throughput: Vec::new(),
            memory: Vec::new(),
            by_method: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Throughput samples of one role, in run order.
    pub fn throughput_for(&self, role: Role) -> impl Iterator<Item = &ThroughputSample> {
        self.throughput.iter().filter(move |s| s.role == role)
    }

    /// Memory samples of one role, in run order.
    pub fn memory_for(&self, role: Role) -> impl Iterator<Item = &MemorySample> {
        self.memory.iter().filter(move |s| s.role == role)
    }
}
