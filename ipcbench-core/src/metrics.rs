// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Per-endpoint metrics: timing, peak resident memory, and the CSV file each
//! endpoint leaves behind.
//!
//! The file is a header plus one data row:
//!
//! ```text
//! active_time_sec,wall_time_sec,bytes_sent,rss_mb
//! 1.234567,1.456789,10737418240,32.50
//! ```
//!
//! Readers accept `rss_mb_max` in place of `rss_mb` and use the last row
//! when several are present.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::MetricsError;
use crate::types::Role;

/// Default iteration stride between resident memory samples.
pub const DEFAULT_RSS_STRIDE: u64 = 100;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// What one endpoint process measured about itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub role: Role,
    /// Time spent inside blocking transfer calls.
    pub active_time_sec: f64,
    /// Time from endpoint start to the last transfer call returning.
    pub wall_time_sec: f64,
    /// `bytes_sent` for a sender, `bytes_received` for a receiver.
    pub bytes: u64,
    /// Peak resident memory in MB (2^20 bytes), if it could be sampled.
    pub peak_rss_mb: Option<f64>,
}

impl MetricSample {
    /// Write the sample as a one-row CSV file.
    pub fn write_csv(&self, path: &Path) -> Result<(), MetricsError> {
        let rss = self
            .peak_rss_mb
            .map(|mb| format!("{:.2}", mb))
            .unwrap_or_default();
        let content = format!(
            "active_time_sec,wall_time_sec,{},rss_mb\n{:.6},{:.6},{},{}\n",
            self.role.byte_column(),
            self.active_time_sec,
            self.wall_time_sec,
            self.bytes,
            rss
        );

        fs::write(path, content).map_err(|source| MetricsError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::debug!(path = %path.display(), role = %self.role, "Wrote metrics file");
        Ok(())
    }

    /// Read the last data row of a metrics file written for `role`.
    pub fn read_csv(path: &Path, role: Role) -> Result<Self, MetricsError> {
        let content = fs::read_to_string(path).map_err(|source| MetricsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_csv(&content, path, role)
    }

    /// Parse metrics text. `path` is only used in error messages.
    pub fn parse_csv(content: &str, path: &Path, role: Role) -> Result<Self, MetricsError> {
        let mut lines = content.lines().map(str::trim).filter(|l| !l.is_empty());

        let header: Vec<&str> = match lines.next() {
            Some(line) => line.split(',').map(str::trim).collect(),
            None => {
                return Err(MetricsError::NoDataRow {
                    path: path.to_path_buf(),
                })
            }
        };
        let row: Vec<&str> = match lines.last() {
            Some(line) => line.split(',').map(str::trim).collect(),
            None => {
                return Err(MetricsError::NoDataRow {
                    path: path.to_path_buf(),
                })
            }
        };

        let field = |column: &'static str| {
            header
                .iter()
                .position(|h| *h == column)
                .and_then(|idx| row.get(idx).copied())
                .ok_or_else(|| MetricsError::MissingColumn {
                    path: path.to_path_buf(),
                    column,
                })
        };

        let active_time_sec = parse_number::<f64>(field("active_time_sec")?, path, "active_time_sec")?;
        let wall_time_sec = parse_number::<f64>(field("wall_time_sec")?, path, "wall_time_sec")?;
        let byte_column = role.byte_column();
        let bytes = parse_bytes(field(byte_column)?, path, byte_column)?;

        // Memory is optional: a missing column or an empty/garbled cell
        // only drops the memory figure.
        let peak_rss_mb = ["rss_mb_max", "rss_mb"]
            .into_iter()
            .find_map(|column| field(column).ok()?.parse::<f64>().ok());

        Ok(Self {
            role,
            active_time_sec,
            wall_time_sec,
            bytes,
            peak_rss_mb,
        })
    }

    /// Throughput in MB/s over active time, `None` when no active time was
    /// recorded.
    pub fn throughput_mb_s(&self) -> Option<f64> {
        if self.active_time_sec > 0.0 {
            Some(self.bytes as f64 / BYTES_PER_MB / self.active_time_sec)
        } else {
            None
        }
    }
}

fn parse_number<T: std::str::FromStr>(
    value: &str,
    path: &Path,
    column: &str,
) -> Result<T, MetricsError> {
    value.parse::<T>().map_err(|_| MetricsError::InvalidValue {
        path: path.to_path_buf(),
        column: column.to_string(),
        value: value.to_string(),
    })
}

/// Byte counters are integers, but tolerate writers that emit `1024.0`.
fn parse_bytes(value: &str, path: &Path, column: &str) -> Result<u64, MetricsError> {
    match value.parse::<u64>() {
        Ok(bytes) => Ok(bytes),
        Err(_) => {
            let float = parse_number::<f64>(value, path, column)?;
            if float.is_finite() && float >= 0.0 {
                Ok(float as u64)
            } else {
                Err(MetricsError::InvalidValue {
                    path: path.to_path_buf(),
                    column: column.to_string(),
                    value: value.to_string(),
                })
            }
        }
    }
}

/// Current resident set size of this process in bytes.
///
/// Reads `/proc/self/statm`; `None` where that is unavailable.
pub fn current_rss_bytes() -> Option<u64> {
    let statm = fs::read_to_string("/proc/self/statm").ok()?;
    let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;

    // SAFETY: sysconf has no preconditions
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page_size <= 0 {
        return None;
    }
    Some(resident_pages * page_size as u64)
}

/// Tracks peak resident memory, sampling every `stride` iterations.
#[derive(Debug, Clone)]
pub struct RssSampler {
    stride: u64,
    peak_bytes: Option<u64>,
}

impl RssSampler {
    pub fn new(stride: u64) -> Self {
        Self {
            stride: stride.max(1),
            peak_bytes: None,
        }
    }

    /// Sample unconditionally.
    pub fn sample(&mut self) {
        if let Some(rss) = current_rss_bytes() {
            self.peak_bytes = Some(self.peak_bytes.map_or(rss, |peak| peak.max(rss)));
        }
    }

    /// Sample when `iteration` lands on the stride.
    pub fn on_iteration(&mut self, iteration: u64) {
        if iteration % self.stride == 0 {
            self.sample();
        }
    }

    pub fn peak_mb(&self) -> Option<f64> {
        self.peak_bytes.map(|bytes| bytes as f64 / BYTES_PER_MB)
    }
}

impl Default for RssSampler {
    fn default() -> Self {
        Self::new(DEFAULT_RSS_STRIDE)
    }
}

/// Wall clock plus an accumulator for time spent inside transfer calls.
#[derive(Debug)]
pub struct TransferClock {
    started: Instant,
    active: Duration,
}

impl TransferClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            active: Duration::ZERO,
        }
    }

    /// Run one blocking transfer call, adding its duration to active time.
    pub fn measure<T>(&mut self, op: impl FnOnce() -> T) -> T {
        let begin = Instant::now();
        let result = op();
        self.active += begin.elapsed();
        result
    }

    pub fn active(&self) -> Duration {
        self.active
    }

    /// Close the measurement and build the sample.
    pub fn finish(self, role: Role, bytes: u64, rss: &RssSampler) -> MetricSample {
        MetricSample {
            role,
            active_time_sec: self.active.as_secs_f64(),
            wall_time_sec: self.started.elapsed().as_secs_f64(),
            bytes,
            peak_rss_mb: rss.peak_mb(),
        }
    }
}
