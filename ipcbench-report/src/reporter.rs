// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Writes sweep summaries to disk and renders them for the console.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use ipcbench_core::Role;
use thiserror::Error;

use crate::metrics::{SweepSummary, ThroughputSample};

/// File name of the summary inside a sweep directory.
pub const SUMMARY_FILE: &str = "summary.json";

/// Errors that can occur while saving or loading a summary.
#[derive(Debug, Error)]
pub enum ReporterError {
    #[error("Failed to access summary file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize summary: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Saves and loads `summary.json` next to the runs it describes.
pub struct SummaryReporter;

impl SummaryReporter {
    /// Write the summary into its sweep directory and return the path.
    pub fn save(summary: &SweepSummary) -> Result<PathBuf, ReporterError> {
        Self::save_to(summary, &summary.sweep_dir.join(SUMMARY_FILE))
    }

    pub fn save_to(summary: &SweepSummary, path: &Path) -> Result<PathBuf, ReporterError> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, summary)?;
        Ok(path.to_path_buf())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<SweepSummary, ReporterError> {
        let file = File::open(path)?;
        let summary = serde_json::from_reader(BufReader::new(file))?;
        Ok(summary)
    }
}

/// Render the summary as plain-text tables.
///
/// A section with no samples is left out.
pub fn render_table(summary: &SweepSummary) -> String {
    let mut out = String::new();

    for role in [Role::Sender, Role::Receiver] {
        let rows: Vec<_> = summary.throughput_for(role).collect();
        if rows.is_empty() {
            continue;
        }
        let _ = writeln!(out, "{} throughput", capitalize(&role.to_string()));
        let _ = writeln!(out, "{:<24} {:>14} {:>12}", "Run", "Throughput", "Active (s)");
        let _ = writeln!(out, "{}", "-".repeat(52));
        for s in rows {
            let _ = writeln!(
                out,
                "{:<24} {:>14} {:>12.3}",
                s.label,
                ThroughputSample::format_mb_per_sec(s.mb_per_sec),
                s.active_time_sec
            );
        }
        out.push('\n');
    }

    if !summary.memory.is_empty() {
        let _ = writeln!(out, "Peak memory");
        let _ = writeln!(out, "{:<24} {:<10} {:>10}", "Run", "Role", "RSS (MB)");
        let _ = writeln!(out, "{}", "-".repeat(46));
        for s in &summary.memory {
            let _ = writeln!(out, "{:<24} {:<10} {:>10.2}", s.label, s.role.to_string(), s.peak_mb);
        }
        out.push('\n');
    }

    if !summary.skipped.is_empty() {
        let _ = writeln!(out, "Skipped {} metrics file(s):", summary.skipped.len());
        for s in &summary.skipped {
            let _ = writeln!(out, "  {} ({}): {}", s.run_tag, s.path.display(), s.reason);
        }
    }

    out
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MemorySample;
    use tempfile::TempDir;

    fn summary(dir: &Path) -> SweepSummary {
        let mut summary = SweepSummary::new(dir.to_path_buf());
        summary.throughput.push(ThroughputSample {
            run_tag: "sockets_py_sender_py_receiver".to_string(),
            label: "sock_py->py".to_string(),
            role: Role::Sender,
            mb_per_sec: 512.0,
            bytes: 1 << 30,
            active_time_sec: 2.0,
        });
        summary
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = SummaryReporter::save(&summary(temp.path())).unwrap();
        assert_eq!(path, temp.path().join(SUMMARY_FILE));

        let loaded = SummaryReporter::load(&path).unwrap();
        assert_eq!(loaded.throughput.len(), 1);
        assert_eq!(loaded.throughput[0].label, "sock_py->py");
    }

    #[test]
    fn test_render_omits_empty_sections() {
        let temp = TempDir::new().unwrap();
        let text = render_table(&summary(temp.path()));
        assert!(text.contains("Sender throughput"));
        assert!(text.contains("512.00 MB/s"));
        assert!(!text.contains("Receiver throughput"));
        assert!(!text.contains("Peak memory"));
    }

    #[test]
    fn test_render_memory_section() {
        let temp = TempDir::new().unwrap();
        let mut s = summary(temp.path());
        s.memory.push(MemorySample {
            run_tag: "sockets_py_sender_py_receiver".to_string(),
            label: "sock_py->py".to_string(),
            role: Role::Receiver,
            peak_mb: 12.5,
        });
        let text = render_table(&s);
        assert!(text.contains("Peak memory"));
        assert!(text.contains("12.50"));
    }
}
