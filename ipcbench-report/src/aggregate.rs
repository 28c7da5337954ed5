// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Collects metric files from a sweep directory into a [`SweepSummary`].
//!
//! Each run directory is identified from its `run.json` when present. Older
//! trees without metadata fall back to matching the directory name against
//! known method names.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ipcbench_core::coordinator::RUN_METADATA_FILE;
use ipcbench_core::{MetricSample, Role, RoleKey, RunMetadata, SweepConfig};
use thiserror::Error;

use crate::metrics::{MemorySample, MethodSummary, SkippedFile, SweepSummary, ThroughputSample};

/// Errors that stop aggregation entirely.
///
/// Problems with individual runs are recorded in [`SweepSummary::skipped`]
/// instead.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("Sweep directory not found: {0}")]
    SweepDirMissing(PathBuf),

    #[error("Failed to read sweep directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Method names of the stock harness with their display prefixes and
/// whether they come in language variants.
const KNOWN_METHODS: [(&str, &str, bool); 4] = [
    ("posix_shared_memory", "shm", true),
    ("boost_int", "boost", false),
    ("zmq", "zmq", true),
    ("sockets", "sock", true),
];

/// Who ran in one run directory.
#[derive(Debug, Clone, PartialEq)]
pub struct RunIdentity {
    pub tag: String,
    pub method: Option<String>,
    pub prefix: Option<String>,
    pub sender: Option<RoleKey>,
    pub receiver: Option<RoleKey>,
    pub has_language_variants: bool,
    pub started_at: Option<DateTime<Utc>>,
}

impl RunIdentity {
    fn unknown(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            method: None,
            prefix: None,
            sender: None,
            receiver: None,
            has_language_variants: false,
            started_at: None,
        }
    }

    fn from_metadata(metadata: &RunMetadata) -> Self {
        Self {
            tag: metadata.tag.as_str().to_string(),
            method: Some(metadata.method.as_str().to_string()),
            prefix: Some(metadata.transport.short_label().to_string()),
            sender: Some(metadata.sender_role),
            receiver: Some(metadata.receiver_role),
            has_language_variants: metadata.has_language_variants,
            started_at: Some(metadata.started_at),
        }
    }

    /// Short display label: `<prefix>_<sender-lang>-><receiver-lang>`, the
    /// bare prefix for fixed pairs, or the raw tag for unknown methods.
    pub fn short_label(&self) -> String {
        let Some(prefix) = &self.prefix else {
            return self.tag.clone();
        };

        let lang = |key: Option<RoleKey>| key.and_then(|k| k.language()).map(|l| l.label());
        match (lang(self.sender), lang(self.receiver)) {
            (None, None) => prefix.clone(),
            (s, r) => format!("{}_{}->{}", prefix, s.unwrap_or(""), r.unwrap_or("")),
        }
    }
}

/// Walks a sweep directory and builds the summary.
#[derive(Debug, Default, Clone, Copy)]
pub struct Aggregator<'a> {
    catalogue: Option<&'a SweepConfig>,
}

impl<'a> Aggregator<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also recognise the catalogue's method names when a run directory has
    /// no metadata.
    pub fn with_catalogue(mut self, config: &'a SweepConfig) -> Self {
        self.catalogue = Some(config);
        self
    }

    pub fn aggregate(&self, sweep_dir: &Path) -> Result<SweepSummary, AggregateError> {
        if !sweep_dir.is_dir() {
            return Err(AggregateError::SweepDirMissing(sweep_dir.to_path_buf()));
        }

        let mut runs = Vec::new();
        let entries = fs::read_dir(sweep_dir).map_err(|source| AggregateError::Io {
            path: sweep_dir.to_path_buf(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| AggregateError::Io {
                path: sweep_dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(tag) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };
            let identity = self.identify(&path, &tag);
            runs.push((path, identity));
        }

        // Metadata carries the start time; directories without it go last.
        runs.sort_by(|(_, a), (_, b)| {
            (a.started_at.is_none(), a.started_at, &a.tag).cmp(&(
                b.started_at.is_none(),
                b.started_at,
                &b.tag,
            ))
        });

        let mut summary = SweepSummary::new(sweep_dir.to_path_buf());
        summary.runs = runs.len();

        for (dir, identity) in &runs {
            for role in [Role::Sender, Role::Receiver] {
                let Some(file) = find_metric_file(dir, role) else {
                    tracing::debug!(run = %identity.tag, role = %role, "No metrics file");
                    continue;
                };
                match MetricSample::read_csv(&file, role) {
                    Ok(sample) => record(&mut summary, identity, &sample),
                    Err(e) => {
                        tracing::warn!(
                            run = %identity.tag,
                            path = %file.display(),
                            error = %e,
                            "Skipping unreadable metrics file"
                        );
                        summary.skipped.push(SkippedFile {
                            run_tag: identity.tag.clone(),
                            path: file,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        summary.by_method = group_by_method(&summary, &runs);
        tracing::info!(
            runs = summary.runs,
            throughput = summary.throughput.len(),
            memory = summary.memory.len(),
            skipped = summary.skipped.len(),
            "Aggregated sweep"
        );
        Ok(summary)
    }

    fn identify(&self, dir: &Path, tag: &str) -> RunIdentity {
        if dir.join(RUN_METADATA_FILE).is_file() {
            match RunMetadata::read(dir) {
                Ok(metadata) => return RunIdentity::from_metadata(&metadata),
                Err(e) => tracing::warn!(run = %tag, error = %e, "Ignoring unreadable run metadata"),
            }
        }
        self.infer(tag)
    }

    /// Match the tag against known method names, longest first.
    fn infer(&self, tag: &str) -> RunIdentity {
        let mut candidates: Vec<(String, String, bool)> = KNOWN_METHODS
            .iter()
            .map(|(name, prefix, variants)| (name.to_string(), prefix.to_string(), *variants))
            .collect();
        if let Some(config) = self.catalogue {
            candidates.extend(config.methods.iter().map(|m| {
                (
                    m.name.as_str().to_string(),
                    m.transport.short_label().to_string(),
                    m.has_language_variants(),
                )
            }));
        }
        candidates.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        for (name, prefix, variants) in candidates {
            let Some(rest) = tag
                .strip_prefix(name.as_str())
                .and_then(|r| r.strip_prefix('_'))
            else {
                continue;
            };
            let (sender, receiver) = split_roles(rest);
            return RunIdentity {
                tag: tag.to_string(),
                method: Some(name),
                prefix: Some(prefix),
                sender,
                receiver,
                has_language_variants: variants,
                started_at: None,
            };
        }

        RunIdentity::unknown(tag)
    }
}

/// Split `<sender_key>_<receiver_key>` into its role keys.
fn split_roles(rest: &str) -> (Option<RoleKey>, Option<RoleKey>) {
    for key in RoleKey::ALL.iter().filter(|k| k.role() == Role::Sender) {
        if let Some(tail) = rest
            .strip_prefix(key.as_str())
            .and_then(|t| t.strip_prefix('_'))
        {
            return (Some(*key), tail.parse().ok());
        }
    }
    (None, None)
}

/// First file in `dir` matching the role's metrics pattern.
///
/// Receivers also match the `reciever` spelling some endpoints use.
pub fn find_metric_file(dir: &Path, role: Role) -> Option<PathBuf> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .collect();
    names.sort();

    let matches = |needle: &str| {
        names
            .iter()
            .find(|n| n.ends_with("metrics.csv") && n.contains(needle))
            .map(|n| dir.join(n))
    };

    match role {
        Role::Sender => matches("sender"),
        Role::Receiver => matches("receiver").or_else(|| matches("reciever")),
    }
}

fn record(summary: &mut SweepSummary, identity: &RunIdentity, sample: &MetricSample) {
    let label = identity.short_label();

    if let Some(mb_per_sec) = sample.throughput_mb_s() {
        summary.throughput.push(ThroughputSample {
            run_tag: identity.tag.clone(),
            label: label.clone(),
            role: sample.role,
            mb_per_sec,
            bytes: sample.bytes,
            active_time_sec: sample.active_time_sec,
        });
    } else {
        tracing::debug!(run = %identity.tag, role = %sample.role, "No active time, throughput omitted");
    }

    if let Some(peak_mb) = sample.peak_rss_mb {
        summary.memory.push(MemorySample {
            run_tag: identity.tag.clone(),
            label,
            role: sample.role,
            peak_mb,
        });
    }
}

fn group_by_method(summary: &SweepSummary, runs: &[(PathBuf, RunIdentity)]) -> Vec<MethodSummary> {
    let mut groups: Vec<MethodSummary> = Vec::new();

    for (_, identity) in runs {
        let Some(method) = &identity.method else {
            continue;
        };
        if !identity.has_language_variants {
            continue;
        }

        let index = match groups.iter().position(|g| &g.method == method) {
            Some(i) => i,
            None => {
                groups.push(MethodSummary {
                    method: method.clone(),
                    ..MethodSummary::default()
                });
                groups.len() - 1
            }
        };
        let group = &mut groups[index];
        group.throughput.extend(
            summary
                .throughput
                .iter()
                .filter(|s| s.run_tag == identity.tag)
                .cloned(),
        );
        group.memory.extend(
            summary
                .memory
                .iter()
                .filter(|s| s.run_tag == identity.tag)
                .cloned(),
        );
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_find_metric_file_accepts_misspelt_receiver() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "shm_reciever_metrics.csv", "x");
        write(temp.path(), "shm_sender_metrics.csv", "x");

        let receiver = find_metric_file(temp.path(), Role::Receiver).unwrap();
        assert!(receiver.ends_with("shm_reciever_metrics.csv"));
        let sender = find_metric_file(temp.path(), Role::Sender).unwrap();
        assert!(sender.ends_with("shm_sender_metrics.csv"));
    }

    #[test]
    fn test_find_metric_file_missing() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "notes.txt", "x");
        assert!(find_metric_file(temp.path(), Role::Sender).is_none());
    }

    #[test]
    fn test_infer_language_run() {
        let identity = Aggregator::new().infer("posix_shared_memory_py_sender_cpp_receiver");
        assert_eq!(identity.method.as_deref(), Some("posix_shared_memory"));
        assert_eq!(identity.sender, Some(RoleKey::PySender));
        assert_eq!(identity.receiver, Some(RoleKey::CppReceiver));
        assert!(identity.has_language_variants);
        assert_eq!(identity.short_label(), "shm_py->c++");
    }

    #[test]
    fn test_infer_fixed_pair() {
        let identity = Aggregator::new().infer("boost_int_sender_receiver");
        assert_eq!(identity.short_label(), "boost");
        assert!(!identity.has_language_variants);
    }

    #[test]
    fn test_unknown_method_uses_raw_tag() {
        let identity = Aggregator::new().infer("carrier_pigeon_py_sender_py_receiver");
        assert_eq!(identity.method, None);
        assert_eq!(identity.short_label(), "carrier_pigeon_py_sender_py_receiver");
    }

    #[test]
    fn test_zero_active_time_keeps_memory_only() {
        let temp = TempDir::new().unwrap();
        write(
            &temp.path().join("sockets_py_sender_py_receiver"),
            "socket_sender_metrics.csv",
            "active_time_sec,wall_time_sec,bytes_sent,rss_mb\n0.0,0.1,0,5.50\n",
        );

        let summary = Aggregator::new().aggregate(temp.path()).unwrap();
        assert!(summary.throughput.is_empty());
        assert_eq!(summary.memory.len(), 1);
        assert_eq!(summary.memory[0].peak_mb, 5.5);
        assert_eq!(summary.memory[0].label, "sock_py->py");
    }

    #[test]
    fn test_malformed_file_is_skipped() {
        let temp = TempDir::new().unwrap();
        let run = temp.path().join("zmq_cpp_sender_py_receiver");
        write(&run, "zmq_sender_metrics.csv", "garbage\n");
        write(
            &run,
            "zmq_receiver_metrics.csv",
            "active_time_sec,wall_time_sec,bytes_received,rss_mb_max\n2.0,2.5,2097152,7.25\n",
        );

        let summary = Aggregator::new().aggregate(temp.path()).unwrap();
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.throughput.len(), 1);
        assert_eq!(summary.throughput[0].mb_per_sec, 1.0);
        assert_eq!(summary.throughput[0].role, Role::Receiver);
    }

    #[test]
    fn test_missing_sweep_dir() {
        let temp = TempDir::new().unwrap();
        let result = Aggregator::new().aggregate(&temp.path().join("absent"));
        assert!(matches!(result, Err(AggregateError::SweepDirMissing(_))));
    }
}
