// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Sweep coordination.
//!
//! Walks the catalogue in declaration order, runs every viable
//! sender/receiver combination through the [`LifecycleManager`] and collects
//! each run's metric files into `results/<sweep-timestamp>/<run-tag>/`,
//! next to a `run.json` describing the run.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{MethodDescriptor, RoleSet, SweepConfig};
use crate::error::{BenchError, BenchResult, HardValidationError, SweepError};
use crate::lifecycle::{EndpointOutcome, LifecycleManager, PairSpec};
use crate::types::{MethodName, RoleKey, RunTag, TransportKind};

/// Fixed enumeration order of language-qualified combinations.
pub const LANGUAGE_PAIRS: [(RoleKey, RoleKey); 4] = [
    (RoleKey::PySender, RoleKey::PyReceiver),
    (RoleKey::PySender, RoleKey::CppReceiver),
    (RoleKey::CppSender, RoleKey::PyReceiver),
    (RoleKey::CppSender, RoleKey::CppReceiver),
];

/// Per-run metadata file name.
pub const RUN_METADATA_FILE: &str = "run.json";

/// Timestamp format of sweep directory names.
pub const SWEEP_DIR_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Structured description of one run, written as `run.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub method: MethodName,
    pub transport: TransportKind,
    pub sender_role: RoleKey,
    pub receiver_role: RoleKey,
    pub tag: RunTag,
    pub has_language_variants: bool,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub timed_out: bool,
    pub sender: EndpointOutcome,
    pub receiver: EndpointOutcome,
    /// Metric file names copied into the run directory.
    pub copied_files: Vec<String>,
    pub sender_metric: String,
    pub receiver_metric: String,
}

impl RunMetadata {
    pub fn read(run_dir: &Path) -> Result<Self, SweepError> {
        let path = run_dir.join(RUN_METADATA_FILE);
        let content = fs::read_to_string(&path).map_err(|e| SweepError::Metadata {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| SweepError::Metadata {
            path,
            reason: e.to_string(),
        })
    }

    pub fn write(&self, run_dir: &Path) -> Result<(), SweepError> {
        let path = run_dir.join(RUN_METADATA_FILE);
        let json = serde_json::to_string_pretty(self).map_err(|e| SweepError::Metadata {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        fs::write(&path, json).map_err(|e| SweepError::Metadata {
            path,
            reason: e.to_string(),
        })
    }
}

/// One completed run.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub dir: PathBuf,
    pub metadata: RunMetadata,
}

/// Result of a whole sweep.
#[derive(Debug, Clone)]
pub struct SweepOutcome {
    pub dir: PathBuf,
    pub runs: Vec<RunRecord>,
}

/// Combinations of `method` that have commands on both sides, in run order.
pub fn viable_pairs(method: &MethodDescriptor) -> Vec<(RoleKey, RoleKey)> {
    match &method.roles {
        RoleSet::Fixed { .. } => vec![(RoleKey::Sender, RoleKey::Receiver)],
        RoleSet::Languages(_) => LANGUAGE_PAIRS
            .into_iter()
            .filter(|(s, r)| method.command(*s).is_some() && method.command(*r).is_some())
            .collect(),
    }
}

/// Drives a sweep over an immutable [`SweepConfig`].
pub struct RunCoordinator<'a> {
    config: &'a SweepConfig,
    lifecycle: LifecycleManager,
    method_filter: Option<Vec<String>>,
}

impl<'a> RunCoordinator<'a> {
    pub fn new(config: &'a SweepConfig) -> Self {
        Self {
            config,
            lifecycle: LifecycleManager::new(
                config.settings.start_delay,
                config.settings.completion_timeout,
            ),
            method_filter: None,
        }
    }

    /// Restrict the sweep to the named methods.
    pub fn with_method_filter(mut self, names: Vec<String>) -> Self {
        self.method_filter = if names.is_empty() { None } else { Some(names) };
        self
    }

    /// Methods selected for this sweep, in catalogue order.
    pub fn selected_methods(&self) -> BenchResult<Vec<&'a MethodDescriptor>> {
        let Some(filter) = &self.method_filter else {
            return Ok(self.config.methods.iter().collect());
        };

        for name in filter {
            if self.config.method(name).is_none() {
                return Err(HardValidationError::InvalidFieldValue {
                    field: "method",
                    value: name.clone(),
                    reason: "Not in the method catalogue".to_string(),
                }
                .into());
            }
        }

        Ok(self
            .config
            .methods
            .iter()
            .filter(|m| filter.iter().any(|name| name == m.name.as_str()))
            .collect())
    }

    /// Create `results/<YYYYmmdd_HHMMSS>` for a sweep starting at `now`.
    pub fn create_sweep_dir(&self, now: DateTime<Local>) -> BenchResult<PathBuf> {
        let results_dir = &self.config.settings.results_dir;
        fs::create_dir_all(results_dir).map_err(|source| BenchError::Io {
            context: "creating results directory",
            source,
        })?;

        let sweep_dir = results_dir.join(now.format(SWEEP_DIR_FORMAT).to_string());
        match fs::create_dir(&sweep_dir) {
            Ok(()) => Ok(sweep_dir),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(SweepError::SweepDirExists { path: sweep_dir }.into())
            }
            Err(source) => Err(BenchError::Io {
                context: "creating sweep directory",
                source,
            }),
        }
    }

    /// Run the whole sweep into a fresh timestamped directory.
    pub async fn run_sweep(&self) -> BenchResult<SweepOutcome> {
        let methods = self.selected_methods()?;
        let dir = self.create_sweep_dir(Local::now())?;

        tracing::info!(
            sweep_dir = %dir.display(),
            methods = methods.len(),
            "Starting sweep"
        );

        let runs = self.run_methods(&methods, &dir).await?;

        tracing::info!(sweep_dir = %dir.display(), runs = runs.len(), "Sweep complete");
        Ok(SweepOutcome { dir, runs })
    }

    /// Run the selected methods into an existing sweep directory.
    pub async fn run_sweep_in(&self, sweep_dir: &Path) -> BenchResult<Vec<RunRecord>> {
        let methods = self.selected_methods()?;
        self.run_methods(&methods, sweep_dir).await
    }

    async fn run_methods(
        &self,
        methods: &[&MethodDescriptor],
        sweep_dir: &Path,
    ) -> BenchResult<Vec<RunRecord>> {
        let mut runs = Vec::new();

        for method in methods {
            let pairs = viable_pairs(method);
            if pairs.is_empty() {
                tracing::info!(method = %method.name, "No viable sender/receiver combination");
            }
            for (sender_key, receiver_key) in pairs {
                runs.push(
                    self.run_one(method, sender_key, receiver_key, sweep_dir)
                        .await?,
                );
            }
        }

        Ok(runs)
    }

    async fn run_one(
        &self,
        method: &MethodDescriptor,
        sender_key: RoleKey,
        receiver_key: RoleKey,
        sweep_dir: &Path,
    ) -> BenchResult<RunRecord> {
        // viable_pairs only yields keys with commands on both sides
        let (Some(sender_command), Some(receiver_command)) =
            (method.command(sender_key), method.command(receiver_key))
        else {
            return Err(HardValidationError::MissingRequiredField {
                field: "roles",
                context: format!("method '{}'", method.name),
            }
            .into());
        };

        let tag = RunTag::derive(&method.name, sender_key, receiver_key);
        let run_dir = sweep_dir.join(tag.as_str());
        match fs::create_dir(&run_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(SweepError::RunDirExists { path: run_dir }.into())
            }
            Err(source) => {
                return Err(BenchError::Io {
                    context: "creating run directory",
                    source,
                })
            }
        }

        tracing::info!(
            tag = %tag,
            transport = %method.transport,
            sender = %sender_key,
            receiver = %receiver_key,
            "Running combination"
        );

        let metric_files = [&method.sender_metric, &method.receiver_metric];
        remove_stale_metrics(&method.working_dir, &metric_files);

        let started_at = Utc::now();
        let clock = Instant::now();
        let outcome = self
            .lifecycle
            .run_pair(&PairSpec {
                sender_command,
                receiver_command,
                working_dir: &method.working_dir,
                start_order: method.transport.start_order(),
            })
            .await;
        let duration_secs = clock.elapsed().as_secs_f64();

        let copied_files = copy_metrics(&method.working_dir, &run_dir, &metric_files);
        if copied_files.len() < metric_files.len() {
            tracing::warn!(
                tag = %tag,
                copied = copied_files.len(),
                "Some metric files were not produced"
            );
        }

        let metadata = RunMetadata {
            method: method.name.clone(),
            transport: method.transport,
            sender_role: sender_key,
            receiver_role: receiver_key,
            tag,
            has_language_variants: method.has_language_variants(),
            started_at,
            duration_secs,
            timed_out: outcome.timed_out(),
            sender: outcome.sender,
            receiver: outcome.receiver,
            copied_files,
            sender_metric: method.sender_metric.clone(),
            receiver_metric: method.receiver_metric.clone(),
        };
        metadata.write(&run_dir)?;

        Ok(RunRecord {
            dir: run_dir,
            metadata,
        })
    }
}

/// Delete metric files an earlier run left in the working directory.
fn remove_stale_metrics(working_dir: &Path, names: &[&String]) {
    for name in names {
        let path = working_dir.join(name);
        match fs::remove_file(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed stale metrics file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to remove stale metrics file"
            ),
        }
    }
}

/// Copy the metric files that exist into the run directory. Returns the
/// names copied.
fn copy_metrics(working_dir: &Path, run_dir: &Path, names: &[&String]) -> Vec<String> {
    let mut copied = Vec::new();
    for name in names {
        let source = working_dir.join(name);
        if !source.is_file() {
            tracing::debug!(path = %source.display(), "Metrics file not produced");
            continue;
        }
        match fs::copy(&source, run_dir.join(name)) {
            Ok(_) => copied.push(name.to_string()),
            Err(e) => tracing::warn!(
                path = %source.display(),
                error = %e,
                "Failed to copy metrics file"
            ),
        }
    }
    copied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigLoader;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn config_with(yaml_methods: &str, root: &Path) -> SweepConfig {
        let yaml = format!(
            "sweep:\n  results_dir: results\n  start_delay_ms: 10\n  completion_timeout_secs: 5\nmethods:\n{}",
            yaml_methods
        );
        ConfigLoader::load_string_at(&yaml, root).unwrap()
    }

    #[test]
    fn test_viable_pairs_skip_absent_commands() {
        let temp = TempDir::new().unwrap();
        let config = config_with(
            r#"
  - name: sockets
    transport: sockets
    roles:
      py_sender: "true"
      py_receiver: "true"
      cpp_receiver: "true"
    sender_metric: s.csv
    receiver_metric: r.csv
"#,
            temp.path(),
        );

        let pairs = viable_pairs(&config.methods[0]);
        assert_eq!(
            pairs,
            vec![
                (RoleKey::PySender, RoleKey::PyReceiver),
                (RoleKey::PySender, RoleKey::CppReceiver),
            ]
        );
    }

    #[test]
    fn test_fixed_method_has_single_pair() {
        let temp = TempDir::new().unwrap();
        let config = config_with(
            r#"
  - name: boost_int
    transport: native
    roles:
      sender: "true"
      receiver: "true"
    sender_metric: s.csv
    receiver_metric: r.csv
"#,
            temp.path(),
        );
        assert_eq!(
            viable_pairs(&config.methods[0]),
            vec![(RoleKey::Sender, RoleKey::Receiver)]
        );
    }

    #[test]
    fn test_sweep_dir_collision() {
        let temp = TempDir::new().unwrap();
        let config = SweepConfig::builtin(temp.path()).unwrap();
        let coordinator = RunCoordinator::new(&config);
        let now = Local.with_ymd_and_hms(2025, 3, 1, 12, 30, 5).unwrap();

        let dir = coordinator.create_sweep_dir(now).unwrap();
        assert!(dir.ends_with("results/20250301_123005"));
        assert!(matches!(
            coordinator.create_sweep_dir(now),
            Err(BenchError::Sweep(SweepError::SweepDirExists { .. }))
        ));
    }

    #[test]
    fn test_unknown_filter_name_rejected() {
        let temp = TempDir::new().unwrap();
        let config = SweepConfig::builtin(temp.path()).unwrap();
        let coordinator =
            RunCoordinator::new(&config).with_method_filter(vec!["carrier_pigeon".to_string()]);
        assert!(coordinator.selected_methods().is_err());
    }

    #[test]
    fn test_filter_keeps_catalogue_order() {
        let temp = TempDir::new().unwrap();
        let config = SweepConfig::builtin(temp.path()).unwrap();
        let coordinator = RunCoordinator::new(&config)
            .with_method_filter(vec!["sockets".to_string(), "zmq".to_string()]);
        let names: Vec<_> = coordinator
            .selected_methods()
            .unwrap()
            .iter()
            .map(|m| m.name.as_str())
            .collect();
        assert_eq!(names, vec!["zmq", "sockets"]);
    }

    #[test]
    fn test_stale_metrics_removed() {
        let temp = TempDir::new().unwrap();
        let stale = "s.csv".to_string();
        fs::write(temp.path().join(&stale), "old").unwrap();
        remove_stale_metrics(temp.path(), &[&stale]);
        assert!(!temp.path().join(&stale).exists());
    }
}
