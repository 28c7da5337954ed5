// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML method catalogue parser with strict schema validation.
//!
//! The catalogue is loaded once at sweep start into an immutable
//! [`SweepConfig`] that is passed explicitly to the coordinator and the
//! lifecycle manager. Any invalid field is a [`HardValidationError`] and no
//! process is launched.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{BenchError, BenchResult, HardValidationError};
use crate::types::{MethodName, RoleKey, TransportKind};

/// Catalogue used when no configuration file is given. Mirrors the layout of
/// the benchmark project: one directory per method holding its endpoints.
pub const DEFAULT_CATALOGUE: &str = r#"
sweep:
  results_dir: results
  start_delay_ms: 200
  completion_timeout_secs: 60

methods:
  - name: posix_shared_memory
    transport: shared_memory
    roles:
      py_sender: python3 shm_sender.py
      py_receiver: python3 shm_reciever.py
      cpp_sender: ./sender_shm
      cpp_receiver: ./reciever_shm
    sender_metric: shm_sender_metrics.csv
    receiver_metric: shm_reciever_metrics.csv

  - name: boost_int
    transport: native
    roles:
      sender: ./boost_sender
      receiver: ./boost_reciever
    sender_metric: boost_sender_metrics.csv
    receiver_metric: boost_reciever_metrics.csv

  - name: zmq
    transport: push_pull
    roles:
      py_sender: python3 sender_zmq.py
      py_receiver: python3 reciever_zmq.py
      cpp_sender: ./zmq_sender
      cpp_receiver: ./zmq_reciever
    sender_metric: zmq_sender_metrics.csv
    receiver_metric: zmq_receiver_metrics.csv

  - name: sockets
    transport: sockets
    roles:
      py_sender: python3 sockets_sender.py
      py_receiver: python3 sockets_reciever.py
      cpp_sender: ./sender_socket
      cpp_receiver: ./reciever_socket
    sender_metric: socket_sender_metrics.csv
    receiver_metric: socket_receiver_metrics.csv
"#;

/// Raw method entry as parsed from YAML (before validation).
#[derive(Debug, Deserialize)]
struct RawMethodConfig {
    name: String,
    transport: TransportKind,
    #[serde(default)]
    working_dir: Option<String>,
    #[serde(default)]
    roles: BTreeMap<String, String>,
    sender_metric: Option<String>,
    receiver_metric: Option<String>,
}

/// Raw sweep settings.
#[derive(Debug, Deserialize)]
struct RawSweepSettings {
    #[serde(default = "default_results_dir")]
    results_dir: String,
    #[serde(default = "default_start_delay_ms")]
    start_delay_ms: u64,
    #[serde(default = "default_completion_timeout_secs")]
    completion_timeout_secs: u64,
}

fn default_results_dir() -> String {
    "results".to_string()
}

fn default_start_delay_ms() -> u64 {
    200
}

fn default_completion_timeout_secs() -> u64 {
    60
}

impl Default for RawSweepSettings {
    fn default() -> Self {
        Self {
            results_dir: default_results_dir(),
            start_delay_ms: default_start_delay_ms(),
            completion_timeout_secs: default_completion_timeout_secs(),
        }
    }
}

/// Raw root configuration file.
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    sweep: RawSweepSettings,
    methods: Vec<RawMethodConfig>,
}

/// Commands of a method that offers language variants. `None` means the
/// role/language combination is not offered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LanguageRoles {
    pub py_sender: Option<String>,
    pub cpp_sender: Option<String>,
    pub py_receiver: Option<String>,
    pub cpp_receiver: Option<String>,
}

/// Role layout of a method: either language-qualified or one fixed pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleSet {
    Languages(LanguageRoles),
    Fixed { sender: String, receiver: String },
}

/// Validated, immutable description of one catalogue entry.
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    pub name: MethodName,
    pub transport: TransportKind,
    /// Directory the endpoints run in and write their metric files to.
    pub working_dir: PathBuf,
    pub roles: RoleSet,
    pub sender_metric: String,
    pub receiver_metric: String,
}

impl MethodDescriptor {
    /// Command for a role key, if this method offers it.
    pub fn command(&self, key: RoleKey) -> Option<&str> {
        match (&self.roles, key) {
            (RoleSet::Languages(roles), RoleKey::PySender) => roles.py_sender.as_deref(),
            (RoleSet::Languages(roles), RoleKey::CppSender) => roles.cpp_sender.as_deref(),
            (RoleSet::Languages(roles), RoleKey::PyReceiver) => roles.py_receiver.as_deref(),
            (RoleSet::Languages(roles), RoleKey::CppReceiver) => roles.cpp_receiver.as_deref(),
            (RoleSet::Fixed { sender, .. }, RoleKey::Sender) => Some(sender),
            (RoleSet::Fixed { receiver, .. }, RoleKey::Receiver) => Some(receiver),
            _ => None,
        }
    }

    /// Whether the method declares language-qualified roles.
    pub fn has_language_variants(&self) -> bool {
        matches!(self.roles, RoleSet::Languages(_))
    }
}

/// Validated sweep-wide settings.
#[derive(Debug, Clone)]
pub struct SweepSettings {
    /// Root under which each sweep creates its timestamped directory.
    pub results_dir: PathBuf,
    /// Pause between starting the first and the second endpoint.
    pub start_delay: Duration,
    /// Ceiling on waiting for the receiver (and a synchronous sender).
    pub completion_timeout: Duration,
}

/// Complete validated configuration.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub settings: SweepSettings,
    pub methods: Vec<MethodDescriptor>,
}

impl SweepConfig {
    /// Built-in catalogue rooted at `project_root`.
    pub fn builtin(project_root: impl AsRef<Path>) -> BenchResult<Self> {
        ConfigLoader::load_string_at(DEFAULT_CATALOGUE, project_root.as_ref())
    }

    /// Look up a method by name.
    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name.as_str() == name)
    }
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate a catalogue from a YAML file. Relative paths in the
    /// file resolve against the file's directory.
    pub fn load_file(path: impl AsRef<Path>) -> BenchResult<SweepConfig> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(BenchError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| BenchError::Io {
            context: "reading config file",
            source: e,
        })?;

        let root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        Self::load_string_at(&content, root)
    }

    /// Load and validate a catalogue from a YAML string, resolving relative
    /// paths against the current directory.
    pub fn load_string(content: &str) -> BenchResult<SweepConfig> {
        Self::load_string_at(content, Path::new("."))
    }

    /// Load and validate a catalogue from a YAML string, resolving relative
    /// paths against `root`.
    pub fn load_string_at(content: &str, root: &Path) -> BenchResult<SweepConfig> {
        let raw: RawConfig =
            serde_yaml::from_str(content).map_err(|e| BenchError::ConfigParse {
                message: format!("YAML parse error: {}", e),
            })?;

        Self::validate(raw, root)
    }

    fn validate(raw: RawConfig, root: &Path) -> BenchResult<SweepConfig> {
        let settings = Self::validate_settings(raw.sweep, root)?;

        let mut methods = Vec::with_capacity(raw.methods.len());
        let mut seen = HashSet::new();

        for (index, raw_method) in raw.methods.into_iter().enumerate() {
            let method = Self::validate_method(raw_method, index, root)?;

            if !seen.insert(method.name.as_str().to_string()) {
                return Err(HardValidationError::DuplicateMethodName {
                    name: method.name.to_string(),
                }
                .into());
            }

            methods.push(method);
        }

        if methods.is_empty() {
            return Err(HardValidationError::SchemaValidation {
                message: "At least one method must be defined".to_string(),
            }
            .into());
        }

        Ok(SweepConfig { settings, methods })
    }

    fn validate_settings(raw: RawSweepSettings, root: &Path) -> BenchResult<SweepSettings> {
        if raw.start_delay_ms > 10_000 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "start_delay_ms",
                value: raw.start_delay_ms.to_string(),
                reason: "Start delay must not exceed 10000ms".to_string(),
            }
            .into());
        }

        if raw.completion_timeout_secs == 0 || raw.completion_timeout_secs > 3600 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "completion_timeout_secs",
                value: raw.completion_timeout_secs.to_string(),
                reason: "Must be between 1 and 3600 seconds".to_string(),
            }
            .into());
        }

        if raw.results_dir.trim().is_empty() {
            return Err(HardValidationError::MissingRequiredField {
                field: "results_dir",
                context: "sweep settings".to_string(),
            }
            .into());
        }

        Ok(SweepSettings {
            results_dir: root.join(&raw.results_dir),
            start_delay: Duration::from_millis(raw.start_delay_ms),
            completion_timeout: Duration::from_secs(raw.completion_timeout_secs),
        })
    }

    fn validate_method(
        raw: RawMethodConfig,
        index: usize,
        root: &Path,
    ) -> BenchResult<MethodDescriptor> {
        let context = format!("method at index {}", index);

        let name = MethodName::new(&raw.name)?;
        let roles = Self::validate_roles(&name, raw.roles)?;

        let sender_metric = Self::validate_metric_name(raw.sender_metric, "sender_metric", &name)?;
        let receiver_metric =
            Self::validate_metric_name(raw.receiver_metric, "receiver_metric", &name)?;

        let working_dir = match raw.working_dir {
            Some(dir) if dir.trim().is_empty() => {
                return Err(HardValidationError::InvalidFieldValue {
                    field: "working_dir",
                    value: dir,
                    reason: format!("Working directory cannot be blank in {}", context),
                }
                .into());
            }
            Some(dir) => root.join(dir),
            None => root.join(name.as_str()),
        };

        Ok(MethodDescriptor {
            name,
            transport: raw.transport,
            working_dir,
            roles,
            sender_metric,
            receiver_metric,
        })
    }

    fn validate_metric_name(
        value: Option<String>,
        field: &'static str,
        method: &MethodName,
    ) -> Result<String, HardValidationError> {
        let value = value
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| HardValidationError::MissingRequiredField {
                field,
                context: format!("method '{}'", method),
            })?;

        if value.contains('/') || value.contains('\\') || value == "." || value == ".." {
            return Err(HardValidationError::InvalidFieldValue {
                field,
                value,
                reason: "Metric file must be a bare file name".to_string(),
            });
        }

        Ok(value)
    }

    /// Turn the raw role map into the tagged variant. Blank commands count
    /// as absent.
    fn validate_roles(
        method: &MethodName,
        raw: BTreeMap<String, String>,
    ) -> Result<RoleSet, HardValidationError> {
        let mut languages = LanguageRoles::default();
        let mut sender = None;
        let mut receiver = None;
        let mut saw_language = false;
        let mut saw_fixed = false;

        for (key, command) in raw {
            let role_key: RoleKey =
                key.parse()
                    .map_err(|_| HardValidationError::UnknownRoleKey {
                        method: method.to_string(),
                        key: key.clone(),
                    })?;

            let command = Some(command.trim().to_string()).filter(|c| !c.is_empty());

            match role_key.language() {
                Some(_) => saw_language = true,
                None => saw_fixed = true,
            }

            match role_key {
                RoleKey::PySender => languages.py_sender = command,
                RoleKey::CppSender => languages.cpp_sender = command,
                RoleKey::PyReceiver => languages.py_receiver = command,
                RoleKey::CppReceiver => languages.cpp_receiver = command,
                RoleKey::Sender => sender = command,
                RoleKey::Receiver => receiver = command,
            }
        }

        match (saw_language, saw_fixed) {
            (true, true) => Err(HardValidationError::MixedRoleSet {
                method: method.to_string(),
            }),
            (true, false) => Ok(RoleSet::Languages(languages)),
            (false, true) => {
                let sender = sender.ok_or_else(|| HardValidationError::MissingRequiredField {
                    field: "sender",
                    context: format!("fixed roles of method '{}'", method),
                })?;
                let receiver =
                    receiver.ok_or_else(|| HardValidationError::MissingRequiredField {
                        field: "receiver",
                        context: format!("fixed roles of method '{}'", method),
                    })?;
                Ok(RoleSet::Fixed { sender, receiver })
            }
            (false, false) => Err(HardValidationError::SchemaValidation {
                message: format!("Method '{}' declares no roles", method),
            }),
        }
    }
}
