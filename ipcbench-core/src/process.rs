// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Endpoint process handles.
//!
//! Each endpoint runs as `sh -c <command>` in its own process group, so a
//! stalled endpoint can be killed together with anything it spawned.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};

use crate::error::LifecycleError;

/// A launched endpoint process, leader of its own process group.
pub struct ProcessHandle {
    label: String,
    command: String,
    child: Child,
    pid: u32,
}

impl ProcessHandle {
    /// Launch `command` through the shell in `working_dir`, detached into a
    /// new process group. Does not wait for it.
    pub fn spawn_detached(
        label: &str,
        command: &str,
        working_dir: &Path,
    ) -> Result<Self, LifecycleError> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .process_group(0);

        let child = cmd.spawn().map_err(|e| LifecycleError::SpawnFailed {
            command: command.to_string(),
            reason: format!("{} (cwd: {})", e, working_dir.display()),
        })?;

        let pid = child.id().ok_or_else(|| LifecycleError::SpawnFailed {
            command: command.to_string(),
            reason: "Process exited before its pid was read".to_string(),
        })?;

        tracing::debug!(
            label = %label,
            pid = pid,
            command = %command,
            cwd = %working_dir.display(),
            "Spawned endpoint process"
        );

        Ok(Self {
            label: label.to_string(),
            command: command.to_string(),
            child,
            pid,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Wait for exit. `Ok(None)` means the timeout elapsed first and the
    /// process is still running.
    pub async fn wait_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<ExitStatus>, LifecycleError> {
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => Ok(Some(status)),
            Ok(Err(e)) => Err(LifecycleError::WaitFailed {
                pid: self.pid,
                reason: e.to_string(),
            }),
            Err(_) => Ok(None),
        }
    }

    /// Non-blocking exit check.
    pub fn try_status(&mut self) -> Result<Option<ExitStatus>, LifecycleError> {
        self.child.try_wait().map_err(|e| LifecycleError::WaitFailed {
            pid: self.pid,
            reason: e.to_string(),
        })
    }

    /// SIGKILL the whole process group. A group that is already gone is not
    /// an error.
    pub fn terminate_group(&self) -> Result<(), LifecycleError> {
        let pgid = self.pid as i32;
        match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
            Ok(()) => {
                tracing::debug!(label = %self.label, pgid = pgid, "Sent SIGKILL to process group");
                Ok(())
            }
            Err(Errno::ESRCH) => {
                tracing::debug!(label = %self.label, pgid = pgid, "Process group already gone");
                Ok(())
            }
            Err(e) => Err(LifecycleError::SignalFailed {
                pgid,
                reason: e.to_string(),
            }),
        }
    }
}
