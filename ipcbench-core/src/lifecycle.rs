// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Launches one sender/receiver pair and waits for it, bounded.
//!
//! A stalled pair never fails the caller: the receiver's process group is
//! killed, a warning is logged and the outcome records what happened.

use std::path::Path;
use std::process::ExitStatus;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::process::ProcessHandle;
use crate::types::{Role, StartOrder};

/// How long to wait for a sender's exit status after its receiver is done.
/// Only used to record the status; the sender is not signalled.
const SENDER_SETTLE: Duration = Duration::from_secs(2);

/// Upper bound on reaping a killed process group.
const REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// The two commands of one run and where to run them.
#[derive(Debug, Clone, Copy)]
pub struct PairSpec<'a> {
    pub sender_command: &'a str,
    pub receiver_command: &'a str,
    pub working_dir: &'a Path,
    pub start_order: StartOrder,
}

/// What happened to one endpoint process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointOutcome {
    pub command: String,
    pub pid: Option<u32>,
    pub exit_code: Option<i32>,
    /// Terminating signal when the process did not exit normally.
    pub signal: Option<i32>,
    pub timed_out: bool,
    pub killed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EndpointOutcome {
    fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            ..Self::default()
        }
    }

    fn record_status(&mut self, status: ExitStatus) {
        use std::os::unix::process::ExitStatusExt;
        self.exit_code = status.code();
        self.signal = status.signal();
    }

    /// Whether the process launched and exited with status 0.
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Outcome of one pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairOutcome {
    pub sender: EndpointOutcome,
    pub receiver: EndpointOutcome,
}

impl PairOutcome {
    /// True when either endpoint hit the completion timeout.
    pub fn timed_out(&self) -> bool {
        self.sender.timed_out || self.receiver.timed_out
    }
}

/// Runs pairs one at a time with a fixed start delay and timeout.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleManager {
    start_delay: Duration,
    completion_timeout: Duration,
}

impl LifecycleManager {
    pub fn new(start_delay: Duration, completion_timeout: Duration) -> Self {
        Self {
            start_delay,
            completion_timeout,
        }
    }

    pub fn start_delay(&self) -> Duration {
        self.start_delay
    }

    pub fn completion_timeout(&self) -> Duration {
        self.completion_timeout
    }

    /// Launch the pair in the transport's start order and wait for it.
    pub async fn run_pair(&self, pair: &PairSpec<'_>) -> PairOutcome {
        let mut outcome = PairOutcome {
            sender: EndpointOutcome::new(pair.sender_command),
            receiver: EndpointOutcome::new(pair.receiver_command),
        };

        match pair.start_order {
            StartOrder::SenderFirst => self.run_sender_first(pair, &mut outcome).await,
            StartOrder::ReceiverFirst => self.run_receiver_first(pair, &mut outcome).await,
        }

        outcome
    }

    /// The sender creates the IPC resources; the receiver attaches.
    async fn run_sender_first(&self, pair: &PairSpec<'_>, outcome: &mut PairOutcome) {
        let Some(mut sender) = spawn(Role::Sender, pair, &mut outcome.sender) else {
            return;
        };

        tokio::time::sleep(self.start_delay).await;

        let Some(mut receiver) = spawn(Role::Receiver, pair, &mut outcome.receiver) else {
            // Nobody will drain the sender.
            kill_and_reap(&mut sender, &mut outcome.sender).await;
            return;
        };

        let deadline = Instant::now() + self.completion_timeout;
        self.await_bounded(&mut receiver, &mut outcome.receiver, deadline)
            .await;

        if outcome.receiver.timed_out {
            // A sender blocked on the dead receiver would keep the shared
            // names alive for the next run.
            if matches!(sender.try_status(), Ok(None)) {
                kill_and_reap(&mut sender, &mut outcome.sender).await;
            } else {
                record_if_exited(&mut sender, &mut outcome.sender);
            }
        } else {
            match sender.wait_timeout(SENDER_SETTLE).await {
                Ok(Some(status)) => outcome.sender.record_status(status),
                Ok(None) => tracing::debug!(
                    pid = sender.pid(),
                    "Sender still running after receiver completed"
                ),
                Err(e) => outcome.sender.error = Some(e.to_string()),
            }
        }
    }

    /// The receiver binds; the sender runs to completion before the
    /// receiver is awaited. Both share one deadline, so the receiver never
    /// outlives the completion timeout measured from the sender's launch.
    async fn run_receiver_first(&self, pair: &PairSpec<'_>, outcome: &mut PairOutcome) {
        let Some(mut receiver) = spawn(Role::Receiver, pair, &mut outcome.receiver) else {
            return;
        };

        tokio::time::sleep(self.start_delay).await;

        let Some(mut sender) = spawn(Role::Sender, pair, &mut outcome.sender) else {
            // Nobody will ever connect.
            kill_and_reap(&mut receiver, &mut outcome.receiver).await;
            return;
        };

        let deadline = Instant::now() + self.completion_timeout;
        self.await_bounded(&mut sender, &mut outcome.sender, deadline)
            .await;
        self.await_bounded(&mut receiver, &mut outcome.receiver, deadline)
            .await;
    }

    /// Wait until `deadline`; on expiry kill the process group.
    async fn await_bounded(
        &self,
        handle: &mut ProcessHandle,
        outcome: &mut EndpointOutcome,
        deadline: Instant,
    ) {
        // A zero remainder still polls once, so an exited child is recorded.
        let remaining = deadline.saturating_duration_since(Instant::now());
        match handle.wait_timeout(remaining).await {
            Ok(Some(status)) => {
                outcome.record_status(status);
                tracing::debug!(
                    label = %handle.label(),
                    pid = handle.pid(),
                    exit_code = ?outcome.exit_code,
                    "Endpoint exited"
                );
            }
            Ok(None) => {
                outcome.timed_out = true;
                tracing::warn!(
                    label = %handle.label(),
                    pid = handle.pid(),
                    timeout_secs = self.completion_timeout.as_secs_f64(),
                    "Endpoint timed out, killing process group"
                );
                kill_and_reap(handle, outcome).await;
            }
            Err(e) => {
                tracing::error!(label = %handle.label(), error = %e, "Failed to wait for endpoint");
                outcome.error = Some(e.to_string());
            }
        }
    }
}

fn spawn(role: Role, pair: &PairSpec<'_>, outcome: &mut EndpointOutcome) -> Option<ProcessHandle> {
    let command = match role {
        Role::Sender => pair.sender_command,
        Role::Receiver => pair.receiver_command,
    };

    match ProcessHandle::spawn_detached(&role.to_string(), command, pair.working_dir) {
        Ok(handle) => {
            outcome.pid = Some(handle.pid());
            Some(handle)
        }
        Err(e) => {
            tracing::error!(role = %role, error = %e, "Failed to launch endpoint");
            outcome.error = Some(e.to_string());
            None
        }
    }
}

async fn kill_and_reap(handle: &mut ProcessHandle, outcome: &mut EndpointOutcome) {
    if let Err(e) = handle.terminate_group() {
        tracing::error!(label = %handle.label(), error = %e, "Failed to kill process group");
        outcome.error = Some(e.to_string());
        return;
    }
    outcome.killed = true;

    match handle.wait_timeout(REAP_TIMEOUT).await {
        Ok(Some(status)) => outcome.record_status(status),
        Ok(None) => tracing::warn!(pid = handle.pid(), "Killed process did not exit"),
        Err(e) => outcome.error = Some(e.to_string()),
    }
}

fn record_if_exited(handle: &mut ProcessHandle, outcome: &mut EndpointOutcome) {
    if let Ok(Some(status)) = handle.try_status() {
        outcome.record_status(status);
    }
}
