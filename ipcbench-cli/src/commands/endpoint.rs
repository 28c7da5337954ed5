// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `ipcbench endpoint` command - Run one side of a transfer.
//!
//! Each endpoint moves the configured plan, then writes its metrics file.
//! Catalogue entries launch these with matching plans on both sides.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Subcommand};
use ipcbench_core::metrics::DEFAULT_RSS_STRIDE;
use ipcbench_core::shm::{AttachRetry, BoundedHandshake, HandshakeNames, DEFAULT_NATIVE_SEGMENT};
use ipcbench_core::transport::{self, Retry, DEFAULT_PUSH_PULL_PORT, DEFAULT_SOCKET_PORT};
use ipcbench_core::types::{DEFAULT_CHUNK_BYTES, DEFAULT_TOTAL_BYTES};
use ipcbench_core::{EndpointConfig, MetricSample, Port, TransferPlan};

#[derive(Subcommand, Debug)]
pub enum EndpointCommand {
    /// Create the shared memory buffer and fill it
    ShmSender {
        #[command(flatten)]
        names: ShmNames,
        /// Remove primitives left behind by an earlier run first
        #[arg(long)]
        reclaim_stale: bool,
        #[command(flatten)]
        plan: PlanArgs,
        #[arg(long, default_value = "shm_sender_metrics.csv")]
        metrics_file: PathBuf,
    },

    /// Attach to the shared memory buffer and drain it
    ShmReceiver {
        #[command(flatten)]
        names: ShmNames,
        #[command(flatten)]
        attach: AttachArgs,
        #[command(flatten)]
        plan: PlanArgs,
        #[arg(long, default_value = "shm_receiver_metrics.csv")]
        metrics_file: PathBuf,
    },

    /// Stream chunks over TCP
    SocketSender {
        #[command(flatten)]
        addr: AddrArgs,
        #[command(flatten)]
        plan: PlanArgs,
        #[arg(long, default_value = "socket_sender_metrics.csv")]
        metrics_file: PathBuf,
    },

    /// Accept one TCP connection and count bytes until the sentinel
    SocketReceiver {
        #[command(flatten)]
        addr: AddrArgs,
        #[command(flatten)]
        plan: PlanArgs,
        #[arg(long, default_value = "socket_receiver_metrics.csv")]
        metrics_file: PathBuf,
    },

    /// Push length-prefixed messages to a pull receiver
    PushSender {
        #[command(flatten)]
        addr: AddrArgs,
        #[command(flatten)]
        plan: PlanArgs,
        #[arg(long, default_value = "zmq_sender_metrics.csv")]
        metrics_file: PathBuf,
    },

    /// Pull messages until the sentinel message
    PullReceiver {
        #[command(flatten)]
        addr: AddrArgs,
        #[command(flatten)]
        plan: PlanArgs,
        #[arg(long, default_value = "zmq_receiver_metrics.csv")]
        metrics_file: PathBuf,
    },

    /// Create the native segment and fill it
    NativeSender {
        #[arg(long, default_value = DEFAULT_NATIVE_SEGMENT)]
        segment: String,
        #[command(flatten)]
        plan: PlanArgs,
        #[arg(long, default_value = "boost_sender_metrics.csv")]
        metrics_file: PathBuf,
    },

    /// Attach to the native segment and drain it
    NativeReceiver {
        #[arg(long, default_value = DEFAULT_NATIVE_SEGMENT)]
        segment: String,
        #[command(flatten)]
        attach: AttachArgs,
        #[command(flatten)]
        plan: PlanArgs,
        #[arg(long, default_value = "boost_receiver_metrics.csv")]
        metrics_file: PathBuf,
    },
}

/// Transfer plan and sampling flags shared by every endpoint.
#[derive(Args, Debug, Clone, Copy)]
pub struct PlanArgs {
    /// Total bytes to move
    #[arg(long, default_value_t = DEFAULT_TOTAL_BYTES)]
    pub total_bytes: u64,

    /// Bytes per transfer call
    #[arg(long, default_value_t = DEFAULT_CHUNK_BYTES)]
    pub chunk_bytes: usize,

    /// Iterations between resident memory samples
    #[arg(long, default_value_t = DEFAULT_RSS_STRIDE)]
    pub rss_stride: u64,
}

impl PlanArgs {
    fn endpoint_config(&self) -> anyhow::Result<EndpointConfig> {
        let plan = TransferPlan::new(self.total_bytes, self.chunk_bytes)?;
        anyhow::ensure!(self.rss_stride > 0, "--rss-stride must be at least 1");
        Ok(EndpointConfig {
            plan,
            rss_stride: self.rss_stride,
        })
    }
}

#[derive(Args, Debug, Clone)]
pub struct ShmNames {
    #[arg(long, default_value = "my_shm")]
    pub segment: String,
    #[arg(long, default_value = "sem_empty")]
    pub empty_sem: String,
    #[arg(long, default_value = "sem_full")]
    pub full_sem: String,
}

impl From<ShmNames> for HandshakeNames {
    fn from(names: ShmNames) -> Self {
        Self {
            segment: names.segment,
            empty: names.empty_sem,
            full: names.full_sem,
        }
    }
}

#[derive(Args, Debug, Clone, Copy)]
pub struct AttachArgs {
    /// Attempts to find the creator's primitives
    #[arg(long, default_value_t = 100)]
    pub attach_attempts: u32,

    /// Delay between attach attempts in milliseconds
    #[arg(long, default_value_t = 100)]
    pub attach_delay_ms: u64,
}

impl From<AttachArgs> for AttachRetry {
    fn from(args: AttachArgs) -> Self {
        Self {
            attempts: args.attach_attempts,
            delay: Duration::from_millis(args.attach_delay_ms),
        }
    }
}

#[derive(Args, Debug, Clone, Copy)]
pub struct AddrArgs {
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub host: IpAddr,

    /// Port (5000 for sockets, 5555 for push/pull when omitted)
    #[arg(long, value_parser = parse_port)]
    pub port: Option<u16>,
}

impl AddrArgs {
    fn socket_addr(&self, default_port: u16) -> SocketAddr {
        SocketAddr::new(self.host, self.port.unwrap_or(default_port))
    }
}

fn parse_port(s: &str) -> Result<u16, String> {
    let raw: u16 = s.parse().map_err(|e| format!("invalid port '{}': {}", s, e))?;
    Port::new(raw).map(u16::from).map_err(|e| e.to_string())
}

pub async fn execute(command: EndpointCommand) -> anyhow::Result<()> {
    let (sample, metrics_file) = match command {
        EndpointCommand::ShmSender {
            names,
            reclaim_stale,
            plan,
            metrics_file,
        } => {
            let config = plan.endpoint_config()?;
            let names = HandshakeNames::from(names);
            tracing::info!(segment = %names.segment, plan = %config.plan, "Starting shared memory sender");
            let sample = blocking(move || {
                if reclaim_stale {
                    BoundedHandshake::remove_stale(&names)?;
                }
                transport::shm::run_sender(&names, &config)
            })
            .await?;
            (sample, metrics_file)
        }
        EndpointCommand::ShmReceiver {
            names,
            attach,
            plan,
            metrics_file,
        } => {
            let config = plan.endpoint_config()?;
            let names = HandshakeNames::from(names);
            tracing::info!(segment = %names.segment, "Starting shared memory receiver");
            let sample =
                blocking(move || transport::shm::run_receiver(&names, &config, attach.into()))
                    .await?;
            (sample, metrics_file)
        }
        EndpointCommand::SocketSender {
            addr,
            plan,
            metrics_file,
        } => {
            let config = plan.endpoint_config()?;
            let addr = addr.socket_addr(DEFAULT_SOCKET_PORT);
            tracing::info!(addr = %addr, plan = %config.plan, "Starting socket sender");
            let sample =
                blocking(move || transport::socket::run_sender(addr, &config, Retry::CONNECT))
                    .await?;
            (sample, metrics_file)
        }
        EndpointCommand::SocketReceiver {
            addr,
            plan,
            metrics_file,
        } => {
            let config = plan.endpoint_config()?;
            let addr = addr.socket_addr(DEFAULT_SOCKET_PORT);
            tracing::info!(addr = %addr, "Starting socket receiver");
            let sample =
                blocking(move || transport::socket::run_receiver(addr, &config, Retry::BIND))
                    .await?;
            (sample, metrics_file)
        }
        EndpointCommand::PushSender {
            addr,
            plan,
            metrics_file,
        } => {
            let config = plan.endpoint_config()?;
            let addr = addr.socket_addr(DEFAULT_PUSH_PULL_PORT);
            tracing::info!(addr = %addr, plan = %config.plan, "Starting push sender");
            let sample =
                blocking(move || transport::pushpull::run_sender(addr, &config, Retry::CONNECT))
                    .await?;
            (sample, metrics_file)
        }
        EndpointCommand::PullReceiver {
            addr,
            plan,
            metrics_file,
        } => {
            let config = plan.endpoint_config()?;
            let addr = addr.socket_addr(DEFAULT_PUSH_PULL_PORT);
            tracing::info!(addr = %addr, "Starting pull receiver");
            let sample = blocking(move || transport::pushpull::run_receiver(addr, &config)).await?;
            (sample, metrics_file)
        }
        EndpointCommand::NativeSender {
            segment,
            plan,
            metrics_file,
        } => {
            let config = plan.endpoint_config()?;
            tracing::info!(segment = %segment, plan = %config.plan, "Starting native sender");
            let sample = blocking(move || transport::native::run_sender(&segment, &config)).await?;
            (sample, metrics_file)
        }
        EndpointCommand::NativeReceiver {
            segment,
            attach,
            plan,
            metrics_file,
        } => {
            let config = plan.endpoint_config()?;
            tracing::info!(segment = %segment, "Starting native receiver");
            let sample = blocking(move || {
                transport::native::run_receiver(&segment, &config, attach.into())
            })
            .await?;
            (sample, metrics_file)
        }
    };

    sample
        .write_csv(&metrics_file)
        .with_context(|| format!("writing metrics to {}", metrics_file.display()))?;

    tracing::info!(
        role = %sample.role,
        bytes = sample.bytes,
        active_time_sec = sample.active_time_sec,
        wall_time_sec = sample.wall_time_sec,
        metrics_file = %metrics_file.display(),
        "Endpoint finished"
    );
    Ok(())
}

/// Transfers block on semaphores and sockets, so they run off the runtime.
async fn blocking<E>(
    transfer: impl FnOnce() -> Result<MetricSample, E> + Send + 'static,
) -> anyhow::Result<MetricSample>
where
    E: std::error::Error + Send + Sync + 'static,
{
    let sample = tokio::task::spawn_blocking(transfer)
        .await
        .context("endpoint task panicked")??;
    Ok(sample)
}
