// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Endpoint implementations of the four transfer protocols.
//!
//! Every endpoint moves a [`TransferPlan`] worth of data, measures itself
//! and returns a [`MetricSample`]. Endpoints are synchronous; each runs as
//! its own OS process launched by the lifecycle manager.

pub mod native;
pub mod pushpull;
pub mod shm;
pub mod socket;

use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use crate::error::TransportError;
use crate::metrics::DEFAULT_RSS_STRIDE;
use crate::types::TransferPlan;

/// End-of-stream marker of the socket and push/pull transports.
pub const SENTINEL: &[u8] = b"DONE";

/// Default localhost port of the socket transport.
pub const DEFAULT_SOCKET_PORT: u16 = 5000;

/// Default localhost port of the push/pull transport.
pub const DEFAULT_PUSH_PULL_PORT: u16 = 5555;

/// Byte written into every outgoing chunk.
pub(crate) const FILL_BYTE: u8 = 0x42;

/// Settings shared by every endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointConfig {
    pub plan: TransferPlan,
    /// Iterations between resident memory samples.
    pub rss_stride: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            plan: TransferPlan::default(),
            rss_stride: DEFAULT_RSS_STRIDE,
        }
    }
}

/// Bounded retry with a fixed delay, used for binding and connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retry {
    pub attempts: u32,
    pub delay: Duration,
}

impl Retry {
    /// Listener bind: 30 attempts, 2 s apart.
    pub const BIND: Retry = Retry {
        attempts: 30,
        delay: Duration::from_secs(2),
    };

    /// Sender connect: 50 attempts, 100 ms apart.
    pub const CONNECT: Retry = Retry {
        attempts: 50,
        delay: Duration::from_millis(100),
    };

    /// A single attempt.
    pub const NONE: Retry = Retry {
        attempts: 1,
        delay: Duration::ZERO,
    };
}

/// Connect to a listener that may not be up yet.
pub(crate) fn connect_with_retry(
    addr: SocketAddr,
    retry: Retry,
) -> Result<TcpStream, TransportError> {
    let mut attempt = 1;
    loop {
        match TcpStream::connect(addr) {
            Ok(stream) => {
                tracing::debug!(addr = %addr, attempt = attempt, "Connected");
                return Ok(stream);
            }
            Err(e) if attempt < retry.attempts => {
                tracing::debug!(
                    addr = %addr,
                    attempt = attempt,
                    error = %e,
                    "Connect failed, retrying"
                );
                attempt += 1;
                std::thread::sleep(retry.delay);
            }
            Err(e) => {
                return Err(TransportError::ConnectFailed {
                    addr,
                    attempts: attempt,
                    reason: e.to_string(),
                })
            }
        }
    }
}

pub(crate) fn io_error(context: &'static str) -> impl FnOnce(std::io::Error) -> TransportError {
    move |source| TransportError::Io { context, source }
}
