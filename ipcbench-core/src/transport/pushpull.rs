// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Push/pull message stream.
//!
//! Messages travel as length-prefixed frames over a localhost TCP
//! connection. The receiver binds; the sender connects, pushes fixed-size
//! messages and finishes with a `DONE` message.
//!
//! Frame format:
//! ```text
//! +----------------+------------------+
//! | length (4 LE)  | payload          |
//! +----------------+------------------+
//! ```

use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener};

use crate::error::TransportError;
use crate::metrics::{MetricSample, RssSampler, TransferClock};
use crate::transport::{connect_with_retry, io_error, EndpointConfig, Retry, FILL_BYTE, SENTINEL};
use crate::types::{Role, MAX_CHUNK_BYTES};

/// Largest message a frame may carry.
pub const MAX_FRAME_SIZE: usize = MAX_CHUNK_BYTES;

/// Write one message with its length prefix and flush it.
pub fn write_frame<W: Write>(writer: &mut BufWriter<W>, payload: &[u8]) -> Result<(), TransportError> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    writer
        .write_all(&(payload.len() as u32).to_le_bytes())
        .map_err(io_error("frame length write"))?;
    writer
        .write_all(payload)
        .map_err(io_error("frame payload write"))?;
    writer.flush().map_err(io_error("frame flush"))
}

/// Read one message into `buf`, growing it as needed.
///
/// Returns `None` on a clean end of stream before a new frame starts.
pub fn read_frame<R: Read>(
    reader: &mut BufReader<R>,
    buf: &mut Vec<u8>,
) -> Result<Option<usize>, TransportError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(source) => {
            return Err(TransportError::Io {
                context: "frame length read",
                source,
            })
        }
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }

    if buf.len() < len {
        buf.resize(len, 0);
    }
    reader
        .read_exact(&mut buf[..len])
        .map_err(io_error("frame payload read"))?;
    Ok(Some(len))
}

/// Bind, accept the pusher and count message bytes until `DONE`.
pub fn run_receiver(addr: SocketAddr, config: &EndpointConfig) -> Result<MetricSample, TransportError> {
    let mut clock = TransferClock::start();
    let mut rss = RssSampler::new(config.rss_stride);

    let listener =
        TcpListener::bind(addr).map_err(|source| TransportError::BindFailed { addr, source })?;
    let (stream, peer) = listener.accept().map_err(io_error("accept"))?;
    tracing::info!(addr = %addr, peer = %peer, "Pull socket connected");

    let mut reader = BufReader::with_capacity(64 * 1024, stream);
    let mut buffer = vec![0u8; config.plan.chunk_bytes()];
    let mut received = 0u64;
    let mut iteration = 0u64;

    loop {
        let len = match clock.measure(|| read_frame(&mut reader, &mut buffer))? {
            Some(len) => len,
            None => {
                tracing::debug!("Pusher closed without sentinel");
                break;
            }
        };
        if &buffer[..len] == SENTINEL {
            tracing::debug!("Sentinel received");
            break;
        }
        received += len as u64;
        rss.on_iteration(iteration);
        iteration += 1;
    }

    tracing::info!(bytes = received, messages = iteration, "Pull receiver done");
    Ok(clock.finish(Role::Receiver, received, &rss))
}

/// Connect to the puller and push the plan as fixed-size messages.
pub fn run_sender(
    addr: SocketAddr,
    config: &EndpointConfig,
    connect_retry: Retry,
) -> Result<MetricSample, TransportError> {
    let mut clock = TransferClock::start();
    let mut rss = RssSampler::new(config.rss_stride);

    let stream = connect_with_retry(addr, connect_retry)?;
    let mut writer = BufWriter::with_capacity(64 * 1024, stream);
    let message = vec![FILL_BYTE; config.plan.chunk_bytes()];
    let mut sent = 0u64;

    for iteration in 0..config.plan.iterations() {
        clock.measure(|| write_frame(&mut writer, &message))?;
        sent += message.len() as u64;
        rss.on_iteration(iteration);
    }
    clock.measure(|| write_frame(&mut writer, SENTINEL))?;

    tracing::info!(bytes = sent, "Push sender done");
    Ok(clock.finish(Role::Sender, sent, &rss))
}
