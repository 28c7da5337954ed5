// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! TCP byte stream terminated by the `DONE` sentinel.
//!
//! A data chunk whose bytes equal the sentinel cannot be told apart from
//! it. Chunks are filled with a constant byte and are never 4 bytes of
//! `DONE`, so this only matters for foreign senders.

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};

use crate::error::TransportError;
use crate::metrics::{MetricSample, RssSampler, TransferClock};
use crate::transport::{connect_with_retry, io_error, EndpointConfig, Retry, FILL_BYTE, SENTINEL};
use crate::types::Role;

/// Bind `addr`, retrying while the address is still in use.
pub fn bind_with_retry(addr: SocketAddr, retry: Retry) -> Result<TcpListener, TransportError> {
    for attempt in 1..=retry.attempts {
        match TcpListener::bind(addr) {
            Ok(listener) => {
                tracing::debug!(addr = %addr, attempt = attempt, "Bind successful");
                return Ok(listener);
            }
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                tracing::warn!(
                    addr = %addr,
                    attempt = attempt,
                    max_attempts = retry.attempts,
                    "Address in use, retrying"
                );
                if attempt < retry.attempts {
                    std::thread::sleep(retry.delay);
                }
            }
            Err(source) => return Err(TransportError::BindFailed { addr, source }),
        }
    }

    Err(TransportError::BindExhausted {
        addr,
        attempts: retry.attempts,
    })
}

/// Read until `buf` is full or the peer closes. Returns the bytes read.
fn fill_chunk(stream: &mut TcpStream, buf: &mut [u8]) -> Result<usize, TransportError> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(TransportError::Io {
                    context: "socket read",
                    source,
                })
            }
        }
    }
    Ok(filled)
}

/// Accept one connection and count bytes until the sentinel or end of
/// stream.
pub fn run_receiver(
    addr: SocketAddr,
    config: &EndpointConfig,
    bind_retry: Retry,
) -> Result<MetricSample, TransportError> {
    let mut clock = TransferClock::start();
    let mut rss = RssSampler::new(config.rss_stride);

    let listener = bind_with_retry(addr, bind_retry)?;
    let (mut conn, peer) = listener.accept().map_err(io_error("accept"))?;
    tracing::info!(addr = %addr, peer = %peer, "Accepted sender connection");

    let mut buffer = vec![0u8; config.plan.chunk_bytes()];
    let mut received = 0u64;
    let mut iteration = 0u64;

    loop {
        let n = clock.measure(|| fill_chunk(&mut conn, &mut buffer))?;
        if &buffer[..n] == SENTINEL {
            // The peer may already be gone; nothing left to read either way.
            let _ = conn.shutdown(Shutdown::Read);
            tracing::debug!("Sentinel received");
            break;
        }
        if n == 0 {
            tracing::debug!("Sender closed without sentinel");
            break;
        }
        received += n as u64;
        rss.on_iteration(iteration);
        iteration += 1;
    }

    tracing::info!(bytes = received, "Socket receiver done");
    Ok(clock.finish(Role::Receiver, received, &rss))
}

/// Stream whole chunks to the receiver, then the sentinel, then half-close.
pub fn run_sender(
    addr: SocketAddr,
    config: &EndpointConfig,
    connect_retry: Retry,
) -> Result<MetricSample, TransportError> {
    let mut clock = TransferClock::start();
    let mut rss = RssSampler::new(config.rss_stride);

    let mut stream = connect_with_retry(addr, connect_retry)?;
    let chunk = vec![FILL_BYTE; config.plan.chunk_bytes()];
    let mut sent = 0u64;

    for iteration in 0..config.plan.iterations() {
        clock
            .measure(|| stream.write_all(&chunk))
            .map_err(io_error("socket write"))?;
        sent += chunk.len() as u64;
        rss.on_iteration(iteration);
    }

    clock
        .measure(|| stream.write_all(SENTINEL))
        .map_err(io_error("socket write sentinel"))?;
    stream
        .shutdown(Shutdown::Write)
        .map_err(io_error("socket shutdown"))?;

    tracing::info!(bytes = sent, "Socket sender done");
    Ok(clock.finish(Role::Sender, sent, &rss))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransferPlan;
    use std::thread;
    use std::time::Duration;

    fn free_addr() -> SocketAddr {
        TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
    }

    #[test]
    fn test_stream_counts_until_sentinel() {
        let addr = free_addr();
        let config = EndpointConfig {
            plan: TransferPlan::new(32 * 1024, 4 * 1024).unwrap(),
            rss_stride: 100,
        };

        let receiver = thread::spawn(move || run_receiver(addr, &config, Retry::NONE).unwrap());
        let sent = run_sender(addr, &config, Retry::CONNECT).unwrap();
        let received = receiver.join().unwrap();

        assert_eq!(sent.bytes, 32 * 1024);
        assert_eq!(received.bytes, sent.bytes);
    }

    #[test]
    fn test_sentinel_is_not_counted() {
        let addr = free_addr();
        let config = EndpointConfig {
            plan: TransferPlan::new(64, 8).unwrap(),
            rss_stride: 100,
        };

        let receiver = thread::spawn(move || run_receiver(addr, &config, Retry::NONE).unwrap());

        let mut stream = connect_with_retry(addr, Retry::CONNECT).unwrap();
        stream.write_all(&[1u8; 8]).unwrap();
        stream.write_all(SENTINEL).unwrap();
        stream.shutdown(Shutdown::Write).unwrap();

        assert_eq!(receiver.join().unwrap().bytes, 8);
    }

    #[test]
    fn test_close_without_sentinel_ends_loop() {
        let addr = free_addr();
        let config = EndpointConfig {
            plan: TransferPlan::new(64, 8).unwrap(),
            rss_stride: 100,
        };

        let receiver = thread::spawn(move || run_receiver(addr, &config, Retry::NONE).unwrap());
        let mut stream = connect_with_retry(addr, Retry::CONNECT).unwrap();
        stream.write_all(&[7u8; 16]).unwrap();
        drop(stream);

        assert_eq!(receiver.join().unwrap().bytes, 16);
    }

    #[test]
    fn test_bind_exhausted_while_in_use() {
        let holder = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = holder.local_addr().unwrap();
        let retry = Retry {
            attempts: 2,
            delay: Duration::from_millis(1),
        };
        assert!(matches!(
            bind_with_retry(addr, retry),
            Err(TransportError::BindExhausted { attempts: 2, .. })
        ));
    }
}
