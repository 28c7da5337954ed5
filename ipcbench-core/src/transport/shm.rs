// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Shared memory endpoints on top of [`BoundedHandshake`].

use crate::error::SharedMemoryError;
use crate::metrics::{MetricSample, RssSampler, TransferClock};
use crate::shm::{AttachRetry, BoundedHandshake, HandshakeNames};
use crate::transport::{EndpointConfig, FILL_BYTE};
use crate::types::Role;

/// Create the handshake primitives and push the whole plan through them.
///
/// The primitives are unlinked when this returns, whether or not the
/// transfer completed.
pub fn run_sender(
    names: &HandshakeNames,
    config: &EndpointConfig,
) -> Result<MetricSample, SharedMemoryError> {
    let mut clock = TransferClock::start();
    let mut rss = RssSampler::new(config.rss_stride);

    let handshake = BoundedHandshake::create(names, config.plan)?;
    let plan = handshake.plan();
    let chunk = vec![FILL_BYTE; plan.chunk_bytes()];
    let mut sent = 0u64;

    for iteration in 0..plan.iterations() {
        clock.measure(|| handshake.send_chunk(&chunk))?;
        sent += chunk.len() as u64;
        rss.on_iteration(iteration);
    }

    tracing::info!(bytes = sent, iterations = plan.iterations(), "Shared memory sender done");
    Ok(clock.finish(Role::Sender, sent, &rss))
}

/// Attach to the sender's primitives and drain the plan the sender
/// published.
pub fn run_receiver(
    names: &HandshakeNames,
    config: &EndpointConfig,
    retry: AttachRetry,
) -> Result<MetricSample, SharedMemoryError> {
    let mut clock = TransferClock::start();
    let mut rss = RssSampler::new(config.rss_stride);

    let handshake = BoundedHandshake::attach(names, config.plan, retry)?;
    let plan = handshake.plan();
    let mut buffer = vec![0u8; plan.chunk_bytes()];
    let mut received = 0u64;

    for iteration in 0..plan.iterations() {
        let n = clock.measure(|| handshake.recv_chunk(&mut buffer))?;
        received += n as u64;
        rss.on_iteration(iteration);
    }

    tracing::info!(bytes = received, iterations = plan.iterations(), "Shared memory receiver done");
    Ok(clock.finish(Role::Receiver, received, &rss))
}
