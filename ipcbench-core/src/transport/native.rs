// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Native interprocess endpoints on top of [`NativeChannel`].

use crate::error::SharedMemoryError;
use crate::metrics::{MetricSample, RssSampler, TransferClock};
use crate::shm::{AttachRetry, NativeChannel};
use crate::transport::{EndpointConfig, FILL_BYTE};
use crate::types::Role;

pub fn run_sender(segment: &str, config: &EndpointConfig) -> Result<MetricSample, SharedMemoryError> {
    let mut clock = TransferClock::start();
    let mut rss = RssSampler::new(config.rss_stride);

    let channel = NativeChannel::create(segment, config.plan)?;
    let chunk = vec![FILL_BYTE; config.plan.chunk_bytes()];
    let mut sent = 0u64;

    for iteration in 0..config.plan.iterations() {
        clock.measure(|| channel.send_chunk(&chunk))?;
        sent += chunk.len() as u64;
        rss.on_iteration(iteration);
    }

    tracing::info!(bytes = sent, segment = %segment, "Native sender done");
    Ok(clock.finish(Role::Sender, sent, &rss))
}

pub fn run_receiver(
    segment: &str,
    config: &EndpointConfig,
    retry: AttachRetry,
) -> Result<MetricSample, SharedMemoryError> {
    let mut clock = TransferClock::start();
    let mut rss = RssSampler::new(config.rss_stride);

    let channel = NativeChannel::attach(segment, config.plan, retry)?;
    let plan = channel.plan();
    let mut buffer = vec![0u8; plan.chunk_bytes()];
    let mut received = 0u64;

    for iteration in 0..plan.iterations() {
        received += clock.measure(|| channel.recv_chunk(&mut buffer))? as u64;
        rss.on_iteration(iteration);
    }

    tracing::info!(bytes = received, segment = %segment, "Native receiver done");
    Ok(clock.finish(Role::Receiver, received, &rss))
}
