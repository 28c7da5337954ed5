// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Shared memory primitives used by the memory-based transports.

mod handshake;
mod native;
mod region;
mod semaphore;

use std::time::Duration;

use crate::error::SharedMemoryError;

pub use handshake::{BoundedHandshake, HandshakeNames};
pub use native::{NativeChannel, DEFAULT_NATIVE_SEGMENT};
pub use region::SharedMemoryRegion;
pub use semaphore::{NamedSemaphore, SharedSemaphore};

/// How long an attaching endpoint keeps waiting for the creator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachRetry {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for AttachRetry {
    fn default() -> Self {
        Self {
            attempts: 100,
            delay: Duration::from_millis(100),
        }
    }
}

impl AttachRetry {
    /// Run `op` until it stops reporting `NotFound` or attempts run out.
    pub(crate) fn run<T>(
        &self,
        mut op: impl FnMut() -> Result<T, SharedMemoryError>,
    ) -> Result<T, SharedMemoryError> {
        let mut attempt = 1;
        loop {
            match op() {
                Err(SharedMemoryError::NotFound { name }) if attempt < self.attempts => {
                    tracing::debug!(
                        name = %name,
                        attempt = attempt,
                        "Creator not ready, retrying attach"
                    );
                    attempt += 1;
                    std::thread::sleep(self.delay);
                }
                other => return other,
            }
        }
    }
}
