// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Depth-1 bounded buffer over a named shared memory segment.
//!
//! Two named counting semaphores guard one chunk-sized slot: `empty`
//! (initial 1) and `full` (initial 0). The sender acquires `empty`, writes,
//! releases `full`; the receiver acquires `full`, reads, releases `empty`.
//! There is no end-of-stream marker, so both sides must run the same number
//! of iterations. The creator publishes its plan in a header at the start of
//! the segment and the attaching side follows that plan. Segments created
//! without a header (data at offset 0, exactly one chunk long) are still
//! accepted; the attaching side then relies on its own plan.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::SharedMemoryError;
use crate::shm::semaphore::NamedSemaphore;
use crate::shm::{AttachRetry, SharedMemoryRegion};
use crate::types::TransferPlan;

/// Marks a header whose plan fields are fully written.
const PLAN_MAGIC: u64 = 0x4950_4342_5348_4d31; // "IPCBSHM1"

/// Bytes reserved in front of the data slot.
const HEADER_SIZE: usize = 64;

/// Plan header stored at the start of the segment.
#[repr(C)]
struct PlanHeader {
    magic: AtomicU64,
    chunk_bytes: AtomicU64,
    iterations: AtomicU64,
}

/// Names of the three primitives. Fixed per transport, not unique per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeNames {
    pub segment: String,
    pub empty: String,
    pub full: String,
}

impl Default for HandshakeNames {
    fn default() -> Self {
        Self {
            segment: "my_shm".to_string(),
            empty: "sem_empty".to_string(),
            full: "sem_full".to_string(),
        }
    }
}

/// One end of the bounded-buffer handshake.
pub struct BoundedHandshake {
    // Field order matters: semaphores close before the segment unmaps.
    empty: NamedSemaphore,
    full: NamedSemaphore,
    region: SharedMemoryRegion,
    plan: TransferPlan,
    /// Offset of the data slot: `HEADER_SIZE`, or 0 for header-less segments.
    data_offset: usize,
}

impl BoundedHandshake {
    /// Create the segment and both semaphores. The returned handle owns all
    /// three and unlinks them on drop.
    pub fn create(names: &HandshakeNames, plan: TransferPlan) -> Result<Self, SharedMemoryError> {
        let region = SharedMemoryRegion::create(&names.segment, HEADER_SIZE + plan.chunk_bytes())?;

        // SAFETY: we created the region and nobody can see the header until
        // the semaphores exist.
        unsafe {
            let header = &*(region.as_ptr() as *const PlanHeader);
            header
                .chunk_bytes
                .store(plan.chunk_bytes() as u64, Ordering::Relaxed);
            header.iterations.store(plan.iterations(), Ordering::Relaxed);
            header.magic.store(PLAN_MAGIC, Ordering::Release);
        }

        let empty = NamedSemaphore::create(&names.empty, 1)?;
        let full = NamedSemaphore::create(&names.full, 0)?;

        tracing::info!(
            segment = %names.segment,
            plan = %plan,
            "Created shared memory handshake"
        );

        Ok(Self {
            empty,
            full,
            region,
            plan,
            data_offset: HEADER_SIZE,
        })
    }

    /// Attach to primitives created by the other process.
    ///
    /// The semaphores are created last, so once both open the header is
    /// complete. If the creator's plan differs from `expected` the creator
    /// wins and a warning is logged. A segment without a header is used as a
    /// bare chunk slot at offset 0 with `expected` as the plan.
    pub fn attach(
        names: &HandshakeNames,
        expected: TransferPlan,
        retry: AttachRetry,
    ) -> Result<Self, SharedMemoryError> {
        let (empty, full) = retry.run(|| {
            let empty = NamedSemaphore::open(&names.empty)?;
            let full = NamedSemaphore::open(&names.full)?;
            Ok((empty, full))
        })?;

        let region = SharedMemoryRegion::open(&names.segment)?;
        let (plan, data_offset) = match Self::read_plan(&region)? {
            Some(plan) => {
                if plan != expected {
                    tracing::warn!(
                        segment = %names.segment,
                        creator_plan = %plan,
                        local_plan = %expected,
                        "Transfer plan differs from creator, following creator"
                    );
                }
                (plan, HEADER_SIZE)
            }
            None => {
                tracing::warn!(
                    segment = %names.segment,
                    size = region.size(),
                    local_plan = %expected,
                    "Segment has no plan header, using local plan"
                );
                (expected, 0)
            }
        };

        if region.size() < data_offset + plan.chunk_bytes() {
            return Err(SharedMemoryError::InvalidHeader {
                name: names.segment.clone(),
                reason: format!(
                    "Segment of {} bytes cannot hold a {} byte chunk",
                    region.size(),
                    plan.chunk_bytes()
                ),
            });
        }

        Ok(Self {
            empty,
            full,
            region,
            plan,
            data_offset,
        })
    }

    /// Unlink primitives a killed run left behind.
    pub fn remove_stale(names: &HandshakeNames) -> Result<(), SharedMemoryError> {
        SharedMemoryRegion::remove(&names.segment)?;
        NamedSemaphore::remove(&names.empty)?;
        NamedSemaphore::remove(&names.full)
    }

    /// The creator's plan, or `None` when the segment carries no header.
    fn read_plan(region: &SharedMemoryRegion) -> Result<Option<TransferPlan>, SharedMemoryError> {
        if region.size() < HEADER_SIZE {
            return Ok(None);
        }

        // SAFETY: the region holds at least HEADER_SIZE bytes
        let header = unsafe { &*(region.as_ptr() as *const PlanHeader) };

        if header.magic.load(Ordering::Acquire) != PLAN_MAGIC {
            return Ok(None);
        }

        let chunk_bytes = header.chunk_bytes.load(Ordering::Relaxed) as usize;
        let iterations = header.iterations.load(Ordering::Relaxed);

        TransferPlan::from_iterations(chunk_bytes, iterations)
            .map(Some)
            .map_err(|e| SharedMemoryError::InvalidHeader {
                name: region.name().to_string(),
                reason: e.to_string(),
            })
    }

    /// Plan both sides follow.
    pub fn plan(&self) -> TransferPlan {
        self.plan
    }

    fn data_ptr(&self) -> *mut u8 {
        // SAFETY: data_offset + chunk_bytes was checked against the region size
        unsafe { self.region.as_ptr().add(self.data_offset) }
    }

    /// Wait for the slot to drain, write one chunk, signal the receiver.
    pub fn send_chunk(&self, data: &[u8]) -> Result<(), SharedMemoryError> {
        if data.len() > self.plan.chunk_bytes() {
            return Err(SharedMemoryError::PayloadTooLarge {
                size: data.len(),
                max: self.plan.chunk_bytes(),
            });
        }

        self.empty.acquire()?;
        // SAFETY: `empty` grants exclusive access to the slot, which holds
        // chunk_bytes >= data.len() bytes.
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.data_ptr(), data.len());
        }
        self.full.release()
    }

    /// Wait for a chunk, copy it out, hand the slot back. Returns the number
    /// of bytes copied.
    pub fn recv_chunk(&self, out: &mut [u8]) -> Result<usize, SharedMemoryError> {
        let len = out.len().min(self.plan.chunk_bytes());

        self.full.acquire()?;
        // SAFETY: `full` grants exclusive access to the slot until `empty`
        // is released; len is bounded by the slot size.
        unsafe {
            std::ptr::copy_nonoverlapping(self.data_ptr(), out.as_mut_ptr(), len);
        }
        self.empty.release()?;
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn names(tag: &str) -> HandshakeNames {
        let pid = std::process::id();
        HandshakeNames {
            segment: format!("ipcbench_hs_{}_{}_shm", tag, pid),
            empty: format!("ipcbench_hs_{}_{}_empty", tag, pid),
            full: format!("ipcbench_hs_{}_{}_full", tag, pid),
        }
    }

    fn quick_retry() -> AttachRetry {
        AttachRetry {
            attempts: 100,
            delay: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_chunks_arrive_in_order() {
        let names = names("order");
        let plan = TransferPlan::new(8 * 256, 256).unwrap();
        let sender = BoundedHandshake::create(&names, plan).unwrap();

        let receiver = {
            let names = names.clone();
            thread::spawn(move || {
                let hs = BoundedHandshake::attach(&names, plan, quick_retry()).unwrap();
                let mut buf = vec![0u8; 256];
                let mut seen = Vec::new();
                for _ in 0..hs.plan().iterations() {
                    let n = hs.recv_chunk(&mut buf).unwrap();
                    assert_eq!(n, 256);
                    seen.push(buf[0]);
                }
                seen
            })
        };

        for i in 0..plan.iterations() {
            sender.send_chunk(&vec![i as u8; 256]).unwrap();
        }

        let seen = receiver.join().unwrap();
        assert_eq!(seen, (0..8).collect::<Vec<u8>>());
    }

    #[test]
    fn test_attacher_follows_creator_plan() {
        let names = names("plan");
        let creator_plan = TransferPlan::new(4 * 128, 128).unwrap();
        let _creator = BoundedHandshake::create(&names, creator_plan).unwrap();

        let local_plan = TransferPlan::new(10 * 64, 64).unwrap();
        let attached = BoundedHandshake::attach(&names, local_plan, quick_retry()).unwrap();
        assert_eq!(attached.plan(), creator_plan);
    }

    #[test]
    fn test_attach_to_headerless_segment() {
        // Laid out like the C++ and Python senders: one bare chunk slot.
        let names = names("bare");
        let chunk = 4096;
        let segment = SharedMemoryRegion::create(&names.segment, chunk).unwrap();
        let empty = NamedSemaphore::create(&names.empty, 1).unwrap();
        let full = NamedSemaphore::create(&names.full, 0).unwrap();

        let plan = TransferPlan::new(5 * chunk as u64, chunk).unwrap();
        let hs = BoundedHandshake::attach(&names, plan, quick_retry()).unwrap();
        assert_eq!(hs.plan(), plan);

        let mut buf = vec![0u8; chunk];
        let mut received = 0;
        for i in 0..plan.iterations() {
            empty.acquire().unwrap();
            unsafe { std::ptr::write_bytes(segment.as_ptr(), i as u8 + 1, chunk) };
            full.release().unwrap();

            received += hs.recv_chunk(&mut buf).unwrap();
            assert!(buf.iter().all(|&b| b == i as u8 + 1));
        }
        assert_eq!(received as u64, plan.total_bytes());
    }

    #[test]
    fn test_headerless_segment_too_small_for_plan() {
        let names = names("bare_small");
        let _segment = SharedMemoryRegion::create(&names.segment, 1024).unwrap();
        let _empty = NamedSemaphore::create(&names.empty, 1).unwrap();
        let _full = NamedSemaphore::create(&names.full, 0).unwrap();

        let plan = TransferPlan::new(4 * 2048, 2048).unwrap();
        assert!(matches!(
            BoundedHandshake::attach(&names, plan, quick_retry()),
            Err(SharedMemoryError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn test_attach_gives_up_without_creator() {
        let names = names("absent");
        let retry = AttachRetry {
            attempts: 3,
            delay: Duration::from_millis(1),
        };
        let plan = TransferPlan::new(128, 64).unwrap();
        assert!(matches!(
            BoundedHandshake::attach(&names, plan, retry),
            Err(SharedMemoryError::NotFound { .. })
        ));
    }

    #[test]
    fn test_second_creator_collides() {
        let names = names("collide");
        let plan = TransferPlan::new(128, 64).unwrap();
        let _first = BoundedHandshake::create(&names, plan).unwrap();
        assert!(matches!(
            BoundedHandshake::create(&names, plan),
            Err(SharedMemoryError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn test_oversized_chunk_rejected() {
        let names = names("oversize");
        let plan = TransferPlan::new(128, 64).unwrap();
        let hs = BoundedHandshake::create(&names, plan).unwrap();
        assert!(matches!(
            hs.send_chunk(&[0u8; 65]),
            Err(SharedMemoryError::PayloadTooLarge { .. })
        ));
    }
}
