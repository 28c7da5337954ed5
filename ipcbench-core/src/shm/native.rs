// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Lock-step channel with its semaphores embedded in the segment.
//!
//! One segment holds three unnamed process-shared semaphores and the data
//! slot. Per chunk the sender waits `mem_lock`, writes, posts `client_ready`
//! and waits `server_ready`; the receiver waits `client_ready`, reads, posts
//! `mem_lock` and then `server_ready`. The sender therefore never runs ahead
//! of the receiver by more than the chunk in flight.

use std::mem::{offset_of, size_of};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::SharedMemoryError;
use crate::shm::semaphore::SharedSemaphore;
use crate::shm::{AttachRetry, SharedMemoryRegion};
use crate::types::TransferPlan;

/// Default segment name of the native transport.
pub const DEFAULT_NATIVE_SEGMENT: &str = "ipcbench_native";

const NATIVE_MAGIC: u64 = 0x4950_4342_4e41_5431; // "IPCBNAT1"

/// Data slot alignment inside the segment.
const DATA_ALIGN: usize = 64;

#[repr(C)]
struct NativeHeader {
    magic: AtomicU64,
    chunk_bytes: AtomicU64,
    iterations: AtomicU64,
    mem_lock: libc::sem_t,
    client_ready: libc::sem_t,
    server_ready: libc::sem_t,
}

const fn data_offset() -> usize {
    size_of::<NativeHeader>().div_ceil(DATA_ALIGN) * DATA_ALIGN
}

/// One end of the native lock-step channel.
pub struct NativeChannel {
    mem_lock: SharedSemaphore,
    client_ready: SharedSemaphore,
    server_ready: SharedSemaphore,
    plan: TransferPlan,
    region: SharedMemoryRegion,
}

impl NativeChannel {
    /// Create the segment, removing any copy a previous run left behind.
    pub fn create(name: &str, plan: TransferPlan) -> Result<Self, SharedMemoryError> {
        SharedMemoryRegion::remove(name)?;
        let region = SharedMemoryRegion::create(name, data_offset() + plan.chunk_bytes())?;
        let base = region.as_ptr();

        // SAFETY: the region is freshly created, large enough for the header,
        // and page aligned; no other process can see an initialized header
        // until the magic is published below.
        let (mem_lock, client_ready, server_ready) = unsafe {
            let sem_at = |offset: usize| base.add(offset) as *mut libc::sem_t;
            let mem_lock =
                SharedSemaphore::init(sem_at(offset_of!(NativeHeader, mem_lock)), 1, "mem_lock")?;
            let client_ready = SharedSemaphore::init(
                sem_at(offset_of!(NativeHeader, client_ready)),
                0,
                "client_ready",
            )?;
            let server_ready = SharedSemaphore::init(
                sem_at(offset_of!(NativeHeader, server_ready)),
                0,
                "server_ready",
            )?;

            let header = &*(base as *const NativeHeader);
            header
                .chunk_bytes
                .store(plan.chunk_bytes() as u64, Ordering::Relaxed);
            header.iterations.store(plan.iterations(), Ordering::Relaxed);
            header.magic.store(NATIVE_MAGIC, Ordering::Release);

            (mem_lock, client_ready, server_ready)
        };

        tracing::info!(segment = %name, plan = %plan, "Created native channel");

        Ok(Self {
            mem_lock,
            client_ready,
            server_ready,
            plan,
            region,
        })
    }

    /// Attach once the creator has published the header.
    pub fn attach(
        name: &str,
        expected: TransferPlan,
        retry: AttachRetry,
    ) -> Result<Self, SharedMemoryError> {
        let region = retry.run(|| {
            let region = SharedMemoryRegion::open(name)?;
            if region.size() < data_offset() {
                return Err(SharedMemoryError::NotFound {
                    name: name.to_string(),
                });
            }
            // SAFETY: the region holds at least the header
            let header = unsafe { &*(region.as_ptr() as *const NativeHeader) };
            if header.magic.load(Ordering::Acquire) != NATIVE_MAGIC {
                return Err(SharedMemoryError::NotFound {
                    name: name.to_string(),
                });
            }
            Ok(region)
        })?;

        // SAFETY: header published with Release and observed above
        let header = unsafe { &*(region.as_ptr() as *const NativeHeader) };
        let chunk_bytes = header.chunk_bytes.load(Ordering::Relaxed) as usize;
        let iterations = header.iterations.load(Ordering::Relaxed);
        let plan = TransferPlan::from_iterations(chunk_bytes, iterations).map_err(|e| {
            SharedMemoryError::InvalidHeader {
                name: name.to_string(),
                reason: e.to_string(),
            }
        })?;

        if region.size() < data_offset() + plan.chunk_bytes() {
            return Err(SharedMemoryError::InvalidHeader {
                name: name.to_string(),
                reason: format!("Segment too small for {} byte chunks", plan.chunk_bytes()),
            });
        }

        if plan != expected {
            tracing::warn!(
                segment = %name,
                creator_plan = %plan,
                local_plan = %expected,
                "Transfer plan differs from creator, following creator"
            );
        }

        let base = region.as_ptr();
        // SAFETY: the creator initialized all three before publishing magic,
        // and `region` keeps the mapping alive for as long as we hold them.
        let (mem_lock, client_ready, server_ready) = unsafe {
            let sem_at = |offset: usize| base.add(offset) as *mut libc::sem_t;
            (
                SharedSemaphore::attach(sem_at(offset_of!(NativeHeader, mem_lock)), "mem_lock"),
                SharedSemaphore::attach(
                    sem_at(offset_of!(NativeHeader, client_ready)),
                    "client_ready",
                ),
                SharedSemaphore::attach(
                    sem_at(offset_of!(NativeHeader, server_ready)),
                    "server_ready",
                ),
            )
        };

        Ok(Self {
            mem_lock,
            client_ready,
            server_ready,
            plan,
            region,
        })
    }

    pub fn plan(&self) -> TransferPlan {
        self.plan
    }

    fn data_ptr(&self) -> *mut u8 {
        // SAFETY: data_offset() is within the region bounds
        unsafe { self.region.as_ptr().add(data_offset()) }
    }

    /// Sender half of one exchange. Returns after the receiver has copied
    /// the chunk out.
    pub fn send_chunk(&self, data: &[u8]) -> Result<(), SharedMemoryError> {
        if data.len() > self.plan.chunk_bytes() {
            return Err(SharedMemoryError::PayloadTooLarge {
                size: data.len(),
                max: self.plan.chunk_bytes(),
            });
        }

        self.mem_lock.wait()?;
        // SAFETY: mem_lock grants exclusive access to the slot
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.data_ptr(), data.len());
        }
        self.client_ready.post()?;
        self.server_ready.wait()
    }

    /// Receiver half of one exchange.
    pub fn recv_chunk(&self, out: &mut [u8]) -> Result<usize, SharedMemoryError> {
        let len = out.len().min(self.plan.chunk_bytes());

        self.client_ready.wait()?;
        // SAFETY: the sender is parked on server_ready until we post it
        unsafe {
            std::ptr::copy_nonoverlapping(self.data_ptr(), out.as_mut_ptr(), len);
        }
        self.mem_lock.post()?;
        self.server_ready.post()?;
        Ok(len)
    }
}

impl Drop for NativeChannel {
    fn drop(&mut self) {
        if self.region.is_owner() {
            // SAFETY: the receiver posts server_ready as its last access, and
            // the owner only drops after its final wait on it returned.
            unsafe {
                self.mem_lock.destroy();
                self.client_ready.destroy();
                self.server_ready.destroy();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn unique(tag: &str) -> String {
        format!("ipcbench_native_{}_{}", tag, std::process::id())
    }

    #[test]
    fn test_data_offset_aligned() {
        assert_eq!(data_offset() % DATA_ALIGN, 0);
        assert!(data_offset() >= size_of::<NativeHeader>());
    }

    #[test]
    fn test_lock_step_exchange() {
        let name = unique("exchange");
        let plan = TransferPlan::new(6 * 512, 512).unwrap();

        let receiver = {
            let name = name.clone();
            thread::spawn(move || {
                let retry = AttachRetry {
                    attempts: 200,
                    delay: Duration::from_millis(10),
                };
                let channel = NativeChannel::attach(&name, plan, retry).unwrap();
                let mut buf = vec![0u8; 512];
                let mut total = 0usize;
                for i in 0..channel.plan().iterations() {
                    total += channel.recv_chunk(&mut buf).unwrap();
                    assert!(buf.iter().all(|&b| b == i as u8));
                }
                total
            })
        };

        let sender = NativeChannel::create(&name, plan).unwrap();
        for i in 0..plan.iterations() {
            sender.send_chunk(&vec![i as u8; 512]).unwrap();
        }

        assert_eq!(receiver.join().unwrap(), 6 * 512);
    }

    /// Leave a segment behind the way a killed creator does: no handle in
    /// this process owns the name afterwards.
    fn leave_stale_segment(name: &str, size: libc::off_t) {
        let c_name = std::ffi::CString::new(format!("/{}", name)).unwrap();
        unsafe {
            let fd = libc::shm_open(c_name.as_ptr(), libc::O_CREAT | libc::O_RDWR, 0o600);
            assert!(fd >= 0);
            assert_eq!(libc::ftruncate(fd, size), 0);
            libc::close(fd);
        }
    }

    #[test]
    fn test_create_replaces_stale_segment() {
        let name = unique("stale");
        leave_stale_segment(&name, 4096);
        let plan = TransferPlan::new(1024, 256).unwrap();

        let channel = NativeChannel::create(&name, plan).unwrap();
        assert_eq!(channel.plan(), plan);

        let retry = AttachRetry {
            attempts: 3,
            delay: Duration::from_millis(1),
        };
        let attached = NativeChannel::attach(&name, plan, retry).unwrap();
        assert_eq!(attached.plan(), plan);
    }
}
