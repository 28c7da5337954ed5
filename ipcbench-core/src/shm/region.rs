// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! POSIX shared memory objects mapped read/write.
//!
//! The creating side owns the object and unlinks it on drop; attaching sides
//! only unmap.

use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::ptr::NonNull;

use crate::error::SharedMemoryError;

/// A mapped shared memory object.
pub struct SharedMemoryRegion {
    /// Object name without the leading slash.
    name: String,
    ptr: NonNull<u8>,
    size: usize,
    _fd: OwnedFd,
    /// Set for the creator, which unlinks the name on drop.
    is_owner: bool,
}

// SAFETY: the mapping is owned by this value; cross-process access is
// serialised by the semaphores of the protocol built on top.
unsafe impl Send for SharedMemoryRegion {}

impl SharedMemoryRegion {
    /// Smallest object an attaching side accepts as fully created.
    pub const MIN_SIZE: usize = 64;

    /// 2 GiB, enough for the largest chunk plus headers.
    pub const MAX_SIZE: usize = 2 * 1024 * 1024 * 1024;

    /// Create `/<name>` exclusively and size it.
    ///
    /// `AlreadyExists` means an earlier run left the object behind.
    pub fn create(name: &str, size: usize) -> Result<Self, SharedMemoryError> {
        if !(Self::MIN_SIZE..=Self::MAX_SIZE).contains(&size) {
            return Err(SharedMemoryError::CreateFailed {
                name: name.to_string(),
                reason: format!(
                    "size {} not within {}..={}",
                    size,
                    Self::MIN_SIZE,
                    Self::MAX_SIZE
                ),
            });
        }

        let c_name = object_name(name)?;
        let fd = shm_open(&c_name, libc::O_CREAT | libc::O_EXCL | libc::O_RDWR, 0o600).map_err(
            |e| match e.raw_os_error() {
                Some(libc::EEXIST) => SharedMemoryError::AlreadyExists {
                    name: name.to_string(),
                },
                _ => create_failed(name, "shm_open", e),
            },
        )?;

        let mapped = resize(&fd, size)
            .map_err(|e| create_failed(name, "ftruncate", e))
            .and_then(|()| map_shared(&fd, size));
        let ptr = match mapped {
            Ok(ptr) => ptr,
            Err(e) => {
                // SAFETY: c_name is NUL-terminated; the object is ours.
                unsafe { libc::shm_unlink(c_name.as_ptr()) };
                return Err(e);
            }
        };

        tracing::debug!(name = %name, size, "Created shared memory object");
        Ok(Self {
            name: name.to_string(),
            ptr,
            size,
            _fd: fd,
            is_owner: true,
        })
    }

    /// Attach to `/<name>` and map its current size.
    ///
    /// Reports `NotFound` while the creator has not created or sized it yet.
    pub fn open(name: &str) -> Result<Self, SharedMemoryError> {
        let c_name = object_name(name)?;
        let not_found = || SharedMemoryError::NotFound {
            name: name.to_string(),
        };

        let fd = shm_open(&c_name, libc::O_RDWR, 0).map_err(|e| match e.raw_os_error() {
            Some(libc::ENOENT) => not_found(),
            _ => SharedMemoryError::OpenFailed {
                name: name.to_string(),
                reason: format!("shm_open: {}", e),
            },
        })?;

        let size = current_size(&fd).map_err(|e| SharedMemoryError::OpenFailed {
            name: name.to_string(),
            reason: format!("fstat: {}", e),
        })?;
        if size < Self::MIN_SIZE {
            return Err(not_found());
        }

        let ptr = map_shared(&fd, size)?;
        tracing::debug!(name = %name, size, "Attached to shared memory object");
        Ok(Self {
            name: name.to_string(),
            ptr,
            size,
            _fd: fd,
            is_owner: false,
        })
    }

    /// Unlink `/<name>` if it exists.
    pub fn remove(name: &str) -> Result<(), SharedMemoryError> {
        let c_name = object_name(name)?;
        // SAFETY: c_name is NUL-terminated.
        if unsafe { libc::shm_unlink(c_name.as_ptr()) } == 0 {
            tracing::debug!(name = %name, "Removed stale shared memory object");
            return Ok(());
        }
        match io::Error::last_os_error() {
            e if e.raw_os_error() == Some(libc::ENOENT) => Ok(()),
            e => Err(create_failed(name, "shm_unlink", e)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_owner(&self) -> bool {
        self.is_owner
    }

    /// Base of the mapping. Callers synchronise with the peer process.
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }
}

impl Drop for SharedMemoryRegion {
    fn drop(&mut self) {
        // SAFETY: ptr/size describe the mapping made in create/open.
        if unsafe { libc::munmap(self.ptr.as_ptr().cast(), self.size) } != 0 {
            tracing::warn!(
                name = %self.name,
                error = %io::Error::last_os_error(),
                "munmap failed"
            );
        }

        if self.is_owner {
            if let Ok(c_name) = object_name(&self.name) {
                // SAFETY: c_name is NUL-terminated.
                unsafe { libc::shm_unlink(c_name.as_ptr()) };
                tracing::debug!(name = %self.name, "Unlinked shared memory object");
            }
        }
    }
}

fn object_name(name: &str) -> Result<CString, SharedMemoryError> {
    let invalid = |reason: String| SharedMemoryError::CreateFailed {
        name: name.to_string(),
        reason,
    };
    if name.is_empty() || name.contains('/') {
        return Err(invalid("name must be non-empty without '/'".to_string()));
    }
    CString::new(format!("/{}", name)).map_err(|e| invalid(e.to_string()))
}

fn create_failed(name: &str, op: &str, e: io::Error) -> SharedMemoryError {
    SharedMemoryError::CreateFailed {
        name: name.to_string(),
        reason: format!("{}: {}", op, e),
    }
}

fn shm_open(c_name: &CString, flags: libc::c_int, mode: libc::mode_t) -> io::Result<OwnedFd> {
    // SAFETY: c_name is NUL-terminated.
    let fd = unsafe { libc::shm_open(c_name.as_ptr(), flags, mode) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: fd was just returned by shm_open and is owned by nobody else.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

fn resize(fd: &OwnedFd, size: usize) -> io::Result<()> {
    // SAFETY: fd is open for writing.
    if unsafe { libc::ftruncate(fd.as_raw_fd(), size as libc::off_t) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn current_size(fd: &OwnedFd) -> io::Result<usize> {
    // SAFETY: stat is plain data filled in by fstat.
    let mut stat: libc::stat = unsafe { std::mem::zeroed() };
    if unsafe { libc::fstat(fd.as_raw_fd(), &mut stat) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(stat.st_size as usize)
}

fn map_shared(fd: &OwnedFd, size: usize) -> Result<NonNull<u8>, SharedMemoryError> {
    // SAFETY: fd is open read/write and at least `size` bytes long.
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd.as_raw_fd(),
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(SharedMemoryError::MapFailed {
            reason: format!("mmap: {}", io::Error::last_os_error()),
        });
    }
    NonNull::new(ptr.cast()).ok_or_else(|| SharedMemoryError::MapFailed {
        reason: "mmap returned null".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique(name: &str) -> String {
        format!("ipcbench_test_{}_{}", name, std::process::id())
    }

    #[test]
    fn test_shm_size_validation() {
        assert!(SharedMemoryRegion::create(&unique("small"), 8).is_err());
        assert!(
            SharedMemoryRegion::create(&unique("large"), SharedMemoryRegion::MAX_SIZE + 1).is_err()
        );
    }

    #[test]
    fn test_shm_invalid_names() {
        assert!(SharedMemoryRegion::create("", 4096).is_err());
        assert!(SharedMemoryRegion::create("a/b", 4096).is_err());
    }

    #[test]
    fn test_exclusive_create_and_open() {
        let name = unique("excl");
        let owner = SharedMemoryRegion::create(&name, 4096).unwrap();
        assert!(owner.is_owner());

        assert!(matches!(
            SharedMemoryRegion::create(&name, 4096),
            Err(SharedMemoryError::AlreadyExists { .. })
        ));

        let attached = SharedMemoryRegion::open(&name).unwrap();
        assert_eq!(attached.size(), 4096);
        assert!(!attached.is_owner());

        // SAFETY: both mappings are live and sized 4096
        unsafe {
            *owner.as_ptr() = 0x5A;
            assert_eq!(*attached.as_ptr(), 0x5A);
        }

        drop(attached);
        drop(owner);
        assert!(matches!(
            SharedMemoryRegion::open(&name),
            Err(SharedMemoryError::NotFound { .. })
        ));
    }

    #[test]
    fn test_remove_missing_is_ok() {
        assert!(SharedMemoryRegion::remove(&unique("never_created")).is_ok());
    }
}
