// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Counting semaphores shared between processes.
//!
//! [`NamedSemaphore`] wraps `sem_open`; the creating side unlinks on drop.
//! [`SharedSemaphore`] wraps an unnamed `sem_t` living inside a shared
//! memory region (`sem_init` with `pshared = 1`).

use std::ffi::CString;

use crate::error::SharedMemoryError;

fn semaphore_error(name: &str, call: &str) -> SharedMemoryError {
    SharedMemoryError::Semaphore {
        name: name.to_string(),
        reason: format!("{} failed: {}", call, std::io::Error::last_os_error()),
    }
}

/// Block on `sem_wait`, restarting when a signal interrupts the call.
///
/// # Safety
/// `sem` must point to a live, initialized semaphore.
unsafe fn wait_raw(sem: *mut libc::sem_t, name: &str) -> Result<(), SharedMemoryError> {
    loop {
        if libc::sem_wait(sem) == 0 {
            return Ok(());
        }
        if std::io::Error::last_os_error().raw_os_error() != Some(libc::EINTR) {
            return Err(semaphore_error(name, "sem_wait"));
        }
    }
}

/// # Safety
/// `sem` must point to a live, initialized semaphore.
unsafe fn post_raw(sem: *mut libc::sem_t, name: &str) -> Result<(), SharedMemoryError> {
    if libc::sem_post(sem) == 0 {
        Ok(())
    } else {
        Err(semaphore_error(name, "sem_post"))
    }
}

/// POSIX named semaphore.
pub struct NamedSemaphore {
    name: String,
    c_name: CString,
    sem: *mut libc::sem_t,
    is_owner: bool,
}

// SAFETY: sem_t handles returned by sem_open may be used from any thread.
unsafe impl Send for NamedSemaphore {}
unsafe impl Sync for NamedSemaphore {}

impl NamedSemaphore {
    /// Create a semaphore with exclusive-create semantics.
    pub fn create(name: &str, initial: u32) -> Result<Self, SharedMemoryError> {
        let c_name = Self::c_name(name)?;

        // SAFETY: c_name is a valid CString; mode and value follow the
        // variadic contract of sem_open with O_CREAT.
        let sem = unsafe {
            libc::sem_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL,
                0o600 as libc::c_uint,
                initial as libc::c_uint,
            )
        };

        if sem == libc::SEM_FAILED {
            if std::io::Error::last_os_error().raw_os_error() == Some(libc::EEXIST) {
                return Err(SharedMemoryError::AlreadyExists {
                    name: name.to_string(),
                });
            }
            return Err(semaphore_error(name, "sem_open(O_CREAT)"));
        }

        tracing::debug!(name = %name, initial = initial, "Created named semaphore");

        Ok(Self {
            name: name.to_string(),
            c_name,
            sem,
            is_owner: true,
        })
    }

    /// Open a semaphore created by the other process.
    pub fn open(name: &str) -> Result<Self, SharedMemoryError> {
        let c_name = Self::c_name(name)?;

        // SAFETY: c_name is a valid CString
        let sem = unsafe { libc::sem_open(c_name.as_ptr(), 0) };

        if sem == libc::SEM_FAILED {
            if std::io::Error::last_os_error().raw_os_error() == Some(libc::ENOENT) {
                return Err(SharedMemoryError::NotFound {
                    name: name.to_string(),
                });
            }
            return Err(semaphore_error(name, "sem_open"));
        }

        Ok(Self {
            name: name.to_string(),
            c_name,
            sem,
            is_owner: false,
        })
    }

    /// Unlink a semaphore left behind by an earlier run.
    pub fn remove(name: &str) -> Result<(), SharedMemoryError> {
        let c_name = Self::c_name(name)?;
        // SAFETY: c_name is a valid CString
        if unsafe { libc::sem_unlink(c_name.as_ptr()) } < 0
            && std::io::Error::last_os_error().raw_os_error() != Some(libc::ENOENT)
        {
            return Err(semaphore_error(name, "sem_unlink"));
        }
        Ok(())
    }

    fn c_name(name: &str) -> Result<CString, SharedMemoryError> {
        if name.is_empty() || name.contains('/') {
            return Err(SharedMemoryError::Semaphore {
                name: name.to_string(),
                reason: "Name must be non-empty and contain no '/'".to_string(),
            });
        }
        CString::new(format!("/{}", name)).map_err(|e| SharedMemoryError::Semaphore {
            name: name.to_string(),
            reason: format!("Invalid name: {}", e),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decrement, blocking while the count is zero.
    pub fn acquire(&self) -> Result<(), SharedMemoryError> {
        // SAFETY: sem came from a successful sem_open and lives until drop
        unsafe { wait_raw(self.sem, &self.name) }
    }

    /// Increment, waking one waiter.
    pub fn release(&self) -> Result<(), SharedMemoryError> {
        // SAFETY: sem came from a successful sem_open and lives until drop
        unsafe { post_raw(self.sem, &self.name) }
    }
}

impl Drop for NamedSemaphore {
    fn drop(&mut self) {
        // SAFETY: sem came from a successful sem_open
        unsafe { libc::sem_close(self.sem) };

        if self.is_owner {
            // SAFETY: c_name is a valid CString
            unsafe { libc::sem_unlink(self.c_name.as_ptr()) };
            tracing::debug!(name = %self.name, "Unlinked named semaphore");
        }
    }
}

/// Unnamed process-shared semaphore placed inside a shared mapping.
///
/// Does not own the memory it points into; the enclosing region must outlive
/// it.
pub struct SharedSemaphore {
    label: &'static str,
    sem: *mut libc::sem_t,
}

// SAFETY: process-shared semaphores are usable from any thread of any process
// mapping them.
unsafe impl Send for SharedSemaphore {}

impl SharedSemaphore {
    /// Initialize a semaphore in place.
    ///
    /// # Safety
    /// `sem` must be valid, suitably aligned, inside a `MAP_SHARED` mapping,
    /// and not yet initialized or in use by another process.
    pub unsafe fn init(
        sem: *mut libc::sem_t,
        initial: u32,
        label: &'static str,
    ) -> Result<Self, SharedMemoryError> {
        if libc::sem_init(sem, 1, initial as libc::c_uint) != 0 {
            return Err(semaphore_error(label, "sem_init"));
        }
        Ok(Self { label, sem })
    }

    /// Use a semaphore the creating process already initialized.
    ///
    /// # Safety
    /// `sem` must point to a semaphore initialized by [`SharedSemaphore::init`]
    /// in a mapping that outlives the returned value.
    pub unsafe fn attach(sem: *mut libc::sem_t, label: &'static str) -> Self {
        Self { label, sem }
    }

    pub fn wait(&self) -> Result<(), SharedMemoryError> {
        // SAFETY: guaranteed by the constructor contracts
        unsafe { wait_raw(self.sem, self.label) }
    }

    pub fn post(&self) -> Result<(), SharedMemoryError> {
        // SAFETY: guaranteed by the constructor contracts
        unsafe { post_raw(self.sem, self.label) }
    }

    /// Destroy the semaphore. Only the creator calls this, once nobody waits.
    ///
    /// # Safety
    /// No process may use the semaphore afterwards.
    pub unsafe fn destroy(&self) {
        libc::sem_destroy(self.sem);
    }
}
