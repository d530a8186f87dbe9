// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Optional inter-process exclusion for channel views.
// Channels never lock on their own; a process that needs a consistent read
// of a region another process may be writing takes a `NamedLock` around the
// access, usually through `GuardedView`.

use std::io;

use crate::channel::{Channel, View};
use crate::error::{ChannelError, Operation, Result};
use crate::payload::Encoding;
use crate::platform::PlatformMutex;
use crate::shm_name::{self, Scope};

/// A named, inter-process mutex.
///
/// On POSIX this is a `pthread_mutex_t` in its own shared segment with
/// `PTHREAD_PROCESS_SHARED` and (where supported) `PTHREAD_MUTEX_ROBUST`:
/// a lock whose owner died is recovered by the next `lock`. On Windows it is
/// a named kernel mutex; an abandoned mutex is likewise treated as acquired.
pub struct NamedLock {
    inner: PlatformMutex,
    name: String,
}

impl NamedLock {
    /// Open (or create) the lock `name` in `scope`.
    pub fn open(name: &str, scope: Scope) -> Result<Self> {
        if let Err(reason) = shm_name::validate_name(name) {
            return Err(ChannelError::InvalidArgument {
                op: Operation::Lock,
                name: name.to_string(),
                reason: reason.to_string(),
            });
        }
        let inner = PlatformMutex::open(name, scope)
            .map_err(|e| ChannelError::from_os(Operation::Lock, name, scope, 0, e))?;
        Ok(Self {
            inner,
            name: name.to_string(),
        })
    }

    /// The lock conventionally paired with `channel`, named `<channel>.lock`.
    pub fn for_channel(channel: &Channel) -> Result<Self> {
        Self::open(&Self::channel_lock_name(channel.name()), channel.scope())
    }

    pub fn channel_lock_name(channel: &str) -> String {
        format!("{channel}.lock")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lock, blocking until the lock is free.
    pub fn lock(&self) -> Result<()> {
        self.inner.lock().map_err(|e| self.error(e))
    }

    /// Lock without blocking. `Ok(false)` when someone else holds it.
    pub fn try_lock(&self) -> Result<bool> {
        self.inner.try_lock().map_err(|e| self.error(e))
    }

    pub fn unlock(&self) -> Result<()> {
        self.inner.unlock().map_err(|e| self.error(e))
    }

    /// Remove a lock's backing storage left behind by a crashed process.
    pub fn clear_storage(name: &str, scope: Scope) {
        PlatformMutex::clear_storage(name, scope);
    }

    fn error(&self, e: io::Error) -> ChannelError {
        ChannelError::Os {
            op: Operation::Lock,
            name: self.name.clone(),
            source: e,
        }
    }
}

impl std::fmt::Debug for NamedLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedLock").field("name", &self.name).finish()
    }
}

/// RAII guard: holds `lock` for its lifetime and gives access to `view`.
pub struct GuardedView<'a> {
    view: &'a View,
    lock: &'a NamedLock,
}

impl<'a> GuardedView<'a> {
    /// Lock `lock` (blocking) and return the guard.
    pub fn new(view: &'a View, lock: &'a NamedLock) -> Result<Self> {
        lock.lock()?;
        Ok(Self { view, lock })
    }

    /// Lock without blocking; `Ok(None)` if the lock is held elsewhere.
    pub fn try_new(view: &'a View, lock: &'a NamedLock) -> Result<Option<Self>> {
        if !lock.try_lock()? {
            return Ok(None);
        }
        Ok(Some(Self { view, lock }))
    }

    pub fn read(&self) -> Result<Vec<u8>> {
        self.view.read()
    }

    pub fn write(&self, payload: &[u8]) -> Result<()> {
        self.view.write(payload)
    }

    pub fn read_text(&self, encoding: Encoding) -> Result<String> {
        self.view.read_text(encoding)
    }

    pub fn write_text(&self, text: &str, encoding: Encoding) -> Result<()> {
        self.view.write_text(text, encoding)
    }
}

impl Drop for GuardedView<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.lock.unlock() {
            tracing::warn!(lock = %self.lock.name, error = %e, "failed to release lock");
        }
    }
}
