// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Cross-platform shared segment.
// Delegates to platform::PlatformShm (POSIX or Windows) and carries the
// channel's identity and event sink, so that views can outlive the channel
// handle they came from.

use std::io;
use std::ptr;
use std::sync::Arc;

use crate::error::Operation;
use crate::event::{ChannelEvent, EventSink, Outcome};
use crate::platform::{PlatformShm, ShmMode};
use crate::shm_name::Scope;

/// A mapped channel segment, shared by a channel handle and its views.
/// The mapping is released when the last of them lets go.
pub(crate) struct Segment {
    shm: PlatformShm,
    name: String,
    scope: Scope,
    sink: Arc<dyn EventSink>,
}

impl Segment {
    pub(crate) fn acquire(
        name: &str,
        scope: Scope,
        capacity: usize,
        mode: ShmMode,
        sink: Arc<dyn EventSink>,
    ) -> io::Result<Self> {
        let shm = PlatformShm::acquire(name, scope, capacity, mode)?;
        Ok(Self {
            shm,
            name: name.to_string(),
            scope,
            sink,
        })
    }

    pub(crate) fn capacity(&self) -> usize {
        self.shm.capacity()
    }

    pub(crate) fn created(&self) -> bool {
        self.shm.created()
    }

    pub(crate) fn ref_count(&self) -> i32 {
        self.shm.ref_count()
    }

    pub(crate) fn emit(&self, op: Operation, offset: usize, length: usize, outcome: Outcome) {
        self.sink.record(&ChannelEvent {
            op,
            name: self.name.clone(),
            scope: self.scope,
            capacity: self.capacity(),
            offset,
            length,
            outcome,
        });
    }

    /// Copy `len` bytes starting at `offset` out of the segment.
    ///
    /// The caller has checked `offset + len <= capacity`.
    pub(crate) fn copy_out(&self, offset: usize, len: usize) -> Vec<u8> {
        debug_assert!(offset + len <= self.capacity());
        let mut buf = vec![0u8; len];
        unsafe {
            ptr::copy_nonoverlapping(self.shm.as_ptr().add(offset), buf.as_mut_ptr(), len);
        }
        buf
    }

    /// Copy `payload` to `offset` and zero the rest of the `len`-byte range.
    ///
    /// The caller has checked `offset + len <= capacity` and
    /// `payload.len() <= len`.
    pub(crate) fn copy_in(&self, offset: usize, len: usize, payload: &[u8]) {
        debug_assert!(offset + len <= self.capacity() && payload.len() <= len);
        unsafe {
            let dst = self.shm.as_ptr().add(offset);
            ptr::copy_nonoverlapping(payload.as_ptr(), dst, payload.len());
            ptr::write_bytes(dst.add(payload.len()), 0, len - payload.len());
        }
    }

    /// Remove a named segment without an open handle (POSIX only; Windows
    /// objects vanish with their last handle).
    pub(crate) fn unlink_by_name(name: &str, scope: Scope) {
        PlatformShm::unlink_by_name(name, scope);
    }
}
