// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Segment layout shared by the POSIX and Windows backends.
//
//   offset 0   SegmentHeader { magic, ref_count, capacity }   (16 bytes)
//   offset 16  user region, `capacity` bytes
//
// The creator writes `capacity` first and publishes `magic` last with release
// ordering; openers load `magic` with acquire ordering before trusting the
// rest of the header.

use std::io;
use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

#[cfg(unix)]
pub mod posix;

#[cfg(windows)]
pub mod windows;

#[cfg(unix)]
pub use posix::{PlatformMutex, PlatformShm};

#[cfg(windows)]
pub use windows::{PlatformMutex, PlatformShm};

/// "SHMC" in little-endian byte order.
pub(crate) const SEGMENT_MAGIC: u32 = u32::from_le_bytes(*b"SHMC");

/// How long an attaching handle waits for a concurrent creator to publish
/// the header before giving up.
pub(crate) const INIT_WAIT: Duration = Duration::from_secs(1);

#[repr(C)]
pub(crate) struct SegmentHeader {
    magic: AtomicU32,
    ref_count: AtomicI32,
    capacity: AtomicU64,
}

pub(crate) const HEADER_SIZE: usize = std::mem::size_of::<SegmentHeader>();

/// Open mode for a platform segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmMode {
    /// Create exclusively: fail if the name already exists.
    Create,
    /// Open existing: fail if it does not exist.
    Open,
    /// Create if missing, attach if it already exists.
    CreateOrOpen,
}

/// What an attaching handle found at the start of an existing segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeaderState {
    Ready { capacity: usize },
    /// The creator has not published the header yet.
    Uninitialised,
    /// Something other than a channel segment owns the name.
    Foreign,
}

/// Total bytes to reserve for a segment with `capacity` user bytes.
pub(crate) fn calc_size(capacity: usize) -> io::Result<usize> {
    capacity.checked_add(HEADER_SIZE).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::OutOfMemory,
            format!("capacity {capacity} overflows the address space"),
        )
    })
}

/// # Safety
/// `mem` must point to a live mapping of at least `HEADER_SIZE` bytes that
/// outlives the returned reference.
pub(crate) unsafe fn header<'a>(mem: *mut u8) -> &'a SegmentHeader {
    &*(mem as *const SegmentHeader)
}

impl SegmentHeader {
    /// Fill in a freshly created, zeroed header. The caller counts as the
    /// first reference.
    pub(crate) fn publish(&self, capacity: usize) {
        self.capacity.store(capacity as u64, Ordering::Relaxed);
        self.ref_count.store(1, Ordering::Relaxed);
        self.magic.store(SEGMENT_MAGIC, Ordering::Release);
    }

    pub(crate) fn inspect(&self) -> HeaderState {
        match self.magic.load(Ordering::Acquire) {
            0 => HeaderState::Uninitialised,
            SEGMENT_MAGIC => HeaderState::Ready {
                capacity: self.capacity.load(Ordering::Relaxed) as usize,
            },
            _ => HeaderState::Foreign,
        }
    }

    /// Register one more handle; returns the count before the increment.
    #[cfg(windows)]
    pub(crate) fn retain(&self) -> i32 {
        self.ref_count.fetch_add(1, Ordering::AcqRel)
    }

    /// Register one more handle unless the count already reached zero, which
    /// means the last holder is about to unlink the name.
    #[cfg(unix)]
    pub(crate) fn try_retain(&self) -> bool {
        self.ref_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n > 0).then(|| n + 1))
            .is_ok()
    }

    /// Drop one handle; returns the count before the decrement.
    pub(crate) fn release(&self) -> i32 {
        self.ref_count.fetch_sub(1, Ordering::AcqRel)
    }

    pub(crate) fn ref_count(&self) -> i32 {
        self.ref_count.load(Ordering::Acquire)
    }
}

pub(crate) fn not_ready() -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        "segment exists but its creator has not finished initialising it",
    )
}

pub(crate) fn foreign() -> io::Error {
    io::Error::new(
        io::ErrorKind::AlreadyExists,
        "the name is owned by an object that is not a channel segment",
    )
}

/// Adaptive backoff: busy spin, then CPU pause hints, then yield, then 1 ms
/// sleeps.
#[inline]
pub(crate) fn adaptive_yield(k: &mut u32) {
    if *k < 4 {
        // busy spin
    } else if *k < 16 {
        std::hint::spin_loop();
    } else if *k < 32 {
        std::thread::yield_now();
    } else {
        std::thread::sleep(Duration::from_millis(1));
        return;
    }
    *k += 1;
}
