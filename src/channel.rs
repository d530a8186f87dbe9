// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Named shared-memory channels and range-checked views.
//
// A `Channel` is one process's handle on a named, fixed-capacity segment.
// A `View` is an `(offset, len)` window into it. The channel provides no
// locking: two writers on overlapping views race, and readers may observe a
// half-written payload. Callers that need more order than "last writer wins"
// layer a signal or a `sync::NamedLock` on top.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::{ChannelError, ErrorKind, Operation, Result};
use crate::event::{ChannelEvent, EventSink, Outcome, TracingSink};
use crate::payload::Encoding;
use crate::platform::ShmMode;
use crate::shm::Segment;
use crate::shm_name::{self, Scope};

// ---------------------------------------------------------------------------
// Retry policy for open
// ---------------------------------------------------------------------------

/// Bounded retry budget for opening a channel that may not exist yet.
///
/// "Not created yet" and "will never exist" look the same to a single
/// `open`; the budget decides when to stop telling them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first. 0 behaves like 1.
    pub attempts: u32,
    /// Delay before the second attempt; doubled after each failure.
    pub initial_backoff: Duration,
    /// Upper bound for a single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// The delays slept between attempts, in order.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let max = self.max_backoff;
        let n = self.attempts.max(1) - 1;
        std::iter::successors(Some(self.initial_backoff.min(max)), move |d| {
            Some(d.saturating_mul(2).min(max))
        })
        .take(n as usize)
    }
}

// ---------------------------------------------------------------------------
// ChannelBuilder
// ---------------------------------------------------------------------------

/// Creates or opens a [`Channel`] with a non-default scope or event sink.
pub struct ChannelBuilder {
    name: String,
    scope: Scope,
    sink: Arc<dyn EventSink>,
}

impl ChannelBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            scope: Scope::default(),
            sink: Arc::new(TracingSink),
        }
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Create the channel, or attach to an existing one with the same
    /// capacity.
    ///
    /// Fails with `AlreadyExists` when the name is taken by a channel of a
    /// different capacity or by some other object.
    pub fn create(self, capacity: usize) -> Result<Channel> {
        let result = self.acquire(Operation::Create, capacity, ShmMode::CreateOrOpen);
        let result = result.and_then(|segment| {
            if !segment.created() && segment.capacity() != capacity {
                return Err(ChannelError::AlreadyExists {
                    op: Operation::Create,
                    name: self.name.clone(),
                    reason: format!(
                        "existing channel has capacity {} (requested {capacity})",
                        segment.capacity()
                    ),
                    source: None,
                });
            }
            Ok(segment)
        });
        self.finish(Operation::Create, capacity, result)
    }

    /// Create the channel; fail with `AlreadyExists` if the name is taken at
    /// all.
    pub fn create_exclusive(self, capacity: usize) -> Result<Channel> {
        let result = self.acquire(Operation::Create, capacity, ShmMode::Create);
        self.finish(Operation::Create, capacity, result)
    }

    /// Attach to an existing channel. Fails with `NotFound` if there is none
    /// yet, including while its creator is still initialising it.
    pub fn open(self) -> Result<Channel> {
        let result = self.acquire(Operation::Open, 0, ShmMode::Open);
        self.finish(Operation::Open, 0, result)
    }

    /// [`open`](Self::open), retrying `NotFound` per `policy`. Other errors
    /// are returned at once; the last `NotFound` is returned when the budget
    /// runs out.
    pub fn open_with_retry(self, policy: &RetryPolicy) -> Result<Channel> {
        let mut delays = policy.delays();
        let mut attempt = 1u32;
        loop {
            let result = self.acquire(Operation::Open, 0, ShmMode::Open);
            match result {
                Err(e) if e.is_retryable() => match delays.next() {
                    Some(delay) => {
                        tracing::debug!(
                            channel = %self.name,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "channel not there yet, retrying"
                        );
                        self.emit_failure(Operation::Open, 0, &e);
                        thread::sleep(delay);
                        attempt += 1;
                    }
                    None => return self.finish(Operation::Open, 0, Err(e)),
                },
                other => return self.finish(Operation::Open, 0, other),
            }
        }
    }

    fn acquire(&self, op: Operation, capacity: usize, mode: ShmMode) -> Result<Segment> {
        if let Err(reason) = shm_name::validate_name(&self.name) {
            return Err(ChannelError::InvalidArgument {
                op,
                name: self.name.clone(),
                reason: reason.to_string(),
            });
        }
        if op == Operation::Create && capacity == 0 {
            return Err(ChannelError::InvalidArgument {
                op,
                name: self.name.clone(),
                reason: "capacity must be greater than zero".into(),
            });
        }
        Segment::acquire(&self.name, self.scope, capacity, mode, Arc::clone(&self.sink))
            .map_err(|e| ChannelError::from_os(op, &self.name, self.scope, capacity, e))
    }

    fn emit_failure(&self, op: Operation, capacity: usize, err: &ChannelError) {
        self.sink.record(&ChannelEvent {
            op,
            name: self.name.clone(),
            scope: self.scope,
            capacity,
            offset: 0,
            length: 0,
            outcome: Outcome::Failed(err.kind()),
        });
    }

    fn finish(&self, op: Operation, capacity: usize, result: Result<Segment>) -> Result<Channel> {
        match result {
            Ok(segment) => {
                segment.emit(op, 0, 0, Outcome::Ok);
                Ok(Channel {
                    name: self.name.clone(),
                    scope: self.scope,
                    capacity: segment.capacity(),
                    creator: segment.created(),
                    segment: Some(Arc::new(segment)),
                })
            }
            Err(e) => {
                self.emit_failure(op, capacity, &e);
                Err(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// One process's handle on a named shared-memory channel.
///
/// Closing (or dropping) the handle releases this process's reference. The
/// segment itself goes away once every handle and view in every process has
/// been released.
pub struct Channel {
    name: String,
    scope: Scope,
    capacity: usize,
    creator: bool,
    segment: Option<Arc<Segment>>,
}

impl Channel {
    /// Create `name` in `scope` with `capacity` bytes, or attach to an
    /// existing channel of the same capacity. See [`ChannelBuilder::create`].
    pub fn create(name: &str, capacity: usize, scope: Scope) -> Result<Self> {
        ChannelBuilder::new(name).scope(scope).create(capacity)
    }

    /// Create `name`, failing if anything already owns the name.
    pub fn create_exclusive(name: &str, capacity: usize, scope: Scope) -> Result<Self> {
        ChannelBuilder::new(name).scope(scope).create_exclusive(capacity)
    }

    /// Open an existing channel.
    pub fn open(name: &str, scope: Scope) -> Result<Self> {
        ChannelBuilder::new(name).scope(scope).open()
    }

    /// Open an existing channel, retrying while it does not exist yet.
    pub fn open_with_retry(name: &str, scope: Scope, policy: &RetryPolicy) -> Result<Self> {
        ChannelBuilder::new(name).scope(scope).open_with_retry(policy)
    }

    pub fn builder(name: &str) -> ChannelBuilder {
        ChannelBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Capacity in bytes, fixed at creation.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether this handle created the segment (as opposed to attaching).
    pub fn is_creator(&self) -> bool {
        self.creator
    }

    pub fn is_closed(&self) -> bool {
        self.segment.is_none()
    }

    /// Number of live handles on the segment across all processes.
    pub fn ref_count(&self) -> Result<i32> {
        self.segment(Operation::Read).map(|s| s.ref_count())
    }

    fn segment(&self, op: Operation) -> Result<&Arc<Segment>> {
        self.segment.as_ref().ok_or_else(|| ChannelError::Closed {
            op,
            name: self.name.clone(),
        })
    }

    /// Map the `len` bytes starting at `offset`.
    ///
    /// Fails with `InvalidRange` unless `offset + len <= capacity`. Views may
    /// overlap; nothing stops two overlapping views from being written at
    /// once.
    pub fn map_view(&self, offset: usize, len: usize) -> Result<View> {
        let segment = self.segment(Operation::MapView)?;
        let in_range = offset
            .checked_add(len)
            .is_some_and(|end| end <= segment.capacity());
        if !in_range {
            segment.emit(
                Operation::MapView,
                offset,
                len,
                Outcome::Failed(ErrorKind::InvalidRange),
            );
            return Err(ChannelError::InvalidRange {
                name: self.name.clone(),
                offset,
                len,
                capacity: segment.capacity(),
            });
        }
        segment.emit(Operation::MapView, offset, len, Outcome::Ok);
        Ok(View {
            segment: Some(Arc::clone(segment)),
            name: self.name.clone(),
            offset,
            len,
        })
    }

    /// Release this handle. Later calls on it fail with `Closed`, including a
    /// second `close`. Views mapped from it stay usable until unmapped.
    pub fn close(&mut self) -> Result<()> {
        let segment = self.segment.take().ok_or_else(|| ChannelError::Closed {
            op: Operation::Close,
            name: self.name.clone(),
        })?;
        segment.emit(Operation::Close, 0, 0, Outcome::Ok);
        Ok(())
    }

    /// Remove a name left behind by a process that died holding a handle.
    ///
    /// Only meaningful on POSIX, where segments are named files; on Windows
    /// the kernel drops the object with its last handle.
    pub fn clear_storage(name: &str, scope: Scope) {
        Segment::unlink_by_name(name, scope);
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        if self.segment.is_some() {
            let _ = self.close();
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("capacity", &self.capacity)
            .field("creator", &self.creator)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// View
// ---------------------------------------------------------------------------

/// A mapped `(offset, len)` window into a channel.
///
/// Reads copy out a snapshot; writes copy in and zero-fill the rest of the
/// window. Both are plain memory copies: they never block and are not atomic
/// with respect to writers in other processes.
pub struct View {
    segment: Option<Arc<Segment>>,
    name: String,
    offset: usize,
    len: usize,
}

impl View {
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_mapped(&self) -> bool {
        self.segment.is_some()
    }

    fn segment(&self, op: Operation) -> Result<&Arc<Segment>> {
        self.segment.as_ref().ok_or_else(|| ChannelError::Closed {
            op,
            name: self.name.clone(),
        })
    }

    /// Copy the current contents of the view.
    pub fn read(&self) -> Result<Vec<u8>> {
        let segment = self.segment(Operation::Read)?;
        let bytes = segment.copy_out(self.offset, self.len);
        segment.emit(Operation::Read, self.offset, self.len, Outcome::Ok);
        Ok(bytes)
    }

    /// Copy `payload` into the start of the view and zero the remainder.
    ///
    /// Fails with `PayloadTooLarge`, leaving the view untouched, when the
    /// payload is longer than the view.
    pub fn write(&self, payload: &[u8]) -> Result<()> {
        let segment = self.segment(Operation::Write)?;
        if payload.len() > self.len {
            segment.emit(
                Operation::Write,
                self.offset,
                payload.len(),
                Outcome::Failed(ErrorKind::PayloadTooLarge),
            );
            return Err(ChannelError::PayloadTooLarge {
                name: self.name.clone(),
                len: payload.len(),
                limit: self.len,
            });
        }
        segment.copy_in(self.offset, self.len, payload);
        segment.emit(Operation::Write, self.offset, payload.len(), Outcome::Ok);
        Ok(())
    }

    /// Encode `text` with `encoding` and write it.
    pub fn write_text(&self, text: &str, encoding: Encoding) -> Result<()> {
        let bytes = encoding
            .encode(text)
            .map_err(|e| ChannelError::InvalidArgument {
                op: Operation::Write,
                name: self.name.clone(),
                reason: e.to_string(),
            })?;
        self.write(&bytes)
    }

    /// Read the view and decode its meaningful prefix with `encoding`.
    pub fn read_text(&self, encoding: Encoding) -> Result<String> {
        let bytes = self.read()?;
        encoding
            .decode(&bytes)
            .map_err(|e| ChannelError::InvalidPayload {
                name: self.name.clone(),
                reason: e.to_string(),
            })
    }

    /// Release the view. Calling it again is a no-op.
    pub fn unmap(&mut self) {
        if let Some(segment) = self.segment.take() {
            segment.emit(Operation::UnmapView, self.offset, self.len, Outcome::Ok);
        }
    }
}

impl Drop for View {
    fn drop(&mut self) {
        self.unmap();
    }
}

impl std::fmt::Debug for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View")
            .field("channel", &self.name)
            .field("offset", &self.offset)
            .field("len", &self.len)
            .field("mapped", &self.is_mapped())
            .finish()
    }
}
