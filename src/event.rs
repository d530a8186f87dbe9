// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Structured per-operation events.
// Every channel operation reports one `ChannelEvent` to the sink configured
// on the channel. The core never formats log lines itself; `TracingSink`
// turns events into `tracing` records and is the default.

use std::sync::{Mutex, PoisonError};

use crate::error::{ErrorKind, Operation};
use crate::shm_name::Scope;

/// Result of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Failed(ErrorKind),
}

impl Outcome {
    pub fn of<T>(result: &crate::Result<T>) -> Self {
        match result {
            Ok(_) => Outcome::Ok,
            Err(e) => Outcome::Failed(e.kind()),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok)
    }
}

/// One operation on one channel.
///
/// `offset`/`length` describe the byte range involved (0 for create, open
/// and close); `capacity` is the channel capacity, or the requested one when
/// a create failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEvent {
    pub op: Operation,
    pub name: String,
    pub scope: Scope,
    pub capacity: usize,
    pub offset: usize,
    pub length: usize,
    pub outcome: Outcome,
}

/// Receiver for channel events.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &ChannelEvent);
}

/// Logs successes at `debug` and failures at `warn`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &ChannelEvent) {
        match event.outcome {
            Outcome::Ok => tracing::debug!(
                op = %event.op,
                channel = %event.name,
                scope = %event.scope,
                capacity = event.capacity,
                offset = event.offset,
                length = event.length,
                "channel operation succeeded"
            ),
            Outcome::Failed(kind) => tracing::warn!(
                op = %event.op,
                channel = %event.name,
                scope = %event.scope,
                capacity = event.capacity,
                offset = event.offset,
                length = event.length,
                error = ?kind,
                "channel operation failed"
            ),
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _event: &ChannelEvent) {}
}

/// Keeps every event in memory, in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ChannelEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far.
    pub fn events(&self) -> Vec<ChannelEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remove and return the events recorded so far.
    pub fn take(&self) -> Vec<ChannelEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl EventSink for RecordingSink {
    fn record(&self, event: &ChannelEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
