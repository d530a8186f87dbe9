// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Named, fixed-capacity shared-memory channels.
// One process creates a scoped, named segment; others open it by name and
// exchange payloads through range-checked views. POSIX shm_open/mmap and
// Win32 file mappings, same layout on both.

pub mod shm_name;

mod platform;

mod shm;

pub mod error;
pub use error::{ChannelError, ErrorKind, Operation, Result};

pub mod event;
pub use event::{ChannelEvent, EventSink, NullSink, Outcome, RecordingSink, TracingSink};

pub mod channel;
pub use channel::{Channel, ChannelBuilder, RetryPolicy, View};

pub mod payload;
pub use payload::{Encoding, PayloadError};

pub mod layout;
pub use layout::{Layout, Region, Role};

pub mod sync;
pub use sync::{GuardedView, NamedLock};

pub mod service;
pub use service::{
    stop_on_input, ServiceError, ServiceHost, ServiceState, StopSignal, Wake, WorkerContext,
};

pub mod config;
pub use config::{Config, ConfigError};

pub mod server;
pub mod client;

pub mod logging;

pub use shm_name::Scope;
