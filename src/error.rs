// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Error taxonomy for channel operations.
// The platform layer speaks `io::Result`; everything above it reports a
// `ChannelError` that names the operation, the channel and the OS cause.

use std::fmt;
use std::io;

use crate::shm_name::Scope;

/// The channel operation an error or event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Open,
    MapView,
    Read,
    Write,
    UnmapView,
    Close,
    Lock,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Open => "open",
            Operation::MapView => "map_view",
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::UnmapView => "unmap_view",
            Operation::Close => "close",
            Operation::Lock => "lock",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flat classification of a [`ChannelError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AlreadyExists,
    NotFound,
    InvalidRange,
    PayloadTooLarge,
    ResourceExhausted,
    AccessDenied,
    InvalidArgument,
    InvalidPayload,
    Closed,
    Os,
}

/// Errors returned by channel, view and lock operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("{op} `{name}`: {reason}")]
    AlreadyExists {
        op: Operation,
        name: String,
        reason: String,
        #[source]
        source: Option<io::Error>,
    },
    #[error("{op} `{name}`: no such channel in {scope} scope ({reason})")]
    NotFound {
        op: Operation,
        name: String,
        scope: Scope,
        reason: String,
        #[source]
        source: Option<io::Error>,
    },
    #[error("map_view `{name}`: range {offset}+{len} exceeds capacity {capacity}")]
    InvalidRange {
        name: String,
        offset: usize,
        len: usize,
        capacity: usize,
    },
    #[error("write `{name}`: payload of {len} bytes exceeds view length {limit}")]
    PayloadTooLarge {
        name: String,
        len: usize,
        limit: usize,
    },
    #[error("{op} `{name}`: cannot reserve {capacity} bytes: {source}")]
    ResourceExhausted {
        op: Operation,
        name: String,
        capacity: usize,
        #[source]
        source: io::Error,
    },
    #[error("{op} `{name}`: access denied in {scope} scope: {source}")]
    AccessDenied {
        op: Operation,
        name: String,
        scope: Scope,
        #[source]
        source: io::Error,
    },
    #[error("{op} `{name}`: {reason}")]
    InvalidArgument {
        op: Operation,
        name: String,
        reason: String,
    },
    #[error("read `{name}`: malformed payload: {reason}")]
    InvalidPayload { name: String, reason: String },
    #[error("{op} `{name}`: handle already released")]
    Closed { op: Operation, name: String },
    #[error("{op} `{name}`: {source}")]
    Os {
        op: Operation,
        name: String,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ChannelError>;

impl ChannelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChannelError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            ChannelError::NotFound { .. } => ErrorKind::NotFound,
            ChannelError::InvalidRange { .. } => ErrorKind::InvalidRange,
            ChannelError::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            ChannelError::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            ChannelError::AccessDenied { .. } => ErrorKind::AccessDenied,
            ChannelError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            ChannelError::InvalidPayload { .. } => ErrorKind::InvalidPayload,
            ChannelError::Closed { .. } => ErrorKind::Closed,
            ChannelError::Os { .. } => ErrorKind::Os,
        }
    }

    /// Raw platform error code (`errno` / `GetLastError`), when the OS
    /// reported the failure.
    pub fn os_code(&self) -> Option<i32> {
        let source = match self {
            ChannelError::AlreadyExists { source, .. } | ChannelError::NotFound { source, .. } => {
                source.as_ref()
            }
            ChannelError::ResourceExhausted { source, .. }
            | ChannelError::AccessDenied { source, .. }
            | ChannelError::Os { source, .. } => Some(source),
            _ => None,
        };
        source.and_then(io::Error::raw_os_error)
    }

    /// Whether retrying the same call can succeed without changing anything.
    ///
    /// Only `NotFound` qualifies: the peer may simply not have created the
    /// channel yet.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Classify an OS failure of `op` on `name`.
    pub(crate) fn from_os(
        op: Operation,
        name: &str,
        scope: Scope,
        capacity: usize,
        err: io::Error,
    ) -> Self {
        let name = name.to_string();
        // Errors synthesised by the platform layer carry their own explanation.
        let custom = err.raw_os_error().is_none().then(|| err.to_string());
        let reason = |default: &str| custom.clone().unwrap_or_else(|| default.to_string());
        match classify(&err) {
            ErrorKind::NotFound => ChannelError::NotFound {
                op,
                name,
                scope,
                reason: reason("the platform has no object with this name"),
                source: Some(err),
            },
            ErrorKind::AlreadyExists => ChannelError::AlreadyExists {
                op,
                name,
                reason: reason("the name is owned by another object"),
                source: Some(err),
            },
            ErrorKind::AccessDenied => ChannelError::AccessDenied {
                op,
                name,
                scope,
                source: err,
            },
            ErrorKind::ResourceExhausted => ChannelError::ResourceExhausted {
                op,
                name,
                capacity,
                source: err,
            },
            ErrorKind::InvalidArgument => ChannelError::InvalidArgument {
                op,
                name,
                reason: err.to_string(),
            },
            _ => ChannelError::Os {
                op,
                name,
                source: err,
            },
        }
    }
}

fn classify(err: &io::Error) -> ErrorKind {
    match err.kind() {
        io::ErrorKind::NotFound => return ErrorKind::NotFound,
        io::ErrorKind::AlreadyExists => return ErrorKind::AlreadyExists,
        io::ErrorKind::PermissionDenied => return ErrorKind::AccessDenied,
        io::ErrorKind::OutOfMemory => return ErrorKind::ResourceExhausted,
        io::ErrorKind::InvalidInput => return ErrorKind::InvalidArgument,
        _ => {}
    }
    match err.raw_os_error() {
        Some(code) => classify_code(code),
        None => ErrorKind::Os,
    }
}

#[cfg(unix)]
fn classify_code(code: i32) -> ErrorKind {
    match code {
        libc::ENOENT => ErrorKind::NotFound,
        libc::EEXIST => ErrorKind::AlreadyExists,
        libc::EACCES | libc::EPERM => ErrorKind::AccessDenied,
        libc::ENOMEM | libc::ENOSPC | libc::EFBIG | libc::EMFILE | libc::ENFILE => {
            ErrorKind::ResourceExhausted
        }
        _ => ErrorKind::Os,
    }
}

#[cfg(windows)]
fn classify_code(code: i32) -> ErrorKind {
    use windows_sys::Win32::Foundation::*;

    match code as u32 {
        ERROR_FILE_NOT_FOUND => ErrorKind::NotFound,
        // ERROR_INVALID_HANDLE: the name belongs to a kernel object of another type.
        ERROR_ALREADY_EXISTS | ERROR_INVALID_HANDLE => ErrorKind::AlreadyExists,
        ERROR_ACCESS_DENIED | ERROR_PRIVILEGE_NOT_HELD => ErrorKind::AccessDenied,
        ERROR_NOT_ENOUGH_MEMORY | ERROR_OUTOFMEMORY | ERROR_COMMITMENT_LIMIT
        | ERROR_NO_SYSTEM_RESOURCES => ErrorKind::ResourceExhausted,
        _ => ErrorKind::Os,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_errors_are_classified() {
        let not_found = io::Error::from(io::ErrorKind::NotFound);
        let e = ChannelError::from_os(Operation::Open, "chan", Scope::Local, 0, not_found);
        assert_eq!(e.kind(), ErrorKind::NotFound);
        assert!(e.is_retryable());

        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        let e = ChannelError::from_os(Operation::Create, "chan", Scope::Global, 64, denied);
        assert_eq!(e.kind(), ErrorKind::AccessDenied);
        assert!(!e.is_retryable());
    }

    #[cfg(unix)]
    #[test]
    fn raw_codes_keep_their_os_code() {
        let err = io::Error::from_raw_os_error(libc::ENOSPC);
        let e = ChannelError::from_os(Operation::Create, "chan", Scope::Local, 1 << 20, err);
        assert_eq!(e.kind(), ErrorKind::ResourceExhausted);
        assert_eq!(e.os_code(), Some(libc::ENOSPC));

        let err = io::Error::from_raw_os_error(libc::EEXIST);
        let e = ChannelError::from_os(Operation::Create, "chan", Scope::Local, 64, err);
        assert_eq!(e.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn messages_name_operation_and_target() {
        let e = ChannelError::InvalidRange {
            name: "SampleMap".into(),
            offset: 1024,
            len: 2048,
            capacity: 2048,
        };
        let msg = e.to_string();
        assert!(msg.contains("map_view"));
        assert!(msg.contains("SampleMap"));
        assert!(msg.contains("1024+2048"));
        assert_eq!(e.os_code(), None);
    }
}
