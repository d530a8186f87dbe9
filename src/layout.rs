// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Region convention for a server/client pair sharing one channel.
//
// Default layout (64 KiB channel):
//
//   0        1024      2048                          65536
//   +---------+---------+-----------------------------+
//   | server  | client  |           unused            |
//   | -> cli  | -> srv  |                             |
//   +---------+---------+-----------------------------+

use serde::{Deserialize, Serialize};

use crate::channel::{Channel, View};
use crate::error::{ChannelError, Operation, Result};

pub const DEFAULT_CAPACITY: usize = 65536;
pub const DEFAULT_VIEW_LEN: usize = 1024;
pub const SERVER_TO_CLIENT_OFFSET: usize = 0;
pub const CLIENT_TO_SERVER_OFFSET: usize = 1024;

/// A byte range `[offset, offset + len)` of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Region {
    pub offset: usize,
    pub len: usize,
}

impl Region {
    pub const fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    /// One past the last byte, or `None` on overflow.
    pub fn end(&self) -> Option<usize> {
        self.offset.checked_add(self.len)
    }

    pub fn overlaps(&self, other: &Region) -> bool {
        if self.len == 0 || other.len == 0 {
            return false;
        }
        // Widened so that regions running past usize::MAX still compare.
        let (a, b) = (self.offset as u128, other.offset as u128);
        a < b + other.len as u128 && b < a + self.len as u128
    }

    pub fn map(&self, channel: &Channel) -> Result<View> {
        channel.map_view(self.offset, self.len)
    }
}

/// Which side of the exchange a process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Layout {
    pub capacity: usize,
    pub server_to_client: Region,
    pub client_to_server: Region,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            server_to_client: Region::new(SERVER_TO_CLIENT_OFFSET, DEFAULT_VIEW_LEN),
            client_to_server: Region::new(CLIENT_TO_SERVER_OFFSET, DEFAULT_VIEW_LEN),
        }
    }
}

impl Layout {
    /// Check that both regions fit the capacity and do not overlap.
    /// `name` is only used to label the error.
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.capacity == 0 {
            return Err(ChannelError::InvalidArgument {
                op: Operation::Create,
                name: name.to_string(),
                reason: "layout capacity must be greater than zero".into(),
            });
        }
        for region in [&self.server_to_client, &self.client_to_server] {
            if region.end().map_or(true, |end| end > self.capacity) {
                return Err(ChannelError::InvalidRange {
                    name: name.to_string(),
                    offset: region.offset,
                    len: region.len,
                    capacity: self.capacity,
                });
            }
        }
        if self.server_to_client.overlaps(&self.client_to_server) {
            return Err(ChannelError::InvalidArgument {
                op: Operation::MapView,
                name: name.to_string(),
                reason: format!(
                    "server-to-client region {:?} overlaps client-to-server region {:?}",
                    self.server_to_client, self.client_to_server
                ),
            });
        }
        Ok(())
    }

    /// The region `role` writes to.
    pub fn outbound(&self, role: Role) -> Region {
        match role {
            Role::Server => self.server_to_client,
            Role::Client => self.client_to_server,
        }
    }

    /// The region `role` reads from.
    pub fn inbound(&self, role: Role) -> Region {
        match role {
            Role::Server => self.client_to_server,
            Role::Client => self.server_to_client,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn default_layout_is_valid() {
        let layout = Layout::default();
        layout.validate("SampleMap").unwrap();
        assert_eq!(layout.outbound(Role::Server), layout.inbound(Role::Client));
        assert_eq!(layout.outbound(Role::Client), Region::new(1024, 1024));
    }

    #[test]
    fn out_of_range_region_rejected() {
        let layout = Layout {
            capacity: 2048,
            client_to_server: Region::new(1024, 1025),
            ..Layout::default()
        };
        assert_eq!(
            layout.validate("x").unwrap_err().kind(),
            ErrorKind::InvalidRange
        );

        let overflow = Layout {
            server_to_client: Region::new(usize::MAX, 2),
            ..Layout::default()
        };
        assert_eq!(
            overflow.validate("x").unwrap_err().kind(),
            ErrorKind::InvalidRange
        );
    }

    #[test]
    fn overlapping_regions_rejected() {
        let layout = Layout {
            client_to_server: Region::new(512, 1024),
            ..Layout::default()
        };
        assert_eq!(
            layout.validate("x").unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn overlap_edges() {
        let a = Region::new(0, 1024);
        assert!(!a.overlaps(&Region::new(1024, 1024)));
        assert!(a.overlaps(&Region::new(1023, 1)));
        assert!(!a.overlaps(&Region::new(10, 0)));
        assert!(Region::new(usize::MAX - 1, 5).overlaps(&Region::new(usize::MAX - 1, 1)));
        assert!(!Region::new(usize::MAX - 1, 5).overlaps(&a));
    }
}
