// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Client role: attaches to a server's channel, reads its greeting and
// leaves a reply.

use std::thread;

use crate::channel::{Channel, RetryPolicy, View};
use crate::config::Config;
use crate::error::Result;
use crate::layout::Role;
use crate::payload::Encoding;

/// An open channel with both client-side views mapped.
#[derive(Debug)]
pub struct Session {
    inbound: View,
    outbound: View,
    encoding: Encoding,
    channel: Channel,
}

impl Session {
    /// Open the configured channel, retrying per `[open_retry]` while the
    /// server has not created it yet.
    pub fn connect(config: &Config) -> Result<Self> {
        let name = &config.channel.name;
        config.layout.validate(name)?;
        let channel =
            Channel::open_with_retry(name, config.channel.scope, &config.open_retry.policy())?;
        let inbound = config.layout.inbound(Role::Client).map(&channel)?;
        let outbound = config.layout.outbound(Role::Client).map(&channel)?;
        tracing::info!(
            channel = %name,
            capacity = channel.capacity(),
            "connected"
        );
        Ok(Self {
            inbound,
            outbound,
            encoding: config.channel.encoding,
            channel,
        })
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Current contents of the server-to-client region.
    pub fn greeting(&self) -> Result<String> {
        self.inbound.read_text(self.encoding)
    }

    /// Like [`greeting`](Self::greeting), but while the region is still empty
    /// re-read it after each delay in `policy`. The server may have created
    /// the channel without having written to it yet.
    pub fn wait_greeting(&self, policy: &RetryPolicy) -> Result<String> {
        let mut delays = policy.delays();
        loop {
            let text = self.greeting()?;
            match delays.next() {
                Some(delay) if text.is_empty() => thread::sleep(delay),
                _ => return Ok(text),
            }
        }
    }

    /// Write `text` into the client-to-server region.
    pub fn reply(&self, text: &str) -> Result<()> {
        self.outbound.write_text(text, self.encoding)
    }
}

/// Connect, read the greeting, write `reply`. Returns the greeting.
pub fn exchange(config: &Config, reply: &str) -> Result<String> {
    let session = Session::connect(config)?;
    let greeting = session.wait_greeting(&config.open_retry.policy())?;
    tracing::info!(channel = %config.channel.name, greeting = %greeting, "read greeting");
    session.reply(reply)?;
    Ok(greeting)
}
