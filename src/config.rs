// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// TOML configuration shared by the server and client binaries.
//
//   [channel]
//   name = "SampleMap"
//   scope = "local"            # or "global"
//   encoding = "utf16_nul"     # utf8_nul | utf16_nul | length_prefixed
//
//   [layout]
//   capacity = 65536
//   server_to_client = { offset = 0, len = 1024 }
//   client_to_server = { offset = 1024, len = 1024 }
//
//   [open_retry]
//   attempts = 10
//   initial_backoff_ms = 50
//   max_backoff_ms = 1000
//
//   [service]
//   tick_ms = 2000
//   greeting = "Message from the server process."
//
// Every key is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::channel::RetryPolicy;
use crate::layout::{Layout, Role};
use crate::payload::Encoding;
use crate::shm_name::{self, Scope};

pub const DEFAULT_CHANNEL_NAME: &str = "SampleMap";
pub const DEFAULT_GREETING: &str = "Message from the server process.";
pub const DEFAULT_REPLY: &str = "Message from the client process.";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub channel: ChannelSection,
    pub layout: Layout,
    pub open_retry: RetrySection,
    pub service: ServiceSection,
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// [`load`](Self::load) when a path is given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Parse and validate configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        shm_name::validate_name(&self.channel.name)
            .map_err(|reason| ConfigError::Invalid(format!("channel.name: {reason}")))?;
        self.layout
            .validate(&self.channel.name)
            .map_err(|e| ConfigError::Invalid(format!("layout: {e}")))?;
        let outbound = self.layout.outbound(Role::Server).len;
        if self.channel.encoding.encoded_len(&self.service.greeting) > outbound {
            return Err(ConfigError::Invalid(format!(
                "service.greeting does not fit the {outbound}-byte server_to_client view"
            )));
        }
        if self.open_retry.initial_backoff_ms > self.open_retry.max_backoff_ms {
            return Err(ConfigError::Invalid(
                "open_retry.initial_backoff_ms exceeds max_backoff_ms".into(),
            ));
        }
        Ok(())
    }
}

/// The `[channel]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelSection {
    pub name: String,
    pub scope: Scope,
    pub encoding: Encoding,
}

impl Default for ChannelSection {
    fn default() -> Self {
        Self {
            name: DEFAULT_CHANNEL_NAME.to_string(),
            scope: Scope::Local,
            encoding: Encoding::Utf16Nul,
        }
    }
}

/// The `[open_retry]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySection {
    pub attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            attempts: policy.attempts,
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
        }
    }
}

impl RetrySection {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

/// The `[service]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceSection {
    /// Interval between liveness ticks while waiting for stop. 0 disables.
    pub tick_ms: u64,
    pub greeting: String,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            tick_ms: 2000,
            greeting: DEFAULT_GREETING.to_string(),
        }
    }
}

impl ServiceSection {
    pub fn tick(&self) -> Option<Duration> {
        (self.tick_ms > 0).then(|| Duration::from_millis(self.tick_ms))
    }
}
