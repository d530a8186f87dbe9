// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Server role: owns the channel for the lifetime of the service.

use std::sync::Arc;

use crate::channel::Channel;
use crate::config::Config;
use crate::error::Result;
use crate::event::{EventSink, TracingSink};
use crate::layout::Role;
use crate::service::WorkerContext;

/// Create the channel, publish the greeting, wait for stop, then read the
/// client's reply.
///
/// Returns `None` when the client never wrote anything. The channel and its
/// views are released on every path out of this function.
pub fn run(ctx: &WorkerContext, config: &Config) -> Result<Option<String>> {
    run_with_sink(ctx, config, Arc::new(TracingSink))
}

pub fn run_with_sink(
    ctx: &WorkerContext,
    config: &Config,
    sink: Arc<dyn EventSink>,
) -> Result<Option<String>> {
    let name = &config.channel.name;
    let encoding = config.channel.encoding;
    config.layout.validate(name)?;

    let channel = Channel::builder(name)
        .scope(config.channel.scope)
        .sink(sink)
        .create(config.layout.capacity)?;
    let outbound = config.layout.outbound(Role::Server).map(&channel)?;
    let inbound = config.layout.inbound(Role::Server).map(&channel)?;

    outbound.write_text(&config.service.greeting, encoding)?;
    tracing::info!(
        service = ctx.name(),
        channel = %name,
        scope = %config.channel.scope,
        creator = channel.is_creator(),
        "greeting published"
    );

    let ticks = ctx.run_until_stopped(config.service.tick(), || {
        tracing::debug!(service = ctx.name(), channel = %name, "waiting for stop");
    });

    let reply = inbound.read_text(encoding)?;
    tracing::info!(service = ctx.name(), channel = %name, ticks, reply = %reply, "read reply");
    Ok((!reply.is_empty()).then_some(reply))
}
