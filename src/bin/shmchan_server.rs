// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Creates the channel, publishes a greeting and, once stopped, prints
// whatever reply a client left behind.
//
// Usage:
//   shmchan-server [--config PATH] [--name NAME] [--scope local|global]
//                  [--run-for-ms MS]
//
// Stops on ENTER (or end of input), or after --run-for-ms.

use std::io::BufReader;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use shmchan::{logging, server, stop_on_input, Config, Scope, ServiceHost};

#[derive(Parser)]
#[command(name = "shmchan-server", about = "Shared-memory channel server")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Channel name (overrides the config file)
    #[arg(short, long)]
    name: Option<String>,
    /// Channel scope (overrides the config file)
    #[arg(short, long)]
    scope: Option<Scope>,
    /// Stop after this many milliseconds instead of waiting for ENTER
    #[arg(long)]
    run_for_ms: Option<u64>,
}

fn main() {
    let cli = Cli::parse();
    logging::init();

    let mut config = match Config::load_or_default(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    if let Some(name) = cli.name {
        config.channel.name = name;
    }
    if let Some(scope) = cli.scope {
        config.channel.scope = scope;
    }
    if let Err(e) = config.validate() {
        eprintln!("{e}");
        std::process::exit(1);
    }

    let worker_config = config.clone();
    let host = match ServiceHost::start("shmchan-server", move |ctx| {
        server::run(&ctx, &worker_config)
    }) {
        Ok(h) => h,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let run_for = cli.run_for_ms.map(Duration::from_millis);
    if run_for.is_none() {
        println!("Serving `{}`. Press ENTER to stop.", config.channel.name);
        let stdin = BufReader::new(std::io::stdin());
        if let Err(e) = stop_on_input(host.signal().clone(), stdin) {
            tracing::error!(error = %e, "cannot watch stdin for ENTER");
            drop(host);
            std::process::exit(1);
        }
    }
    host.signal().wait_stopped(run_for);

    match host.stop() {
        Ok(Ok(Some(reply))) => println!("Client replied: {reply}"),
        Ok(Ok(None)) => println!("No reply from a client."),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "server failed");
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!(error = %e, "server worker failed");
            std::process::exit(1);
        }
    }
}
