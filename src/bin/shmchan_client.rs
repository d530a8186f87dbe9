// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Opens a server's channel, prints its greeting and writes a reply.
//
// Usage:
//   shmchan-client [--config PATH] [--name NAME] [--scope local|global]
//                  [--message TEXT] [--no-wait]
//
// Without --message the reply is read from one line of standard input.
// The channel is held until ENTER unless --no-wait is given.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::Parser;

use shmchan::client::Session;
use shmchan::config::DEFAULT_REPLY;
use shmchan::{logging, Config, Scope};

#[derive(Parser)]
#[command(name = "shmchan-client", about = "Shared-memory channel client")]
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
    /// Reply text; read from stdin when omitted
    #[arg(short, long)]
    message: Option<String>,
    /// Release the channel right after replying
    #[arg(long)]
    no_wait: bool,
}

fn read_line() -> io::Result<String> {
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load_or_default(cli.config.as_deref())?;
    if let Some(name) = cli.name {
        config.channel.name = name;
    }
    if let Some(scope) = cli.scope {
        config.channel.scope = scope;
    }
    config.validate()?;

    let session = Session::connect(&config)?;
    let greeting = session.wait_greeting(&config.open_retry.policy())?;
    println!("{greeting}");

    let reply = match cli.message {
        Some(m) => m,
        None => {
            print!("Reply: ");
            io::stdout().flush()?;
            let line = read_line()?;
            if line.is_empty() {
                DEFAULT_REPLY.to_string()
            } else {
                line
            }
        }
    };
    session.reply(&reply)?;
    tracing::info!(channel = %config.channel.name, reply = %reply, "reply written");

    if !cli.no_wait {
        println!("Press ENTER to exit.");
        read_line()?;
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    logging::init();

    if let Err(e) = run(cli) {
        eprintln!("shmchan-client: {e}");
        std::process::exit(1);
    }
}
