// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Tracing subscriber setup for the binaries and tests.
//
// Levels:
// - WARN: failed channel operations (from `TracingSink`)
// - INFO: service lifecycle, greeting and reply exchanged
// - DEBUG: every successful channel operation, open retries

use tracing_subscriber::EnvFilter;

fn filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Initialise the subscriber, honouring `RUST_LOG` (default `info`).
/// `RUST_LOG_FORMAT=json` switches to JSON lines.
pub fn init() {
    if std::env::var("RUST_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        init_json();
        return;
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter("info"))
        .with_writer(std::io::stderr)
        .init();
}

pub fn init_json() {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter("info"))
        .with_writer(std::io::stderr)
        .init();
}

/// Safe to call from every test.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter("debug"))
        .with_test_writer()
        .try_init();
}
