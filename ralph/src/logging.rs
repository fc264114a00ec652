//! Diagnostic tracing for the supervisor.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: diagnostics via `RUST_LOG`, output to stderr.
//!   Not part of ralph's product output on stdout.
//!
//! - **Agent transcripts (`io/iteration_log`)**: product artifacts in
//!   `.ralph/logs/`. Always written, unaffected by `RUST_LOG`.
//!
//! A daemon's stderr is its `.ralph/daemon-<key>.log`, so diagnostics from a
//! detached run land there without colour codes.

use std::io::IsTerminal;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG` env var. Defaults to `warn` if unset.
/// Output: stderr, compact format, ANSI only on a terminal.
///
/// # Example
/// ```bash
/// RUST_LOG=ralph=debug ralph 5 --workspace
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let ansi = std::io::stderr().is_terminal();

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(ansi)
                .compact(),
        )
        .init();
}
