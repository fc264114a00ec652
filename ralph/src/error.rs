//! Typed failures that callers branch on.
//!
//! Everything else travels as `anyhow::Error` with context; these variants are
//! wrapped in `anyhow` too and recovered with `downcast_ref` where the CLI or
//! the engine needs to react to them specifically.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RalphError {
    /// Task list missing, unreadable, or without a usable branch.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A live daemon is already registered for this project/branch.
    #[error("daemon already running for {project} on {branch} (pid {pid})")]
    AlreadyRunning {
        project: String,
        branch: String,
        pid: u32,
    },

    /// The detached child died during the startup grace period.
    #[error("daemon exited during startup (pid {pid}); see {}", log_path.display())]
    StartupFailure { pid: u32, log_path: PathBuf },
}

impl RalphError {
    pub fn configuration(message: impl Into<String>) -> Self {
        RalphError::Configuration(message.into())
    }
}
