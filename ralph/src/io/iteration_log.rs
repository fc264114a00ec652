//! Transcript file naming for `.ralph/logs/`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::core::naming::sanitize;

/// Timestamp format embedded in transcript names (wall clock, second precision).
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Transcript path for an iteration on `label` (story id or `cleanup`).
///
/// The iteration number and wall-clock timestamp keep names unique across
/// repeated attempts on the same story.
pub fn iteration_log_path(
    logs_dir: &Path,
    label: &str,
    iter: u32,
    now: DateTime<Local>,
) -> PathBuf {
    logs_dir.join(format!(
        "{}-iter{iter}-{}.log",
        sanitize(label),
        now.format(TIMESTAMP_FORMAT)
    ))
}

/// Transcript path for the retrospective pass.
pub fn retrospective_log_path(logs_dir: &Path, now: DateTime<Local>) -> PathBuf {
    logs_dir.join(format!("retrospective-{}.log", now.format(TIMESTAMP_FORMAT)))
}
