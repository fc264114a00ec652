//! Run state for a working root: last-branch marker, progress log, archives.
//!
//! The marker records which branch was last processed here. When the task
//! list starts declaring a different branch, the previous run's artifacts are
//! archived and the progress log starts over.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use super::paths::{RalphPaths, create_dir, write_atomic};
use super::task_store::peek_branch;
use crate::core::naming::archive_label;

/// What `reconcile_run_state` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStateOutcome {
    /// Branch declared by the task list, if any.
    pub branch: Option<String>,
    /// Branch recorded by the marker before reconciliation.
    pub previous_branch: Option<String>,
    /// Archive folder written when a rotation was detected.
    pub archived: Option<PathBuf>,
}

/// Read the last-processed-branch marker.
pub fn read_last_branch(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read marker {}", path.display()))?;
    let branch = contents.trim();
    Ok((!branch.is_empty()).then(|| branch.to_string()))
}

/// Atomically write the last-processed-branch marker.
pub fn write_last_branch(path: &Path, branch: &str) -> Result<()> {
    debug!(path = %path.display(), branch, "writing last-branch marker");
    write_atomic(path, &format!("{branch}\n"))
}

/// Fresh progress log header.
pub fn progress_header(now: DateTime<Local>) -> String {
    format!(
        "# Ralph Progress Log\nStarted: {}\n---\n",
        now.format("%Y-%m-%d %H:%M:%S %z")
    )
}

/// Detect rotation, archive if needed, then make sure the run can log.
///
/// Archiving is best effort; creating the progress log or logs directory is not.
#[instrument(skip_all, fields(root = %paths.root.display()))]
pub fn reconcile_run_state(paths: &RalphPaths, now: DateTime<Local>) -> Result<RunStateOutcome> {
    let branch = peek_branch(&paths.task_list_path);
    let previous_branch = read_last_branch(&paths.last_branch_path)?;

    let mut archived = None;
    if let (Some(current), Some(previous)) = (&branch, &previous_branch)
        && current != previous
    {
        info!(previous = %previous, current = %current, "branch changed, archiving previous run");
        let folder = archive_previous_run(paths, previous, now)?;
        reset_progress_log(paths, now)?;
        archived = Some(folder);
    }

    if let Some(current) = &branch {
        write_last_branch(&paths.last_branch_path, current)?;
    }

    ensure_run_layout(paths, now)?;

    Ok(RunStateOutcome {
        branch,
        previous_branch,
        archived,
    })
}

/// Create the progress log (with header) and logs directory if missing.
fn ensure_run_layout(paths: &RalphPaths, now: DateTime<Local>) -> Result<()> {
    create_dir(&paths.logs_dir)?;
    if !paths.progress_path.exists() {
        reset_progress_log(paths, now)?;
    }
    Ok(())
}

fn reset_progress_log(paths: &RalphPaths, now: DateTime<Local>) -> Result<()> {
    fs::write(&paths.progress_path, progress_header(now))
        .with_context(|| format!("write progress log {}", paths.progress_path.display()))
}

/// Copy the task list and progress log, and move the logs directory, into a
/// dated folder named after `previous_branch`.
fn archive_previous_run(
    paths: &RalphPaths,
    previous_branch: &str,
    now: DateTime<Local>,
) -> Result<PathBuf> {
    create_dir(&paths.archive_dir)?;
    let folder = unique_archive_folder(
        &paths.archive_dir,
        &format!("{}-{}", now.format("%Y-%m-%d"), archive_label(previous_branch)),
    );
    create_dir(&folder)?;

    for source in [&paths.task_list_path, &paths.progress_path] {
        let Some(name) = source.file_name() else {
            continue;
        };
        if !source.is_file() {
            debug!(path = %source.display(), "nothing to archive");
            continue;
        }
        if let Err(e) = fs::copy(source, folder.join(name)) {
            warn!(path = %source.display(), err = %e, "failed to archive file, skipping");
        }
    }

    if paths.logs_dir.is_dir() {
        let target = folder.join("logs");
        if let Err(e) = fs::rename(&paths.logs_dir, &target) {
            warn!(err = %e, "failed to move logs into archive, copying instead");
            copy_tree(&paths.logs_dir, &target);
        }
    }

    info!(folder = %folder.display(), "archived previous run");
    Ok(folder)
}

fn unique_archive_folder(archive_dir: &Path, base: &str) -> PathBuf {
    let first = archive_dir.join(base);
    if !first.exists() {
        return first;
    }
    let mut suffix = 2u32;
    loop {
        let candidate = archive_dir.join(format!("{base}-{suffix}"));
        if !candidate.exists() {
            return candidate;
        }
        suffix += 1;
    }
}

/// Best-effort recursive copy; unreadable entries are skipped.
fn copy_tree(from: &Path, to: &Path) {
    for entry in WalkDir::new(from).into_iter().filter_map(|e| e.ok()) {
        let Ok(relative) = entry.path().strip_prefix(from) else {
            continue;
        };
        let target = to.join(relative);
        let copied = if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
        } else {
            fs::copy(entry.path(), &target).map(|_| ())
        };
        if let Err(e) = copied {
            warn!(path = %entry.path().display(), err = %e, "failed to archive entry, skipping");
        }
    }
}
