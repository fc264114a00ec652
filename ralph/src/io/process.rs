//! Helpers for running child processes with a timeout and a transcript file.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// How a logged child process ended.
#[derive(Debug)]
pub struct ProcessOutcome {
    pub status: ExitStatus,
    pub timed_out: bool,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.success()
    }
}

/// Run a command with stdout and stderr both redirected into `log_path`.
///
/// `stdin` is written to the child and then closed. The child is killed once
/// `timeout` elapses. A trailing marker line records how the process ended so
/// the transcript is self-describing.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), log = %log_path.display()))]
pub fn run_command_to_log(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    log_path: &Path,
    timeout: Duration,
) -> Result<ProcessOutcome> {
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log dir {}", parent.display()))?;
    }
    let log = File::create(log_path)
        .with_context(|| format!("create log file {}", log_path.display()))?;
    let log_err = log
        .try_clone()
        .with_context(|| format!("clone log handle {}", log_path.display()))?;

    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::from(log)).stderr(Stdio::from(log_err));

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        if let Err(e) = child_stdin.write_all(input) {
            // The child may exit before draining stdin; its exit status tells the story.
            warn!(err = %e, "failed to write stdin");
        }
    }

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    append_footer(log_path, &status, timed_out, timeout);
    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(ProcessOutcome { status, timed_out })
}

fn append_footer(log_path: &Path, status: &ExitStatus, timed_out: bool, timeout: Duration) {
    let footer = if timed_out {
        format!("\n[ralph: timed out after {}s]\n", timeout.as_secs())
    } else {
        format!("\n[ralph: exit status {:?}]\n", status.code())
    };
    let appended = OpenOptions::new()
        .append(true)
        .open(log_path)
        .and_then(|mut file| file.write_all(footer.as_bytes()));
    if let Err(e) = appended {
        warn!(err = %e, "failed to append transcript footer");
    }
}
