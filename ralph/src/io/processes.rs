//! OS process control for detached daemons.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, Signal, System};
use tracing::{debug, error, info, instrument};

/// What to launch as a daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub workdir: PathBuf,
    /// Receives the child's stdout and stderr (appended).
    pub log_path: PathBuf,
}

/// Process table operations the daemon supervisor needs.
pub trait ProcessHost {
    /// Start a detached child and return its pid.
    fn spawn_detached(&self, spec: &SpawnSpec) -> Result<u32>;
    /// Zombie or dead processes are not alive.
    fn is_alive(&self, pid: u32) -> bool;
    /// OS start time of `pid` in seconds since the epoch, if it exists.
    fn start_time(&self, pid: u32) -> Option<u64>;
    /// Request termination. `Ok(false)` when no such process exists.
    fn terminate(&self, pid: u32) -> Result<bool>;
}

/// [`ProcessHost`] backed by the real process table.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcesses;

impl ProcessHost for SystemProcesses {
    #[instrument(skip_all, fields(program = %spec.program.display(), log = %spec.log_path.display()))]
    fn spawn_detached(&self, spec: &SpawnSpec) -> Result<u32> {
        if let Some(parent) = spec.log_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create log dir {}", parent.display()))?;
        }
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&spec.log_path)
            .with_context(|| format!("open daemon log {}", spec.log_path.display()))?;
        let log_err = log
            .try_clone()
            .with_context(|| format!("clone log handle {}", spec.log_path.display()))?;

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Detach from the caller's process group.
            cmd.process_group(0);
        }

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(err = %e, "failed to spawn daemon");
                return Err(e).context("spawn daemon");
            }
        };
        let pid = child.id();
        info!(pid, "daemon spawned");
        Ok(pid)
    }

    fn is_alive(&self, pid: u32) -> bool {
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);
        let alive = system.process(Pid::from_u32(pid)).is_some_and(|p| {
            !matches!(p.status(), ProcessStatus::Zombie) && p.status() != ProcessStatus::Dead
        });
        debug!(pid, alive, "liveness check");
        alive
    }

    fn start_time(&self, pid: u32) -> Option<u64> {
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[Pid::from_u32(pid)]), true);
        system.process(Pid::from_u32(pid)).map(sysinfo::Process::start_time)
    }

    fn terminate(&self, pid: u32) -> Result<bool> {
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);
        let Some(process) = system.process(Pid::from_u32(pid)) else {
            return Ok(false);
        };
        let sent = process.kill_with(Signal::Term).unwrap_or(false);
        debug!(pid, sent, "sent SIGTERM");
        Ok(sent)
    }
}
