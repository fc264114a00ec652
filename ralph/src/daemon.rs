//! Daemon supervisor: start, status, stop and list detached runs.
//!
//! At most one daemon runs per (project, branch). The registry maps that key
//! to a pid; every read re-checks the pid and purges entries whose process is
//! gone, so the registry heals itself after crashes. Check-then-register is
//! not atomic: two simultaneous starts for the same key can both succeed.

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Local;
use tracing::{debug, info, instrument, warn};

use crate::core::naming::registry_key;
use crate::error::RalphError;
use crate::io::config::RalphConfig;
use crate::io::processes::{ProcessHost, SpawnSpec};
use crate::io::registry::{Registry, RegistryEntry};

/// Interval between liveness checks while waiting for a stopped daemon.
pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Identity of a daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonKey {
    pub project: String,
    pub branch: String,
}

impl DaemonKey {
    pub fn new(project: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            branch: branch.into(),
        }
    }

    pub fn registry_key(&self) -> String {
        registry_key(&self.project, &self.branch)
    }
}

/// A live daemon as reported by `status` and `list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonInfo {
    pub key: String,
    pub pid: u32,
    pub log_path: PathBuf,
    pub project: String,
    pub branch: String,
    pub started_at: String,
}

impl DaemonInfo {
    fn from_entry(key: String, entry: RegistryEntry) -> Self {
        Self {
            key,
            pid: entry.pid,
            log_path: entry.log_path,
            project: entry.project,
            branch: entry.branch,
            started_at: entry.started_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonStatus {
    Running(DaemonInfo),
    NotRunning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing live was registered under the key.
    NotRunning,
    /// Termination was requested and the entry removed. `confirmed` is false
    /// when the process was still alive at the end of the polling window.
    Stopped { pid: u32, confirmed: bool },
}

/// Timing knobs for start and stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaemonTiming {
    pub startup_grace: Duration,
    pub stop_timeout: Duration,
    pub poll_interval: Duration,
}

impl DaemonTiming {
    pub fn from_config(config: &RalphConfig) -> Self {
        Self {
            startup_grace: config.startup_grace(),
            stop_timeout: config.stop_timeout(),
            poll_interval: STOP_POLL_INTERVAL,
        }
    }
}

pub struct DaemonSupervisor<R, P> {
    registry: R,
    processes: P,
    timing: DaemonTiming,
}

impl<R: Registry, P: ProcessHost> DaemonSupervisor<R, P> {
    pub fn new(registry: R, processes: P, timing: DaemonTiming) -> Self {
        Self {
            registry,
            processes,
            timing,
        }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn processes(&self) -> &P {
        &self.processes
    }

    /// Spawn `spec` detached and register it under `key`.
    ///
    /// Fails with [`RalphError::AlreadyRunning`] if a live daemon holds the key
    /// and with [`RalphError::StartupFailure`] if the child dies within the
    /// startup grace period.
    #[instrument(skip_all, fields(project = %key.project, branch = %key.branch))]
    pub fn start(&self, key: &DaemonKey, spec: &SpawnSpec) -> Result<DaemonInfo> {
        let reg_key = key.registry_key();
        if let Some(entry) = self.live_entry(&reg_key)? {
            return Err(RalphError::AlreadyRunning {
                project: key.project.clone(),
                branch: key.branch.clone(),
                pid: entry.pid,
            }
            .into());
        }

        let pid = self.processes.spawn_detached(spec)?;
        let entry = RegistryEntry {
            pid,
            log_path: spec.log_path.clone(),
            project: key.project.clone(),
            branch: key.branch.clone(),
            started_at: Local::now().to_rfc3339(),
            process_start: self.processes.start_time(pid),
        };
        self.registry.put(&reg_key, &entry)?;

        if !self.timing.startup_grace.is_zero() {
            debug!(
                grace_ms = self.timing.startup_grace.as_millis() as u64,
                "waiting for daemon startup"
            );
            thread::sleep(self.timing.startup_grace);
        }
        if !self.processes.is_alive(pid) {
            warn!(pid, "daemon exited during startup");
            self.registry.remove(&reg_key)?;
            return Err(RalphError::StartupFailure {
                pid,
                log_path: spec.log_path.clone(),
            }
            .into());
        }

        info!(pid, key = %reg_key, "daemon started");
        Ok(DaemonInfo::from_entry(reg_key, entry))
    }

    pub fn status(&self, key: &DaemonKey) -> Result<DaemonStatus> {
        let reg_key = key.registry_key();
        Ok(match self.live_entry(&reg_key)? {
            Some(entry) => DaemonStatus::Running(DaemonInfo::from_entry(reg_key, entry)),
            None => DaemonStatus::NotRunning,
        })
    }

    /// Send SIGTERM, wait up to the stop timeout, then drop the entry regardless.
    #[instrument(skip_all, fields(project = %key.project, branch = %key.branch))]
    pub fn stop(&self, key: &DaemonKey) -> Result<StopOutcome> {
        let reg_key = key.registry_key();
        let Some(entry) = self.live_entry(&reg_key)? else {
            return Ok(StopOutcome::NotRunning);
        };
        let pid = entry.pid;

        if !self.processes.terminate(pid)? {
            debug!(pid, "process vanished before SIGTERM");
        }
        let confirmed = self.wait_for_exit(pid);
        if !confirmed {
            warn!(
                pid,
                timeout_secs = self.timing.stop_timeout.as_secs(),
                "daemon still alive after stop timeout"
            );
        }
        self.registry.remove(&reg_key)?;
        info!(pid, confirmed, "daemon stopped");
        Ok(StopOutcome::Stopped { pid, confirmed })
    }

    /// Every live daemon on the machine, sorted by key. Stale entries are purged.
    pub fn list(&self) -> Result<Vec<DaemonInfo>> {
        let mut live = Vec::new();
        for (key, entry) in self.registry.entries()? {
            if self.is_registered_process(&entry) {
                live.push(DaemonInfo::from_entry(key, entry));
            } else {
                debug!(key = %key, pid = entry.pid, "purging stale registry entry");
                self.registry.remove(&key)?;
            }
        }
        Ok(live)
    }

    /// Registered entry whose process is alive; a stale entry is removed.
    fn live_entry(&self, reg_key: &str) -> Result<Option<RegistryEntry>> {
        let Some(entry) = self.registry.get(reg_key)? else {
            return Ok(None);
        };
        if self.is_registered_process(&entry) {
            return Ok(Some(entry));
        }
        debug!(key = reg_key, pid = entry.pid, "purging stale registry entry");
        self.registry.remove(reg_key)?;
        Ok(None)
    }

    /// The entry's pid is alive and, when a start time was recorded, still
    /// belongs to the process that was registered.
    fn is_registered_process(&self, entry: &RegistryEntry) -> bool {
        if !self.processes.is_alive(entry.pid) {
            return false;
        }
        match entry.process_start {
            Some(recorded) => {
                let current = self.processes.start_time(entry.pid);
                if current != Some(recorded) {
                    debug!(pid = entry.pid, recorded, ?current, "pid reused by another process");
                    return false;
                }
                true
            }
            None => true,
        }
    }

    fn wait_for_exit(&self, pid: u32) -> bool {
        let deadline = Instant::now() + self.timing.stop_timeout;
        loop {
            if !self.processes.is_alive(pid) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(self.timing.poll_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::registry::MemoryRegistry;
    use crate::test_support::FakeProcesses;

    fn timing() -> DaemonTiming {
        DaemonTiming {
            startup_grace: Duration::ZERO,
            stop_timeout: Duration::from_millis(50),
            poll_interval: Duration::from_millis(5),
        }
    }

    fn spec() -> SpawnSpec {
        SpawnSpec {
            program: PathBuf::from("/usr/bin/ralph"),
            args: vec!["5".to_string()],
            workdir: PathBuf::from("/w"),
            log_path: PathBuf::from("/w/.ralph/daemon-shop__ralph-cart.log"),
        }
    }

    fn key() -> DaemonKey {
        DaemonKey::new("shop", "ralph/cart")
    }

    fn supervisor(processes: FakeProcesses) -> DaemonSupervisor<MemoryRegistry, FakeProcesses> {
        DaemonSupervisor::new(MemoryRegistry::new(), processes, timing())
    }

    fn stale_entry(pid: u32) -> RegistryEntry {
        RegistryEntry {
            pid,
            log_path: PathBuf::from("/w/old.log"),
            project: "shop".to_string(),
            branch: "ralph/cart".to_string(),
            started_at: "2026-01-01T00:00:00+00:00".to_string(),
            process_start: None,
        }
    }

    #[test]
    fn start_registers_live_daemon() {
        let sup = supervisor(FakeProcesses::new());

        let info = sup.start(&key(), &spec()).expect("start");

        assert_eq!(info.key, "shop__ralph-cart");
        assert_eq!(info.branch, "ralph/cart");
        assert_eq!(sup.processes().spawned(), vec![spec()]);
        assert_eq!(sup.status(&key()).expect("status"), DaemonStatus::Running(info));
    }

    #[test]
    fn start_refuses_second_daemon_for_same_key() {
        let sup = supervisor(FakeProcesses::new());
        let first = sup.start(&key(), &spec()).expect("start");

        let err = sup.start(&key(), &spec()).unwrap_err();

        match err.downcast_ref::<RalphError>() {
            Some(RalphError::AlreadyRunning { pid, .. }) => assert_eq!(*pid, first.pid),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(sup.processes().spawned().len(), 1);
    }

    #[test]
    fn start_replaces_stale_entry() {
        let sup = supervisor(FakeProcesses::new());
        sup.registry()
            .put(&key().registry_key(), &stale_entry(99))
            .expect("put");

        let info = sup.start(&key(), &spec()).expect("start");
        assert_ne!(info.pid, 99);
    }

    #[test]
    fn child_dying_during_grace_is_startup_failure() {
        let sup = supervisor(FakeProcesses::new().die_on_spawn());

        let err = sup.start(&key(), &spec()).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<RalphError>(),
            Some(RalphError::StartupFailure { .. })
        ));
        assert!(sup.registry().entries().expect("entries").is_empty());
    }

    #[test]
    fn status_without_entry_is_not_running() {
        let sup = supervisor(FakeProcesses::new());
        assert_eq!(sup.status(&key()).expect("status"), DaemonStatus::NotRunning);
    }

    #[test]
    fn status_purges_dead_entry() {
        let sup = supervisor(FakeProcesses::new());
        sup.registry()
            .put(&key().registry_key(), &stale_entry(99))
            .expect("put");

        assert_eq!(sup.status(&key()).expect("status"), DaemonStatus::NotRunning);
        assert!(sup.registry().entries().expect("entries").is_empty());
    }

    #[test]
    fn stop_terminates_and_removes_entry() {
        let sup = supervisor(FakeProcesses::new().with_live(4000));
        sup.registry()
            .put(&key().registry_key(), &stale_entry(4000))
            .expect("put");

        let outcome = sup.stop(&key()).expect("stop");

        assert_eq!(
            outcome,
            StopOutcome::Stopped {
                pid: 4000,
                confirmed: true
            }
        );
        assert_eq!(sup.processes().terminated(), vec![4000]);
        assert!(sup.registry().entries().expect("entries").is_empty());
    }

    #[test]
    fn stop_removes_entry_even_when_process_ignores_sigterm() {
        let sup = supervisor(FakeProcesses::new().with_live(4000).ignore_terminate());
        sup.registry()
            .put(&key().registry_key(), &stale_entry(4000))
            .expect("put");

        let outcome = sup.stop(&key()).expect("stop");

        assert_eq!(
            outcome,
            StopOutcome::Stopped {
                pid: 4000,
                confirmed: false
            }
        );
        assert!(sup.registry().entries().expect("entries").is_empty());
    }

    #[test]
    fn start_records_process_start_time() {
        let sup = supervisor(FakeProcesses::new());
        let info = sup.start(&key(), &spec()).expect("start");

        let entry = sup
            .registry()
            .get(&key().registry_key())
            .expect("get")
            .expect("entry");
        assert_eq!(entry.process_start, Some(u64::from(info.pid)));
    }

    #[test]
    fn stop_leaves_recycled_pid_alone() {
        let sup = supervisor(FakeProcesses::new().with_recycled(4000));
        let mut entry = stale_entry(4000);
        entry.process_start = Some(4000);
        sup.registry()
            .put(&key().registry_key(), &entry)
            .expect("put");

        assert_eq!(sup.stop(&key()).expect("stop"), StopOutcome::NotRunning);
        assert!(sup.processes().terminated().is_empty());
        assert!(sup.registry().entries().expect("entries").is_empty());
        assert_eq!(sup.status(&key()).expect("status"), DaemonStatus::NotRunning);
    }

    #[test]
    fn stop_without_live_daemon_is_not_running() {
        let sup = supervisor(FakeProcesses::new());
        assert_eq!(sup.stop(&key()).expect("stop"), StopOutcome::NotRunning);
        assert!(sup.processes().terminated().is_empty());
    }

    #[test]
    fn list_reports_live_daemons_and_purges_stale_ones() {
        let sup = supervisor(FakeProcesses::new().with_live(10));
        let mut live = stale_entry(10);
        live.branch = "ralph/a".to_string();
        sup.registry().put("shop__ralph-a", &live).expect("put");
        sup.registry()
            .put("shop__ralph-b", &stale_entry(11))
            .expect("put");

        let listed = sup.list().expect("list");

        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, "shop__ralph-a");
        assert_eq!(listed[0].branch, "ralph/a");
        assert_eq!(sup.registry().entries().expect("entries").len(), 1);
    }
}
