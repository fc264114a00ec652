//! Test-only helpers: task list builders, a scratch git repo, and scripted
//! stand-ins for the agent and the process table.

use std::collections::{BTreeSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use serde_json::Map;
use tempfile::TempDir;

use crate::io::agent::{Agent, AgentRequest, AgentRun};
use crate::io::paths::TASK_LIST_FILE;
use crate::io::processes::{ProcessHost, SpawnSpec};
use crate::io::task_store::{load_task_list, write_task_list};
use crate::task_list::{Story, TaskList};

/// Create a deterministic story with explicit `passes`.
pub fn story(id: &str, passes: bool) -> Story {
    Story {
        id: id.to_string(),
        title: format!("{id} title"),
        description: format!("{id} description"),
        acceptance_criteria: Vec::new(),
        priority: 0.0,
        passes,
        notes: None,
        extra: Map::new(),
    }
}

pub fn story_with_priority(id: &str, priority: f64, passes: bool) -> Story {
    Story {
        priority,
        ..story(id, passes)
    }
}

/// Task list for project `demo` on `branch`.
pub fn task_list(branch: &str, stories: Vec<Story>) -> TaskList {
    TaskList {
        project: "demo".to_string(),
        branch_name: Some(branch.to_string()),
        description: "demo feature".to_string(),
        user_stories: stories,
        extra: Map::new(),
    }
}

/// Scratch git repository with one commit on `main`.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp repo dir")?;
        let repo = Self { dir };
        repo.git(&["init", "-q", "-b", "main"])?;
        repo.git(&["config", "user.email", "ralph@example.com"])?;
        repo.git(&["config", "user.name", "Ralph Test"])?;
        repo.git(&["config", "commit.gpgsign", "false"])?;
        fs::write(repo.path().join("README.md"), "# demo\n").context("write README")?;
        repo.commit_all("initial commit")?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Stage everything and commit.
    pub fn commit_all(&self, message: &str) -> Result<()> {
        self.git(&["add", "-A"])?;
        self.git(&["commit", "-q", "--allow-empty", "-m", message])?;
        Ok(())
    }

    /// Run git in the repository and return trimmed stdout.
    pub fn git(&self, args: &[&str]) -> Result<String> {
        let out = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !out.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&out.stderr).trim()
            ));
        }
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }
}

/// One scripted agent invocation.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRun {
    /// Story ids to mark as passing.
    pub complete: Vec<String>,
    /// Story ids to mark as not passing again.
    pub reopen: Vec<String>,
    /// Report a failed run (non-zero exit).
    pub fail: bool,
    /// Fail to start at all.
    pub error: bool,
    /// Do not write the transcript file.
    pub skip_log: bool,
}

impl ScriptedRun {
    pub fn completes(ids: &[&str]) -> Self {
        Self {
            complete: ids.iter().map(|id| id.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn idle() -> Self {
        Self::default()
    }

    pub fn reopens(ids: &[&str]) -> Self {
        Self {
            reopen: ids.iter().map(|id| id.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn unstartable() -> Self {
        Self {
            error: true,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

/// Agent that edits the task list in the request's workdir instead of
/// spawning anything. Once the script runs out every call is idle.
#[derive(Debug)]
pub struct ScriptedAgent {
    task_list_file: PathBuf,
    script: Mutex<VecDeque<ScriptedRun>>,
    requests: Mutex<Vec<AgentRequest>>,
}

impl ScriptedAgent {
    pub fn new(script: Vec<ScriptedRun>) -> Self {
        Self {
            task_list_file: PathBuf::from(TASK_LIST_FILE),
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<AgentRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl Agent for ScriptedAgent {
    fn invoke(&self, request: &AgentRequest) -> Result<AgentRun> {
        self.requests
            .lock()
            .map_err(|_| anyhow!("requests lock poisoned"))?
            .push(request.clone());
        let run = self
            .script
            .lock()
            .map_err(|_| anyhow!("script lock poisoned"))?
            .pop_front()
            .unwrap_or_default();

        if run.error {
            return Err(anyhow!("scripted agent could not start"));
        }
        if !run.complete.is_empty() || !run.reopen.is_empty() {
            let path = request.workdir.join(&self.task_list_file);
            let mut list = load_task_list(&path)?;
            for story in &mut list.user_stories {
                if run.complete.contains(&story.id) {
                    story.passes = true;
                } else if run.reopen.contains(&story.id) {
                    story.passes = false;
                }
            }
            write_task_list(&path, &list)?;
        }
        if !run.skip_log {
            if let Some(parent) = request.log_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&request.log_path, "scripted agent transcript\n")?;
        }
        Ok(AgentRun {
            success: !run.fail,
            exit_code: Some(if run.fail { 1 } else { 0 }),
            timed_out: false,
        })
    }
}

#[derive(Debug)]
struct FakeState {
    next_pid: u32,
    alive: BTreeSet<u32>,
    spawned: Vec<SpawnSpec>,
    terminated: Vec<u32>,
    /// Pids now held by an unrelated process started later.
    recycled: BTreeSet<u32>,
    die_on_spawn: bool,
    ignore_terminate: bool,
}

/// In-memory process table.
#[derive(Debug)]
pub struct FakeProcesses {
    state: Mutex<FakeState>,
}

impl FakeProcesses {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                next_pid: 4242,
                alive: BTreeSet::new(),
                spawned: Vec::new(),
                terminated: Vec::new(),
                recycled: BTreeSet::new(),
                die_on_spawn: false,
                ignore_terminate: false,
            }),
        }
    }

    /// Pretend `pid` is already running.
    pub fn with_live(self, pid: u32) -> Self {
        self.lock().alive.insert(pid);
        self
    }

    /// `pid` is running but belongs to a process other than the one that
    /// was registered.
    pub fn with_recycled(self, pid: u32) -> Self {
        {
            let mut state = self.lock();
            state.alive.insert(pid);
            state.recycled.insert(pid);
        }
        self
    }

    /// Spawned children exit immediately.
    pub fn die_on_spawn(self) -> Self {
        self.lock().die_on_spawn = true;
        self
    }

    /// SIGTERM is delivered but the process keeps running.
    pub fn ignore_terminate(self) -> Self {
        self.lock().ignore_terminate = true;
        self
    }

    pub fn spawned(&self) -> Vec<SpawnSpec> {
        self.lock().spawned.clone()
    }

    pub fn terminated(&self) -> Vec<u32> {
        self.lock().terminated.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake process lock")
    }
}

impl Default for FakeProcesses {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessHost for FakeProcesses {
    fn spawn_detached(&self, spec: &SpawnSpec) -> Result<u32> {
        let mut state = self.lock();
        let pid = state.next_pid;
        state.next_pid += 1;
        state.spawned.push(spec.clone());
        if !state.die_on_spawn {
            state.alive.insert(pid);
        }
        Ok(pid)
    }

    fn is_alive(&self, pid: u32) -> bool {
        self.lock().alive.contains(&pid)
    }

    fn start_time(&self, pid: u32) -> Option<u64> {
        let state = self.lock();
        if !state.alive.contains(&pid) {
            return None;
        }
        let base = u64::from(pid);
        Some(if state.recycled.contains(&pid) { base + 1_000_000 } else { base })
    }

    fn terminate(&self, pid: u32) -> Result<bool> {
        let mut state = self.lock();
        if !state.alive.contains(&pid) {
            return Ok(false);
        }
        state.terminated.push(pid);
        if !state.ignore_terminate {
            state.alive.remove(&pid);
        }
        Ok(true)
    }
}
