//! Agent abstraction for iteration and retrospective invocations.
//!
//! The [`Agent`] trait decouples the iteration engine from the actual agent
//! backend (`claude`, `codex`, or `amp`). Tests use scripted agents that
//! mutate the task list directly without spawning processes.

use std::fmt;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::io::process::run_command_to_log;

/// Supported agent backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    #[default]
    Claude,
    Codex,
    Amp,
}

impl AgentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentKind::Claude => "claude",
            AgentKind::Codex => "codex",
            AgentKind::Amp => "amp",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasoning effort hint for backends that accept one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Minimal,
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasoningEffort::Minimal => "minimal",
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
        }
    }
}

impl fmt::Display for ReasoningEffort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    /// Working directory for the agent process.
    pub workdir: PathBuf,
    /// Instructions fed to the agent on stdin.
    pub prompt: String,
    /// Transcript destination (stdout + stderr).
    pub log_path: PathBuf,
    /// Maximum time to wait for the agent to exit.
    pub timeout: Duration,
}

/// How an invocation ended. A failed run is not an error: the loop retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRun {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

/// Abstraction over agent execution backends.
pub trait Agent {
    /// Run the agent. `Err` means the agent could not be run at all.
    fn invoke(&self, request: &AgentRequest) -> Result<AgentRun>;
}

/// Agent that spawns a CLI backend as a subprocess.
#[derive(Debug, Clone)]
pub struct CliAgent {
    kind: AgentKind,
    model: Option<String>,
    reasoning_effort: Option<ReasoningEffort>,
}

impl CliAgent {
    pub fn new(
        kind: AgentKind,
        model: Option<String>,
        reasoning_effort: Option<ReasoningEffort>,
    ) -> Self {
        Self {
            kind,
            model,
            reasoning_effort,
        }
    }

    /// Program and arguments for the configured backend.
    pub fn command_line(&self) -> (String, Vec<String>) {
        let mut args: Vec<String> = Vec::new();
        match self.kind {
            AgentKind::Claude => {
                args.push("--print".into());
                args.push("--dangerously-skip-permissions".into());
                if let Some(model) = &self.model {
                    args.push("--model".into());
                    args.push(model.clone());
                }
                if let Some(effort) = self.reasoning_effort {
                    debug!(%effort, "claude has no reasoning effort flag, ignoring");
                }
            }
            AgentKind::Codex => {
                args.push("exec".into());
                args.push("--sandbox".into());
                args.push("danger-full-access".into());
                args.push("--skip-git-repo-check".into());
                if let Some(model) = &self.model {
                    args.push("--model".into());
                    args.push(model.clone());
                }
                if let Some(effort) = self.reasoning_effort {
                    args.push("-c".into());
                    args.push(format!("model_reasoning_effort={effort}"));
                }
                args.push("-".into());
            }
            AgentKind::Amp => {
                args.push("--dangerously-allow-all".into());
                if self.model.is_some() || self.reasoning_effort.is_some() {
                    debug!("amp does not accept model or reasoning effort, ignoring");
                }
            }
        }
        (self.kind.as_str().to_string(), args)
    }
}

impl Agent for CliAgent {
    #[instrument(skip_all, fields(agent = %self.kind, timeout_secs = request.timeout.as_secs()))]
    fn invoke(&self, request: &AgentRequest) -> Result<AgentRun> {
        info!(workdir = %request.workdir.display(), "starting agent");
        let (program, args) = self.command_line();
        let mut cmd = Command::new(&program);
        cmd.args(&args).current_dir(&request.workdir);

        let outcome = run_command_to_log(
            cmd,
            Some(request.prompt.as_bytes()),
            &request.log_path,
            request.timeout,
        )
        .with_context(|| format!("run agent {program}"))?;

        if outcome.timed_out {
            warn!(
                timeout_secs = request.timeout.as_secs(),
                "agent timed out"
            );
        } else if !outcome.status.success() {
            warn!(exit_code = ?outcome.status.code(), "agent failed");
        } else {
            debug!("agent completed successfully");
        }

        Ok(AgentRun {
            success: outcome.success(),
            exit_code: outcome.status.code(),
            timed_out: outcome.timed_out,
        })
    }
}
