//! Supervisor configuration stored under `.ralph/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use super::agent::{AgentKind, ReasoningEffort};
use super::paths::write_atomic;

/// Supervisor configuration (TOML).
///
/// Edited by humans; every field is optional in the file and CLI flags win
/// over whatever is stored here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RalphConfig {
    /// Agent backend to invoke.
    pub agent: AgentKind,

    /// Model passed to the agent, if it accepts one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Reasoning effort passed to the agent, if it accepts one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,

    /// Pause between iterations in seconds.
    pub iteration_delay_secs: u64,

    /// Wall-clock limit for one agent invocation in seconds.
    pub agent_timeout_secs: u64,

    /// How long a freshly spawned daemon must survive to count as started.
    pub startup_grace_ms: u64,

    /// How long `stop` waits for the daemon to exit.
    pub stop_timeout_secs: u64,

    /// Directory holding workspaces; defaults to a sibling of the repository.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_base: Option<PathBuf>,

    /// File the retrospective pass asks the agent to write.
    pub report_file: String,
}

impl Default for RalphConfig {
    fn default() -> Self {
        Self {
            agent: AgentKind::default(),
            model: None,
            reasoning_effort: None,
            iteration_delay_secs: 2,
            agent_timeout_secs: 60 * 60,
            startup_grace_ms: 2_000,
            stop_timeout_secs: 10,
            workspace_base: None,
            report_file: "RETROSPECTIVE.md".to_string(),
        }
    }
}

impl RalphConfig {
    pub fn validate(&self) -> Result<()> {
        if self.agent_timeout_secs == 0 {
            return Err(anyhow!("agent_timeout_secs must be > 0"));
        }
        if self.stop_timeout_secs == 0 {
            return Err(anyhow!("stop_timeout_secs must be > 0"));
        }
        if self.report_file.trim().is_empty() {
            return Err(anyhow!("report_file must not be empty"));
        }
        if let Some(model) = &self.model
            && model.trim().is_empty()
        {
            return Err(anyhow!("model must not be empty when set"));
        }
        Ok(())
    }

    pub fn iteration_delay(&self) -> Duration {
        Duration::from_secs(self.iteration_delay_secs)
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RalphConfig::default()`.
pub fn load_config(path: &Path) -> Result<RalphConfig> {
    if !path.exists() {
        let cfg = RalphConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RalphConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RalphConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, RalphConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let cfg = RalphConfig {
            agent: AgentKind::Codex,
            model: Some("gpt-5-codex".to_string()),
            reasoning_effort: Some(ReasoningEffort::High),
            ..RalphConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "agent = \"amp\"\niteration_delay_secs = 0\n").expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.agent, AgentKind::Amp);
        assert_eq!(cfg.iteration_delay_secs, 0);
        assert_eq!(cfg.stop_timeout_secs, 10);
        assert_eq!(cfg.report_file, "RETROSPECTIVE.md");
    }

    #[test]
    fn rejects_zero_agent_timeout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "agent_timeout_secs = 0\n").expect("write");

        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("agent_timeout_secs"));
    }
}
