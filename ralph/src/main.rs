//! `ralph`: run an AI coding agent over a `prd.json` task list until every
//! story passes, in the foreground or as a detached daemon.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};

use ralph::daemon::{DaemonKey, DaemonStatus, DaemonSupervisor, DaemonTiming, StopOutcome};
use ralph::exit_codes;
use ralph::io::agent::{AgentKind, CliAgent, ReasoningEffort};
use ralph::io::config::{RalphConfig, load_config};
use ralph::io::paths::{RalphPaths, TASK_LIST_FILE};
use ralph::io::processes::{SpawnSpec, SystemProcesses};
use ralph::io::registry::FileRegistry;
use ralph::io::task_store::load_with_branch;
use ralph::logging;
use ralph::looping::{LoopConfig, LoopEvent, LoopOutcome, LoopStop, run_loop};
use ralph::prepare::{PrepareOptions, Prepared, prepare_run};

#[derive(Parser, Debug)]
#[command(
    name = "ralph",
    version,
    about = "Drive an AI coding agent through a prd.json task list",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report whether a daemon is running for the task list's branch.
    Status(TaskListArg),
    /// Stop the daemon running for the task list's branch.
    Stop(TaskListArg),
    /// List every running daemon on this machine.
    List,
}

#[derive(Args, Debug, Clone)]
struct TaskListArg {
    /// Path to the task list.
    #[arg(long, default_value = TASK_LIST_FILE)]
    prd: PathBuf,
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Maximum number of agent iterations.
    #[arg(default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
    iterations: u32,
    /// Agent backend (defaults to the config file, then claude).
    #[arg(long, value_enum)]
    agent: Option<AgentKind>,
    /// Model passed to the agent.
    #[arg(long)]
    model: Option<String>,
    /// Reasoning effort passed to the agent.
    #[arg(long, value_enum)]
    reasoning_effort: Option<ReasoningEffort>,
    /// Run detached in the background.
    #[arg(long)]
    daemon: bool,
    /// Run in an isolated git worktree for the task list's branch.
    #[arg(long)]
    workspace: bool,
    /// Destroy and recreate the workspace and its branch.
    #[arg(long, requires = "workspace")]
    force_reset: bool,
    #[command(flatten)]
    task_list: TaskListArg,
    /// Config file (defaults to `.ralph/config.toml` next to the task list).
    #[arg(long)]
    config: Option<PathBuf>,
}

impl RunArgs {
    /// Arguments for the detached child: the same run, minus `--daemon`,
    /// with paths made absolute.
    fn child_args(&self, task_list: &Path, config: Option<&Path>) -> Vec<String> {
        let mut args = vec![self.iterations.to_string()];
        if let Some(agent) = self.agent {
            args.extend(["--agent".to_string(), agent.to_string()]);
        }
        if let Some(model) = &self.model {
            args.extend(["--model".to_string(), model.clone()]);
        }
        if let Some(effort) = self.reasoning_effort {
            args.extend(["--reasoning-effort".to_string(), effort.to_string()]);
        }
        if self.workspace {
            args.push("--workspace".to_string());
        }
        if self.force_reset {
            args.push("--force-reset".to_string());
        }
        args.extend(["--prd".to_string(), task_list.display().to_string()]);
        if let Some(config) = config {
            args.extend(["--config".to_string(), config.display().to_string()]);
        }
        args
    }

    fn effective_config(&self, paths: &RalphPaths) -> Result<RalphConfig> {
        let path = self.config.clone().unwrap_or_else(|| paths.config_path.clone());
        let mut config = load_config(&path)?;
        if let Some(agent) = self.agent {
            config.agent = agent;
        }
        if self.model.is_some() {
            config.model = self.model.clone();
        }
        if self.reasoning_effort.is_some() {
            config.reasoning_effort = self.reasoning_effort;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::ERROR);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Some(Command::Status(arg)) => cmd_status(&arg.prd),
        Some(Command::Stop(arg)) => cmd_stop(&arg.prd),
        Some(Command::List) => cmd_list(),
        None if cli.run.daemon => cmd_daemon_start(&cli.run),
        None => cmd_run(&cli.run),
    }
}

fn supervisor(config: &RalphConfig) -> DaemonSupervisor<FileRegistry, SystemProcesses> {
    DaemonSupervisor::new(
        FileRegistry::system(),
        SystemProcesses,
        DaemonTiming::from_config(config),
    )
}

/// Daemon key and source paths for a task list.
fn resolve_key(task_list: &Path) -> Result<(DaemonKey, RalphPaths)> {
    let (list, branch) = load_with_branch(task_list)?;
    Ok((
        DaemonKey::new(list.project, branch),
        RalphPaths::for_task_list(task_list),
    ))
}

fn cmd_daemon_start(args: &RunArgs) -> Result<i32> {
    let task_list = std::path::absolute(&args.task_list.prd)
        .with_context(|| format!("resolve {}", args.task_list.prd.display()))?;
    let config_path = args
        .config
        .as_deref()
        .map(std::path::absolute)
        .transpose()
        .context("resolve config path")?;
    let (key, paths) = resolve_key(&task_list)?;
    let config = args.effective_config(&paths)?;

    let spec = SpawnSpec {
        program: std::env::current_exe().context("locate ralph executable")?,
        args: args.child_args(&task_list, config_path.as_deref()),
        workdir: std::env::current_dir().context("read current directory")?,
        log_path: paths.daemon_log_path(&key.registry_key()),
    };
    let info = supervisor(&config).start(&key, &spec)?;
    println!(
        "daemon: started pid={} project={} branch={} log={}",
        info.pid,
        info.project,
        info.branch,
        info.log_path.display()
    );
    Ok(exit_codes::OK)
}

fn cmd_status(task_list: &Path) -> Result<i32> {
    let (key, paths) = resolve_key(task_list)?;
    let config = load_config(&paths.config_path)?;
    match supervisor(&config).status(&key)? {
        DaemonStatus::Running(info) => {
            println!(
                "status: running pid={} project={} branch={} started={} log={}",
                info.pid,
                info.project,
                info.branch,
                info.started_at,
                info.log_path.display()
            );
            Ok(exit_codes::OK)
        }
        DaemonStatus::NotRunning => {
            println!(
                "status: not running project={} branch={}",
                key.project, key.branch
            );
            Ok(exit_codes::NOT_RUNNING)
        }
    }
}

fn cmd_stop(task_list: &Path) -> Result<i32> {
    let (key, paths) = resolve_key(task_list)?;
    let config = load_config(&paths.config_path)?;
    match supervisor(&config).stop(&key)? {
        StopOutcome::Stopped { pid, confirmed } => {
            println!("stop: stopped pid={pid} confirmed={confirmed}");
            Ok(exit_codes::OK)
        }
        StopOutcome::NotRunning => {
            println!(
                "stop: not running project={} branch={}",
                key.project, key.branch
            );
            Ok(exit_codes::NOT_RUNNING)
        }
    }
}

fn cmd_list() -> Result<i32> {
    let daemons = supervisor(&RalphConfig::default()).list()?;
    if daemons.is_empty() {
        println!("list: no running daemons");
    }
    for info in daemons {
        println!(
            "pid={} project={} branch={} started={} log={}",
            info.pid,
            info.project,
            info.branch,
            info.started_at,
            info.log_path.display()
        );
    }
    Ok(exit_codes::OK)
}

fn cmd_run(args: &RunArgs) -> Result<i32> {
    // Printed root and transcript paths must resolve from any cwd.
    let task_list = std::path::absolute(&args.task_list.prd)
        .with_context(|| format!("resolve {}", args.task_list.prd.display()))?;
    let source_paths = RalphPaths::for_task_list(&task_list);
    let config = args.effective_config(&source_paths)?;
    let prepared = prepare_run(
        &PrepareOptions {
            task_list_path: &task_list,
            workspace: args.workspace,
            force_reset: args.force_reset,
            workspace_base: config.workspace_base.as_deref(),
        },
        Local::now(),
    )?;

    println!(
        "ralph: project={} branch={} root={} agent={} max_iterations={}",
        prepared.project,
        prepared.branch,
        prepared.paths.root.display(),
        config.agent,
        args.iterations
    );
    if let Some(archived) = &prepared.run_state.archived {
        println!("archived previous run: {}", archived.display());
    }

    let agent = CliAgent::new(config.agent, config.model.clone(), config.reasoning_effort);
    let outcome = run_loop(
        &prepared.paths,
        &agent,
        &LoopConfig {
            max_iterations: args.iterations,
            delay: config.iteration_delay(),
            agent_timeout: config.agent_timeout(),
            report_file: config.report_file.clone(),
        },
        print_event,
    )?;

    print_summary(&prepared, &outcome);
    Ok(match outcome.stop {
        LoopStop::Complete { .. } => exit_codes::OK,
        LoopStop::Exhausted { .. } => exit_codes::INCOMPLETE,
    })
}

fn tag(success: bool) -> &'static str {
    if success { "ok" } else { "failed" }
}

fn print_event(event: &LoopEvent) {
    match event {
        LoopEvent::IterationStarted {
            iter,
            max_iterations,
            target,
        } => println!("iteration {iter}/{max_iterations}: {target}"),
        LoopEvent::IterationFinished {
            success, log_path, ..
        } => println!("  [{}] log={}", tag(*success), log_path.display()),
        LoopEvent::RetrospectiveFinished { success, log_path } => {
            println!("retrospective: [{}] log={}", tag(*success), log_path.display());
        }
    }
}

fn print_summary(prepared: &Prepared, outcome: &LoopOutcome) {
    match &outcome.stop {
        LoopStop::Complete { iterations } => println!(
            "done: complete iterations={iterations} stories={}/{}",
            outcome.completed, outcome.total
        ),
        LoopStop::Exhausted {
            iterations,
            remaining,
        } => println!(
            "done: incomplete iterations={iterations} remaining={remaining} stories={}/{}",
            outcome.completed, outcome.total
        ),
    }
    if let Some(ws) = &prepared.workspace {
        let path = ws.path.display();
        let branch = &ws.branch;
        println!("workspace: {path}");
        println!("  review:  git -C {path} log --oneline");
        println!("  push:    git -C {path} push -u origin {branch}");
        println!("  merge:   git merge {branch}");
        println!("  cleanup: git worktree remove {path}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_defaults_to_ten_iterations() {
        let cli = Cli::parse_from(["ralph"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.run.iterations, 10);
        assert_eq!(cli.run.task_list.prd, PathBuf::from("prd.json"));
        assert!(!cli.run.daemon);
    }

    #[test]
    fn parse_run_flags() {
        let cli = Cli::parse_from([
            "ralph",
            "25",
            "--agent",
            "codex",
            "--reasoning-effort",
            "high",
            "--workspace",
            "--force-reset",
            "--prd",
            "plans/prd.json",
        ]);
        assert_eq!(cli.run.iterations, 25);
        assert_eq!(cli.run.agent, Some(AgentKind::Codex));
        assert_eq!(cli.run.reasoning_effort, Some(ReasoningEffort::High));
        assert!(cli.run.workspace && cli.run.force_reset);
    }

    #[test]
    fn zero_iterations_is_rejected() {
        assert!(Cli::try_parse_from(["ralph", "0"]).is_err());
    }

    #[test]
    fn force_reset_requires_workspace() {
        assert!(Cli::try_parse_from(["ralph", "--force-reset"]).is_err());
    }

    #[test]
    fn parse_management_subcommands() {
        let cli = Cli::parse_from(["ralph", "status", "--prd", "x.json"]);
        assert!(matches!(cli.command, Some(Command::Status(ref a)) if a.prd == Path::new("x.json")));
        assert!(matches!(
            Cli::parse_from(["ralph", "list"]).command,
            Some(Command::List)
        ));
    }

    #[test]
    fn child_args_drop_daemon_and_keep_the_rest() {
        let cli = Cli::parse_from([
            "ralph", "3", "--daemon", "--agent", "amp", "--model", "m", "--workspace",
        ]);
        let args = cli
            .run
            .child_args(Path::new("/abs/prd.json"), Some(Path::new("/abs/c.toml")));
        assert_eq!(
            args,
            vec![
                "3",
                "--agent",
                "amp",
                "--model",
                "m",
                "--workspace",
                "--prd",
                "/abs/prd.json",
                "--config",
                "/abs/c.toml"
            ]
        );
        let reparsed = Cli::try_parse_from(std::iter::once("ralph".to_string()).chain(args))
            .expect("child args parse");
        assert!(!reparsed.run.daemon);
        assert_eq!(reparsed.run.iterations, 3);
    }
}
