//! Iteration engine: select, invoke, verify, repeat, then reflect once.
//!
//! The engine never writes `passes`; it only reads the task list back after
//! each agent run and decides whether to continue. A failed agent run is an
//! ordinary iteration, not an error.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::Local;
use tracing::{debug, info, instrument, warn};

use crate::core::selector::{first_open_story, lowest_priority_open_story};
use crate::core::types::{Target, Verdict, judge};
use crate::io::agent::{Agent, AgentRequest};
use crate::io::iteration_log::{iteration_log_path, retrospective_log_path};
use crate::io::paths::{PROGRESS_FILE, RalphPaths};
use crate::io::prompt::{PromptInputs, render_iteration, render_retrospective};
use crate::io::task_store::{load_task_list, load_with_branch};
use crate::task_list::TaskList;

/// Settings for one engine run.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub max_iterations: u32,
    /// Pause between a verified iteration and the next selection.
    pub delay: Duration,
    pub agent_timeout: Duration,
    /// Report file the retrospective asks the agent to write.
    pub report_file: String,
}

/// Reason why `run_loop` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// Every story passes.
    Complete { iterations: u32 },
    /// The iteration budget ran out with stories still open.
    Exhausted { iterations: u32, remaining: usize },
}

/// Summary of an engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub stop: LoopStop,
    pub completed: usize,
    pub total: usize,
    /// Whether the retrospective agent run succeeded.
    pub retrospective_ok: bool,
}

/// Progress notifications for the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEvent {
    IterationStarted {
        iter: u32,
        max_iterations: u32,
        target: Target,
    },
    IterationFinished {
        iter: u32,
        target: Target,
        success: bool,
        log_path: PathBuf,
    },
    RetrospectiveFinished {
        success: bool,
        log_path: PathBuf,
    },
}

enum State {
    SelectTask {
        iter: u32,
    },
    InvokeAgent {
        iter: u32,
        target: Target,
        list: TaskList,
        branch: String,
    },
    Verify {
        iter: u32,
    },
    Retrospective {
        stop: LoopStop,
    },
    Done(LoopOutcome),
}

/// Drive the agent until the task list is complete or the budget is spent.
///
/// `Err` is reserved for fatal problems: an unreadable task list or an agent
/// that cannot be started at all.
#[instrument(skip_all, fields(root = %paths.root.display(), max_iterations = config.max_iterations))]
pub fn run_loop<A: Agent, F: FnMut(&LoopEvent)>(
    paths: &RalphPaths,
    agent: &A,
    config: &LoopConfig,
    on_event: F,
) -> Result<LoopOutcome> {
    if config.max_iterations == 0 {
        return Err(anyhow!("max_iterations must be at least 1"));
    }
    let mut engine = Engine {
        paths,
        agent,
        config,
        on_event,
        task_list_file: paths.task_list_file_name(),
        last_completed: None,
    };
    let mut state = State::SelectTask { iter: 1 };
    loop {
        state = match state {
            State::SelectTask { iter } => engine.select_task(iter)?,
            State::InvokeAgent {
                iter,
                target,
                list,
                branch,
            } => engine.invoke_agent(iter, target, &list, &branch)?,
            State::Verify { iter } => engine.verify(iter)?,
            State::Retrospective { stop } => engine.retrospective(stop)?,
            State::Done(outcome) => return Ok(outcome),
        };
    }
}

struct Engine<'a, A, F> {
    paths: &'a RalphPaths,
    agent: &'a A,
    config: &'a LoopConfig,
    on_event: F,
    task_list_file: PathBuf,
    last_completed: Option<usize>,
}

impl<A: Agent, F: FnMut(&LoopEvent)> Engine<'_, A, F> {
    fn select_task(&mut self, iter: u32) -> Result<State> {
        let (list, branch) = load_with_branch(&self.paths.task_list_path)?;
        self.observe_completed(list.completed_count());

        let target = match first_open_story(&list) {
            Some(story) => {
                if let Some(lowest) = lowest_priority_open_story(&list)
                    && lowest.id != story.id
                {
                    debug!(
                        selected = %story.id,
                        lowest_priority = %lowest.id,
                        "document order differs from priority order"
                    );
                }
                Target::Story {
                    id: story.id.clone(),
                    title: story.title.clone(),
                }
            }
            None => Target::Cleanup,
        };
        info!(iter, target = %target, "selected");
        (self.on_event)(&LoopEvent::IterationStarted {
            iter,
            max_iterations: self.config.max_iterations,
            target: target.clone(),
        });
        Ok(State::InvokeAgent {
            iter,
            target,
            list,
            branch,
        })
    }

    fn invoke_agent(
        &mut self,
        iter: u32,
        target: Target,
        list: &TaskList,
        branch: &str,
    ) -> Result<State> {
        let story = match &target {
            Target::Story { id, .. } => list.story(id),
            Target::Cleanup => None,
        };
        let prompt = render_iteration(&self.prompt_inputs(list, branch), story)?;
        let log_path = iteration_log_path(&self.paths.logs_dir, target.label(), iter, Local::now());

        let run = self.agent.invoke(&AgentRequest {
            workdir: self.paths.root.clone(),
            prompt,
            log_path: log_path.clone(),
            timeout: self.config.agent_timeout,
        })?;
        warn_if_missing(&log_path);
        if !run.success {
            warn!(iter, exit_code = ?run.exit_code, timed_out = run.timed_out, "iteration failed");
        }

        (self.on_event)(&LoopEvent::IterationFinished {
            iter,
            target,
            success: run.success,
            log_path,
        });
        Ok(State::Verify { iter })
    }

    fn verify(&mut self, iter: u32) -> Result<State> {
        let list = load_task_list(&self.paths.task_list_path)?;
        self.observe_completed(list.completed_count());
        let incomplete = list.incomplete_count();

        match judge(incomplete, iter, self.config.max_iterations) {
            Verdict::Complete => {
                info!(iterations = iter, "all stories pass");
                Ok(State::Retrospective {
                    stop: LoopStop::Complete { iterations: iter },
                })
            }
            Verdict::Exhausted => {
                warn!(iterations = iter, remaining = incomplete, "iteration budget spent");
                Ok(State::Retrospective {
                    stop: LoopStop::Exhausted {
                        iterations: iter,
                        remaining: incomplete,
                    },
                })
            }
            Verdict::Continue => {
                debug!(remaining = incomplete, "continuing");
                if !self.config.delay.is_zero() {
                    thread::sleep(self.config.delay);
                }
                Ok(State::SelectTask { iter: iter + 1 })
            }
        }
    }

    /// The retrospective is best effort: any failure is logged and the run
    /// still finishes with the verdict it already reached.
    fn retrospective(&mut self, stop: LoopStop) -> Result<State> {
        let list = load_task_list(&self.paths.task_list_path)?;
        let branch = list.branch().unwrap_or_default().to_string();
        let complete = matches!(stop, LoopStop::Complete { .. });
        let log_path = retrospective_log_path(&self.paths.logs_dir, Local::now());

        let success = match render_retrospective(
            &self.prompt_inputs(&list, &branch),
            complete,
            &self.config.report_file,
        )
        .and_then(|prompt| {
            self.agent.invoke(&AgentRequest {
                workdir: self.paths.root.clone(),
                prompt,
                log_path: log_path.clone(),
                timeout: self.config.agent_timeout,
            })
        }) {
            Ok(run) => {
                warn_if_missing(&log_path);
                run.success
            }
            Err(err) => {
                warn!(err = %format!("{err:#}"), "retrospective could not run");
                false
            }
        };
        if !success {
            warn!("retrospective failed");
        }
        (self.on_event)(&LoopEvent::RetrospectiveFinished {
            success,
            log_path,
        });

        Ok(State::Done(LoopOutcome {
            stop,
            completed: list.completed_count(),
            total: list.user_stories.len(),
            retrospective_ok: success,
        }))
    }

    fn prompt_inputs<'b>(&'b self, list: &'b TaskList, branch: &'b str) -> PromptInputs<'b> {
        PromptInputs {
            list,
            branch,
            task_list_file: &self.task_list_file,
            progress_file: Path::new(PROGRESS_FILE),
        }
    }

    fn observe_completed(&mut self, completed: usize) {
        if let Some(previous) = self.last_completed
            && completed < previous
        {
            warn!(previous, completed, "completed story count decreased");
        }
        self.last_completed = Some(completed);
    }
}

fn warn_if_missing(log_path: &Path) {
    if !log_path.exists() {
        warn!(log = %log_path.display(), "agent transcript missing after invocation");
    }
}
