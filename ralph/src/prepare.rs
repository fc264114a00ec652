//! Everything that happens before the first iteration.
//!
//! Resolves the working root (provisioning a workspace when asked), then
//! reconciles run state there. Configuration errors surface before either
//! step mutates anything.

use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Local};
use tracing::{debug, info};

use crate::io::paths::RalphPaths;
use crate::io::run_state::{RunStateOutcome, reconcile_run_state};
use crate::io::task_store::load_with_branch;
use crate::io::workspace::{Workspace, WorkspaceRequest, provision};

/// Options for [`prepare_run`].
#[derive(Debug, Clone)]
pub struct PrepareOptions<'a> {
    pub task_list_path: &'a Path,
    /// Run inside an isolated worktree instead of the source checkout.
    pub workspace: bool,
    pub force_reset: bool,
    pub workspace_base: Option<&'a Path>,
}

/// Resolved working root for the iteration engine.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub paths: RalphPaths,
    pub project: String,
    pub branch: String,
    pub workspace: Option<Workspace>,
    pub run_state: RunStateOutcome,
}

pub fn prepare_run(options: &PrepareOptions<'_>, now: DateTime<Local>) -> Result<Prepared> {
    let (paths, project, branch, workspace) = if options.workspace {
        let ws = provision(&WorkspaceRequest {
            task_list_path: options.task_list_path,
            force_reset: options.force_reset,
            base: options.workspace_base,
        })?;
        let file_name = RalphPaths::for_task_list(options.task_list_path).task_list_file_name();
        let paths = RalphPaths::with_task_list(&ws.root, file_name);
        info!(root = %paths.root.display(), created = ws.created, reset = ws.reset, "using workspace");
        (paths, ws.project.clone(), ws.branch.clone(), Some(ws))
    } else {
        let (list, branch) = load_with_branch(options.task_list_path)?;
        if options.force_reset {
            debug!("--force-reset has no effect without --workspace");
        }
        (
            RalphPaths::for_task_list(options.task_list_path),
            list.project,
            branch,
            None,
        )
    };

    let run_state = reconcile_run_state(&paths, now)?;
    Ok(Prepared {
        paths,
        project,
        branch,
        workspace,
        run_state,
    })
}
