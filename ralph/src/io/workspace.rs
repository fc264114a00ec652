//! Isolated git worktree per (project, branch).
//!
//! A workspace is a worktree checked out on the task list's branch, placed at
//! a path derived only from the project and branch names. The task list inside
//! it is reconciled against the source copy before each run.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use super::git::Git;
use super::task_store::{load_with_branch, peek_branch};
use crate::core::naming::workspace_path;

/// Inputs for [`provision`].
#[derive(Debug, Clone)]
pub struct WorkspaceRequest<'a> {
    /// Task list in the source checkout.
    pub task_list_path: &'a Path,
    /// Destroy an existing workspace and its branch before recreating it.
    pub force_reset: bool,
    /// Directory holding workspaces; defaults to a sibling of the repository.
    pub base: Option<&'a Path>,
}

/// A provisioned workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    /// Effective working root inside the worktree (task list directory).
    pub root: PathBuf,
    /// Worktree directory.
    pub path: PathBuf,
    pub project: String,
    pub branch: String,
    /// The worktree was created by this call.
    pub created: bool,
    /// An existing worktree was destroyed first.
    pub reset: bool,
}

/// Default workspace base: `<repo parent>/<repo name>-ralph-workspaces`.
pub fn default_workspace_base(toplevel: &Path) -> PathBuf {
    let name = toplevel
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "repo".to_string());
    let parent = toplevel.parent().unwrap_or(toplevel);
    parent.join(format!("{name}-ralph-workspaces"))
}

/// Create or reuse the workspace for the source task list's branch.
///
/// Configuration problems (missing task list, no branch) are reported before
/// anything on disk or in git is touched.
#[instrument(skip_all, fields(task_list = %request.task_list_path.display(), force_reset = request.force_reset))]
pub fn provision(request: &WorkspaceRequest<'_>) -> Result<Workspace> {
    let (list, branch) = load_with_branch(request.task_list_path)?;
    let source = request
        .task_list_path
        .canonicalize()
        .with_context(|| format!("resolve {}", request.task_list_path.display()))?;
    let source_dir = source
        .parent()
        .ok_or_else(|| anyhow!("task list has no parent directory: {}", source.display()))?;
    let file_name = source
        .file_name()
        .ok_or_else(|| anyhow!("task list has no file name: {}", source.display()))?;

    let git = Git::new(source_dir);
    let toplevel = git.toplevel()?;
    let toplevel = toplevel
        .canonicalize()
        .with_context(|| format!("resolve {}", toplevel.display()))?;
    let relative = source_dir.strip_prefix(&toplevel).with_context(|| {
        format!(
            "task list {} is outside repository {}",
            source.display(),
            toplevel.display()
        )
    })?;

    let base = match request.base {
        Some(base) => base.to_path_buf(),
        None => default_workspace_base(&toplevel),
    };
    let path = workspace_path(&base, &list.project, &branch);
    debug!(path = %path.display(), branch = %branch, "workspace location");

    let repo = Git::new(&toplevel);
    let mut reset = false;
    if request.force_reset && path.exists() {
        destroy_workspace(&repo, &path, &branch)?;
        reset = true;
    }

    let created = if path.exists() {
        info!(path = %path.display(), "reusing workspace");
        false
    } else {
        if !repo.branch_exists(&branch)? {
            let start = repo.current_branch()?;
            info!(branch = %branch, start = %start, "creating branch");
            repo.create_branch(&branch, &start)?;
        }
        fs::create_dir_all(&base).with_context(|| format!("create {}", base.display()))?;
        repo.worktree_add(&path, &branch)?;
        info!(path = %path.display(), "created workspace");
        true
    };

    let root = path.join(relative);
    reconcile_task_list(&source, &root.join(file_name), &branch)?;

    Ok(Workspace {
        root,
        path,
        project: list.project,
        branch,
        created,
        reset,
    })
}

/// Tear down the worktree (best effort) and delete its branch (must succeed).
fn destroy_workspace(repo: &Git, path: &Path, branch: &str) -> Result<()> {
    warn!(path = %path.display(), branch, "force reset: destroying workspace");
    if let Err(e) = repo.worktree_remove_force(path) {
        warn!(err = %e, "git worktree remove failed");
    }
    if path.exists()
        && let Err(e) = fs::remove_dir_all(path)
    {
        warn!(err = %e, path = %path.display(), "failed to remove workspace directory");
    }
    if let Err(e) = repo.worktree_prune() {
        warn!(err = %e, "git worktree prune failed");
    }
    if repo.branch_exists(branch)? {
        repo.delete_branch_force(branch)
            .with_context(|| format!("delete branch {branch} for a clean reset"))?;
    }
    Ok(())
}

/// Keep the workspace task list when it targets `branch`; otherwise copy the
/// source over it.
fn reconcile_task_list(source: &Path, target: &Path, branch: &str) -> Result<()> {
    if peek_branch(target).as_deref() == Some(branch) {
        debug!(path = %target.display(), "keeping workspace task list");
        return Ok(());
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::copy(source, target).with_context(|| {
        format!("copy task list {} to {}", source.display(), target.display())
    })?;
    info!(path = %target.display(), "copied task list into workspace");
    Ok(())
}
