//! Git adapter for workspace provisioning.
//!
//! Workspaces are git worktrees, so we keep a small, explicit wrapper around
//! the handful of `git` subprocess calls the provisioner needs.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Absolute path of the repository's top-level directory.
    pub fn toplevel(&self) -> Result<PathBuf> {
        let out = self
            .run_capture(&["rev-parse", "--show-toplevel"])
            .with_context(|| format!("{} is not inside a git repository", self.workdir.display()))?;
        Ok(PathBuf::from(out.trim()))
    }

    /// Return the current branch name (errors on detached HEAD).
    #[instrument(skip_all)]
    pub fn current_branch(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let name = out.trim().to_string();
        if name == "HEAD" {
            warn!("detached HEAD detected");
            return Err(anyhow!("detached HEAD (cannot branch from it)"));
        }
        debug!(branch = %name, "current branch");
        Ok(name)
    }

    /// Check whether a local branch exists.
    pub fn branch_exists(&self, branch: &str) -> Result<bool> {
        let status = self
            .run(&[
                "show-ref",
                "--verify",
                "--quiet",
                &format!("refs/heads/{branch}"),
            ])?
            .status;
        Ok(status.success())
    }

    /// Create `branch` at `start_point` without checking it out.
    #[instrument(skip_all, fields(branch, start_point))]
    pub fn create_branch(&self, branch: &str, start_point: &str) -> Result<()> {
        debug!(branch, start_point, "creating branch");
        self.run_checked(&["branch", branch, start_point])?;
        Ok(())
    }

    /// Delete a local branch even if it is not merged.
    #[instrument(skip_all, fields(branch))]
    pub fn delete_branch_force(&self, branch: &str) -> Result<()> {
        debug!(branch, "force-deleting branch");
        self.run_checked(&["branch", "-D", branch])?;
        Ok(())
    }

    /// Check out `branch` into a new worktree at `path`.
    #[instrument(skip_all, fields(path = %path.display(), branch))]
    pub fn worktree_add(&self, path: &Path, branch: &str) -> Result<()> {
        let path_arg = path.to_string_lossy();
        debug!("adding worktree");
        self.run_checked(&["worktree", "add", &path_arg, branch])?;
        Ok(())
    }

    /// Remove a worktree, discarding uncommitted changes.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn worktree_remove_force(&self, path: &Path) -> Result<()> {
        let path_arg = path.to_string_lossy();
        self.run_checked(&["worktree", "remove", "--force", &path_arg])?;
        Ok(())
    }

    /// Drop administrative records of worktrees whose directories are gone.
    pub fn worktree_prune(&self) -> Result<()> {
        self.run_checked(&["worktree", "prune"])?;
        Ok(())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}
