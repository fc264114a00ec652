//! Canonical paths of a working root.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Default task list file name.
pub const TASK_LIST_FILE: &str = "prd.json";
/// Default progress log file name.
pub const PROGRESS_FILE: &str = "progress.txt";

/// All canonical paths for a working root (source dir or workspace).
///
/// The task list and progress log sit at the root so the agent can find them
/// without knowing about `.ralph/`.
#[derive(Debug, Clone)]
pub struct RalphPaths {
    pub root: PathBuf,
    pub ralph_dir: PathBuf,
    pub task_list_path: PathBuf,
    pub progress_path: PathBuf,
    pub config_path: PathBuf,
    pub last_branch_path: PathBuf,
    pub logs_dir: PathBuf,
    pub archive_dir: PathBuf,
}

impl RalphPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_task_list(root, TASK_LIST_FILE)
    }

    /// Paths for a root whose task list uses a non-default file name.
    pub fn with_task_list(root: impl Into<PathBuf>, task_list_file: impl AsRef<Path>) -> Self {
        let root = root.into();
        let ralph_dir = root.join(".ralph");
        Self {
            task_list_path: root.join(task_list_file),
            progress_path: root.join(PROGRESS_FILE),
            config_path: ralph_dir.join("config.toml"),
            last_branch_path: ralph_dir.join("last-branch"),
            logs_dir: ralph_dir.join("logs"),
            archive_dir: ralph_dir.join("archive"),
            ralph_dir,
            root,
        }
    }

    /// Derive paths from a task list location (its parent is the root).
    pub fn for_task_list(task_list_path: &Path) -> Self {
        let root = task_list_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let file = task_list_path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(TASK_LIST_FILE));
        Self::with_task_list(root, file)
    }

    /// Log file for the detached daemon of `key`.
    pub fn daemon_log_path(&self, key: &str) -> PathBuf {
        self.ralph_dir.join(format!("daemon-{key}.log"))
    }

    /// Task list file name relative to the root.
    pub fn task_list_file_name(&self) -> PathBuf {
        self.task_list_path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(TASK_LIST_FILE))
    }
}

pub(crate) fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

/// Atomically write `contents` to `path` (temp file + rename).
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    create_dir(parent)?;
    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_stable() {
        let paths = RalphPaths::new("/work/app");

        assert_eq!(paths.task_list_path, PathBuf::from("/work/app/prd.json"));
        assert_eq!(paths.progress_path, PathBuf::from("/work/app/progress.txt"));
        assert_eq!(
            paths.last_branch_path,
            PathBuf::from("/work/app/.ralph/last-branch")
        );
        assert!(paths.logs_dir.ends_with(".ralph/logs"));
        assert!(paths.archive_dir.ends_with(".ralph/archive"));
        assert!(paths.config_path.ends_with(".ralph/config.toml"));
    }

    #[test]
    fn for_task_list_uses_parent_as_root() {
        let paths = RalphPaths::for_task_list(Path::new("/work/app/plans/feature.json"));
        assert_eq!(paths.root, PathBuf::from("/work/app/plans"));
        assert_eq!(paths.task_list_file_name(), PathBuf::from("feature.json"));

        let bare = RalphPaths::for_task_list(Path::new("prd.json"));
        assert_eq!(bare.root, PathBuf::from("."));
    }

    #[test]
    fn write_atomic_replaces_contents() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("marker");

        write_atomic(&path, "one\n").expect("first write");
        write_atomic(&path, "two\n").expect("second write");

        assert_eq!(fs::read_to_string(&path).expect("read"), "two\n");
        assert!(!temp.path().join("nested").join("marker.tmp").exists());
    }
}
