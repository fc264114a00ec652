//! Task list load/save helpers with schema + invariant validation.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde_json::Value;
use tracing::debug;

use crate::core::invariants::validate_invariants;
use crate::error::RalphError;
use crate::task_list::TaskList;

const TASK_LIST_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schemas/task_list.schema.json"
));

/// Load and validate a task list from disk (schema + invariants).
///
/// Every failure here is a configuration problem and is reported as
/// [`RalphError::Configuration`].
pub fn load_task_list(path: &Path) -> Result<TaskList> {
    if !path.is_file() {
        return Err(RalphError::configuration(format!(
            "task list not found at {}",
            path.display()
        ))
        .into());
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read task list {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents).map_err(|err| {
        RalphError::configuration(format!("parse task list {}: {err}", path.display()))
    })?;
    validate_schema(&value).map_err(|err| {
        RalphError::configuration(format!("task list {}: {err}", path.display()))
    })?;
    let list: TaskList = serde_json::from_value(value).map_err(|err| {
        RalphError::configuration(format!("deserialize task list {}: {err}", path.display()))
    })?;
    let errors = validate_invariants(&list);
    if !errors.is_empty() {
        return Err(RalphError::configuration(format!(
            "task list {} invariants failed: {}",
            path.display(),
            errors.join("; ")
        ))
        .into());
    }
    debug!(
        path = %path.display(),
        stories = list.user_stories.len(),
        completed = list.completed_count(),
        "task list loaded"
    );
    Ok(list)
}

/// Load a task list and require a declared branch.
pub fn load_with_branch(path: &Path) -> Result<(TaskList, String)> {
    let list = load_task_list(path)?;
    let branch = list.branch().map(str::to_string).ok_or_else(|| {
        RalphError::configuration(format!(
            "task list {} does not declare branchName",
            path.display()
        ))
    })?;
    Ok((list, branch))
}

/// Read only the declared branch, tolerating any other damage to the document.
///
/// Returns `None` when the file is missing, unparseable, or has no branch.
pub fn peek_branch(path: &Path) -> Option<String> {
    let contents = fs::read_to_string(path).ok()?;
    let value: Value = serde_json::from_str(&contents).ok()?;
    value
        .get("branchName")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(str::to_string)
}

/// Write a task list to disk as pretty JSON with a trailing newline.
pub fn write_task_list(path: &Path, list: &TaskList) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(list).context("serialize task list")?;
    buf.push('\n');
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(path, buf).with_context(|| format!("write task list {}", path.display()))
}

fn validate_schema(value: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(TASK_LIST_SCHEMA).context("parse task list schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(value) {
        let messages = compiled
            .iter_errors(value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!("schema validation failed: {}", messages.join("; ")));
    }
    Ok(())
}
