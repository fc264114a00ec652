//! Task list document (`prd.json`).
//!
//! The task list is the single source of truth for progress. The supervisor only
//! ever reads it; `passes` flips are made by the agent.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskList {
    #[serde(default)]
    pub project: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub user_stories: Vec<Story>,
    /// Fields ralph does not interpret, kept so a rewrite is lossless.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub priority: f64,
    #[serde(default)]
    pub passes: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskList {
    /// Declared branch, treating an empty or whitespace value as absent.
    pub fn branch(&self) -> Option<&str> {
        self.branch_name
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
    }

    /// Number of stories with `passes == true`.
    pub fn completed_count(&self) -> usize {
        self.user_stories.iter().filter(|s| s.passes).count()
    }

    /// Number of stories still open.
    pub fn incomplete_count(&self) -> usize {
        self.user_stories.len() - self.completed_count()
    }

    pub fn story(&self, id: &str) -> Option<&Story> {
        self.user_stories.iter().find(|s| s.id == id)
    }
}
