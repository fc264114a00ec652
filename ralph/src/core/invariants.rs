//! Semantic invariants not expressible via JSON Schema.

use std::collections::HashSet;

use crate::task_list::TaskList;

/// Check semantic invariants of a task list:
/// - No duplicate story ids
/// - No empty story ids
pub fn validate_invariants(list: &TaskList) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    for (index, story) in list.user_stories.iter().enumerate() {
        if story.id.trim().is_empty() {
            errors.push(format!("userStories[{index}]: id must not be empty"));
            continue;
        }
        if !seen.insert(story.id.as_str()) {
            errors.push(format!(
                "duplicate story id '{}' at userStories[{index}]",
                story.id
            ));
        }
    }
    errors
}
