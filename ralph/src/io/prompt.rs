//! Prompt rendering for agent invocations.
//!
//! Both payloads are fixed templates; only paths and the selected story vary,
//! so the agent always receives the same instructions for the same state.

use std::path::Path;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;

use crate::task_list::{Story, TaskList};

const ITERATION_TEMPLATE: &str = include_str!("prompts/iteration.md");
const RETROSPECTIVE_TEMPLATE: &str = include_str!("prompts/retrospective.md");

/// Story fields exposed to templates.
#[derive(Debug, Clone, Serialize)]
struct StoryContext {
    id: String,
    title: String,
    description: String,
    acceptance_criteria: Vec<String>,
}

impl StoryContext {
    fn from_story(story: &Story) -> Self {
        Self {
            id: story.id.clone(),
            title: story.title.clone(),
            description: story.description.trim().to_string(),
            acceptance_criteria: story.acceptance_criteria.clone(),
        }
    }
}

/// Inputs shared by both payloads.
#[derive(Debug, Clone)]
pub struct PromptInputs<'a> {
    pub list: &'a TaskList,
    pub branch: &'a str,
    pub task_list_file: &'a Path,
    pub progress_file: &'a Path,
}

fn environment() -> Result<Environment<'static>> {
    let mut env = Environment::new();
    env.add_template("iteration", ITERATION_TEMPLATE)
        .context("load iteration template")?;
    env.add_template("retrospective", RETROSPECTIVE_TEMPLATE)
        .context("load retrospective template")?;
    Ok(env)
}

/// Render the per-iteration payload. `story` is `None` on a cleanup pass.
pub fn render_iteration(inputs: &PromptInputs<'_>, story: Option<&Story>) -> Result<String> {
    let env = environment()?;
    let template = env.get_template("iteration")?;
    let rendered = template
        .render(context! {
            project => inputs.list.project.as_str(),
            branch => inputs.branch,
            task_list => inputs.task_list_file.display().to_string(),
            progress => inputs.progress_file.display().to_string(),
            story => story.map(StoryContext::from_story),
        })
        .context("render iteration prompt")?;
    Ok(rendered)
}

/// Render the retrospective payload for a finished run.
pub fn render_retrospective(
    inputs: &PromptInputs<'_>,
    complete: bool,
    report_file: &str,
) -> Result<String> {
    let env = environment()?;
    let template = env.get_template("retrospective")?;
    let open_stories: Vec<StoryContext> = inputs
        .list
        .user_stories
        .iter()
        .filter(|story| !story.passes)
        .map(StoryContext::from_story)
        .collect();
    let rendered = template
        .render(context! {
            project => inputs.list.project.as_str(),
            branch => inputs.branch,
            task_list => inputs.task_list_file.display().to_string(),
            progress => inputs.progress_file.display().to_string(),
            report_file => report_file,
            complete => complete,
            total => inputs.list.user_stories.len(),
            completed => inputs.list.completed_count(),
            open_stories => open_stories,
        })
        .context("render retrospective prompt")?;
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{story, task_list};

    fn inputs(list: &TaskList) -> PromptInputs<'_> {
        PromptInputs {
            list,
            branch: "ralph/demo",
            task_list_file: Path::new("prd.json"),
            progress_file: Path::new("progress.txt"),
        }
    }

    #[test]
    fn iteration_prompt_names_selected_story() {
        let mut selected = story("US-2", false);
        selected.acceptance_criteria = vec!["Typecheck passes".to_string()];
        let list = task_list("ralph/demo", vec![story("US-1", true), selected.clone()]);

        let prompt = render_iteration(&inputs(&list), Some(&selected)).expect("render");
        assert!(prompt.contains("US-2: US-2 title"));
        assert!(prompt.contains("- Typecheck passes"));
        assert!(prompt.contains("`prd.json`"));
        assert!(prompt.contains("ralph/demo"));
    }

    #[test]
    fn iteration_prompt_for_cleanup_has_no_story() {
        let list = task_list("ralph/demo", vec![story("US-1", true)]);
        let prompt = render_iteration(&inputs(&list), None).expect("render");
        assert!(prompt.contains("already marked as passing"));
        assert!(!prompt.contains("Work on exactly one story"));
    }

    #[test]
    fn retrospective_prompt_lists_open_stories_when_exhausted() {
        let list = task_list("ralph/demo", vec![story("US-1", true), story("US-2", false)]);
        let prompt =
            render_retrospective(&inputs(&list), false, "RETROSPECTIVE.md").expect("render");
        assert!(prompt.contains("1 of 2 stories pass"));
        assert!(prompt.contains("- US-2: US-2 title"));
        assert!(prompt.contains("`RETROSPECTIVE.md`"));
    }

    #[test]
    fn retrospective_prompt_for_complete_run() {
        let list = task_list("ralph/demo", vec![story("US-1", true)]);
        let prompt = render_retrospective(&inputs(&list), true, "REPORT.md").expect("render");
        assert!(prompt.contains("all 1 stories pass"));
        assert!(!prompt.contains("Stories still open"));
    }
}
