//! Deterministic story selection.

use crate::task_list::{Story, TaskList};

/// Find the first story in document order with `passes=false`.
///
/// Returns `None` if every story passes (task list is complete).
pub fn first_open_story(list: &TaskList) -> Option<&Story> {
    list.user_stories.iter().find(|story| !story.passes)
}

/// Open story with the lowest declared priority, ties broken by document order.
///
/// Only used to flag when document order and priority disagree.
pub fn lowest_priority_open_story(list: &TaskList) -> Option<&Story> {
    list.user_stories
        .iter()
        .filter(|story| !story.passes)
        .fold(None, |best: Option<&Story>, story| match best {
            Some(current) if current.priority <= story.priority => Some(current),
            _ => Some(story),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{story, story_with_priority, task_list};

    #[test]
    fn selects_first_open_story_in_document_order() {
        let list = task_list(
            "ralph/demo",
            vec![
                story("US-1", true),
                story_with_priority("US-2", 5.0, false),
                story_with_priority("US-3", 1.0, false),
            ],
        );

        let selected = first_open_story(&list).expect("open story");
        assert_eq!(selected.id, "US-2");
    }

    #[test]
    fn returns_none_when_all_pass() {
        let list = task_list("ralph/demo", vec![story("US-1", true), story("US-2", true)]);
        assert!(first_open_story(&list).is_none());
    }

    #[test]
    fn priority_pick_ignores_document_order() {
        let list = task_list(
            "ralph/demo",
            vec![
                story_with_priority("US-1", 3.0, false),
                story_with_priority("US-2", 1.0, false),
                story_with_priority("US-3", 1.0, false),
            ],
        );

        let selected = lowest_priority_open_story(&list).expect("open story");
        assert_eq!(selected.id, "US-2");
    }
}
