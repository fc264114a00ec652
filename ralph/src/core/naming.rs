//! Filesystem-safe names derived from project and branch identifiers.
//!
//! Every function here is pure: identical inputs always yield identical
//! outputs, which is what keeps workspace paths and registry keys stable
//! across invocations.

use std::path::{Path, PathBuf};

/// Separator between the project and branch halves of a registry key.
pub const KEY_SEPARATOR: &str = "__";

/// Replace everything outside `[A-Za-z0-9._-]` with `-`.
///
/// Empty input maps to `unnamed` so a key never collapses to nothing.
pub fn sanitize(input: &str) -> String {
    let cleaned: String = input
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

/// Registry key for a (project, branch) pair.
pub fn registry_key(project: &str, branch: &str) -> String {
    format!("{}{KEY_SEPARATOR}{}", sanitize(project), sanitize(branch))
}

/// Directory name of the workspace bound to (project, branch).
pub fn workspace_dir_name(project: &str, branch: &str) -> String {
    format!("{}-{}", sanitize(project), sanitize(branch))
}

/// Absolute workspace location under `base`.
pub fn workspace_path(base: &Path, project: &str, branch: &str) -> PathBuf {
    base.join(workspace_dir_name(project, branch))
}

/// Archive folder label for a previous branch (`ralph/` prefix dropped).
pub fn archive_label(branch: &str) -> String {
    let trimmed = branch.trim();
    sanitize(trimmed.strip_prefix("ralph/").unwrap_or(trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize("ralph/feature x"), "ralph-feature-x");
        assert_eq!(sanitize("v1.2_rc-3"), "v1.2_rc-3");
        assert_eq!(sanitize("  "), "unnamed");
    }

    #[test]
    fn registry_key_joins_sanitized_parts() {
        assert_eq!(
            registry_key("My App", "ralph/login"),
            "My-App__ralph-login"
        );
    }

    #[test]
    fn workspace_path_is_deterministic() {
        let base = Path::new("/work/repo-ralph-workspaces");
        let first = workspace_path(base, "shop", "ralph/cart");
        let second = workspace_path(base, "shop", "ralph/cart");
        assert_eq!(first, second);
        assert_eq!(
            first,
            PathBuf::from("/work/repo-ralph-workspaces/shop-ralph-cart")
        );
        assert_ne!(first, workspace_path(base, "shop", "ralph/checkout"));
    }

    #[test]
    fn archive_label_strips_ralph_prefix() {
        assert_eq!(archive_label("ralph/task-priority"), "task-priority");
        assert_eq!(archive_label("feature/x"), "feature-x");
    }
}
