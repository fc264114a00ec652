//! Shared deterministic types for the iteration engine.

use std::fmt;

/// What a single iteration is pointed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// An open story selected in document order.
    Story { id: String, title: String },
    /// No open story remained at selection time; the pass only tidies up.
    Cleanup,
}

impl Target {
    /// Label used in log file names and console output.
    pub fn label(&self) -> &str {
        match self {
            Target::Story { id, .. } => id,
            Target::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Story { id, title } if title.is_empty() => write!(f, "{id}"),
            Target::Story { id, title } => write!(f, "{id} ({title})"),
            Target::Cleanup => f.write_str("cleanup"),
        }
    }
}

/// Decision taken after verifying the task list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Stories remain and the iteration budget allows another pass.
    Continue,
    /// Every story passes.
    Complete,
    /// Stories remain but the iteration budget is spent.
    Exhausted,
}

/// Decide the next transition from a fresh incomplete count.
///
/// `iter` is 1-indexed; `max_iterations` is the configured ceiling.
pub fn judge(incomplete: usize, iter: u32, max_iterations: u32) -> Verdict {
    if incomplete == 0 {
        Verdict::Complete
    } else if iter < max_iterations {
        Verdict::Continue
    } else {
        Verdict::Exhausted
    }
}
