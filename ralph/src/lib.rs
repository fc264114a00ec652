//! Supervisor that drives an AI coding agent through a JSON task list.
//!
//! One agent invocation works on one story; the task list (`prd.json`) is the
//! only record of progress, so a run can stop and resume at any point. The
//! crate keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (selection, verdicts, naming).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (filesystem, git, processes, agent
//!   backends, daemon registry). Behind traits where tests need fakes.
//!
//! Orchestration modules ([`prepare`], [`looping`], [`daemon`]) coordinate
//! core logic with I/O to implement CLI commands.

pub mod core;
pub mod daemon;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod prepare;
pub mod task_list;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
