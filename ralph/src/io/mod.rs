//! Side-effecting adapters: filesystem, git, child processes, agent backends.

pub mod agent;
pub mod config;
pub mod git;
pub mod iteration_log;
pub mod paths;
pub mod process;
pub mod processes;
pub mod prompt;
pub mod registry;
pub mod run_state;
pub mod task_store;
pub mod workspace;
