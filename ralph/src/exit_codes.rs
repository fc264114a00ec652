//! Stable exit codes for ralph CLI commands.

/// Run completed, or a management command succeeded.
pub const OK: i32 = 0;
/// The iteration budget ran out with stories still open.
pub const INCOMPLETE: i32 = 1;
/// `status` or `stop` found no running daemon.
pub const NOT_RUNNING: i32 = 1;
/// Fatal error (configuration, filesystem, agent spawn, daemon startup).
pub const ERROR: i32 = 1;
