//! Status values written to a task's event stream.
//!
//! The browser client switches on these strings, so they are part of the
//! public protocol and must not change.

/// Status `data` value sent when a task completes successfully.
pub const STATUS_COMPLETED: &str = "completed";

/// Status `data` value sent when a task fails.
pub const STATUS_ERROR: &str = "error";
