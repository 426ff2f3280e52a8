//! UniStacker domain types.
//!
//! Pure building blocks shared by the event, worker and API crates:
//! task identifiers, the task state machine, submission validation and
//! the wire message constants. Nothing in here performs I/O.

pub mod error;
pub mod stream_events;
pub mod submission;
pub mod task;
pub mod types;
