//! UniStacker task events and per-task event channels.
//!
//! This crate provides the building blocks of the live progress stream:
//!
//! - [`TaskEvent`]: the immutable message emitted during a task's life.
//! - [`TaskChannel`]: bounded single-producer/single-consumer FIFO of
//!   events with a terminal marker.
//! - [`wire`]: the JSON encoding written to streaming clients.

pub mod channel;
pub mod event;
pub mod wire;

pub use channel::{ChannelError, TaskChannel, DEFAULT_CAPACITY};
pub use event::TaskEvent;
