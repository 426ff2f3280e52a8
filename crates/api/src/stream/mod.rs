//! Live event streaming to HTTP clients.

pub mod publisher;

pub use publisher::{StreamItem, StreamPublisher};
