//! In-memory task bookkeeping.

pub mod registry;

pub use registry::{TaskRegistry, TaskSnapshot, Transition, TransitionOutcome};
