//! Task lifecycle state machine.
//!
//! A task moves `Pending -> Running -> Completed | Failed`. A task may also
//! fail straight from `Pending` (it never got a worker). Terminal states are
//! final: nothing transitions out of `Completed` or `Failed`.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Lifecycle state of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskState {
    /// Whether no further transitions are possible from this state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Lower-case name used in logs and API payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether moving from `self` to `next` is a legal forward step.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Failed)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }

    /// Validate a transition, returning a [`CoreError::Conflict`] describing
    /// the rejected step.
    pub fn validate_transition(self, next: TaskState) -> Result<(), CoreError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(CoreError::Conflict(format!(
                "Cannot transition task from {} to {}",
                self.as_str(),
                next.as_str()
            )))
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn forward_steps_are_allowed() {
        assert!(TaskState::Pending.can_transition_to(TaskState::Running));
        assert!(TaskState::Running.can_transition_to(TaskState::Completed));
        assert!(TaskState::Running.can_transition_to(TaskState::Failed));
        assert!(TaskState::Pending.can_transition_to(TaskState::Failed));
    }

    #[test]
    fn pending_cannot_complete_without_running() {
        assert!(!TaskState::Pending.can_transition_to(TaskState::Completed));
    }

    #[test]
    fn terminal_states_are_final() {
        for terminal in [TaskState::Completed, TaskState::Failed] {
            assert!(terminal.is_terminal());
            for next in [
                TaskState::Pending,
                TaskState::Running,
                TaskState::Completed,
                TaskState::Failed,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn backwards_step_is_a_conflict() {
        assert_matches!(
            TaskState::Running.validate_transition(TaskState::Pending),
            Err(CoreError::Conflict(msg)) if msg.contains("running to pending")
        );
    }

    #[test]
    fn serializes_as_snake_case() {
        let json = serde_json::to_string(&TaskState::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
    }
}
