//! Events produced during a task's lifetime.

use unistacker_core::task::TaskState;

/// One discrete message emitted while a task runs.
///
/// Events are immutable once created. Within a task they are delivered in
/// emission order; there is no ordering across tasks.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    /// A single line of worker progress output.
    Log(String),

    /// A task state change, with an optional human-readable detail.
    Status {
        state: TaskState,
        message: Option<String>,
    },

    /// The structured result of a successful task.
    Result(serde_json::Value),

    /// A transport-level failure of the stream itself.
    StreamError(String),
}

impl TaskEvent {
    /// Build a log event from anything string-like.
    pub fn log(line: impl Into<String>) -> Self {
        Self::Log(line.into())
    }

    /// The status event closing a successful task.
    pub fn completed() -> Self {
        Self::Status {
            state: TaskState::Completed,
            message: None,
        }
    }

    /// The status event closing a failed task.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Status {
            state: TaskState::Failed,
            message: Some(message.into()),
        }
    }

    /// Whether this event ends the task's stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Status { state, .. } if state.is_terminal())
    }

    /// Whether this event may be discarded under log backpressure.
    pub fn is_droppable(&self) -> bool {
        matches!(self, Self::Log(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_terminal_status_is_terminal() {
        assert!(TaskEvent::completed().is_terminal());
        assert!(TaskEvent::failed("boom").is_terminal());
        assert!(!TaskEvent::log("hello").is_terminal());
        assert!(!TaskEvent::Result(serde_json::json!({})).is_terminal());
        assert!(!TaskEvent::Status {
            state: TaskState::Running,
            message: None
        }
        .is_terminal());
    }

    #[test]
    fn only_logs_are_droppable() {
        assert!(TaskEvent::log("x").is_droppable());
        assert!(!TaskEvent::completed().is_droppable());
        assert!(!TaskEvent::Result(serde_json::Value::Null).is_droppable());
    }
}
