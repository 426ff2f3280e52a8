//! JSON encoding of task events for streaming clients.
//!
//! Each event becomes one JSON object with a `type` discriminant:
//!
//! ```text
//! {"type":"log","data":"<line>"}
//! {"type":"status","data":"completed"}
//! {"type":"status","data":"error","message":"<cause>"}
//! {"type":"results","data":<result>}
//! {"type":"error","message":"<transport failure>"}
//! ```

use serde::Serialize;
use unistacker_core::stream_events::{STATUS_COMPLETED, STATUS_ERROR};
use unistacker_core::task::TaskState;

use crate::event::TaskEvent;

/// Borrowed wire representation of a [`TaskEvent`].
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireEvent<'a> {
    Log {
        data: &'a str,
    },
    Status {
        data: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<&'a str>,
    },
    Results {
        data: &'a serde_json::Value,
    },
    Error {
        message: &'a str,
    },
}

impl<'a> From<&'a TaskEvent> for WireEvent<'a> {
    fn from(event: &'a TaskEvent) -> Self {
        match event {
            TaskEvent::Log(line) => WireEvent::Log { data: line },
            TaskEvent::Status { state, message } => WireEvent::Status {
                data: status_name(*state),
                message: message.as_deref(),
            },
            TaskEvent::Result(value) => WireEvent::Results { data: value },
            TaskEvent::StreamError(message) => WireEvent::Error { message },
        }
    }
}

fn status_name(state: TaskState) -> &'static str {
    match state {
        TaskState::Completed => STATUS_COMPLETED,
        TaskState::Failed => STATUS_ERROR,
        other => other.as_str(),
    }
}

/// Serialize an event into its single-line JSON wire form.
pub fn encode(event: &TaskEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(&WireEvent::from(event))
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    fn wire(event: TaskEvent) -> Value {
        serde_json::from_str(&encode(&event).unwrap()).unwrap()
    }

    #[test]
    fn log_line() {
        assert_eq!(
            wire(TaskEvent::log("line1")),
            json!({"type": "log", "data": "line1"})
        );
    }

    #[test]
    fn completed_status_has_no_message() {
        assert_eq!(
            wire(TaskEvent::completed()),
            json!({"type": "status", "data": "completed"})
        );
    }

    #[test]
    fn failed_status_is_reported_as_error_with_message() {
        assert_eq!(
            wire(TaskEvent::failed("login failed")),
            json!({"type": "status", "data": "error", "message": "login failed"})
        );
    }

    #[test]
    fn results_carry_the_payload_verbatim() {
        assert_eq!(
            wire(TaskEvent::Result(json!({"courses": []}))),
            json!({"type": "results", "data": {"courses": []}})
        );
    }

    #[test]
    fn stream_error() {
        assert_eq!(
            wire(TaskEvent::StreamError("Log stream unavailable.".into())),
            json!({"type": "error", "message": "Log stream unavailable."})
        );
    }

    #[test]
    fn encoded_events_fit_on_one_line() {
        let encoded = encode(&TaskEvent::log("multi\nline")).unwrap();
        assert!(!encoded.contains('\n'));
    }
}
