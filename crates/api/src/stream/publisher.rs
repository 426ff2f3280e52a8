//! Attach a streaming client to a task and relay its events.
//!
//! A stream yields buffered and live events in order, a keepalive after
//! every idle period, and ends right after the terminal status. The task
//! is reaped once the terminal status has been handed to the client. A
//! client that drops right after receiving it leaves a finished task that
//! the retention sweep removes. A client that goes away earlier only
//! releases its attachment: the job keeps running and the next client
//! picks up where this one stopped.

use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use unistacker_core::error::CoreError;
use unistacker_core::types::TaskId;
use unistacker_events::TaskEvent;

use crate::tasks::TaskRegistry;

/// Message relayed when a task's channel disappears before its terminal
/// status was read.
pub const STREAM_UNAVAILABLE: &str = "Log stream unavailable.";

/// One item of a task stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Event(TaskEvent),
    /// Nothing happened for a full idle period.
    KeepAlive,
}

/// Serves task event streams.
pub struct StreamPublisher {
    registry: Arc<TaskRegistry>,
    idle: Duration,
}

impl StreamPublisher {
    pub fn new(registry: Arc<TaskRegistry>, idle: Duration) -> Self {
        Self { registry, idle }
    }

    /// Attach to `task_id` and return its event stream.
    ///
    /// Fails up front with [`CoreError::NotFound`] for unknown or reaped
    /// tasks and [`CoreError::Conflict`] if another client is attached.
    pub async fn serve(
        &self,
        task_id: TaskId,
    ) -> Result<impl Stream<Item = StreamItem> + Send + 'static, CoreError> {
        let mut reader = self.registry.attach(task_id).await?;
        let registry = Arc::clone(&self.registry);
        let idle = self.idle;
        tracing::info!(task_id = %task_id, "Client attached to task stream");

        Ok(async_stream::stream! {
            let mut guard = AttachGuard { task_id, ended: false };
            loop {
                match tokio::time::timeout(idle, reader.recv()).await {
                    Err(_) => yield StreamItem::KeepAlive,
                    Ok(Some(event)) if event.is_terminal() => {
                        guard.ended = true;
                        yield StreamItem::Event(event);
                        registry.reap(task_id).await;
                        tracing::info!(task_id = %task_id, "Terminal event delivered, task reaped");
                        break;
                    }
                    Ok(Some(event)) => yield StreamItem::Event(event),
                    Ok(None) => {
                        guard.ended = true;
                        tracing::warn!(task_id = %task_id, "Task channel closed before its terminal event");
                        yield StreamItem::Event(TaskEvent::StreamError(STREAM_UNAVAILABLE.to_string()));
                        break;
                    }
                }
            }
        })
    }
}

/// Logs clients that leave before the stream ended.
struct AttachGuard {
    task_id: TaskId,
    ended: bool,
}

impl Drop for AttachGuard {
    fn drop(&mut self) {
        if !self.ended {
            tracing::info!(task_id = %self.task_id, "Client disconnected, task keeps running");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
