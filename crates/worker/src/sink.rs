//! Append-only progress sink handed to automation workers.

use std::sync::Arc;

use unistacker_core::types::TaskId;
use unistacker_events::{TaskChannel, TaskEvent};

/// Write-only handle through which a worker reports progress lines.
///
/// Cheap to clone and safe to use from any task. Every line becomes one
/// log event on the owning task's stream, in call order per clone. Clones
/// blocked on a full buffer all resume once it drains. Lines written after
/// the task finished (or was reaped) are discarded.
#[derive(Clone)]
pub struct LogSink {
    task_id: TaskId,
    channel: Arc<TaskChannel>,
}

impl LogSink {
    pub fn new(task_id: TaskId, channel: Arc<TaskChannel>) -> Self {
        Self { task_id, channel }
    }

    /// Id of the task this sink writes to.
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Append one raw line.
    ///
    /// Waits while the task's buffer is full and a client is attached.
    pub async fn emit(&self, line: impl Into<String>) {
        let line = line.into();
        tracing::debug!(task_id = %self.task_id, line = %line, "Worker progress");
        if let Err(e) = self.channel.send(TaskEvent::Log(line)).await {
            tracing::trace!(task_id = %self.task_id, error = %e, "Progress line discarded");
        }
    }

    /// Append a line formatted as `<timestamp> - INFO - <message>`.
    pub async fn info(&self, message: impl AsRef<str>) {
        self.emit(format_line("INFO", message.as_ref())).await;
    }

    /// Append a line formatted as `<timestamp> - WARNING - <message>`.
    pub async fn warn(&self, message: impl AsRef<str>) {
        self.emit(format_line("WARNING", message.as_ref())).await;
    }

    /// Append a line formatted as `<timestamp> - ERROR - <message>`.
    pub async fn error(&self, message: impl AsRef<str>) {
        self.emit(format_line("ERROR", message.as_ref())).await;
    }
}

fn format_line(level: &str, message: &str) -> String {
    let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    format!("{now} - {level} - {message}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lines_arrive_in_call_order() {
        let channel = Arc::new(TaskChannel::new(16));
        let sink = LogSink::new(TaskId::new(), Arc::clone(&channel));

        sink.emit("first").await;
        sink.info("second").await;

        let mut reader = channel.attach().unwrap();
        assert_eq!(reader.recv().await, Some(TaskEvent::log("first")));
        match reader.recv().await {
            Some(TaskEvent::Log(line)) => assert!(line.ends_with(" - INFO - second")),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn lines_after_finish_are_discarded() {
        let channel = Arc::new(TaskChannel::new(16));
        let sink = LogSink::new(TaskId::new(), Arc::clone(&channel));
        channel.finish(vec![TaskEvent::completed()]).unwrap();

        sink.emit("too late").await;

        let mut reader = channel.attach().unwrap();
        assert_eq!(reader.recv().await, Some(TaskEvent::completed()));
        assert_eq!(reader.recv().await, None);
    }
}
