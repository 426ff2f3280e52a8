use async_trait::async_trait;
use unistacker_core::submission::ScrapeRequest;

use crate::sink::LogSink;

/// Failure of an automation run.
///
/// The `Display` output becomes the cause reported to the client, so it
/// should read as a sentence about what went wrong.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The automation driver could not be launched or reported a failure.
    #[error("{0}")]
    Driver(String),

    /// The driver produced output that is not a JSON document.
    #[error("Driver returned invalid JSON: {0}")]
    InvalidOutput(#[from] serde_json::Error),

    /// Communicating with the driver process failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other failure raised by the worker.
    #[error("{0}")]
    Failed(String),
}

/// A long-running, fallible automation job.
///
/// Implementations call `sink` zero or more times with progress lines and
/// eventually return the structured result or an error. They must not
/// assume anything about who reads the sink.
#[async_trait]
pub trait AutomationWorker: Send + Sync {
    async fn run(
        &self,
        request: ScrapeRequest,
        sink: LogSink,
    ) -> Result<serde_json::Value, WorkerError>;
}
