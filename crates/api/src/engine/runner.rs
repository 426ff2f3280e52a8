//! Background execution of automation jobs.
//!
//! Each launched job runs in its own tokio task: it waits for a worker
//! slot, moves the task to `Running`, runs the [`AutomationWorker`] under
//! the job timeout and reports exactly one terminal transition back to the
//! [`TaskRegistry`]. The worker itself runs in a nested task so a panic
//! surfaces as a `JoinError` instead of tearing down the runner.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, TryAcquireError};
use tokio::task::{JoinError, JoinHandle};
use tracing::Instrument;
use unistacker_core::error::CoreError;
use unistacker_core::submission::ScrapeRequest;
use unistacker_core::types::TaskId;
use unistacker_worker::{AutomationWorker, LogSink};

use crate::tasks::{TaskRegistry, Transition, TransitionOutcome};

/// Launches automation workers, at most `max_concurrent` at a time.
pub struct JobRunner {
    registry: Arc<TaskRegistry>,
    worker: Arc<dyn AutomationWorker>,
    permits: Arc<Semaphore>,
    job_timeout: Duration,
}

impl JobRunner {
    pub fn new(
        registry: Arc<TaskRegistry>,
        worker: Arc<dyn AutomationWorker>,
        max_concurrent: usize,
        job_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            worker,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            job_timeout,
        }
    }

    /// Number of worker slots currently free.
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }

    /// Start the job for an existing `Pending` task and return immediately.
    ///
    /// The returned handle resolves once the task reached a terminal state.
    /// Dropping it detaches the job.
    pub async fn launch(
        &self,
        task_id: TaskId,
        request: ScrapeRequest,
    ) -> Result<JoinHandle<()>, CoreError> {
        let channel = self.registry.channel(task_id).await?;
        let job = Job {
            task_id,
            registry: Arc::clone(&self.registry),
            worker: Arc::clone(&self.worker),
            permits: Arc::clone(&self.permits),
            job_timeout: self.job_timeout,
            sink: LogSink::new(task_id, channel),
        };

        let span = tracing::info_span!("job", task_id = %task_id);
        Ok(tokio::spawn(job.run(request).instrument(span)))
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

struct Job {
    task_id: TaskId,
    registry: Arc<TaskRegistry>,
    worker: Arc<dyn AutomationWorker>,
    permits: Arc<Semaphore>,
    job_timeout: Duration,
    sink: LogSink,
}

impl Job {
    async fn run(self, request: ScrapeRequest) {
        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => Ok(permit),
            Err(TryAcquireError::NoPermits) => {
                tracing::info!("All worker slots busy, job queued");
                self.sink
                    .info("Waiting for a free worker slot...")
                    .await;
                Arc::clone(&self.permits).acquire_owned().await.map_err(|_| ())
            }
            Err(TryAcquireError::Closed) => Err(()),
        };
        let Ok(_permit) = permit else {
            self.finish(Transition::Fail("Worker pool is shut down".to_string()))
                .await;
            return;
        };

        match self.registry.transition(self.task_id, Transition::Start).await {
            Ok(TransitionOutcome::Applied) => {}
            Ok(TransitionOutcome::Ignored) => return,
            Err(e) => {
                tracing::warn!(error = %e, "Task vanished before its job started");
                return;
            }
        }

        let worker = Arc::clone(&self.worker);
        let sink = self.sink.clone();
        let mut handle = tokio::spawn(async move { worker.run(request, sink).await });

        let outcome = match tokio::time::timeout(self.job_timeout, &mut handle).await {
            Ok(Ok(Ok(result))) => Transition::Complete(result),
            Ok(Ok(Err(e))) => Transition::Fail(non_empty(e.to_string())),
            Ok(Err(join_error)) => Transition::Fail(join_failure(join_error)),
            Err(_) => {
                handle.abort();
                Transition::Fail(format!(
                    "Job timed out after {} seconds",
                    self.job_timeout.as_secs()
                ))
            }
        };

        if let Transition::Fail(cause) = &outcome {
            tracing::warn!(cause = %cause, "Job failed");
        }
        self.finish(outcome).await;
    }

    async fn finish(&self, outcome: Transition) {
        match self.registry.transition(self.task_id, outcome).await {
            Ok(TransitionOutcome::Applied) => {}
            Ok(TransitionOutcome::Ignored) => {
                tracing::debug!("Terminal transition ignored, task already finished");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not record job outcome");
            }
        }
    }
}

fn non_empty(cause: String) -> String {
    if cause.trim().is_empty() {
        "Worker failed without an error message".to_string()
    } else {
        cause
    }
}

fn join_failure(error: JoinError) -> String {
    if error.is_cancelled() {
        return "Worker was cancelled".to_string();
    }
    match panic_message(error.into_panic()) {
        Some(msg) => format!("Worker panicked: {msg}"),
        None => "Worker panicked".to_string(),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> Option<String> {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use unistacker_core::task::TaskState;
    use unistacker_events::channel::ChannelReader;
    use unistacker_events::TaskEvent;
    use unistacker_worker::WorkerError;

    use super::*;

    enum Behaviour {
        Succeed(Value),
        Fail(&'static str),
        Panic,
        Hang,
    }

    struct FakeWorker(Behaviour);

    #[async_trait]
    impl AutomationWorker for FakeWorker {
        async fn run(&self, _request: ScrapeRequest, sink: LogSink) -> Result<Value, WorkerError> {
            sink.emit("line1").await;
            match &self.0 {
                Behaviour::Succeed(value) => Ok(value.clone()),
                Behaviour::Fail(msg) => Err(WorkerError::Failed(msg.to_string())),
                Behaviour::Panic => panic!("driver exploded"),
                Behaviour::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }
    }

    fn request() -> ScrapeRequest {
        ScrapeRequest {
            username: "u".to_string(),
            password: "p".to_string(),
            captcha_api_key: "k".to_string(),
            discord_webhook: None,
        }
    }

    async fn run_to_end(behaviour: Behaviour, timeout: Duration) -> (TaskState, Vec<TaskEvent>) {
        let registry = Arc::new(TaskRegistry::new(64));
        let runner = JobRunner::new(
            Arc::clone(&registry),
            Arc::new(FakeWorker(behaviour)),
            2,
            timeout,
        );
        let id = registry.create_task().await;
        runner.launch(id, request()).await.unwrap().await.unwrap();

        let state = registry.snapshot(id).await.unwrap().state;
        let mut reader = registry.attach(id).await.unwrap();
        (state, drain(&mut reader).await)
    }

    async fn drain(reader: &mut ChannelReader) -> Vec<TaskEvent> {
        let mut events = Vec::new();
        while let Some(event) = reader.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn success_ends_with_result_and_completed() {
        let (state, events) = run_to_end(
            Behaviour::Succeed(json!({"courses": []})),
            Duration::from_secs(5),
        )
        .await;

        assert_eq!(state, TaskState::Completed);
        assert_eq!(
            events,
            vec![
                TaskEvent::log("line1"),
                TaskEvent::Result(json!({"courses": []})),
                TaskEvent::completed(),
            ]
        );
    }

    #[tokio::test]
    async fn worker_error_becomes_failed_status() {
        let (state, events) =
            run_to_end(Behaviour::Fail("login failed"), Duration::from_secs(5)).await;

        assert_eq!(state, TaskState::Failed);
        assert_eq!(
            events,
            vec![TaskEvent::log("line1"), TaskEvent::failed("login failed")]
        );
    }

    #[tokio::test]
    async fn empty_error_message_is_replaced() {
        let (_, events) = run_to_end(Behaviour::Fail("  "), Duration::from_secs(5)).await;
        assert_eq!(
            events.last(),
            Some(&TaskEvent::failed("Worker failed without an error message"))
        );
    }

    #[tokio::test]
    async fn panic_is_contained() {
        let (state, events) = run_to_end(Behaviour::Panic, Duration::from_secs(5)).await;

        assert_eq!(state, TaskState::Failed);
        assert_eq!(
            events.last(),
            Some(&TaskEvent::failed("Worker panicked: driver exploded"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_fails_the_task() {
        let (state, events) = run_to_end(Behaviour::Hang, Duration::from_secs(30)).await;

        assert_eq!(state, TaskState::Failed);
        assert_eq!(
            events.last(),
            Some(&TaskEvent::failed("Job timed out after 30 seconds"))
        );
    }

    struct GatedWorker {
        running: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        gate: Arc<tokio::sync::Notify>,
    }

    #[async_trait]
    impl AutomationWorker for GatedWorker {
        async fn run(&self, _request: ScrapeRequest, _sink: LogSink) -> Result<Value, WorkerError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.gate.notified().await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn concurrency_is_bounded_and_excess_jobs_wait_pending() {
        let registry = Arc::new(TaskRegistry::new(64));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(tokio::sync::Notify::new());
        let runner = JobRunner::new(
            Arc::clone(&registry),
            Arc::new(GatedWorker {
                running: Arc::clone(&running),
                peak: Arc::clone(&peak),
                gate: Arc::clone(&gate),
            }),
            2,
            Duration::from_secs(60),
        );

        let mut ids = Vec::new();
        let mut handles = Vec::new();
        for _ in 0..4 {
            let id = registry.create_task().await;
            handles.push(runner.launch(id, request()).await.unwrap());
            ids.push(id);
        }

        while running.load(Ordering::SeqCst) < 2 {
            tokio::task::yield_now().await;
        }
        assert_eq!(runner.available_slots(), 0);

        let mut pending = 0;
        for id in &ids {
            if registry.snapshot(*id).await.unwrap().state == TaskState::Pending {
                pending += 1;
            }
        }
        assert_eq!(pending, 2);

        // Release workers until every job has finished.
        let all_done = async {
            for handle in handles {
                handle.await.unwrap();
            }
        };
        tokio::pin!(all_done);
        loop {
            gate.notify_waiters();
            tokio::select! {
                () = &mut all_done => break,
                () = tokio::time::sleep(Duration::from_millis(10)) => {}
            }
        }

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        for id in ids {
            assert_eq!(registry.snapshot(id).await.unwrap().state, TaskState::Completed);
        }
    }
}
