//! Process-wide map of live tasks.
//!
//! [`TaskRegistry`] owns every task record and its [`TaskChannel`]. It is
//! the only place task state changes: the job runner requests transitions,
//! the stream publisher attaches readers and reaps finished tasks, and the
//! retention sweep reaps tasks nobody came back for.
//!
//! Entering a terminal state and enqueueing the terminal event batch happen
//! under the same write lock, so a task's stream always ends with exactly
//! one terminal event.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::Instant;
use unistacker_core::error::CoreError;
use unistacker_core::task::TaskState;
use unistacker_core::types::{TaskId, Timestamp};
use unistacker_events::channel::ChannelReader;
use unistacker_events::{ChannelError, TaskChannel, TaskEvent};

/// A requested state change.
#[derive(Debug, Clone)]
pub enum Transition {
    /// `Pending -> Running`.
    Start,
    /// `Running -> Completed` with the worker's result.
    Complete(serde_json::Value),
    /// `Pending | Running -> Failed` with a human-readable cause.
    Fail(String),
}

impl Transition {
    fn target(&self) -> TaskState {
        match self {
            Transition::Start => TaskState::Running,
            Transition::Complete(_) => TaskState::Completed,
            Transition::Fail(_) => TaskState::Failed,
        }
    }
}

/// Result of a transition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    /// The task was already in the target state or already finished.
    Ignored,
}

/// Read-only view of a task record.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub state: TaskState,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

struct TaskEntry {
    snapshot: TaskSnapshot,
    /// Monotonic finish time used by the retention sweep.
    finished: Option<Instant>,
    channel: Arc<TaskChannel>,
}

/// Registry of every task that has not been reaped yet.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application.
pub struct TaskRegistry {
    tasks: RwLock<HashMap<TaskId, TaskEntry>>,
    channel_capacity: usize,
}

fn not_found(id: TaskId) -> CoreError {
    CoreError::NotFound {
        entity: "Task",
        id: id.to_string(),
    }
}

impl TaskRegistry {
    /// Create an empty registry whose channels buffer `channel_capacity`
    /// log lines each.
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            channel_capacity,
        }
    }

    /// Register a new `Pending` task with an empty channel.
    pub async fn create_task(&self) -> TaskId {
        let id = TaskId::new();
        let entry = TaskEntry {
            snapshot: TaskSnapshot {
                id,
                state: TaskState::Pending,
                created_at: chrono::Utc::now(),
                started_at: None,
                finished_at: None,
                error: None,
                result: None,
            },
            finished: None,
            channel: Arc::new(TaskChannel::new(self.channel_capacity)),
        };
        self.tasks.write().await.insert(id, entry);
        tracing::debug!(task_id = %id, "Task created");
        id
    }

    /// The event channel of a live task.
    pub async fn channel(&self, id: TaskId) -> Result<Arc<TaskChannel>, CoreError> {
        self.tasks
            .read()
            .await
            .get(&id)
            .map(|entry| Arc::clone(&entry.channel))
            .ok_or_else(|| not_found(id))
    }

    /// Attach the single reader of a task's channel.
    ///
    /// Returns [`CoreError::NotFound`] for unknown or reaped tasks and
    /// [`CoreError::Conflict`] if another client is already attached.
    pub async fn attach(&self, id: TaskId) -> Result<ChannelReader, CoreError> {
        let channel = self.channel(id).await?;
        channel.attach().map_err(|e| match e {
            ChannelError::AlreadyAttached => CoreError::Conflict(format!(
                "Task {id} already has a client streaming its logs"
            )),
            ChannelError::Closed => not_found(id),
            other => CoreError::Internal(other.to_string()),
        })
    }

    /// Apply a state transition.
    ///
    /// Entering a terminal state enqueues the terminal batch: `[Result,
    /// completed]` on success, `[failed(cause)]` on failure. Repeated or
    /// late requests against an already finished task are [`Ignored`].
    ///
    /// [`Ignored`]: TransitionOutcome::Ignored
    pub async fn transition(
        &self,
        id: TaskId,
        transition: Transition,
    ) -> Result<TransitionOutcome, CoreError> {
        let mut tasks = self.tasks.write().await;
        let entry = tasks.get_mut(&id).ok_or_else(|| not_found(id))?;

        let current = entry.snapshot.state;
        let next = transition.target();
        if current == next || current.is_terminal() {
            tracing::debug!(
                task_id = %id,
                from = %current,
                to = %next,
                "Transition ignored"
            );
            return Ok(TransitionOutcome::Ignored);
        }
        current.validate_transition(next)?;

        let now = chrono::Utc::now();
        match transition {
            Transition::Start => {
                entry.snapshot.started_at = Some(now);
            }
            Transition::Complete(result) => {
                entry
                    .channel
                    .finish(vec![TaskEvent::Result(result.clone()), TaskEvent::completed()])
                    .map_err(|e| CoreError::Internal(e.to_string()))?;
                entry.snapshot.result = Some(result);
            }
            Transition::Fail(cause) => {
                entry
                    .channel
                    .finish(vec![TaskEvent::failed(cause.clone())])
                    .map_err(|e| CoreError::Internal(e.to_string()))?;
                entry.snapshot.error = Some(cause);
            }
        }

        entry.snapshot.state = next;
        if next.is_terminal() {
            entry.snapshot.finished_at = Some(now);
            entry.finished = Some(Instant::now());
        }

        tracing::info!(task_id = %id, from = %current, to = %next, "Task transitioned");
        Ok(TransitionOutcome::Applied)
    }

    /// Remove a task and close its channel.
    ///
    /// Returns `false` if the task was already gone.
    pub async fn reap(&self, id: TaskId) -> bool {
        let removed = self.tasks.write().await.remove(&id);
        match removed {
            Some(entry) => {
                entry.channel.close();
                tracing::debug!(task_id = %id, state = %entry.snapshot.state, "Task reaped");
                true
            }
            None => false,
        }
    }

    /// Reap every task that finished more than `retention` ago and has no
    /// reader attached. Returns the number of tasks reaped.
    pub async fn sweep(&self, retention: Duration) -> usize {
        let mut tasks = self.tasks.write().await;
        let expired: Vec<TaskId> = tasks
            .iter()
            .filter(|(_, entry)| {
                entry
                    .finished
                    .is_some_and(|finished| finished.elapsed() >= retention)
                    && !entry.channel.has_reader()
            })
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            if let Some(entry) = tasks.remove(id) {
                entry.channel.close();
                tracing::debug!(task_id = %id, "Expired task reaped");
            }
        }
        expired.len()
    }

    /// Copy of a task's record.
    pub async fn snapshot(&self, id: TaskId) -> Result<TaskSnapshot, CoreError> {
        self.tasks
            .read()
            .await
            .get(&id)
            .map(|entry| entry.snapshot.clone())
            .ok_or_else(|| not_found(id))
    }

    /// Number of tasks not yet reaped.
    pub async fn task_count(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// Number of tasks that have not reached a terminal state.
    pub async fn active_count(&self) -> usize {
        self.tasks
            .read()
            .await
            .values()
            .filter(|entry| !entry.snapshot.state.is_terminal())
            .count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
