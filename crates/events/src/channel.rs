//! Bounded per-task event channel.
//!
//! A [`TaskChannel`] is a FIFO of [`TaskEvent`]s fed by the job runner
//! (possibly through several cloned handles) and read by at most one
//! attached reader (a stream connection).
//! Readers come and go: a client that disconnects releases its attachment
//! and any events it did not consume stay buffered for the next reader.
//!
//! # Backpressure
//!
//! Only [`TaskEvent::Log`] events count against the capacity.
//!
//! - While a reader is attached and the buffer is full, the writer waits
//!   until the reader drains a log line. A worker that logs faster than the
//!   client renders is paced by the client. Every blocked writer is woken
//!   when room appears, and they race for it.
//! - While no reader is attached, the oldest buffered log line is discarded
//!   instead, and the next reader first receives a synthetic
//!   `[N earlier log lines dropped]` line.
//!
//! Status and result events are never dropped and never block.
//!
//! # Terminal batch
//!
//! A task's stream ends with exactly one terminal batch (see
//! [`TaskChannel::finish`]). Once it is enqueued the channel rejects any
//! further events, and once the reader has received the terminal status the
//! reader sees end-of-stream.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::event::TaskEvent;

/// Default number of buffered log lines per task.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Errors returned by channel operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The task was reaped; nothing will read this channel again.
    #[error("task channel is closed")]
    Closed,

    /// The terminal batch has already been enqueued.
    #[error("task channel already received its terminal event")]
    AlreadyTerminated,

    /// Another reader is currently attached.
    #[error("task channel already has a reader attached")]
    AlreadyAttached,

    /// A terminal batch must end with a terminal status event.
    #[error("terminal batch does not end with a terminal status")]
    MissingTerminal,
}

#[derive(Debug, Default)]
struct State {
    queue: VecDeque<TaskEvent>,
    queued_logs: usize,
    dropped_logs: usize,
    terminated: bool,
    terminal_delivered: bool,
    reader_attached: bool,
    closed: bool,
}

impl State {
    fn push(&mut self, event: TaskEvent) {
        if event.is_droppable() {
            self.queued_logs += 1;
        }
        self.queue.push_back(event);
    }

    fn drop_oldest_log(&mut self) {
        if let Some(pos) = self.queue.iter().position(TaskEvent::is_droppable) {
            self.queue.remove(pos);
            self.queued_logs -= 1;
            self.dropped_logs += 1;
        }
    }
}

/// Multi-producer/single-consumer event buffer for one task.
#[derive(Debug)]
pub struct TaskChannel {
    capacity: usize,
    state: Mutex<State>,
    readable: Notify,
    writable: Notify,
}

impl TaskChannel {
    /// Create an empty channel buffering at most `capacity` log lines.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(State::default()),
            readable: Notify::new(),
            writable: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a non-terminal event, applying the backpressure policy.
    ///
    /// A terminal status passed here is treated as a one-event terminal
    /// batch (see [`finish`](Self::finish)).
    pub async fn send(&self, event: TaskEvent) -> Result<(), ChannelError> {
        if event.is_terminal() {
            return self.finish(vec![event]);
        }

        loop {
            // Registered before the state check so a wakeup between the
            // check and the await is not lost.
            let notified = self.writable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return Err(ChannelError::Closed);
                }
                if state.terminated {
                    return Err(ChannelError::AlreadyTerminated);
                }

                let full = event.is_droppable() && state.queued_logs >= self.capacity;
                if !full || !state.reader_attached {
                    if full {
                        state.drop_oldest_log();
                    }
                    state.push(event);
                    drop(state);
                    self.readable.notify_one();
                    return Ok(());
                }
            }

            // Full with a live reader: wait for it to drain or detach.
            notified.await;
        }
    }

    /// Enqueue the terminal batch: zero or more events followed by a
    /// terminal status. Never blocks and never drops.
    ///
    /// Exactly one terminal batch is accepted per channel.
    pub fn finish(&self, batch: Vec<TaskEvent>) -> Result<(), ChannelError> {
        if !batch.last().is_some_and(TaskEvent::is_terminal) {
            return Err(ChannelError::MissingTerminal);
        }

        let mut state = self.lock();
        if state.closed {
            return Err(ChannelError::Closed);
        }
        if state.terminated {
            return Err(ChannelError::AlreadyTerminated);
        }
        state.terminated = true;
        for event in batch {
            state.push(event);
        }
        drop(state);
        self.readable.notify_one();
        Ok(())
    }

    /// Attach the single reader.
    ///
    /// The returned [`ChannelReader`] releases the attachment when dropped.
    pub fn attach(self: &Arc<Self>) -> Result<ChannelReader, ChannelError> {
        let mut state = self.lock();
        if state.closed {
            return Err(ChannelError::Closed);
        }
        if state.reader_attached {
            return Err(ChannelError::AlreadyAttached);
        }
        state.reader_attached = true;
        Ok(ChannelReader {
            channel: Arc::clone(self),
        })
    }

    /// Close the channel, waking any waiting reader or writer.
    ///
    /// Buffered events are discarded.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.queue.clear();
        state.queued_logs = 0;
        drop(state);
        self.readable.notify_one();
        self.writable.notify_waiters();
    }

    /// Whether the terminal batch has been enqueued.
    pub fn is_terminated(&self) -> bool {
        self.lock().terminated
    }

    /// Whether a reader is currently attached.
    pub fn has_reader(&self) -> bool {
        self.lock().reader_attached
    }

    /// Number of buffered events (including a pending drop marker).
    pub fn len(&self) -> usize {
        let state = self.lock();
        state.queue.len() + usize::from(state.dropped_logs > 0)
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive read handle on a [`TaskChannel`].
#[derive(Debug)]
pub struct ChannelReader {
    channel: Arc<TaskChannel>,
}

impl ChannelReader {
    /// Receive the next event, waiting while the channel is empty.
    ///
    /// Returns `None` once the terminal status has been received or the
    /// channel was closed.
    pub async fn recv(&mut self) -> Option<TaskEvent> {
        loop {
            {
                let mut state = self.channel.lock();
                if state.closed || state.terminal_delivered {
                    return None;
                }

                if state.dropped_logs > 0 {
                    let dropped = std::mem::take(&mut state.dropped_logs);
                    return Some(TaskEvent::Log(format!(
                        "[{dropped} earlier log lines dropped]"
                    )));
                }

                if let Some(event) = state.queue.pop_front() {
                    if event.is_droppable() {
                        state.queued_logs -= 1;
                        drop(state);
                        self.channel.writable.notify_waiters();
                    } else if event.is_terminal() {
                        state.terminal_delivered = true;
                    }
                    return Some(event);
                }
            }

            self.channel.readable.notified().await;
        }
    }
}

impl Drop for ChannelReader {
    fn drop(&mut self) {
        self.channel.lock().reader_attached = false;
        // A writer blocked on a full buffer switches to dropping.
        self.channel.writable.notify_waiters();
    }
}
