use std::sync::Arc;

use unistacker_worker::AutomationWorker;

use crate::config::ServerConfig;
use crate::engine::JobRunner;
use crate::stream::StreamPublisher;
use crate::tasks::TaskRegistry;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Every live task and its event channel.
    pub registry: Arc<TaskRegistry>,
    /// Launches automation workers for submitted tasks.
    pub runner: Arc<JobRunner>,
    /// Attaches streaming clients to task channels.
    pub publisher: Arc<StreamPublisher>,
}

impl AppState {
    /// Wire the registry, runner and publisher around `worker`.
    pub fn new(config: ServerConfig, worker: Arc<dyn AutomationWorker>) -> Self {
        let registry = Arc::new(TaskRegistry::new(config.tasks.channel_capacity));
        let runner = Arc::new(JobRunner::new(
            Arc::clone(&registry),
            worker,
            config.tasks.max_concurrent_jobs,
            config.tasks.job_timeout,
        ));
        let publisher = Arc::new(StreamPublisher::new(
            Arc::clone(&registry),
            config.tasks.stream_idle,
        ));

        Self {
            config: Arc::new(config),
            registry,
            runner,
            publisher,
        }
    }
}
