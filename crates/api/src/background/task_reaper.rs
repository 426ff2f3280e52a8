//! Periodic reaping of finished tasks nobody streamed to the end.
//!
//! A client that disconnects mid-job, or never attaches at all, leaves a
//! finished task behind. This loop removes such tasks once they have been
//! terminal for longer than the retention window.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::tasks::TaskRegistry;

/// Run the retention sweep every `interval` until `cancel` is triggered.
pub async fn run(
    registry: Arc<TaskRegistry>,
    retention: Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        retention_secs = retention.as_secs(),
        interval_secs = interval.as_secs(),
        "Task reaper started"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Task reaper stopping");
                break;
            }
            _ = ticker.tick() => {
                let reaped = registry.sweep(retention).await;
                if reaped > 0 {
                    tracing::info!(reaped, "Task reaper: removed expired tasks");
                } else {
                    tracing::debug!("Task reaper: nothing to remove");
                }
            }
        }
    }
}
