//! Route definitions for scrape tasks.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::tasks;
use crate::state::AppState;

/// Routes mounted at `/api`.
///
/// ```text
/// POST   /run-scraper              -> run_scraper
/// GET    /stream-logs/{task_id}    -> stream_logs
/// GET    /tasks/{task_id}          -> get_task
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/run-scraper", post(tasks::run_scraper))
        .route("/stream-logs/{task_id}", get(tasks::stream_logs))
        .route("/tasks/{task_id}", get(tasks::get_task))
}
