pub mod health;
pub mod tasks;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /run-scraper                 submit a scrape job (POST)
/// /stream-logs/{task_id}       live task events (SSE)
/// /tasks/{task_id}             task status
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().merge(tasks::router())
}
