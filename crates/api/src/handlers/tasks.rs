//! Handlers for scrape job submission, log streaming and task status.

use std::convert::Infallible;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::{Stream, StreamExt};
use serde::Serialize;
use unistacker_core::error::CoreError;
use unistacker_core::submission::ScrapeRequest;
use unistacker_core::types::TaskId;
use unistacker_events::wire;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;
use crate::stream::StreamItem;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a path task id. Malformed ids cannot name a task, so they are
/// reported as not found.
fn parse_task_id(raw: &str) -> AppResult<TaskId> {
    raw.parse().map_err(|_| {
        AppError::Core(CoreError::NotFound {
            entity: "Task",
            id: raw.to_string(),
        })
    })
}

fn sse_event(item: StreamItem) -> Event {
    match item {
        StreamItem::KeepAlive => Event::default().comment("keepalive"),
        StreamItem::Event(event) => match wire::encode(&event) {
            Ok(json) => Event::default().data(json),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode task event");
                Event::default().comment("unencodable event skipped")
            }
        },
    }
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// Body of an accepted submission.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub message: &'static str,
    pub task_id: String,
}

/// POST /api/run-scraper
///
/// Validate the submission, register a `Pending` task and start its job in
/// the background. Returns 202 with the task id without waiting for the job.
pub async fn run_scraper(
    State(state): State<AppState>,
    payload: Result<Json<ScrapeRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(input) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let request = input.validated()?;

    let task_id = state.registry.create_task().await;
    // The job handle is detached; the registry tracks the outcome.
    state.runner.launch(task_id, request).await?;

    tracing::info!(task_id = %task_id, "Scrape job submitted");

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            message: "Scraping process initiated.",
            task_id: task_id.to_string(),
        }),
    ))
}

// ---------------------------------------------------------------------------
// Stream
// ---------------------------------------------------------------------------

/// GET /api/stream-logs/{task_id}
///
/// Server-Sent Events stream of the task's events. Each `data:` line is one
/// JSON-encoded event; idle periods are filled with comment keepalives.
pub async fn stream_logs(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let task_id = parse_task_id(&task_id)?;
    let items = state.publisher.serve(task_id).await?;

    Ok(Sse::new(items.map(|item| Ok(sse_event(item)))))
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// GET /api/tasks/{task_id}
///
/// Current record of a task that has not been reaped yet.
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let task_id = parse_task_id(&task_id)?;
    let snapshot = state.registry.snapshot(task_id).await?;
    Ok(Json(DataResponse { data: snapshot }))
}
