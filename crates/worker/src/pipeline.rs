//! The production automation worker.
//!
//! [`ScrapePipeline`] fetches the raw course document from a
//! [`CourseSource`], then optionally alerts the student about upcoming
//! deadlines and attaches a data-quality report to the result.

use std::time::Instant;

use async_trait::async_trait;
use unistacker_core::submission::ScrapeRequest;

use crate::alerts::DeadlineNotifier;
use crate::deadlines::{upcoming_deadlines, DEADLINE_THRESHOLD_DAYS};
use crate::quality::quality_report;
use crate::sink::LogSink;
use crate::worker::{AutomationWorker, WorkerError};

/// Where scraped course data comes from.
#[async_trait]
pub trait CourseSource: Send + Sync {
    async fn fetch(
        &self,
        request: &ScrapeRequest,
        sink: &LogSink,
    ) -> Result<serde_json::Value, WorkerError>;
}

/// Scrape, alert, report.
pub struct ScrapePipeline<S> {
    source: S,
    notifier: DeadlineNotifier,
    threshold_days: i64,
}

impl<S: CourseSource> ScrapePipeline<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            notifier: DeadlineNotifier::new(),
            threshold_days: DEADLINE_THRESHOLD_DAYS,
        }
    }

    async fn run_inner(
        &self,
        request: &ScrapeRequest,
        sink: &LogSink,
    ) -> Result<serde_json::Value, WorkerError> {
        let mut data = self.source.fetch(request, sink).await?;
        let now = chrono::Local::now().naive_local();

        match request.discord_webhook.as_deref() {
            Some(webhook) => {
                let upcoming = upcoming_deadlines(&data, now, self.threshold_days);
                sink.info(format!(
                    "Found {} upcoming deadlines within {} days.",
                    upcoming.len(),
                    self.threshold_days
                ))
                .await;
                self.notifier
                    .send_alerts(webhook, &upcoming, now, sink)
                    .await;
            }
            None => {
                sink.info("No Discord webhook provided, skipping deadline alerts.")
                    .await;
            }
        }

        let report = quality_report(&data, now);
        let detail = if report.issues.is_empty() {
            "None".to_string()
        } else {
            report.issues.join("; ")
        };
        sink.info(format!(
            "Data Quality Report: {} Issues: {detail}",
            report.summary
        ))
        .await;

        if let Some(object) = data.as_object_mut() {
            let report = serde_json::to_value(&report)?;
            object.insert("quality_report".to_string(), report);
        }

        Ok(data)
    }
}

#[async_trait]
impl<S: CourseSource> AutomationWorker for ScrapePipeline<S> {
    async fn run(
        &self,
        request: ScrapeRequest,
        sink: LogSink,
    ) -> Result<serde_json::Value, WorkerError> {
        let started = Instant::now();
        sink.info("--- Starting DULMS Scraper Task ---").await;

        let result = self.run_inner(&request, &sink).await;

        match &result {
            Ok(_) => sink.info("Scraper task completed successfully.").await,
            Err(e) => {
                sink.error(format!("A critical error occurred during scraper execution: {e}"))
                    .await
            }
        }
        sink.info(format!(
            "--- DULMS Scraper Task finished in {:.2} seconds ---",
            started.elapsed().as_secs_f64()
        ))
        .await;

        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
