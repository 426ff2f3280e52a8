//! Discord deadline alerts.
//!
//! [`DeadlineNotifier`] posts upcoming deadlines to a Discord webhook as
//! embeds, at most ten per message. Failed deliveries are retried with a
//! short backoff and then reported to the task log; they never fail the
//! job.

use std::time::Duration;

use chrono::NaiveDateTime;
use serde_json::{json, Value};

use crate::deadlines::{UpcomingDeadline, DEADLINE_THRESHOLD_DAYS};
use crate::sink::LogSink;

/// Discord accepts at most this many embeds per message.
const MAX_EMBEDS: usize = 10;

/// Pause between consecutive chunks to stay under Discord's rate limit.
const CHUNK_SPACING: Duration = Duration::from_millis(1200);

/// Retry delays in seconds.
const RETRY_DELAYS_SECS: [u64; 2] = [1, 2];

/// HTTP request timeout for a single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const COLOR_RED: u32 = 15_158_332;
const COLOR_ORANGE: u32 = 15_105_570;
const COLOR_YELLOW: u32 = 16_776_960;
const COLOR_GREEN: u32 = 3_066_993;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for webhook delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote server returned a non-2xx status code.
    #[error("Webhook returned HTTP {0}")]
    HttpStatus(u16),
}

// ---------------------------------------------------------------------------
// Message building
// ---------------------------------------------------------------------------

/// Whether `url` looks like a Discord webhook endpoint.
pub fn is_discord_webhook(url: &str) -> bool {
    url.contains("discord.com/api/webhooks")
}

fn urgency_color(days_left: i64) -> u32 {
    match days_left {
        d if d <= 1 => COLOR_RED,
        d if d <= 3 => COLOR_ORANGE,
        _ => COLOR_YELLOW,
    }
}

fn days_left_label(days_left: i64) -> String {
    match days_left {
        0 => "**Due Today!**".to_string(),
        1 => "**Due Tomorrow!**".to_string(),
        d => format!("{d} days"),
    }
}

fn embed(deadline: &UpcomingDeadline) -> Value {
    json!({
        "title": format!("{}: {}", deadline.kind, deadline.name),
        "color": urgency_color(deadline.days_left),
        "fields": [
            {"name": "Course", "value": deadline.course, "inline": true},
            {"name": "Due Date", "value": deadline.due.format("%a, %b %d, %Y %I:%M %p").to_string(), "inline": true},
            {"name": "Days Left", "value": days_left_label(deadline.days_left), "inline": true},
        ],
    })
}

/// Build the webhook messages for a set of upcoming deadlines.
///
/// An empty set produces a single "All Clear" message.
pub fn build_messages(upcoming: &[UpcomingDeadline], now: NaiveDateTime) -> Vec<Value> {
    if upcoming.is_empty() {
        return vec![json!({
            "content": "✅ **All Clear!**",
            "embeds": [{
                "title": "No Upcoming Deadlines",
                "description": format!(
                    "No assignments or quizzes found due in the next {DEADLINE_THRESHOLD_DAYS} days."
                ),
                "color": COLOR_GREEN,
                "footer": {"text": format!("Checked on: {}", now.format("%Y-%m-%d %H:%M:%S"))},
            }],
        })];
    }

    let chunks: Vec<&[UpcomingDeadline]> = upcoming.chunks(MAX_EMBEDS).collect();
    let total = chunks.len();
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            json!({
                "content": format!(
                    "🔔 **Upcoming Deadlines Alert!** (Part {}/{total}) - Checked: {}",
                    i + 1,
                    now.format("%H:%M")
                ),
                "embeds": chunk.iter().map(embed).collect::<Vec<_>>(),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// DeadlineNotifier
// ---------------------------------------------------------------------------

/// Delivers deadline alerts to a Discord webhook.
#[derive(Clone, Default)]
pub struct DeadlineNotifier {
    client: reqwest::Client,
}

impl DeadlineNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post all alert messages for `upcoming` to `webhook_url`.
    ///
    /// Returns the number of messages delivered. Failures are reported to
    /// `sink` and otherwise swallowed.
    pub async fn send_alerts(
        &self,
        webhook_url: &str,
        upcoming: &[UpcomingDeadline],
        now: NaiveDateTime,
        sink: &LogSink,
    ) -> usize {
        if !is_discord_webhook(webhook_url) {
            sink.error("Invalid or missing Discord webhook URL provided.")
                .await;
            return 0;
        }

        let messages = build_messages(upcoming, now);
        let total = messages.len();
        let mut delivered = 0;

        for (i, message) in messages.iter().enumerate() {
            sink.info(format!("Sending deadline alert {}/{total} to Discord...", i + 1))
                .await;
            match self.deliver(webhook_url, message).await {
                Ok(()) => {
                    delivered += 1;
                    sink.info(format!("Discord alert {}/{total} sent successfully.", i + 1))
                        .await;
                }
                Err(e) => {
                    tracing::warn!(task_id = %sink.task_id(), error = %e, "Discord alert failed");
                    sink.error(format!("Failed to send Discord alert {}/{total}: {e}", i + 1))
                        .await;
                }
            }
            if i + 1 < total {
                tokio::time::sleep(CHUNK_SPACING).await;
            }
        }

        delivered
    }

    /// Deliver one message with retry.
    async fn deliver(&self, url: &str, message: &Value) -> Result<(), WebhookError> {
        for (attempt, delay_secs) in RETRY_DELAYS_SECS.iter().enumerate() {
            match self.try_send(url, message).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::debug!(
                        attempt = attempt + 1,
                        error = %e,
                        "Discord delivery attempt failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_secs(*delay_secs)).await;
                }
            }
        }

        // Final attempt after the last backoff.
        self.try_send(url, message).await
    }

    /// Execute a single POST request and check the response status.
    async fn try_send(&self, url: &str, message: &Value) -> Result<(), WebhookError> {
        let response = self
            .client
            .post(url)
            .timeout(REQUEST_TIMEOUT)
            .json(message)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(WebhookError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
