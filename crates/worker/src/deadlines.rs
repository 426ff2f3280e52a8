//! Upcoming deadline detection over scraped course data.
//!
//! The site renders deadlines in several shapes: relative countdowns
//! ("Will be closed after: 2 days 5 hours"), prefixed absolute dates
//! ("Closed at: Jan 5, 2025 at 11:59 PM") and a handful of placeholders.
//! All times are naive local time, as shown on the site.

use std::sync::LazyLock;

use chrono::{Duration, NaiveDateTime};
use regex::Regex;
use serde::Serialize;

/// Deadlines at most this many days away are reported.
pub const DEADLINE_THRESHOLD_DAYS: i64 = 3;

/// Values the scraper writes when an item has no usable date.
const PLACEHOLDERS: [&str; 4] = ["No Deadline Info", "No Status/Date", "N/A", "Unknown"];

/// Absolute formats tried in order after cleaning.
const ABSOLUTE_FORMATS: [&str; 5] = [
    "%b %d, %Y at %I:%M %p",
    "%B %d, %Y at %I:%M %p",
    "%Y-%m-%d %H:%M:%S",
    "%m/%d/%Y %I:%M %p",
    "%a, %b %d, %Y %I:%M %p",
];

static RELATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Will be closed after:.*?(\d+)\s*days?.*?(\d+)\s*hours?").expect("valid regex")
});

static PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(Closed at:|Opened at:|Will be opened at:)\s*").expect("valid regex")
});

static SINGLE_DIGIT_DAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\b\w{3})\s+(\d),").expect("valid regex"));

/// One assignment or quiz due within the threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpcomingDeadline {
    pub course: String,
    pub name: String,
    pub kind: String,
    /// The date text exactly as scraped.
    pub due_raw: String,
    pub due: NaiveDateTime,
    pub days_left: i64,
}

/// Parse a scraped date into a naive local timestamp.
///
/// `now` anchors relative countdowns. Returns `None` for placeholders and
/// anything unrecognised.
pub fn parse_deadline(raw: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let text = raw.replace('\n', " ");
    let text = text.trim();
    if text.is_empty() || PLACEHOLDERS.contains(&text) {
        return None;
    }

    if let Some(caps) = RELATIVE_RE.captures(text) {
        let days = caps[1].parse::<i64>().ok();
        let hours = caps[2].parse::<i64>().ok();
        if let (Some(days), Some(hours)) = (days, hours) {
            return Some(now + Duration::days(days) + Duration::hours(hours));
        }
    }

    let cleaned = PREFIX_RE.replace(text, "");
    let cleaned = SINGLE_DIGIT_DAY_RE.replace_all(cleaned.trim(), "${1} 0${2},");

    ABSOLUTE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&cleaned, fmt).ok())
}

/// Every assignment and quiz record in a scraped document.
pub(crate) fn all_items(data: &serde_json::Value) -> impl Iterator<Item = &serde_json::Value> {
    [
        data.pointer("/assignments/assignments"),
        data.pointer("/quizzes/quizzes_with_results"),
        data.pointer("/quizzes/quizzes_without_results"),
    ]
    .into_iter()
    .flatten()
    .filter_map(serde_json::Value::as_array)
    .flatten()
}

/// Collect items due within `threshold_days` of `now`, soonest first.
pub fn upcoming_deadlines(
    data: &serde_json::Value,
    now: NaiveDateTime,
    threshold_days: i64,
) -> Vec<UpcomingDeadline> {
    let text = |item: &serde_json::Value, key: &str, default: &str| -> String {
        item.get(key)
            .and_then(serde_json::Value::as_str)
            .unwrap_or(default)
            .to_string()
    };

    let mut upcoming: Vec<UpcomingDeadline> = all_items(data)
        .filter_map(|item| {
            let raw = ["closed_at", "status"]
                .iter()
                .filter_map(|key| item.get(*key).and_then(serde_json::Value::as_str))
                .find(|s| !s.is_empty())?;
            let due = parse_deadline(raw, now)?;
            if due <= now {
                return None;
            }
            let days_left = (due - now).num_days();
            (0..=threshold_days)
                .contains(&days_left)
                .then(|| UpcomingDeadline {
                    course: text(item, "course", "N/A"),
                    name: text(item, "name", "Unnamed Task"),
                    kind: text(item, "type", "Task"),
                    due_raw: raw.to_string(),
                    due,
                    days_left,
                })
        })
        .collect();

    upcoming.sort_by_key(|d| d.due);
    upcoming
}
