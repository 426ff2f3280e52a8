//! Data-quality summary of a scraped document.

use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::Value;

use crate::deadlines::parse_deadline;

/// Placeholders the scraper writes when a date was not found at all.
const ASSIGNMENT_NO_DATE: [&str; 3] = ["No Deadline Info", "N/A", "Unknown"];
const QUIZ_NO_DATE: [&str; 3] = ["No Status/Date", "N/A", "Unknown"];

/// Counts of suspicious records, one line per problem category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub issues: Vec<String>,
    pub summary: String,
}

fn items<'a>(data: &'a Value, pointer: &str) -> Vec<&'a Value> {
    data.pointer(pointer)
        .and_then(Value::as_array)
        .map(|items| items.iter().collect())
        .unwrap_or_default()
}

fn field<'a>(item: &'a Value, key: &str) -> &'a str {
    item.get(key).and_then(Value::as_str).unwrap_or("")
}

fn bad_name(item: &Value) -> bool {
    let name = field(item, "name");
    name.is_empty() || name.contains("Unnamed") || name.contains("Error Processing")
}

fn unknown(item: &Value, key: &str) -> bool {
    let value = field(item, key);
    value.is_empty() || value.contains("Unknown")
}

fn bad_date(item: &Value, placeholders: &[&str], now: NaiveDateTime) -> bool {
    let raw = field(item, "closed_at");
    !raw.is_empty() && !placeholders.contains(&raw) && parse_deadline(raw, now).is_none()
}

/// Build the quality report for a scraped document.
pub fn quality_report(data: &Value, now: NaiveDateTime) -> QualityReport {
    let assignments = items(data, "/assignments/assignments");
    let mut quizzes = items(data, "/quizzes/quizzes_with_results");
    quizzes.extend(items(data, "/quizzes/quizzes_without_results"));

    let total_a = assignments.len();
    let total_q = quizzes.len();
    let count = |items: &[&Value], pred: &dyn Fn(&Value) -> bool| {
        items.iter().filter(|item| pred(item)).count()
    };

    let checks = [
        (
            "Assignments missing/default/error names",
            count(&assignments, &bad_name),
            total_a,
        ),
        (
            "Quizzes missing/default/error names",
            count(&quizzes, &bad_name),
            total_q,
        ),
        (
            "Assignments with unparseable dates",
            count(&assignments, &|i| bad_date(i, &ASSIGNMENT_NO_DATE, now)),
            total_a,
        ),
        (
            "Quizzes with unparseable dates",
            count(&quizzes, &|i| bad_date(i, &QUIZ_NO_DATE, now)),
            total_q,
        ),
        (
            "Assignments missing/unknown submission status",
            count(&assignments, &|i| unknown(i, "submit_status")),
            total_a,
        ),
        (
            "Assignments missing/unknown grading status",
            count(&assignments, &|i| unknown(i, "grading_status")),
            total_a,
        ),
        (
            "Quizzes missing/unknown grade",
            count(&quizzes, &|i| unknown(i, "grade")),
            total_q,
        ),
    ];

    let issues: Vec<String> = checks
        .iter()
        .filter(|(_, bad, _)| *bad > 0)
        .map(|(label, bad, total)| format!("{label}: {bad}/{total}"))
        .collect();

    let summary = if issues.is_empty() {
        "Data quality appears good.".to_string()
    } else {
        format!(
            "Potential data quality issues found ({} categories).",
            issues.len()
        )
    };

    QualityReport { issues, summary }
}
