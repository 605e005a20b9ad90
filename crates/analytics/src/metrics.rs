//! Pure aggregation over job/task records.
//!
//! Everything here is deterministic math over already-loaded records; the
//! read side composes these with store queries.

use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use sparkwatch_core::JobStatus;

use crate::records::{JobRecord, TaskRecord};

/// Per-job metrics computed from a job record and its task records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: i64,
    pub user: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub status: Option<JobStatus>,
    pub task_count: usize,
    pub failed_tasks: usize,
    pub success_rate: f64,
    pub duration_seconds: Option<i64>,
}

/// Totals and means over a set of per-job summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub total_jobs: usize,
    pub total_tasks: usize,
    pub failed_tasks: usize,
    pub avg_success_rate: f64,
    pub avg_duration_seconds: f64,
}

impl AnalyticsSummary {
    pub fn empty() -> Self {
        Self {
            total_jobs: 0,
            total_tasks: 0,
            failed_tasks: 0,
            avg_success_rate: 0.0,
            avg_duration_seconds: 0.0,
        }
    }
}

/// Response shape of the summary endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsResponse {
    pub date: String,
    pub summary: AnalyticsSummary,
    pub jobs: Vec<JobSummary>,
}

/// Compute the metrics for a single job.
///
/// `success_rate` is a percentage rounded to two decimals, 0.0 for a job
/// with no tasks. `duration_seconds` is whole seconds between start and end
/// time and is `None` unless both are present and parseable.
pub fn job_metrics(job: &JobRecord, tasks: &[TaskRecord]) -> JobSummary {
    let task_count = tasks.len();
    let failed_tasks = tasks.iter().filter(|t| !t.successful).count();
    let success_rate = if task_count == 0 {
        0.0
    } else {
        round2(100.0 * (task_count - failed_tasks) as f64 / task_count as f64)
    };

    let duration_seconds = match (job.start_time.as_deref(), job.end_time.as_deref()) {
        (Some(start), Some(end)) => duration_between(start, end),
        _ => None,
    };

    JobSummary {
        job_id: job.job_id,
        user: job.user.clone(),
        start_time: job.start_time.clone(),
        end_time: job.end_time.clone(),
        status: job.status,
        task_count,
        failed_tasks,
        success_rate,
        duration_seconds,
    }
}

/// Fold per-job summaries into date-level totals.
///
/// `avg_duration_seconds` averages only the jobs whose duration is known and
/// is 0.0 when none are.
pub fn summarize(job_summaries: &[JobSummary]) -> AnalyticsSummary {
    let total_jobs = job_summaries.len();
    if total_jobs == 0 {
        return AnalyticsSummary::empty();
    }

    let total_tasks = job_summaries.iter().map(|s| s.task_count).sum();
    let failed_tasks = job_summaries.iter().map(|s| s.failed_tasks).sum();
    let avg_success_rate = round2(
        job_summaries.iter().map(|s| s.success_rate).sum::<f64>() / total_jobs as f64,
    );

    let durations: Vec<i64> = job_summaries
        .iter()
        .filter_map(|s| s.duration_seconds)
        .collect();
    let avg_duration_seconds = if durations.is_empty() {
        0.0
    } else {
        round2(durations.iter().sum::<i64>() as f64 / durations.len() as f64)
    };

    AnalyticsSummary {
        total_jobs,
        total_tasks,
        failed_tasks,
        avg_success_rate,
        avg_duration_seconds,
    }
}

/// The `[start, end)` bounds of a calendar day, rendered the way job start
/// times are compared in the store (`YYYY-MM-DDTHH:MM:SS`, lexicographic).
///
/// `None` only if the next day is outside the supported calendar range.
pub fn day_bounds(date: NaiveDate) -> Option<(String, String)> {
    let next = date.checked_add_days(Days::new(1))?;
    let render = |d: NaiveDate| format!("{}T00:00:00", d.format("%Y-%m-%d"));
    Some((render(date), render(next)))
}

fn duration_between(start: &str, end: &str) -> Option<i64> {
    let start = parse_timestamp(start)?;
    let end = parse_timestamp(end)?;
    Some((end - start).num_seconds())
}

/// Parse an ISO-8601 timestamp. A trailing `Z` or explicit offset is
/// honored; an offset-less timestamp is read as UTC.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
