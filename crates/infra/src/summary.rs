//! Date-scoped summary assembly over the analytics store.

use chrono::NaiveDate;
use tracing::instrument;

use sparkwatch_analytics::metrics::{self, AnalyticsResponse};

use crate::store::{AnalyticsStore, StoreError};

/// Assemble the analytics summary for one calendar day.
///
/// Pulls the jobs whose recorded start time falls on `date`, computes
/// per-job metrics from their task records, and folds them into totals.
/// A day with no jobs yields an empty summary, not an error.
#[instrument(skip(store), fields(date = %date), err)]
pub async fn date_summary<S: AnalyticsStore + ?Sized>(
    store: &S,
    date: NaiveDate,
) -> Result<AnalyticsResponse, StoreError> {
    let (from, to) = metrics::day_bounds(date)
        .ok_or_else(|| StoreError::backend("date outside the supported calendar range"))?;

    let jobs = store.jobs_started_between(&from, &to).await?;

    let mut job_summaries = Vec::with_capacity(jobs.len());
    for job in &jobs {
        let tasks = store.tasks_for_job(job.job_id).await?;
        job_summaries.push(metrics::job_metrics(job, &tasks));
    }

    Ok(AnalyticsResponse {
        date: date.format("%Y-%m-%d").to_string(),
        summary: metrics::summarize(&job_summaries),
        jobs: job_summaries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryAnalyticsStore, ReductionBatch};
    use sparkwatch_analytics::{JobRecord, TaskRecord};
    use sparkwatch_core::JobStatus;

    fn job(job_id: i64, start: &str, end: Option<&str>, status: JobStatus) -> JobRecord {
        JobRecord {
            job_id,
            user: Some("tester".into()),
            start_time: Some(start.into()),
            end_time: end.map(String::from),
            status: Some(status),
        }
    }

    fn task(task_id: &str, job_id: i64, successful: bool) -> TaskRecord {
        TaskRecord {
            task_id: task_id.into(),
            job_id,
            timestamp: None,
            duration_ms: Some(100),
            successful,
        }
    }

    async fn seed(store: &InMemoryAnalyticsStore, jobs: Vec<JobRecord>, tasks: Vec<TaskRecord>) {
        store
            .commit_reduction(ReductionBatch {
                jobs,
                tasks,
                processed_event_ids: Vec::new(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn empty_day_yields_an_empty_summary() {
        let store = InMemoryAnalyticsStore::new();
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        let response = date_summary(&store, date).await.unwrap();

        assert_eq!(response.date, "2024-05-01");
        assert_eq!(response.summary.total_jobs, 0);
        assert_eq!(response.summary.avg_success_rate, 0.0);
        assert!(response.jobs.is_empty());
    }

    #[tokio::test]
    async fn day_summary_covers_only_that_day() {
        let store = InMemoryAnalyticsStore::new();
        seed(
            &store,
            vec![
                job(1, "2024-05-01T10:00:00", Some("2024-05-01T10:01:40"), JobStatus::Success),
                job(2, "2024-05-01T12:00:00", None, JobStatus::Processing),
                job(3, "2024-05-02T00:00:00", None, JobStatus::Processing),
            ],
            vec![
                task("t-1", 1, true),
                task("t-2", 1, false),
                task("t-3", 2, true),
            ],
        )
        .await;

        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let response = date_summary(&store, date).await.unwrap();

        assert_eq!(response.summary.total_jobs, 2);
        assert_eq!(response.summary.total_tasks, 3);
        assert_eq!(response.summary.failed_tasks, 1);
        // (50.0 + 100.0) / 2
        assert_eq!(response.summary.avg_success_rate, 75.0);
        // Only job 1 has both endpoints
        assert_eq!(response.summary.avg_duration_seconds, 100.0);

        let first = &response.jobs[0];
        assert_eq!(first.job_id, 1);
        assert_eq!(first.task_count, 2);
        assert_eq!(first.failed_tasks, 1);
        assert_eq!(first.success_rate, 50.0);
        assert_eq!(first.duration_seconds, Some(100));
    }

    #[tokio::test]
    async fn jobs_without_a_start_time_are_not_counted() {
        let store = InMemoryAnalyticsStore::new();
        seed(&store, vec![JobRecord::bare(9)], Vec::new()).await;

        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let response = date_summary(&store, date).await.unwrap();

        assert_eq!(response.summary.total_jobs, 0);
    }
}
