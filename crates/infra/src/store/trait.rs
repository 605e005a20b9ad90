use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use thiserror::Error;

use sparkwatch_analytics::{JobRecord, RawEvent, TaskRecord};

/// Analytics store operation error.
///
/// These are **infrastructure errors** (storage, locking, concurrency) as
/// opposed to domain errors (validation, guard rejections). Callers that need
/// to surface them over HTTP should map every variant to a server-side
/// failure; none of them indicate bad client input.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness guarantee was violated by a concurrent writer.
    #[error("storage conflict: {0}")]
    Conflict(String),

    /// A stored row or payload could not be decoded into its domain shape.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The backend itself failed (connection loss, pool closed, lock poisoned).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(msg: impl Into<String>) -> Self {
        StoreError::Backend(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        StoreError::Serialization(msg.into())
    }
}

/// One reduction batch, applied atomically by [`AnalyticsStore::commit_reduction`].
///
/// Job and task records carry the final merged state for their keys, so
/// applying a batch is a plain upsert per record. `processed_event_ids` lists
/// every raw event drained by the batch, including events that failed to
/// reduce; those are retired along with the rest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReductionBatch {
    pub jobs: Vec<JobRecord>,
    pub tasks: Vec<TaskRecord>,
    pub processed_event_ids: Vec<i64>,
}

impl ReductionBatch {
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty() && self.tasks.is_empty() && self.processed_event_ids.is_empty()
    }
}

/// Storage boundary for the raw event log and the reduced analytics records.
///
/// ## Design Principles
///
/// - **No storage assumptions**: works with an in-memory implementation
///   (tests/dev) and a Postgres backend (production)
/// - **Claim before mutate**: reducers take ownership of pending events via
///   `claim_unprocessed` before folding them, so two reducers never process
///   the same event
/// - **Atomic commit**: a reduction batch lands entirely or not at all
///
/// ## Claim Lifecycle
///
/// 1. `claim_unprocessed(worker)` stamps every pending event with the worker
///    name and returns the batch in arrival order
/// 2. the reducer folds the batch off to the side
/// 3. `commit_reduction(batch)` upserts the merged records and flips the
///    processed flag on the drained events in one transaction
/// 4. on a failed commit, `release_claims(worker)` puts the events back; a
///    worker that crashes without releasing recovers its own claims on the
///    next pass, since `claim_unprocessed` re-claims rows it already owns
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    /// Append a raw event to the log, unprocessed and unclaimed.
    ///
    /// Assigned ids are monotonically increasing, so id order is arrival order.
    async fn insert_raw_event(
        &self,
        job_id: i64,
        event_type: &str,
        payload: JsonValue,
    ) -> Result<RawEvent, StoreError>;

    /// Atomically claim every unprocessed event for `worker`, in arrival order.
    ///
    /// Events held by another worker are skipped. Events already claimed by
    /// `worker` itself are included again.
    async fn claim_unprocessed(&self, worker: &str) -> Result<Vec<RawEvent>, StoreError>;

    /// Release every claim held by `worker` without marking anything processed.
    async fn release_claims(&self, worker: &str) -> Result<(), StoreError>;

    /// Apply a reduction batch atomically.
    ///
    /// Upserts the batch's job records (keyed by job id) and task records
    /// (keyed by task id + job id), then marks the drained events processed
    /// and drops their claims.
    async fn commit_reduction(&self, batch: ReductionBatch) -> Result<(), StoreError>;

    /// Look up one job record.
    async fn get_job(&self, job_id: i64) -> Result<Option<JobRecord>, StoreError>;

    /// Look up one task record by its composite key.
    async fn get_task(&self, task_id: &str, job_id: i64)
    -> Result<Option<TaskRecord>, StoreError>;

    /// Look up a task record by task id alone, across all jobs.
    async fn find_task(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError>;

    /// All task records for a job, ordered by task id.
    async fn tasks_for_job(&self, job_id: i64) -> Result<Vec<TaskRecord>, StoreError>;

    /// Job records whose start time falls in `[from, to)`, ordered by job id.
    ///
    /// Start times are compared lexicographically, which matches chronological
    /// order for ISO-8601 timestamps. Jobs without a start time never match.
    async fn jobs_started_between(
        &self,
        from: &str,
        to: &str,
    ) -> Result<Vec<JobRecord>, StoreError>;
}

#[async_trait]
impl<S> AnalyticsStore for Arc<S>
where
    S: AnalyticsStore + ?Sized,
{
    async fn insert_raw_event(
        &self,
        job_id: i64,
        event_type: &str,
        payload: JsonValue,
    ) -> Result<RawEvent, StoreError> {
        (**self).insert_raw_event(job_id, event_type, payload).await
    }

    async fn claim_unprocessed(&self, worker: &str) -> Result<Vec<RawEvent>, StoreError> {
        (**self).claim_unprocessed(worker).await
    }

    async fn release_claims(&self, worker: &str) -> Result<(), StoreError> {
        (**self).release_claims(worker).await
    }

    async fn commit_reduction(&self, batch: ReductionBatch) -> Result<(), StoreError> {
        (**self).commit_reduction(batch).await
    }

    async fn get_job(&self, job_id: i64) -> Result<Option<JobRecord>, StoreError> {
        (**self).get_job(job_id).await
    }

    async fn get_task(
        &self,
        task_id: &str,
        job_id: i64,
    ) -> Result<Option<TaskRecord>, StoreError> {
        (**self).get_task(task_id, job_id).await
    }

    async fn find_task(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError> {
        (**self).find_task(task_id).await
    }

    async fn tasks_for_job(&self, job_id: i64) -> Result<Vec<TaskRecord>, StoreError> {
        (**self).tasks_for_job(job_id).await
    }

    async fn jobs_started_between(
        &self,
        from: &str,
        to: &str,
    ) -> Result<Vec<JobRecord>, StoreError> {
        (**self).jobs_started_between(from, to).await
    }
}
