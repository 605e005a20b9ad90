//! Ingestion idempotency guard.
//!
//! The guard screens inbound events against already-reduced analytics state
//! and rejects duplicates of terminal transitions. It reads committed records
//! only, so an event whose predecessor is still sitting unreduced in the raw
//! log will not be caught here; the reducer's upserts keep replays of that
//! window harmless.

use tracing::warn;

use sparkwatch_core::event::{InboundEvent, JOB_END, JOB_START, TASK_END};
use sparkwatch_core::JobStatus;

use crate::store::AnalyticsStore;

/// A duplicate detected by the guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub message: String,
}

impl Conflict {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Decide whether an inbound event duplicates committed state.
///
/// Returns `None` to accept. Store failures are logged and treated as
/// no-conflict: the gateway stays available and the reducer's upsert
/// semantics absorb any duplicate that slips through.
pub async fn check<S>(store: &S, event: &InboundEvent) -> Option<Conflict>
where
    S: AnalyticsStore + ?Sized,
{
    match event.event_type.as_str() {
        JOB_START => match store.get_job(event.job_id).await {
            Ok(Some(job)) if job.status == Some(JobStatus::Processing) => {
                Some(Conflict::new("job already processing"))
            }
            Ok(_) => None,
            Err(e) => {
                warn!(
                    job_id = event.job_id,
                    error = %e,
                    "idempotency check failed, accepting event"
                );
                None
            }
        },
        JOB_END => match store.get_job(event.job_id).await {
            Ok(Some(job)) if job.status == Some(JobStatus::Success) => {
                Some(Conflict::new("job already completed successfully"))
            }
            Ok(_) => None,
            Err(e) => {
                warn!(
                    job_id = event.job_id,
                    error = %e,
                    "idempotency check failed, accepting event"
                );
                None
            }
        },
        TASK_END => {
            let task_id = event.task_id()?;
            match store.find_task(task_id).await {
                Ok(Some(_)) => Some(Conflict::new("task already processed")),
                Ok(None) => None,
                Err(e) => {
                    warn!(
                        job_id = event.job_id,
                        task_id,
                        error = %e,
                        "idempotency check failed, accepting event"
                    );
                    None
                }
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryAnalyticsStore, ReductionBatch, StoreError};
    use async_trait::async_trait;
    use serde_json::json;
    use sparkwatch_analytics::{JobRecord, RawEvent, TaskRecord};

    async fn seed_job(store: &InMemoryAnalyticsStore, job_id: i64, status: JobStatus) {
        let batch = ReductionBatch {
            jobs: vec![JobRecord {
                job_id,
                user: None,
                start_time: None,
                end_time: None,
                status: Some(status),
            }],
            tasks: Vec::new(),
            processed_event_ids: Vec::new(),
        };
        store.commit_reduction(batch).await.unwrap();
    }

    async fn seed_task(store: &InMemoryAnalyticsStore, task_id: &str, job_id: i64) {
        let batch = ReductionBatch {
            jobs: Vec::new(),
            tasks: vec![TaskRecord {
                task_id: task_id.to_string(),
                job_id,
                timestamp: None,
                duration_ms: None,
                successful: true,
            }],
            processed_event_ids: Vec::new(),
        };
        store.commit_reduction(batch).await.unwrap();
    }

    fn event(event_type: &str, job_id: i64, extra: serde_json::Value) -> InboundEvent {
        let mut payload = json!({"job_id": job_id, "event": event_type});
        if let (Some(obj), Some(map)) = (payload.as_object_mut(), extra.as_object()) {
            for (k, v) in map {
                obj.insert(k.clone(), v.clone());
            }
        }
        InboundEvent::parse(payload).unwrap()
    }

    #[tokio::test]
    async fn job_start_is_rejected_while_processing() {
        let store = InMemoryAnalyticsStore::new();
        seed_job(&store, 1, JobStatus::Processing).await;

        let conflict = check(&store, &event(JOB_START, 1, json!({}))).await;
        assert_eq!(conflict.unwrap().message, "job already processing");
    }

    #[tokio::test]
    async fn job_start_is_accepted_after_completion() {
        let store = InMemoryAnalyticsStore::new();
        seed_job(&store, 1, JobStatus::Success).await;

        assert!(check(&store, &event(JOB_START, 1, json!({}))).await.is_none());
    }

    #[tokio::test]
    async fn job_end_is_rejected_after_success() {
        let store = InMemoryAnalyticsStore::new();
        seed_job(&store, 2, JobStatus::Success).await;

        let conflict = check(&store, &event(JOB_END, 2, json!({}))).await;
        assert_eq!(conflict.unwrap().message, "job already completed successfully");
    }

    #[tokio::test]
    async fn job_end_is_accepted_after_failure() {
        let store = InMemoryAnalyticsStore::new();
        seed_job(&store, 2, JobStatus::Failure).await;

        // A failed job may still receive a successful end later
        assert!(check(&store, &event(JOB_END, 2, json!({}))).await.is_none());
    }

    #[tokio::test]
    async fn task_end_is_rejected_across_jobs() {
        let store = InMemoryAnalyticsStore::new();
        seed_task(&store, "t-9", 5).await;

        // Same task id under a different job id still conflicts
        let conflict = check(&store, &event(TASK_END, 6, json!({"task_id": "t-9"}))).await;
        assert_eq!(conflict.unwrap().message, "task already processed");
    }

    #[tokio::test]
    async fn unknown_event_types_pass() {
        let store = InMemoryAnalyticsStore::new();
        assert!(
            check(&store, &event("SparkListenerStageCompleted", 3, json!({})))
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn unseen_ids_pass() {
        let store = InMemoryAnalyticsStore::new();
        assert!(check(&store, &event(JOB_START, 10, json!({}))).await.is_none());
        assert!(check(&store, &event(JOB_END, 10, json!({}))).await.is_none());
        assert!(
            check(&store, &event(TASK_END, 10, json!({"task_id": "t-0"})))
                .await
                .is_none()
        );
    }

    // A store that refuses every operation.
    struct FailingStore;

    #[async_trait]
    impl AnalyticsStore for FailingStore {
        async fn insert_raw_event(
            &self,
            _job_id: i64,
            _event_type: &str,
            _payload: serde_json::Value,
        ) -> Result<RawEvent, StoreError> {
            Err(StoreError::backend("store offline"))
        }

        async fn claim_unprocessed(&self, _worker: &str) -> Result<Vec<RawEvent>, StoreError> {
            Err(StoreError::backend("store offline"))
        }

        async fn release_claims(&self, _worker: &str) -> Result<(), StoreError> {
            Err(StoreError::backend("store offline"))
        }

        async fn commit_reduction(&self, _batch: ReductionBatch) -> Result<(), StoreError> {
            Err(StoreError::backend("store offline"))
        }

        async fn get_job(&self, _job_id: i64) -> Result<Option<JobRecord>, StoreError> {
            Err(StoreError::backend("store offline"))
        }

        async fn get_task(
            &self,
            _task_id: &str,
            _job_id: i64,
        ) -> Result<Option<TaskRecord>, StoreError> {
            Err(StoreError::backend("store offline"))
        }

        async fn find_task(&self, _task_id: &str) -> Result<Option<TaskRecord>, StoreError> {
            Err(StoreError::backend("store offline"))
        }

        async fn tasks_for_job(&self, _job_id: i64) -> Result<Vec<TaskRecord>, StoreError> {
            Err(StoreError::backend("store offline"))
        }

        async fn jobs_started_between(
            &self,
            _from: &str,
            _to: &str,
        ) -> Result<Vec<JobRecord>, StoreError> {
            Err(StoreError::backend("store offline"))
        }
    }

    #[tokio::test]
    async fn store_failures_pass() {
        let store = FailingStore;
        assert!(check(&store, &event(JOB_START, 7, json!({}))).await.is_none());
        assert!(check(&store, &event(JOB_END, 7, json!({}))).await.is_none());
        assert!(
            check(&store, &event(TASK_END, 7, json!({"task_id": "t-7"})))
                .await
                .is_none()
        );
    }
}
