//! Ingestion gateway: validate, guard, persist, enqueue.

use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::info;

use sparkwatch_core::event::InboundEvent;
use sparkwatch_core::{DomainError, WorkId};

use crate::guard;
use crate::store::{AnalyticsStore, StoreError};
use crate::work::{QueueError, WorkItem, WorkQueue};

/// Kind string under which reduction passes are enqueued.
pub const REDUCE_WORK_KIND: &str = "analytics.reduce";

/// Ingestion error.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The payload was malformed (missing or ill-typed required fields).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The event duplicates an already-recorded terminal transition.
    #[error("{0}")]
    Conflict(String),

    /// The raw event could not be persisted.
    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    /// The reduction pass could not be enqueued.
    #[error("queue failure: {0}")]
    Queue(#[from] QueueError),
}

impl From<DomainError> for IngestError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                IngestError::Validation(msg)
            }
            DomainError::Conflict(msg) => IngestError::Conflict(msg),
            DomainError::NotFound => IngestError::Validation("not found".to_string()),
        }
    }
}

/// Receipt for an accepted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReceipt {
    /// Tracking handle for the reduction pass this event triggered
    pub tracking_id: WorkId,
    /// Position of the event in the raw log
    pub raw_event_id: i64,
}

/// Front door for listener events.
///
/// Each accepted event is appended to the raw log and answered with a
/// tracking id before any reduction work happens. The enqueued reduction
/// pass drains the whole pending backlog, not just the triggering event.
pub struct IngestService<S, Q> {
    store: S,
    queue: Q,
}

impl<S, Q> IngestService<S, Q>
where
    S: AnalyticsStore,
    Q: WorkQueue,
{
    pub fn new(store: S, queue: Q) -> Self {
        Self { store, queue }
    }

    /// Ingest one inbound payload.
    ///
    /// Runs envelope validation and the idempotency guard, then persists the
    /// event and enqueues an asynchronous reduction pass.
    pub async fn ingest(&self, payload: JsonValue) -> Result<IngestReceipt, IngestError> {
        let event = InboundEvent::parse(payload)?;

        if let Some(conflict) = guard::check(&self.store, &event).await {
            return Err(IngestError::Conflict(conflict.message));
        }

        let raw = self
            .store
            .insert_raw_event(event.job_id, &event.event_type, event.payload)
            .await?;

        let item = WorkItem::new(REDUCE_WORK_KIND, JsonValue::Null);
        let tracking_id = self.queue.enqueue(item)?;

        info!(
            job_id = raw.job_id,
            event_type = %raw.event_type,
            raw_event_id = raw.id,
            tracking_id = %tracking_id,
            "event accepted"
        );

        Ok(IngestReceipt {
            tracking_id,
            raw_event_id: raw.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryAnalyticsStore;
    use crate::work::{InMemoryWorkQueue, WorkStatus};
    use serde_json::json;
    use std::sync::Arc;

    fn service() -> (
        Arc<InMemoryAnalyticsStore>,
        Arc<InMemoryWorkQueue>,
        IngestService<Arc<InMemoryAnalyticsStore>, Arc<InMemoryWorkQueue>>,
    ) {
        let store = Arc::new(InMemoryAnalyticsStore::new());
        let queue = InMemoryWorkQueue::arc();
        let service = IngestService::new(store.clone(), queue.clone());
        (store, queue, service)
    }

    #[tokio::test]
    async fn accepted_event_is_persisted_and_tracked() {
        let (store, queue, service) = service();

        let receipt = service
            .ingest(json!({
                "job_id": 1,
                "event": "SparkListenerJobStart",
                "user": "alice",
                "timestamp": "2024-05-01T10:00:00"
            }))
            .await
            .unwrap();

        assert_eq!(store.pending_events().unwrap(), 1);

        let item = queue.get(receipt.tracking_id).unwrap().unwrap();
        assert_eq!(item.kind, REDUCE_WORK_KIND);
        assert!(matches!(item.status, WorkStatus::Pending));
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected_without_side_effects() {
        let (store, queue, service) = service();

        let err = service
            .ingest(json!({"event": "SparkListenerJobStart"}))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));

        let err = service
            .ingest(json!({"job_id": "not-a-number", "event": "SparkListenerJobStart"}))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));

        let err = service
            .ingest(json!({"job_id": 1, "event": "SparkListenerTaskEnd"}))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));

        assert_eq!(store.pending_events().unwrap(), 0);
        assert_eq!(queue.stats().unwrap().pending, 0);
    }

    #[tokio::test]
    async fn duplicate_before_reduction_is_accepted() {
        let (store, _queue, service) = service();

        let payload = json!({"job_id": 7, "event": "SparkListenerJobStart", "user": "bob"});
        service.ingest(payload.clone()).await.unwrap();

        // The first event has not been reduced yet, so the guard sees no
        // committed record and lets the duplicate through.
        service.ingest(payload).await.unwrap();

        assert_eq!(store.pending_events().unwrap(), 2);
    }

    #[tokio::test]
    async fn unknown_event_types_are_still_recorded() {
        let (store, _queue, service) = service();

        service
            .ingest(json!({"job_id": 3, "event": "SparkListenerStageCompleted"}))
            .await
            .unwrap();

        assert_eq!(store.pending_events().unwrap(), 1);
    }
}
