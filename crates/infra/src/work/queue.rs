//! Work queue implementations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use sparkwatch_core::WorkId;

use super::types::{WorkItem, WorkStatus};

/// Work queue abstraction.
///
/// The queue owns work item state; handlers and callers go through it for
/// every transition so status reads stay consistent.
pub trait WorkQueue: Send + Sync {
    /// Enqueue a new item.
    fn enqueue(&self, item: WorkItem) -> Result<WorkId, QueueError>;

    /// Get an item by ID.
    fn get(&self, id: WorkId) -> Result<Option<WorkItem>, QueueError>;

    /// Update an item.
    fn update(&self, item: &WorkItem) -> Result<(), QueueError>;

    /// Claim the next pending item that is ready to execute.
    /// Returns None if nothing is available.
    fn claim_next(&self) -> Result<Option<WorkItem>, QueueError>;

    /// Get queue statistics.
    fn stats(&self) -> Result<QueueStats, QueueError>;
}

/// Work queue error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QueueError {
    #[error("work item not found: {0}")]
    NotFound(WorkId),
    #[error("work item already exists: {0}")]
    AlreadyExists(WorkId),
    #[error("queue storage error: {0}")]
    Storage(String),
}

/// Queue statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

/// In-memory work queue.
///
/// Items are volatile: a restart loses queued work and recorded results. The
/// raw event log is the durable source of truth, so lost reduction passes are
/// re-covered by the next enqueued one.
#[derive(Debug, Default)]
pub struct InMemoryWorkQueue {
    items: RwLock<HashMap<WorkId, WorkItem>>,
}

impl InMemoryWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<WorkId, WorkItem>>, QueueError> {
        self.items
            .read()
            .map_err(|_| QueueError::Storage("lock poisoned".to_string()))
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<WorkId, WorkItem>>, QueueError> {
        self.items
            .write()
            .map_err(|_| QueueError::Storage("lock poisoned".to_string()))
    }
}

impl WorkQueue for InMemoryWorkQueue {
    fn enqueue(&self, item: WorkItem) -> Result<WorkId, QueueError> {
        let mut items = self.write()?;
        if items.contains_key(&item.id) {
            return Err(QueueError::AlreadyExists(item.id));
        }
        let id = item.id;
        items.insert(id, item);
        Ok(id)
    }

    fn get(&self, id: WorkId) -> Result<Option<WorkItem>, QueueError> {
        let items = self.read()?;
        Ok(items.get(&id).cloned())
    }

    fn update(&self, item: &WorkItem) -> Result<(), QueueError> {
        let mut items = self.write()?;
        if !items.contains_key(&item.id) {
            return Err(QueueError::NotFound(item.id));
        }
        items.insert(item.id, item.clone());
        Ok(())
    }

    fn claim_next(&self) -> Result<Option<WorkItem>, QueueError> {
        let mut items = self.write()?;

        // Find the oldest ready pending item (FIFO)
        let mut candidates: Vec<_> = items
            .values()
            .filter(|i| matches!(i.status, WorkStatus::Pending) && i.is_ready())
            .collect();
        candidates.sort_by_key(|i| i.created_at);

        if let Some(item) = candidates.first() {
            let id = item.id;
            if let Some(item) = items.get_mut(&id) {
                item.mark_running();
                return Ok(Some(item.clone()));
            }
        }

        Ok(None)
    }

    fn stats(&self) -> Result<QueueStats, QueueError> {
        let items = self.read()?;
        let mut stats = QueueStats::default();
        for item in items.values() {
            match &item.status {
                WorkStatus::Pending => stats.pending += 1,
                WorkStatus::Running => stats.running += 1,
                WorkStatus::Completed => stats.completed += 1,
                WorkStatus::Failed { .. } => stats.failed += 1,
            }
        }
        Ok(stats)
    }
}

impl<Q> WorkQueue for Arc<Q>
where
    Q: WorkQueue + ?Sized,
{
    fn enqueue(&self, item: WorkItem) -> Result<WorkId, QueueError> {
        (**self).enqueue(item)
    }

    fn get(&self, id: WorkId) -> Result<Option<WorkItem>, QueueError> {
        (**self).get(id)
    }

    fn update(&self, item: &WorkItem) -> Result<(), QueueError> {
        (**self).update(item)
    }

    fn claim_next(&self) -> Result<Option<WorkItem>, QueueError> {
        (**self).claim_next()
    }

    fn stats(&self) -> Result<QueueStats, QueueError> {
        (**self).stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work::types::RetryPolicy;

    #[test]
    fn enqueue_and_claim() {
        let queue = InMemoryWorkQueue::new();

        let item = WorkItem::new("test.kind", serde_json::json!({}));
        let id = queue.enqueue(item).unwrap();

        let claimed = queue.claim_next().unwrap().unwrap();
        assert_eq!(claimed.id, id);
        assert!(matches!(claimed.status, WorkStatus::Running));
        assert_eq!(claimed.attempt, 1);

        // Nothing left
        assert!(queue.claim_next().unwrap().is_none());
    }

    #[test]
    fn claim_is_fifo_by_creation() {
        let queue = InMemoryWorkQueue::new();

        let first = WorkItem::new("test.kind", serde_json::json!({"n": 1}));
        let first_id = first.id;
        queue.enqueue(first).unwrap();

        let mut second = WorkItem::new("test.kind", serde_json::json!({"n": 2}));
        second.created_at += chrono::Duration::milliseconds(5);
        queue.enqueue(second).unwrap();

        let claimed = queue.claim_next().unwrap().unwrap();
        assert_eq!(claimed.id, first_id);
    }

    #[test]
    fn claim_skips_items_scheduled_for_later() {
        let queue = InMemoryWorkQueue::new();

        let mut item = WorkItem::new("test.kind", serde_json::json!({}))
            .with_retry_policy(RetryPolicy::default());
        item.scheduled_at = Some(chrono::Utc::now() + chrono::Duration::minutes(5));
        queue.enqueue(item).unwrap();

        assert!(queue.claim_next().unwrap().is_none());
    }

    #[test]
    fn duplicate_enqueue_is_rejected() {
        let queue = InMemoryWorkQueue::new();

        let item = WorkItem::new("test.kind", serde_json::json!({}));
        let dup = item.clone();
        queue.enqueue(item).unwrap();

        assert!(matches!(
            queue.enqueue(dup),
            Err(QueueError::AlreadyExists(_))
        ));
    }

    #[test]
    fn stats_tracking() {
        let queue = InMemoryWorkQueue::new();

        for i in 0..5 {
            let item = WorkItem::new("test.kind", serde_json::json!({"i": i}));
            queue.enqueue(item).unwrap();
        }

        let stats = queue.stats().unwrap();
        assert_eq!(stats.pending, 5);

        queue.claim_next().unwrap();
        queue.claim_next().unwrap();

        let stats = queue.stats().unwrap();
        assert_eq!(stats.pending, 3);
        assert_eq!(stats.running, 2);
    }

    #[test]
    fn completed_result_is_readable_through_get() {
        let queue = InMemoryWorkQueue::new();

        let item = WorkItem::new("test.kind", serde_json::json!({}));
        let id = queue.enqueue(item).unwrap();

        let mut claimed = queue.claim_next().unwrap().unwrap();
        claimed.mark_completed(serde_json::json!({"status": "success"}));
        queue.update(&claimed).unwrap();

        let fetched = queue.get(id).unwrap().unwrap();
        assert!(matches!(fetched.status, WorkStatus::Completed));
        assert_eq!(
            fetched.result,
            Some(serde_json::json!({"status": "success"}))
        );
    }
}
