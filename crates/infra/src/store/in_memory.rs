//! In-memory analytics store for tests and local development.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use sparkwatch_analytics::{JobRecord, RawEvent, TaskRecord};

use super::r#trait::{AnalyticsStore, ReductionBatch, StoreError};

/// Thread-safe in-memory store, keyed the same way the Postgres schema is.
///
/// Raw events live in a vector in arrival order. Claim and commit take the
/// write lock for their whole critical section, which gives them the same
/// atomicity the Postgres implementation gets from transactions.
#[derive(Debug, Default)]
pub struct InMemoryAnalyticsStore {
    inner: RwLock<State>,
}

#[derive(Debug, Default)]
struct State {
    next_event_id: i64,
    raw_events: Vec<RawEvent>,
    jobs: HashMap<i64, JobRecord>,
    tasks: HashMap<(String, i64), TaskRecord>,
}

impl InMemoryAnalyticsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of raw events still awaiting reduction.
    pub fn pending_events(&self) -> Result<usize, StoreError> {
        let state = self.read()?;
        Ok(state.raw_events.iter().filter(|e| !e.processed).count())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::backend("lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::backend("lock poisoned"))
    }
}

#[async_trait]
impl AnalyticsStore for InMemoryAnalyticsStore {
    async fn insert_raw_event(
        &self,
        job_id: i64,
        event_type: &str,
        payload: JsonValue,
    ) -> Result<RawEvent, StoreError> {
        let mut state = self.write()?;
        state.next_event_id += 1;
        let event = RawEvent {
            id: state.next_event_id,
            job_id,
            event_type: event_type.to_string(),
            payload,
            processed: false,
            claimed_by: None,
        };
        state.raw_events.push(event.clone());
        Ok(event)
    }

    async fn claim_unprocessed(&self, worker: &str) -> Result<Vec<RawEvent>, StoreError> {
        let mut state = self.write()?;
        let mut claimed = Vec::new();
        for event in state.raw_events.iter_mut() {
            if event.processed {
                continue;
            }
            match event.claimed_by.as_deref() {
                None => {}
                Some(owner) if owner == worker => {}
                Some(_) => continue,
            }
            event.claimed_by = Some(worker.to_string());
            claimed.push(event.clone());
        }
        Ok(claimed)
    }

    async fn release_claims(&self, worker: &str) -> Result<(), StoreError> {
        let mut state = self.write()?;
        for event in state.raw_events.iter_mut() {
            if !event.processed && event.claimed_by.as_deref() == Some(worker) {
                event.claimed_by = None;
            }
        }
        Ok(())
    }

    async fn commit_reduction(&self, batch: ReductionBatch) -> Result<(), StoreError> {
        let mut state = self.write()?;
        for job in batch.jobs {
            state.jobs.insert(job.job_id, job);
        }
        for task in batch.tasks {
            state.tasks.insert((task.task_id.clone(), task.job_id), task);
        }
        for id in batch.processed_event_ids {
            if let Some(event) = state.raw_events.iter_mut().find(|e| e.id == id) {
                event.processed = true;
                event.claimed_by = None;
            }
        }
        Ok(())
    }

    async fn get_job(&self, job_id: i64) -> Result<Option<JobRecord>, StoreError> {
        let state = self.read()?;
        Ok(state.jobs.get(&job_id).cloned())
    }

    async fn get_task(
        &self,
        task_id: &str,
        job_id: i64,
    ) -> Result<Option<TaskRecord>, StoreError> {
        let state = self.read()?;
        Ok(state.tasks.get(&(task_id.to_string(), job_id)).cloned())
    }

    async fn find_task(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError> {
        let state = self.read()?;
        Ok(state
            .tasks
            .values()
            .find(|t| t.task_id == task_id)
            .cloned())
    }

    async fn tasks_for_job(&self, job_id: i64) -> Result<Vec<TaskRecord>, StoreError> {
        let state = self.read()?;
        let mut tasks: Vec<TaskRecord> = state
            .tasks
            .values()
            .filter(|t| t.job_id == job_id)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        Ok(tasks)
    }

    async fn jobs_started_between(
        &self,
        from: &str,
        to: &str,
    ) -> Result<Vec<JobRecord>, StoreError> {
        let state = self.read()?;
        let mut jobs: Vec<JobRecord> = state
            .jobs
            .values()
            .filter(|j| {
                j.start_time
                    .as_deref()
                    .is_some_and(|start| start >= from && start < to)
            })
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.job_id);
        Ok(jobs)
    }
}
