//! Event reducer: folds claimed raw events into analytics records.
//!
//! A reduction pass claims the whole pending backlog, folds it in memory,
//! and commits the merged records plus the processed-flag flips in one
//! atomic batch. Within a pass, later events see the state produced by
//! earlier ones through batch-local read-through maps, so a job's start and
//! end arriving together still merge into a single record.

use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use sparkwatch_analytics::{JobRecord, RawEvent, TaskRecord};
use sparkwatch_core::event::ListenerEvent;
use sparkwatch_core::{DomainError, JobStatus};

use crate::store::{AnalyticsStore, ReductionBatch, StoreError};
use crate::work::WorkOutcome;

/// Summary of one successfully folded event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventOutcome {
    JobStarted {
        job_id: i64,
        user: Option<String>,
        start_time: Option<String>,
        status: Option<JobStatus>,
    },
    JobEnded {
        job_id: i64,
        end_time: Option<String>,
        status: Option<JobStatus>,
    },
    TaskRecorded {
        job_id: i64,
        task_id: String,
        timestamp: Option<String>,
        duration_ms: Option<i64>,
        successful: bool,
    },
}

/// Result of one reduction pass.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReductionReport {
    /// How many raw events the pass claimed and retired
    pub drained: usize,
    /// Outcomes for the events that folded cleanly
    pub outcomes: Vec<EventOutcome>,
}

/// Per-event reduction failure. Logged and swallowed; the event is retired
/// with the rest of its batch.
#[derive(Debug, Error)]
enum ItemError {
    #[error(transparent)]
    Invalid(#[from] DomainError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Folds raw listener events into job and task analytics records.
pub struct EventReducer<S> {
    store: S,
    worker: String,
}

impl<S: AnalyticsStore> EventReducer<S> {
    pub fn new(store: S, worker: impl Into<String>) -> Self {
        Self {
            store,
            worker: worker.into(),
        }
    }

    /// Claim and fold every pending raw event.
    ///
    /// Events that fail to reduce individually are logged and retired along
    /// with the rest. A claim or commit failure aborts the whole pass with
    /// nothing applied; claims are released so another pass can retry.
    pub async fn reduce_pending(&self) -> Result<ReductionReport, StoreError> {
        let events = self.store.claim_unprocessed(&self.worker).await?;
        if events.is_empty() {
            return Ok(ReductionReport::default());
        }

        let mut jobs: HashMap<i64, JobRecord> = HashMap::new();
        let mut tasks: HashMap<(String, i64), TaskRecord> = HashMap::new();
        let mut outcomes = Vec::with_capacity(events.len());
        let mut processed_ids = Vec::with_capacity(events.len());

        for event in &events {
            // Retired regardless of how the fold goes
            processed_ids.push(event.id);

            match self.reduce_one(event, &mut jobs, &mut tasks).await {
                Ok(Some(outcome)) => outcomes.push(outcome),
                Ok(None) => {
                    debug!(
                        event_id = event.id,
                        event_type = %event.event_type,
                        "skipping unrecognized event type"
                    );
                }
                Err(e) => {
                    warn!(
                        event_id = event.id,
                        job_id = event.job_id,
                        error = %e,
                        "failed to reduce event"
                    );
                }
            }
        }

        let batch = ReductionBatch {
            jobs: jobs.into_values().collect(),
            tasks: tasks.into_values().collect(),
            processed_event_ids: processed_ids,
        };
        if let Err(commit_err) = self.store.commit_reduction(batch).await {
            if let Err(release_err) = self.store.release_claims(&self.worker).await {
                error!(
                    worker = %self.worker,
                    error = %release_err,
                    "failed to release claims after aborted commit"
                );
            }
            return Err(commit_err);
        }

        info!(
            worker = %self.worker,
            drained = events.len(),
            folded = outcomes.len(),
            "reduction pass committed"
        );

        Ok(ReductionReport {
            drained: events.len(),
            outcomes,
        })
    }

    /// Run one pass and shape the queue-facing result payload.
    pub async fn run(&self) -> WorkOutcome {
        match self.reduce_pending().await {
            Ok(report) if report.drained == 0 => {
                WorkOutcome::Completed(serde_json::json!({"status": "empty"}))
            }
            Ok(report) => WorkOutcome::Completed(serde_json::json!({
                "status": "success",
                "processed": report.outcomes.len(),
                "results": report.outcomes,
            })),
            Err(e) => WorkOutcome::Failed(e.to_string()),
        }
    }

    async fn reduce_one(
        &self,
        event: &RawEvent,
        jobs: &mut HashMap<i64, JobRecord>,
        tasks: &mut HashMap<(String, i64), TaskRecord>,
    ) -> Result<Option<EventOutcome>, ItemError> {
        match ListenerEvent::classify(&event.event_type, &event.payload)? {
            ListenerEvent::JobStart(fields) => {
                let record = match self.job_state(jobs, event.job_id).await? {
                    Some(mut record) => {
                        record.user = fields.user;
                        record.start_time = fields.timestamp;
                        if record.status.is_none() {
                            record.status = Some(JobStatus::Processing);
                        }
                        record
                    }
                    None => JobRecord {
                        job_id: event.job_id,
                        user: fields.user,
                        start_time: fields.timestamp,
                        end_time: None,
                        status: Some(JobStatus::Processing),
                    },
                };
                let outcome = EventOutcome::JobStarted {
                    job_id: record.job_id,
                    user: record.user.clone(),
                    start_time: record.start_time.clone(),
                    status: record.status,
                };
                jobs.insert(record.job_id, record);
                Ok(Some(outcome))
            }
            ListenerEvent::JobEnd(fields) => {
                let mut record = self
                    .job_state(jobs, event.job_id)
                    .await?
                    .unwrap_or_else(|| JobRecord::bare(event.job_id));
                record.end_time = fields.end_time().map(str::to_string);
                record.status = Some(if fields.succeeded() {
                    JobStatus::Success
                } else {
                    JobStatus::Failure
                });
                let outcome = EventOutcome::JobEnded {
                    job_id: record.job_id,
                    end_time: record.end_time.clone(),
                    status: record.status,
                };
                jobs.insert(record.job_id, record);
                Ok(Some(outcome))
            }
            ListenerEvent::TaskEnd(fields) => {
                let task_id = fields
                    .task_id
                    .clone()
                    .ok_or_else(|| DomainError::validation("task end event without task id"))?;
                let mut record = self
                    .task_state(tasks, &task_id, event.job_id)
                    .await?
                    .unwrap_or(TaskRecord {
                        task_id,
                        job_id: event.job_id,
                        timestamp: None,
                        duration_ms: None,
                        successful: true,
                    });
                record.timestamp = fields.timestamp;
                record.duration_ms = fields.duration_ms;
                record.successful = fields.successful.unwrap_or(true);
                let outcome = EventOutcome::TaskRecorded {
                    job_id: record.job_id,
                    task_id: record.task_id.clone(),
                    timestamp: record.timestamp.clone(),
                    duration_ms: record.duration_ms,
                    successful: record.successful,
                };
                tasks.insert((record.task_id.clone(), record.job_id), record);
                Ok(Some(outcome))
            }
            ListenerEvent::Unknown { .. } => Ok(None),
        }
    }

    /// Current job state as this batch sees it: batch-local first, then store.
    async fn job_state(
        &self,
        pending: &HashMap<i64, JobRecord>,
        job_id: i64,
    ) -> Result<Option<JobRecord>, StoreError> {
        if let Some(record) = pending.get(&job_id) {
            return Ok(Some(record.clone()));
        }
        self.store.get_job(job_id).await
    }

    /// Current task state as this batch sees it: batch-local first, then store.
    async fn task_state(
        &self,
        pending: &HashMap<(String, i64), TaskRecord>,
        task_id: &str,
        job_id: i64,
    ) -> Result<Option<TaskRecord>, StoreError> {
        if let Some(record) = pending.get(&(task_id.to_string(), job_id)) {
            return Ok(Some(record.clone()));
        }
        self.store.get_task(task_id, job_id).await
    }
}
