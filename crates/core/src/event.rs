//! Inbound listener-event model.
//!
//! Events arrive as arbitrary JSON objects emitted by the compute
//! framework's listener interface. The envelope (`job_id`, `event`) is
//! validated at ingestion; per-type fields are extracted at the reducer
//! boundary, keyed on the event-type string. The payload itself travels
//! and is stored verbatim.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{DomainError, DomainResult};

/// Event type emitted when a job starts.
pub const JOB_START: &str = "SparkListenerJobStart";
/// Event type emitted when a job finishes.
pub const JOB_END: &str = "SparkListenerJobEnd";
/// Event type emitted when a task finishes.
pub const TASK_END: &str = "SparkListenerTaskEnd";
/// `job_result` value marking a successful job completion.
pub const JOB_SUCCEEDED: &str = "JobSucceeded";

/// A validated inbound event envelope: the required fields plus the full
/// payload.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub job_id: i64,
    pub event_type: String,
    pub payload: Value,
}

impl InboundEvent {
    /// Validate the envelope of a raw payload.
    ///
    /// Requires an integer `job_id` and a string `event`; a task-end event
    /// must additionally carry a string `task_id`. Everything else in the
    /// payload passes through untouched.
    pub fn parse(payload: Value) -> DomainResult<Self> {
        let job_id = payload
            .get("job_id")
            .and_then(Value::as_i64)
            .ok_or_else(|| DomainError::validation("event must carry an integer job_id"))?;
        let event_type = payload
            .get("event")
            .and_then(Value::as_str)
            .ok_or_else(|| DomainError::validation("event must carry an event type string"))?
            .to_string();

        if event_type == TASK_END && payload.get("task_id").and_then(Value::as_str).is_none() {
            return Err(DomainError::validation(
                "task-end event must carry a task_id",
            ));
        }

        Ok(Self {
            job_id,
            event_type,
            payload,
        })
    }

    /// The `task_id` field, when present as a string.
    pub fn task_id(&self) -> Option<&str> {
        self.payload.get("task_id").and_then(Value::as_str)
    }

    /// Classify this event's payload into its typed variant.
    pub fn classify(&self) -> DomainResult<ListenerEvent> {
        ListenerEvent::classify(&self.event_type, &self.payload)
    }
}

/// Typed view over a listener payload, keyed by its event-type string.
#[derive(Debug, Clone, PartialEq)]
pub enum ListenerEvent {
    JobStart(JobStartFields),
    JobEnd(JobEndFields),
    TaskEnd(TaskEndFields),
    /// Unrecognized event type; reduced as a logged no-op.
    Unknown { event_type: String },
}

/// Fields read from a job-start payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobStartFields {
    pub user: Option<String>,
    pub timestamp: Option<String>,
}

/// Fields read from a job-end payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobEndFields {
    pub completion_time: Option<String>,
    pub timestamp: Option<String>,
    pub job_result: Option<String>,
}

/// Fields read from a task-end payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskEndFields {
    pub task_id: Option<String>,
    pub timestamp: Option<String>,
    pub duration_ms: Option<i64>,
    pub successful: Option<bool>,
}

impl JobEndFields {
    /// Completion time, falling back to the event timestamp.
    pub fn end_time(&self) -> Option<&str> {
        self.completion_time
            .as_deref()
            .or(self.timestamp.as_deref())
    }

    /// Whether the payload reports a successful completion.
    pub fn succeeded(&self) -> bool {
        self.job_result.as_deref() == Some(JOB_SUCCEEDED)
    }
}

impl ListenerEvent {
    /// Extract the typed fields for `event_type` from `payload`.
    ///
    /// Unrecognized event types classify as [`ListenerEvent::Unknown`]; a
    /// recognized type whose fields are ill-typed is a validation error.
    /// Fields the variant does not read are never inspected.
    pub fn classify(event_type: &str, payload: &Value) -> DomainResult<Self> {
        let ill_typed = |e: serde_json::Error| DomainError::validation(format!("{event_type}: {e}"));
        match event_type {
            JOB_START => Ok(Self::JobStart(
                JobStartFields::deserialize(payload).map_err(ill_typed)?,
            )),
            JOB_END => Ok(Self::JobEnd(
                JobEndFields::deserialize(payload).map_err(ill_typed)?,
            )),
            TASK_END => Ok(Self::TaskEnd(
                TaskEndFields::deserialize(payload).map_err(ill_typed)?,
            )),
            other => Ok(Self::Unknown {
                event_type: other.to_string(),
            }),
        }
    }
}
