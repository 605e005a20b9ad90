//! Analytics data model: the raw ingestion record and the job/task records
//! the reducer maintains.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use sparkwatch_core::JobStatus;

/// Immutable ingestion record.
///
/// Owned exclusively by the analytics store; `processed` starts false and is
/// flipped exactly once by the reducer when the event has been folded
/// (successfully or not). `claimed_by` marks the worker currently draining
/// the event; it is cleared if that worker's batch aborts before commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Store-assigned, monotonically increasing.
    pub id: i64,
    pub job_id: i64,
    pub event_type: String,
    /// Full inbound payload, stored verbatim.
    pub payload: Value,
    pub processed: bool,
    pub claimed_by: Option<String>,
}

/// One row per job identifier, merged from its listener events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: i64,
    pub user: Option<String>,
    /// Start/end times are kept verbatim as the payload's strings; parsing
    /// happens only in the aggregation engine.
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub status: Option<JobStatus>,
}

impl JobRecord {
    /// A record carrying only the job id.
    ///
    /// This is the shape a job takes when its first observed event is a
    /// job-end: that event alone cannot recover user or start time.
    pub fn bare(job_id: i64) -> Self {
        Self {
            job_id,
            user: None,
            start_time: None,
            end_time: None,
            status: None,
        }
    }
}

/// One row per (task id, job id) pair.
///
/// Task ids are global dedup keys: the idempotency guard rejects a second
/// task-end for the same task id regardless of job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub job_id: i64,
    pub timestamp: Option<String>,
    pub duration_ms: Option<i64>,
    pub successful: bool,
}
