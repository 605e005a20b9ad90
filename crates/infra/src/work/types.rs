//! Core work item types and policies.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sparkwatch_core::WorkId;

/// Work item execution status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    /// Queued, waiting to be picked up (possibly delayed for a retry)
    Pending,
    /// Currently being executed
    Running,
    /// Completed successfully
    Completed,
    /// Exhausted retries
    Failed { error: String, attempts: u32 },
}

impl WorkStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkStatus::Completed | WorkStatus::Failed { .. })
    }
}

/// Retry policy configuration.
///
/// Delays grow exponentially from `base_delay`, capped at `max_delay`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (0 = no retries)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    /// Calculate delay for a given attempt number (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let exp = 2_f64.powi((attempt - 1) as i32);
        Duration::from_millis((base_ms * exp).min(max_ms) as u64)
    }

    /// Check if more attempts are allowed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// One unit of asynchronous work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    /// Unique item ID, handed to callers as their tracking handle
    pub id: WorkId,
    /// Kind string for routing to a handler
    pub kind: String,
    /// JSON payload
    pub payload: serde_json::Value,
    /// Current status
    pub status: WorkStatus,
    /// Retry policy
    pub retry_policy: RetryPolicy,
    /// Current attempt number (starts at 0)
    pub attempt: u32,
    /// Handler result, recorded on completion
    pub result: Option<serde_json::Value>,
    /// When the item was created
    pub created_at: DateTime<Utc>,
    /// When the item was last updated
    pub updated_at: DateTime<Utc>,
    /// When the item should next be executed (set for retry backoff)
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl WorkItem {
    /// Create a new pending item.
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: WorkId::new(),
            kind: kind.into(),
            payload,
            status: WorkStatus::Pending,
            retry_policy: RetryPolicy::default(),
            attempt: 0,
            result: None,
            created_at: now,
            updated_at: now,
            scheduled_at: None,
        }
    }

    /// Set a custom retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Check if the item is ready to execute.
    pub fn is_ready(&self) -> bool {
        match self.scheduled_at {
            Some(at) => Utc::now() >= at,
            None => true,
        }
    }

    /// Mark the item as running.
    pub fn mark_running(&mut self) {
        self.status = WorkStatus::Running;
        self.attempt += 1;
        self.updated_at = Utc::now();
    }

    /// Mark the item as completed with its handler's result.
    pub fn mark_completed(&mut self, result: serde_json::Value) {
        self.status = WorkStatus::Completed;
        self.result = Some(result);
        self.updated_at = Utc::now();
    }

    /// Mark the current attempt as failed.
    ///
    /// Requeues the item with backoff while the retry policy allows it,
    /// otherwise parks it in the terminal `Failed` state.
    pub fn mark_failed(&mut self, error: String) {
        let now = Utc::now();
        self.updated_at = now;

        if self.retry_policy.should_retry(self.attempt) {
            let delay = self.retry_policy.delay_for_attempt(self.attempt);
            self.scheduled_at = Some(now + chrono::Duration::from_std(delay).unwrap_or_default());
            self.status = WorkStatus::Pending;
        } else {
            self.status = WorkStatus::Failed {
                error,
                attempts: self.attempt,
            };
        }
    }
}

/// Result of executing one work item attempt.
#[derive(Debug)]
pub enum WorkOutcome {
    /// The attempt succeeded; the value becomes the item's result
    Completed(serde_json::Value),
    /// The attempt failed; the item is retried per its policy
    Failed(String),
}
