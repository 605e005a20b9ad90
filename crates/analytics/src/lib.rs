//! Analytics domain module.
//!
//! This crate contains the job/task analytics data model and the pure
//! aggregation engine over it (no IO, no HTTP, no storage).

pub mod metrics;
pub mod records;

pub use metrics::{
    day_bounds, job_metrics, summarize, AnalyticsResponse, AnalyticsSummary, JobSummary,
};
pub use records::{JobRecord, RawEvent, TaskRecord};
