//! Asynchronous work queue with retry and backoff.
//!
//! ## Design
//!
//! - Work items are typed by a plain kind string and routed to handlers
//! - Retry policy with exponential backoff
//! - Completed items keep their handler's result payload for later lookup
//! - Visibility into item status and executor throughput
//!
//! ## Components
//!
//! - `WorkItem`: one unit of work with payload and metadata
//! - `WorkQueue`: persistence for work items (in-memory for now)
//! - `WorkExecutor`: runs items against registered handlers with retry logic

pub mod executor;
pub mod queue;
pub mod types;

pub use executor::{WorkExecutor, WorkExecutorConfig, WorkExecutorHandle};
pub use queue::{InMemoryWorkQueue, QueueError, QueueStats, WorkQueue};
pub use types::{RetryPolicy, WorkItem, WorkOutcome, WorkStatus};
