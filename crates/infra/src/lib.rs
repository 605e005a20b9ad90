//! Infrastructure layer: analytics storage, work queue, ingestion pipeline.

pub mod guard;
pub mod ingest;
pub mod reducer;
pub mod store;
pub mod summary;
pub mod work;

pub use ingest::{IngestError, IngestReceipt, IngestService, REDUCE_WORK_KIND};
pub use reducer::{EventOutcome, EventReducer, ReductionReport};
pub use store::{AnalyticsStore, InMemoryAnalyticsStore, PostgresAnalyticsStore, StoreError};
pub use summary::date_summary;
pub use work::{
    InMemoryWorkQueue, QueueError, WorkExecutor, WorkExecutorHandle, WorkItem, WorkOutcome,
    WorkQueue, WorkStatus,
};
