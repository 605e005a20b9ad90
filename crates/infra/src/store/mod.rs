//! Analytics storage boundary.
//!
//! This module defines an infrastructure-facing abstraction over the raw
//! event log and the reduced analytics records without making any storage
//! assumptions. Implementations must give claim and commit operations
//! all-or-nothing semantics so concurrent reducers never fold the same raw
//! event twice.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryAnalyticsStore;
pub use postgres::PostgresAnalyticsStore;
pub use r#trait::{AnalyticsStore, ReductionBatch, StoreError};
