//! `sparkwatch-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod event;
pub mod id;
pub mod status;

pub use error::{DomainError, DomainResult};
pub use event::{InboundEvent, JobEndFields, JobStartFields, ListenerEvent, TaskEndFields};
pub use id::WorkId;
pub use status::JobStatus;
