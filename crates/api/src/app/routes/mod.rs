use axum::{
    routing::{get, post},
    Router,
};

pub mod ingest;
pub mod jobs;
pub mod summary;
pub mod system;

/// Router for the analytics endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/ingest", post(ingest::ingest_event))
        .route("/jobs/:id", get(jobs::get_job))
        .route("/summary", get(summary::get_summary))
}
