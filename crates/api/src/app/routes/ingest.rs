use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::app::{errors, services::AppServices};

/// POST /ingest
///
/// Accepts any JSON listener event carrying the envelope fields, records it,
/// and returns the tracking handle of the reduction pass it scheduled.
pub async fn ingest_event(
    Extension(services): Extension<Arc<AppServices>>,
    Json(payload): Json<serde_json::Value>,
) -> axum::response::Response {
    match services.ingest.ingest(payload).await {
        Ok(receipt) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "status": "received",
                "task_id": receipt.tracking_id.to_string(),
            })),
        )
            .into_response(),
        Err(e) => errors::ingest_error_to_response(e),
    }
}
