use axum::{response::IntoResponse, Json};

/// GET /health (liveness only)
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
