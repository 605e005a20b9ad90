use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use sparkwatch_infra::IngestError;

pub fn ingest_error_to_response(err: IngestError) -> axum::response::Response {
    match err {
        IngestError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation", msg),
        IngestError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        IngestError::Store(e) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string())
        }
        IngestError::Queue(e) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string())
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
