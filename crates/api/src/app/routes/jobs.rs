use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use sparkwatch_core::WorkId;
use sparkwatch_infra::{WorkQueue, WorkStatus};

use crate::app::{errors, services::AppServices};

/// GET /jobs/:id
///
/// Poll the asynchronous unit of work behind a tracking handle.
pub async fn get_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let work_id: WorkId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid task id")
        }
    };

    let item = match services.queue.get(work_id) {
        Ok(Some(item)) => item,
        Ok(None) => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "unknown task id"),
        Err(e) => {
            return errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string())
        }
    };

    match item.status {
        WorkStatus::Pending | WorkStatus::Running => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "task_id": work_id.to_string(),
                "status": "Processing",
            })),
        )
            .into_response(),
        WorkStatus::Completed => (
            StatusCode::OK,
            Json(serde_json::json!({
                "task_id": work_id.to_string(),
                "status": "Success",
                "result": item.result,
            })),
        )
            .into_response(),
        WorkStatus::Failed { error, .. } => {
            errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", error)
        }
    }
}
