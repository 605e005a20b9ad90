use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;

use sparkwatch_infra::date_summary;

use crate::app::{errors, services::AppServices};

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub date: Option<String>,
}

/// GET /summary?date=YYYY-MM-DD
///
/// Analytics for all jobs whose recorded start time falls on the given day.
pub async fn get_summary(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<SummaryQuery>,
) -> axum::response::Response {
    let parsed = query
        .date
        .as_deref()
        .map(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d"));
    let date = match parsed {
        Some(Ok(date)) => date,
        _ => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "validation",
                "Invalid date format. Use YYYY-MM-DD",
            )
        }
    };

    match date_summary(services.store.as_ref(), date).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string()),
    }
}
