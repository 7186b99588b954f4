//! Alert delivery log.
//!
//! Routes:
//! - `GET /alerts/history`   paginated list of alert publish attempts

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::error::AppError;
use crate::care::types::AlertType;
use crate::repository::AlertEvent;

#[derive(Debug, Deserialize)]
pub struct AlertHistoryQuery {
    pub limit: Option<i64>,
    pub alert_type: Option<String>,
    pub delivered: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct AlertHistoryResponse {
    pub total: i64,
    pub items: Vec<AlertEvent>,
}

/// `GET /alerts/history`
///
/// Query params:
/// - `limit`      max items to return (default 20, clamped to 100)
/// - `alert_type` optional filter: HEMORRHAGE | INFECTION | PAIN | PSYCHOSOCIAL
/// - `delivered`  optional bool filter
pub async fn get_alert_history(
    State(state): State<AppState>,
    Query(params): Query<AlertHistoryQuery>,
) -> Result<Json<AlertHistoryResponse>, AppError> {
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let alert_type = params
        .alert_type
        .as_deref()
        .map(|raw| {
            AlertType::parse(raw).ok_or_else(|| {
                let valid: Vec<&str> = AlertType::ALL.iter().map(AlertType::as_str).collect();
                AppError::Validation(format!(
                    "Invalid alert_type '{}'. Must be one of: {}",
                    raw,
                    valid.join(", ")
                ))
            })
        })
        .transpose()?
        .map(|parsed| parsed.as_str());
    let delivered = params.delivered;

    let repo = &state.repository;
    let (items, total) = tokio::try_join!(
        repo.query_alert_history(limit, alert_type, delivered),
        repo.count_alert_events(alert_type, delivered),
    )?;

    Ok(Json(AlertHistoryResponse { total, items }))
}
