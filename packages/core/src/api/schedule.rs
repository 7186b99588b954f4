//! Read-only schedule projections.
//!
//! Routes:
//! - `GET /care-plans/:id/schedule`
//! - `GET /schedule?patient_id=..&hospital_id=..`   the active plan's schedule

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::api::AppState;
use crate::care::types::ScheduleView;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct ScheduleQuery {
    pub patient_id: i64,
    pub hospital_id: i64,
}

/// `GET /care-plans/:id/schedule`
pub async fn plan_schedule(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ScheduleView>, AppError> {
    Ok(Json(state.service.schedule(id).await?))
}

/// `GET /schedule`
pub async fn active_schedule(
    State(state): State<AppState>,
    Query(query): Query<ScheduleQuery>,
) -> Result<Json<ScheduleView>, AppError> {
    Ok(Json(
        state
            .service
            .active_schedule(query.patient_id, query.hospital_id)
            .await?,
    ))
}
