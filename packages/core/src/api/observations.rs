//! Observation endpoints.
//!
//! Routes:
//! - `POST /observations`                  record one clinical check
//! - `GET  /observations/:id`              one recorded observation
//! - `GET  /care-plans/:id/observations`   a plan's history, oldest first

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::api::AppState;
use crate::care::types::{ObservationRequest, ObservationResponse};
use crate::error::AppError;

/// `POST /observations`
pub async fn record_observation(
    State(state): State<AppState>,
    Json(request): Json<ObservationRequest>,
) -> Result<(StatusCode, Json<ObservationResponse>), AppError> {
    let response = state.service.record_observation(request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// `GET /observations/:id`
pub async fn get_observation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ObservationResponse>, AppError> {
    Ok(Json(state.service.observation(id).await?))
}

/// `GET /care-plans/:id/observations`
pub async fn list_plan_observations(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<ObservationResponse>>, AppError> {
    Ok(Json(state.service.observations_for_plan(id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Method, Request},
        routing::{get, post},
        Router,
    };
    use tower::ServiceExt;

    use crate::api::test_support::{body_json, test_state};

    async fn make_app() -> Router {
        Router::new()
            .route("/observations", post(record_observation))
            .route("/observations/:id", get(get_observation))
            .route("/care-plans/:id/observations", get(list_plan_observations))
            .with_state(test_state().await)
    }

    fn post_json(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/observations")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn post_records_observation_with_schedule() {
        let app = make_app().await;
        let resp = app
            .oneshot(post_json(serde_json::json!({
                "patient_id": 1,
                "hospital_id": 1,
                "recorded_by": "nurse.ada",
                "findings": { "pain_score": 8 }
            })))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::CREATED);
        let json = body_json(resp.into_body()).await;
        assert_eq!(json["schedule"]["phase"], "IMMEDIATE");
        assert_eq!(json["alerts"][0]["alert_type"], "PAIN");
        assert_eq!(json["alerts"][0]["severity"], "CAUTION");
        assert_eq!(json["referrals"]["pain_management_referral_suggested"], true);
        assert_eq!(json["recorded_by"]["kind"], "staff");
    }

    #[tokio::test]
    async fn post_invalid_pain_score_returns_400() {
        let app = make_app().await;
        let resp = app
            .oneshot(post_json(serde_json::json!({
                "patient_id": 1,
                "hospital_id": 1,
                "recorded_by": "nurse.ada",
                "findings": { "pain_score": 12 }
            })))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp.into_body()).await;
        assert!(json["error"].as_str().unwrap().contains("pain_score"));
    }

    #[tokio::test]
    async fn post_unknown_patient_returns_404() {
        let app = make_app().await;
        let resp = app
            .oneshot(post_json(serde_json::json!({
                "patient_id": 99,
                "hospital_id": 1,
                "recorded_by": "nurse.ada"
            })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn get_round_trips_recorded_observation() {
        let app = make_app().await;
        let created = app
            .clone()
            .oneshot(post_json(serde_json::json!({
                "patient_id": 1,
                "hospital_id": 1,
                "recorded_by": "nurse.ada"
            })))
            .await
            .unwrap();
        let created = body_json(created.into_body()).await;
        let id = created["id"].as_i64().unwrap();
        let plan_id = created["care_plan_id"].as_i64().unwrap();

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/observations/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp.into_body()).await;
        assert_eq!(json["id"], id);
        assert_eq!(json["schedule"], created["schedule"]);

        let resp = app
            .oneshot(
                Request::builder()
                    .uri(format!("/care-plans/{}/observations", plan_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(resp.into_body()).await;
        assert_eq!(json.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn get_missing_observation_returns_404() {
        let app = make_app().await;
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/observations/4242")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
