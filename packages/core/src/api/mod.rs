//! HTTP surface.
//!
//! Thin axum handlers over [`CareService`]; all clinical logic lives in
//! `crate::care`.

pub mod alerts;
pub mod health;
pub mod observations;
pub mod schedule;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{MatchedPath, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::care::service::CareService;
use crate::metrics::AppMetrics;
use crate::repository::CareRepository;

/// Shared state for every route.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CareService>,
    pub repository: Arc<CareRepository>,
    pub metrics: Arc<AppMetrics>,
}

/// Assemble the full router. `main.rs` and the integration tests both use this.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(render_metrics))
        .route("/observations", post(observations::record_observation))
        .route("/observations/:id", get(observations::get_observation))
        .route("/care-plans/:id/schedule", get(schedule::plan_schedule))
        .route(
            "/care-plans/:id/observations",
            get(observations::list_plan_observations),
        )
        .route("/schedule", get(schedule::active_schedule))
        .route("/alerts/history", get(alerts::get_alert_history))
        .route_layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            track_http_metrics,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// `GET /metrics` in Prometheus text format.
pub async fn render_metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
            .body(Body::from(body))
            .unwrap_or_default(),
        Err(err) => {
            tracing::error!("Failed to render metrics: {}", err);
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::from("metrics error"))
                .unwrap_or_default()
        }
    }
}

async fn track_http_metrics(
    State(metrics): State<Arc<AppMetrics>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let started = Instant::now();
    let response = next.run(request).await;

    metrics
        .http_requests_total
        .with_label_values(&[method.as_str(), path.as_str(), response.status().as_str()])
        .inc();
    metrics
        .http_request_duration
        .observe(started.elapsed().as_secs_f64());

    response
}
