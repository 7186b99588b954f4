//! Integration tests for all API endpoints.
//!
//! Each test boots the full Axum router (same assembly as `main.rs`) using
//! `tower::ServiceExt::oneshot`, so no live server is needed.
//!
//! `build_test_app()` wires together:
//! - A wiremocked alert webhook that accepts every POST
//! - An in-memory SQLite pool with the schema applied
//! - An in-memory identity directory with one patient, hospital and nurse
//! - Prometheus `AppMetrics`

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::{
    matchers::{body_partial_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

use postpartum_care::{
    alerts::{publisher::AlertPublisher, webhook::WebhookNotifier},
    api::{self, AppState},
    care::{CareService, MonitoringPolicy},
    db,
    metrics::AppMetrics,
    repository::CareRepository,
    services::directory::InMemoryDirectory,
};

// ---- Helpers ----------------------------------------------------------------

/// Build the complete test router.
///
/// Returns `(Router, MockServer)`. The `MockServer` must outlive the test so
/// its `expect` counts are verified on drop.
async fn build_test_app() -> (Router, MockServer) {
    let mock_server = MockServer::start().await;

    let pool = db::create_pool("sqlite::memory:").await.unwrap();
    let repository = Arc::new(CareRepository::new(pool));
    let metrics = Arc::new(AppMetrics::new().unwrap());

    let directory = InMemoryDirectory::new()
        .with_patient(1, "Jane Doe")
        .with_patient(2, "Mary Roe")
        .with_hospital(1, "St. Mary")
        .with_registration(55, 1)
        .with_staff(7, "nurse.ada", "Nurse Ada");

    let notifier = WebhookNotifier::new(
        format!("{}/alerts", mock_server.uri()),
        Duration::from_secs(2),
    )
    .unwrap();
    let publisher = AlertPublisher::new(
        Arc::new(notifier),
        repository.clone(),
        Some(metrics.clone()),
    );
    let service = CareService::new(
        repository.clone(),
        Arc::new(directory),
        publisher,
        MonitoringPolicy::default(),
        Some(metrics.clone()),
    );

    let app = api::create_router(AppState {
        service: Arc::new(service),
        repository,
        metrics,
    });

    (app, mock_server)
}

async fn accept_webhooks(server: &MockServer, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/alerts"))
        .respond_with(ResponseTemplate::new(200))
        .expect(expected)
        .mount(server)
        .await;
}

/// Convenience: collect body bytes and parse as JSON.
async fn json_body(body: Body) -> Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let resp = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    (status, json_body(resp.into_body()).await)
}

/// Poll `/alerts/history` until `total` events are logged. Delivery runs on a
/// background task, so history lags the recording response.
async fn wait_for_history(app: &Router, query: &str, total: i64) -> Value {
    let uri = format!("/alerts/history{}", query);
    let mut history = Value::Null;
    for _ in 0..200 {
        let (status, json) = get(app, &uri).await;
        assert_eq!(status, StatusCode::OK);
        if json["total"].as_i64() == Some(total) {
            return json;
        }
        history = json;
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    history
}

async fn post_observation(app: &Router, body: Value) -> (StatusCode, Value) {
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/observations")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = resp.status();
    (status, json_body(resp.into_body()).await)
}

fn routine_check() -> Value {
    json!({
        "patient_id": 1,
        "hospital_id": 1,
        "recorded_by": "nurse.ada",
        "findings": { "temperature_c": 36.8, "systolic_bp": 118, "pulse": 82 }
    })
}

// ---- GET /health ------------------------------------------------------------

#[tokio::test]
async fn health_returns_200_with_ok_body() {
    let (app, _mock) = build_test_app().await;
    let resp = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"ok");
}

// ---- POST /observations -----------------------------------------------------

#[tokio::test]
async fn first_observation_opens_plan_in_immediate_phase() {
    let (app, _mock) = build_test_app().await;

    let (status, json) = post_observation(&app, routine_check()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(json["care_plan_id"].as_i64().unwrap() > 0);
    assert_eq!(json["schedule"]["phase"], "IMMEDIATE");
    assert!(json["alerts"].as_array().unwrap().is_empty());
    assert_eq!(json["recorded_by"]["display_name"], "Nurse Ada");
}

#[tokio::test]
async fn repeated_observations_share_one_plan_until_stabilised() {
    let (app, _mock) = build_test_app().await;

    let mut plan_ids = Vec::new();
    for _ in 0..3 {
        let (status, json) = post_observation(&app, routine_check()).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["schedule"]["phase"], "IMMEDIATE");
        plan_ids.push(json["care_plan_id"].as_i64().unwrap());
    }
    assert!(plan_ids.iter().all(|id| *id == plan_ids[0]));

    let (status, schedule) =
        get(&app, &format!("/care-plans/{}/schedule", plan_ids[0])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(schedule["immediate_window_complete"], false);
    assert_eq!(schedule["immediate_checks_completed"], 3);
    assert_eq!(schedule["immediate_check_target"], 8);
    assert_eq!(schedule["frequency_minutes"], 15);

    let mut stabilised = routine_check();
    stabilised["controls"] = json!({ "stabilization_confirmed": true });
    let (_, json) = post_observation(&app, stabilised).await;
    assert_eq!(json["care_plan_id"].as_i64().unwrap(), plan_ids[0]);
    assert_eq!(json["schedule"]["phase"], "SHIFT_BASELINE");

    let (_, schedule) = get(&app, "/schedule?patient_id=1&hospital_id=1").await;
    assert_eq!(schedule["immediate_window_complete"], true);
    assert_eq!(schedule["frequency_minutes"], 240);
}

#[tokio::test]
async fn urgent_finding_escalates_and_notifies_webhook() {
    let (app, mock) = build_test_app().await;
    Mock::given(method("POST"))
        .and(path("/alerts"))
        .and(body_partial_json(json!({
            "recipient_id": 7,
            "recipient_kind": "staff"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock)
        .await;

    let (status, json) = post_observation(
        &app,
        json!({
            "patient_id": 1,
            "hospital_id": 1,
            "registration_id": 55,
            "recorded_by": "7",
            "findings": { "estimated_blood_loss_ml": 650 },
            "controls": { "stabilization_confirmed": true }
        }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["alerts"][0]["alert_type"], "HEMORRHAGE");
    assert_eq!(json["alerts"][0]["severity"], "URGENT");
    assert_eq!(json["schedule"]["phase"], "ENHANCED_MONITORING");

    let (status, schedule) = get(&app, "/schedule?patient_id=1&hospital_id=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(schedule["phase"], "ENHANCED_MONITORING");
    assert!(schedule["escalation_reason"].is_string());

    let history = wait_for_history(&app, "?alert_type=HEMORRHAGE", 1).await;
    assert_eq!(history["total"], 1);
    assert_eq!(history["items"][0]["delivered"], true);
    assert_eq!(history["items"][0]["recipient_id"], 7);
}

#[tokio::test]
async fn rejected_webhook_is_recorded_as_undelivered() {
    let (app, mock) = build_test_app().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock)
        .await;

    let (status, _) = post_observation(
        &app,
        json!({
            "patient_id": 1,
            "hospital_id": 1,
            "recorded_by": "nurse.ada",
            "findings": { "temperature_c": 38.6 }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let history = wait_for_history(&app, "?delivered=false", 1).await;
    assert_eq!(history["total"], 1);
    assert_eq!(history["items"][0]["alert_type"], "INFECTION");
}

#[tokio::test]
async fn registration_for_other_patient_returns_400() {
    let (app, _mock) = build_test_app().await;

    let (status, json) = post_observation(
        &app,
        json!({
            "patient_id": 2,
            "hospital_id": 1,
            "registration_id": 55,
            "recorded_by": "nurse.ada"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("registration 55"));
}

#[tokio::test]
async fn unknown_registration_returns_404() {
    let (app, _mock) = build_test_app().await;

    let mut body = routine_check();
    body["registration_id"] = json!(99);
    let (status, _) = post_observation(&app, body).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_recorder_returns_404() {
    let (app, _mock) = build_test_app().await;

    let mut body = routine_check();
    body["recorded_by"] = json!("ghost");
    let (status, _) = post_observation(&app, body).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn discharge_closes_plan_and_next_observation_opens_new_one() {
    let (app, _mock) = build_test_app().await;

    let (_, first) = post_observation(&app, routine_check()).await;
    let first_plan = first["care_plan_id"].as_i64().unwrap();

    let mut discharge = routine_check();
    discharge["discharge"] = json!({
        "discharge_checklist_complete": true,
        "follow_up_contact_method": "phone"
    });
    let (status, closed) = post_observation(&app, discharge).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(closed["schedule"]["phase"], "DISCHARGE_PLANNING");
    assert!(closed["schedule"]["next_due_at"].is_null());

    let (status, _) = get(&app, "/schedule?patient_id=1&hospital_id=1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, reopened) = post_observation(&app, routine_check()).await;
    assert_ne!(reopened["care_plan_id"].as_i64().unwrap(), first_plan);
}

#[tokio::test]
async fn correction_must_reference_observation_on_same_plan() {
    let (app, _mock) = build_test_app().await;

    let (_, original) = post_observation(&app, routine_check()).await;
    let original_id = original["id"].as_i64().unwrap();

    let mut correction = routine_check();
    correction["supersedes_observation_id"] = json!(original_id);
    let (status, json) = post_observation(&app, correction).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["supersedes_observation_id"], original_id);

    let mut dangling = routine_check();
    dangling["supersedes_observation_id"] = json!(9999);
    let (status, _) = post_observation(&app, dangling).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ---- GET /observations ------------------------------------------------------

#[tokio::test]
async fn plan_observations_listed_in_order() {
    let (app, _mock) = build_test_app().await;

    let (_, a) = post_observation(&app, routine_check()).await;
    let (_, b) = post_observation(&app, routine_check()).await;
    let plan_id = a["care_plan_id"].as_i64().unwrap();

    let (status, list) = get(&app, &format!("/care-plans/{}/observations", plan_id)).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![a["id"].as_i64().unwrap(), b["id"].as_i64().unwrap()]);

    let (status, single) = get(&app, &format!("/observations/{}", ids[1])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(single["schedule"], b["schedule"]);
}

#[tokio::test]
async fn unknown_plan_observations_returns_404() {
    let (app, _mock) = build_test_app().await;
    let (status, json) = get(&app, "/care-plans/404/observations").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].is_string());
}

// ---- GET /alerts/history ----------------------------------------------------

#[tokio::test]
async fn alert_history_invalid_type_returns_400() {
    let (app, _mock) = build_test_app().await;
    let (status, json) = get(&app, "/alerts/history?alert_type=Critical").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("HEMORRHAGE"));
}

// ---- GET /metrics -----------------------------------------------------------

#[tokio::test]
async fn metrics_expose_care_counters() {
    let (app, mock) = build_test_app().await;
    accept_webhooks(&mock, 0).await;

    post_observation(&app, routine_check()).await;

    let resp = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("postpartum_care_observations_recorded_total 1"));
    assert!(text.contains("postpartum_care_care_plans_opened_total 1"));
    assert!(text.contains("postpartum_care_http_requests_total"));
}
