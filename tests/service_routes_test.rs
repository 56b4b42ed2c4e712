mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{app, get_json, post_json, series, july_first};

#[tokio::test]
async fn readiness_reports_the_loaded_model() {
    let (status, body) = get_json(app(), "/health/ready").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
    assert_eq!(body["status"], "up");
    assert_eq!(body["model"]["name"], "drift");
    assert_eq!(body["max_encoder_length"], 30);
}

#[tokio::test]
async fn liveness_and_basic_health_are_up() {
    let (status, body) = get_json(app(), "/health/live").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["alive"], true);

    let (status, body) = get_json(app(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "up");
}

#[tokio::test]
async fn version_exposes_build_information() {
    let (status, body) = get_json(app(), "/health/version").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn metrics_count_served_forecasts() {
    let body = json!({ "timeseries": series(july_first(), 37, "3", "99197", 1.0) });
    let (status, _) = post_json(app(), "/api/forecast", &body).await;
    assert_eq!(status, StatusCode::OK);

    let (status, metrics) = get_json(app(), "/metrics/json").await;

    assert_eq!(status, StatusCode::OK);
    let served = metrics["counters"]["forecast_requests_total"]
        .as_u64()
        .expect("forecast counter is exported");
    assert!(served >= 1);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let (status, body) = get_json(app(), "/api-docs/openapi.json").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/api/forecast"]["post"].is_object());
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
    let (status, _) = get_json(app(), "/api/forecasts").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
