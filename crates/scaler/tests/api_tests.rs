//! Integration tests for the predictive scaler API endpoints

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use predictive_scaler::api::{create_router, AppState};
use scaler_lib::{
    config::ProviderAvailability,
    health::{Component, HealthRegistry},
    telemetry::{Metric, QueryRange, StaticReplicaSource, TelemetrySource},
    EngineConfig, ExperimentConfig, ProviderKind, ScalingEngine,
};
use std::sync::Arc;
use tower::ServiceExt;

/// Constant CPU series; every other metric is missing
struct FlatCpu(f64);

#[async_trait]
impl TelemetrySource for FlatCpu {
    async fn query(
        &self,
        metric: Metric,
        _service: &str,
        range: QueryRange,
    ) -> scaler_lib::Result<Vec<(i64, f64)>> {
        Ok(match metric {
            Metric::Cpu => range.timestamps().map(|t| (t, self.0)).collect(),
            _ => Vec::new(),
        })
    }
}

fn engine_config(experiment: ExperimentConfig) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.prediction.seed = Some(11);
    config.experiment = experiment;
    config.providers = ProviderAvailability::minimal();
    config.services = vec!["checkout".to_string(), "payments".to_string()];
    config
}

async fn setup_test_app(cpu: f64) -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    let engine = ScalingEngine::builder(engine_config(ExperimentConfig::single(
        ProviderKind::LinearRegression,
    )))
    .instance_name("api-test")
    .telemetry(Arc::new(FlatCpu(cpu)))
    .replicas(Arc::new(StaticReplicaSource::new(3)))
    .health(health_registry.clone())
    .build()
    .await
    .unwrap();

    let state = Arc::new(AppState::with_engine(health_registry, Arc::new(engine)));
    let router = create_router(state.clone());

    (router, state)
}

async fn send(app: Router, method: &str, uri: &str, body: Body) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(body)
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let (status, body) = send(app, "GET", uri, Body::empty()).await;
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_readyz_returns_503_before_engine_is_built() {
    let state = Arc::new(AppState::new(HealthRegistry::new()));
    let app = create_router(state);

    let (status, readiness) = get_json(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);

    // Engine routes answer 503 until the engine is installed
    let (status, body) = get_json(app, "/api/v1/decisions/checkout").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "not_ready");
}

#[tokio::test]
async fn test_readyz_returns_ok_once_engine_is_built() {
    let (app, _state) = setup_test_app(30.0).await;

    let (status, readiness) = get_json(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_healthz_includes_engine_components() {
    let (app, _state) = setup_test_app(30.0).await;

    let (status, health) = get_json(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    for component in Component::ALL {
        assert!(health["components"][component.as_str()].is_object());
    }
    assert_eq!(health["components"].as_object().unwrap().len(), Component::ALL.len());
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state) = setup_test_app(30.0).await;

    state
        .health_registry
        .set_unhealthy(Component::Forecaster, "every provider failed")
        .await;

    let (status, health) = get_json(app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_prediction_uses_requested_horizon() {
    let (app, _state) = setup_test_app(30.0).await;

    let (status, forecast) = get_json(app, "/api/v1/predictions/checkout?horizon=15").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(forecast["service"], "checkout");
    assert_eq!(forecast["provider_used"], "linear_regression");
    assert_eq!(forecast["horizon_minutes"], 15);
    assert_eq!(forecast["data_origin"], "partial");

    let predicted = forecast["predicted_value"].as_f64().unwrap();
    assert!((predicted - 30.0).abs() < 10.0);
}

#[tokio::test]
async fn test_prediction_defaults_horizon() {
    let (app, _state) = setup_test_app(30.0).await;

    let (status, forecast) = get_json(app, "/api/v1/predictions/checkout").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(forecast["horizon_minutes"], 5);
}

#[tokio::test]
async fn test_decision_holds_replicas_under_high_cpu() {
    let (app, _state) = setup_test_app(90.0).await;

    let (status, decision) = get_json(app, "/api/v1/decisions/checkout").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decision["current_replicas"], 3);
    assert!(decision["recommended_replicas"].as_u64().unwrap() >= 3);
    assert_ne!(decision["risk_level"], "LOW");
    assert!(decision["reasoning"].as_str().unwrap().contains("replicas"));
}

#[tokio::test]
async fn test_costs_and_tiers() {
    let (app, _state) = setup_test_app(15.0).await;

    let (status, costs) = get_json(app.clone(), "/api/v1/costs/checkout").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(costs["current_replicas"], 3);
    assert_eq!(costs["current_tier"], "micro");

    let (status, tiers) = get_json(app, "/api/v1/tiers").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tiers.as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_experiment_reload_rejects_invalid_split() {
    let (app, _state) = setup_test_app(30.0).await;

    let body = serde_json::json!({
        "traffic_split": { "linear_regression": 0.5 },
        "eligible_metrics": ["mse"],
        "current_best_provider": "linear_regression"
    });
    let (status, bytes) = send(
        app.clone(),
        "PUT",
        "/api/v1/experiment",
        Body::from(body.to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let error: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(error["code"], "invalid_config");

    // The previous experiment stays active
    let (status, experiment) = get_json(app, "/api/v1/experiment").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(experiment["config"]["traffic_split"]["linear_regression"], 1.0);
}

#[tokio::test]
async fn test_experiment_reload_accepts_valid_split() {
    let (app, _state) = setup_test_app(30.0).await;

    let body = serde_json::json!({
        "traffic_split": { "linear_regression": 0.5, "ensemble_tree": 0.5 },
        "eligible_metrics": ["mse", "mae"],
        "current_best_provider": "ensemble_tree"
    });
    let (status, bytes) = send(
        app,
        "PUT",
        "/api/v1/experiment",
        Body::from(body.to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let experiment: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(experiment["config"]["current_best_provider"], "ensemble_tree");
}

#[tokio::test]
async fn test_train_and_model_report() {
    let (app, _state) = setup_test_app(30.0).await;

    let (status, bytes) = send(
        app.clone(),
        "POST",
        "/api/v1/models/checkout/train",
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let report: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(report["service"], "checkout");
    assert!(!report["trained"].as_array().unwrap().is_empty());

    let (status, models) = get_json(app, "/api/v1/models").await;
    assert_eq!(status, StatusCode::OK);
    assert!(models
        .as_array()
        .unwrap()
        .iter()
        .all(|m| m["service"] == "checkout"));
}

#[tokio::test]
async fn test_retrain_unknown_provider_is_bad_request() {
    let (app, _state) = setup_test_app(30.0).await;

    let (status, bytes) = send(
        app,
        "POST",
        "/api/v1/models/checkout/prophet/retrain",
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(error["code"], "unknown_provider");
}

#[tokio::test]
async fn test_retrain_undeployed_provider_is_not_found() {
    let (app, _state) = setup_test_app(30.0).await;

    let (status, bytes) = send(
        app,
        "POST",
        "/api/v1/models/checkout/seasonal/retrain",
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let error: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(error["code"], "provider_unavailable");
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, _state) = setup_test_app(30.0).await;

    // Produce at least one forecast so labelled series exist
    let (status, _) = get_json(app.clone(), "/api/v1/predictions/checkout").await;
    assert_eq!(status, StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("predictive_scaler_forecasts_total"));
    assert!(metrics_text.contains("predictive_scaler_prediction_latency_seconds_bucket"));
}

#[tokio::test]
async fn test_prediction_horizon_above_maximum_is_bad_request() {
    let (app, _) = setup_test_app(40.0).await;

    let (status, body) = get_json(app, "/api/v1/predictions/checkout?horizon=100000").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_request");
    assert!(body["error"].as_str().unwrap().contains("exceeds the maximum"));
}

#[tokio::test]
async fn test_malformed_service_name_is_bad_request() {
    let (app, _) = setup_test_app(40.0).await;

    for uri in [
        "/api/v1/predictions/api%22%7D",
        "/api/v1/decisions/api.*",
        "/api/v1/costs/-api",
    ] {
        let (status, body) = get_json(app.clone(), uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body["code"], "invalid_request");
    }

    let (status, _) = send(app, "POST", "/api/v1/models/api%7C/train", Body::empty()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_fleet_predictions_cover_configured_services() {
    let (app, _) = setup_test_app(40.0).await;

    let (status, fleet) = get_json(app, "/api/v1/predictions?horizon=10").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fleet["horizon_minutes"], 10);
    let predictions = fleet["predictions"].as_array().unwrap();
    assert_eq!(predictions.len(), 2);
    assert_eq!(predictions[0]["service"], "checkout");
    assert_eq!(predictions[1]["service"], "payments");
    assert_eq!(predictions[1]["forecast"]["horizon_minutes"], 10);
}

#[tokio::test]
async fn test_fleet_costs_report_summary() {
    let (app, _) = setup_test_app(40.0).await;

    let (status, report) = get_json(app, "/api/v1/costs").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["services"].as_array().unwrap().len(), 2);
    assert_eq!(report["services"][0]["decision"]["current_replicas"], 3);

    let summary = &report["summary"];
    assert_eq!(summary["services_analyzed"], 2);
    assert_eq!(summary["services_failed"], 0);
    let per_hour = summary["total_savings_per_hour"].as_f64().unwrap();
    let per_day = summary["total_savings_per_day"].as_f64().unwrap();
    assert!((per_day - per_hour * 24.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_fleet_routes_need_configured_services() {
    let health_registry = HealthRegistry::new();
    let mut config = engine_config(ExperimentConfig::single(ProviderKind::LinearRegression));
    config.services.clear();
    let engine = ScalingEngine::builder(config)
        .telemetry(Arc::new(FlatCpu(40.0)))
        .health(health_registry.clone())
        .build()
        .await
        .unwrap();
    let app = create_router(Arc::new(AppState::with_engine(
        health_registry,
        Arc::new(engine),
    )));

    let (status, body) = get_json(app, "/api/v1/costs").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "invalid_config");
}
