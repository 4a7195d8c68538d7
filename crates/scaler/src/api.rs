//! HTTP API for the decision engine, health checks and Prometheus metrics

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use scaler_lib::{
    health::{ComponentStatus, HealthRegistry},
    validate_service_name, EngineError, ExperimentConfig, ProviderKind, ScalingEngine,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

/// Shared application state
///
/// The server starts before the engine is built; engine routes answer 503
/// until [`AppState::set_engine`] has been called.
pub struct AppState {
    pub health_registry: HealthRegistry,
    engine: OnceLock<Arc<ScalingEngine>>,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry) -> Self {
        Self {
            health_registry,
            engine: OnceLock::new(),
        }
    }

    pub fn with_engine(health_registry: HealthRegistry, engine: Arc<ScalingEngine>) -> Self {
        let state = Self::new(health_registry);
        state.set_engine(engine);
        state
    }

    /// Install the engine; later calls are ignored
    pub fn set_engine(&self, engine: Arc<ScalingEngine>) {
        if self.engine.set(engine).is_err() {
            warn!("Engine already installed, ignoring");
        }
    }

    fn engine(&self) -> Result<&Arc<ScalingEngine>, ApiError> {
        self.engine.get().ok_or_else(|| ApiError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            code: "not_ready",
            message: "engine is still starting".to_string(),
        })
    }
}

/// Error body returned by every engine route
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::InsufficientData { .. } | EngineError::InvalidConfig { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            EngineError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            EngineError::ProviderUnavailable { .. } => StatusCode::NOT_FOUND,
            EngineError::PredictionError { .. }
            | EngineError::TelemetryUnavailable { .. }
            | EngineError::DecisionUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self {
            status,
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
                code: self.code.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct PredictionQuery {
    /// Minutes ahead; the configured default when absent
    pub horizon: Option<u32>,
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

async fn get_prediction(
    State(state): State<Arc<AppState>>,
    Path(service): Path<String>,
    Query(query): Query<PredictionQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = state.engine()?;
    let horizon = query
        .horizon
        .unwrap_or(engine.config().prediction.default_horizon_minutes);
    Ok(Json(engine.get_prediction(&service, horizon).await?))
}

async fn get_decision(
    State(state): State<Arc<AppState>>,
    Path(service): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = state.engine()?;
    validate_service_name(&service)?;
    Ok(Json(engine.get_scaling_decision(&service).await))
}

async fn get_costs(
    State(state): State<Arc<AppState>>,
    Path(service): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = state.engine()?;
    Ok(Json(engine.get_cost_metrics(&service).await?))
}

async fn get_fleet_predictions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PredictionQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = state.engine()?;
    let horizon = query
        .horizon
        .unwrap_or(engine.config().prediction.default_horizon_minutes);
    Ok(Json(engine.predict_all(horizon).await?))
}

async fn get_fleet_costs(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.engine()?.cost_analysis_all().await?))
}

async fn get_tiers(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.engine()?.cost_tiers()))
}

async fn get_experiment(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.engine()?.get_experiment_status()))
}

async fn put_experiment(
    State(state): State<Arc<AppState>>,
    Json(config): Json<ExperimentConfig>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.engine()?.reload_experiment(config)?))
}

async fn get_models(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.engine()?.model_performance()))
}

async fn train_service(
    State(state): State<Arc<AppState>>,
    Path(service): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = state.engine()?;
    Ok(Json(engine.train_all(&service).await?))
}

async fn retrain_model(
    State(state): State<Arc<AppState>>,
    Path((service, provider)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = state.engine()?;
    let kind: ProviderKind = provider.parse().map_err(|message| ApiError {
        status: StatusCode::BAD_REQUEST,
        code: "unknown_provider",
        message,
    })?;
    Ok(Json(engine.retrain(&service, kind).await?))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/predictions", get(get_fleet_predictions))
        .route("/api/v1/predictions/:service", get(get_prediction))
        .route("/api/v1/decisions/:service", get(get_decision))
        .route("/api/v1/costs", get(get_fleet_costs))
        .route("/api/v1/costs/:service", get(get_costs))
        .route("/api/v1/tiers", get(get_tiers))
        .route("/api/v1/experiment", get(get_experiment).put(put_experiment))
        .route("/api/v1/models", get(get_models))
        .route("/api/v1/models/:service/train", post(train_service))
        .route("/api/v1/models/:service/:provider/retrain", post(retrain_model))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
