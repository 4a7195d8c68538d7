//! Predictive Scaler - forecast-driven scaling decisions
//!
//! Serves scaling recommendations, forecasts and cost metrics for services
//! whose telemetry lives in Prometheus.

use anyhow::{Context, Result};
use predictive_scaler::{api, config::ServiceConfig};
use scaler_lib::{HealthRegistry, ScalingEngine};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting predictive-scaler");

    // Load configuration
    let config = ServiceConfig::load()?;
    info!(
        instance = %config.instance_name,
        prometheus = ?config.engine.telemetry.prometheus_url,
        "Service configured"
    );

    // Health endpoints answer (not ready) while the engine is being built
    let health_registry = HealthRegistry::new();
    let app_state = Arc::new(api::AppState::new(health_registry.clone()));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state.clone()));

    let engine = ScalingEngine::builder(config.engine)
        .instance_name(config.instance_name)
        .health(health_registry)
        .build()
        .await
        .context("failed to build decision engine")?;
    let engine = Arc::new(engine);
    app_state.set_engine(engine.clone());

    // Wait for shutdown signal or server failure
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            engine.shutdown("SIGINT received").await;
        }
        result = api_handle => {
            match result {
                Ok(Ok(())) => engine.shutdown("API server stopped").await,
                Ok(Err(e)) => {
                    error!(error = %e, "API server failed");
                    engine.shutdown("API server failed").await;
                    return Err(e);
                }
                Err(e) => {
                    engine.shutdown("API server task panicked").await;
                    return Err(e.into());
                }
            }
        }
    }
    info!("Shutting down");

    Ok(())
}
