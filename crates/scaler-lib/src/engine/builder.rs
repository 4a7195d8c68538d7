//! Engine construction
//!
//! Collaborators default from configuration: a Prometheus URL enables the
//! Prometheus telemetry and replica sources, otherwise the engine runs on
//! synthetic telemetry and a fixed replica count.

use super::ScalingEngine;
use crate::config::EngineConfig;
use crate::cost::{CostModel, ScalingPolicy};
use crate::error::Result;
use crate::health::HealthRegistry;
use crate::observability::{EngineMetrics, StructuredLogger};
use crate::predictor::{
    build_providers, ExperimentRouter, FeaturePipeline, ForecastProvider, ModelRegistry,
    PredictionCache,
};
use crate::telemetry::{
    PrometheusReplicaSource, PrometheusSource, ReplicaSource, StaticReplicaSource,
    TelemetryGateway, TelemetrySource,
};
use std::sync::Arc;
use tracing::info;

pub struct EngineBuilder {
    config: EngineConfig,
    instance_name: String,
    telemetry: Option<Arc<dyn TelemetrySource>>,
    replicas: Option<Arc<dyn ReplicaSource>>,
    providers: Option<Vec<Arc<dyn ForecastProvider>>>,
    health: Option<HealthRegistry>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            instance_name: "predictive-scaler".to_string(),
            telemetry: None,
            replicas: None,
            providers: None,
            health: None,
        }
    }

    pub fn instance_name(mut self, name: impl Into<String>) -> Self {
        self.instance_name = name.into();
        self
    }

    pub fn telemetry(mut self, source: Arc<dyn TelemetrySource>) -> Self {
        self.telemetry = Some(source);
        self
    }

    pub fn replicas(mut self, source: Arc<dyn ReplicaSource>) -> Self {
        self.replicas = Some(source);
        self
    }

    /// Replace the provider set resolved from the availability flags
    pub fn providers(mut self, providers: Vec<Arc<dyn ForecastProvider>>) -> Self {
        self.providers = Some(providers);
        self
    }

    /// Share a health registry with the HTTP layer
    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub async fn build(self) -> Result<ScalingEngine> {
        let config = self.config;
        config.validate()?;

        let seed = config.prediction.seed.unwrap_or_else(rand::random);
        let prometheus_url = config.telemetry.prometheus_url.as_deref();

        let telemetry = match (self.telemetry, prometheus_url) {
            (Some(source), _) => Some(source),
            (None, Some(url)) => Some(Arc::new(PrometheusSource::new(
                url,
                config.telemetry.timeout(),
            )?) as Arc<dyn TelemetrySource>),
            (None, None) => None,
        };
        let replicas: Arc<dyn ReplicaSource> = match (self.replicas, prometheus_url) {
            (Some(source), _) => source,
            (None, Some(url)) => Arc::new(PrometheusReplicaSource::new(
                url,
                config.telemetry.timeout(),
            )?),
            (None, None) => Arc::new(StaticReplicaSource::new(config.policy.default_replicas)),
        };

        let providers = self
            .providers
            .unwrap_or_else(|| build_providers(&config.prediction, config.providers, seed));
        let router = ExperimentRouter::new(config.experiment.clone(), providers, seed)?;

        let health = self.health.unwrap_or_default();
        health.register_all().await;

        let logger = StructuredLogger::new(self.instance_name);
        let engine = ScalingEngine {
            telemetry: TelemetryGateway::new(telemetry, config.telemetry.clone(), seed),
            replicas,
            pipeline: FeaturePipeline::new(),
            registry: ModelRegistry::new(config.prediction.staleness_window()),
            cache: PredictionCache::new(config.prediction.cache_ttl()),
            policy: ScalingPolicy::new(config.policy.clone(), CostModel::new(config.cost.clone())),
            router,
            health,
            metrics: EngineMetrics::new(),
            logger,
            config,
        };

        info!(
            backend = engine.telemetry.has_backend(),
            seeded = engine.config.prediction.seed.is_some(),
            "Engine built"
        );
        engine
            .logger
            .log_startup(env!("CARGO_PKG_VERSION"), &engine.available_providers());
        engine.health.set_ready(true).await;
        Ok(engine)
    }
}
