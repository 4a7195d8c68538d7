//! Decision engine facade
//!
//! Wires telemetry, the feature pipeline, providers, registry, router,
//! cache and policy into the operations the API layer exposes. Engine state
//! is explicit: everything lives in one [`ScalingEngine`] built once at
//! start-up and shared by reference.

mod builder;


pub use builder::EngineBuilder;

use crate::config::EngineConfig;
use crate::cost::{ScalingPolicy, ServiceSnapshot};
use crate::error::{EngineError, Result};
use crate::health::{Component, HealthRegistry};
use crate::models::{
    validate_service_name, CostMetrics, CostTier, DataOrigin, DegradationStep, ExperimentConfig,
    FeatureVector, FleetCostReport, FleetCostSummary, FleetForecast, ForecastResult, ModelSummary,
    ProviderKind, ScalingDecision, ServiceCostAnalysis, ServiceForecast, TrainingFailure,
    TrainingReport,
};
use crate::observability::{EngineMetrics, StructuredLogger};
use crate::predictor::{
    ExperimentRouter, ExperimentStatus, FeaturePipeline, FittedModel, ForecastProvider,
    ModelRegistry, PredictionCache,
};
use crate::telemetry::{ReplicaSource, TelemetryBatch, TelemetryGateway};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

pub struct ScalingEngine {
    config: EngineConfig,
    telemetry: TelemetryGateway,
    replicas: Arc<dyn ReplicaSource>,
    pipeline: FeaturePipeline,
    registry: ModelRegistry,
    router: ExperimentRouter,
    cache: PredictionCache,
    policy: ScalingPolicy,
    health: HealthRegistry,
    metrics: EngineMetrics,
    logger: StructuredLogger,
}

/// Feature rows for a service plus the provenance of their samples
struct PreparedHistory {
    rows: Arc<Vec<FeatureVector>>,
    origin: DataOrigin,
    notes: Vec<String>,
}

impl ScalingEngine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub fn available_providers(&self) -> Vec<ProviderKind> {
        self.router.providers().iter().map(|p| p.kind()).collect()
    }

    /// Forecast CPU for `service` `horizon_minutes` ahead
    ///
    /// Read-through on the prediction cache. On a miss the assigned provider
    /// is tried first and the degradation ladder after it; every rung that
    /// gives way is recorded on the result. Only a failure of the terminal
    /// heuristic rung surfaces as an error.
    pub async fn get_prediction(
        &self,
        service: &str,
        horizon_minutes: u32,
    ) -> Result<ForecastResult> {
        validate_service_name(service)?;
        let horizon = self.resolve_horizon(horizon_minutes)?;

        if let Some(hit) = self.cache.get(service, horizon) {
            self.metrics.inc_cache_hits();
            debug!(service = %service, horizon = horizon, "Prediction cache hit");
            return Ok(hit);
        }
        self.metrics.inc_cache_misses();

        let started = Instant::now();
        let history = self.prepare_history(service).await;
        let assigned = self.router.assign();
        let ladder = self.router.ladder(assigned);

        let mut degradation = Vec::new();
        for kind in ladder {
            match self.try_provider(kind, service, &history, horizon).await {
                Ok(mut forecast) => {
                    forecast.reasoning =
                        compose_reasoning(&forecast.reasoning, assigned, &degradation, &history);
                    forecast.degradation = degradation;
                    forecast.data_origin = history.origin;
                    self.finish_forecast(&forecast, started).await;
                    return Ok(forecast);
                }
                Err(e) => {
                    let reason = e.to_string();
                    self.metrics.inc_degradations(kind);
                    self.logger.log_degradation(service, kind, &reason);
                    degradation.push(DegradationStep { provider: kind, reason });
                }
            }
        }

        let message = format!(
            "every provider failed for {}: {}",
            service,
            degradation
                .iter()
                .map(|s| format!("{} ({})", s.provider, s.reason))
                .collect::<Vec<_>>()
                .join(", ")
        );
        self.health
            .set_unhealthy(Component::Forecaster, message.clone())
            .await;
        Err(EngineError::DecisionUnavailable { message })
    }

    /// Scaling recommendation for `service`; never fails
    pub async fn get_scaling_decision(&self, service: &str) -> ScalingDecision {
        let horizon = self.config.prediction.default_horizon_minutes;
        let (forecast, (current, _), replicas) = tokio::join!(
            self.get_prediction(service, horizon),
            self.telemetry.current(service),
            self.current_replicas(service),
        );
        let snapshot = ServiceSnapshot {
            service,
            current_replicas: replicas,
            current_cpu: current.cpu_percent,
        };

        let decision = match forecast {
            Ok(forecast) => self.policy.decide(snapshot, &forecast),
            Err(e) => {
                warn!(
                    service = %service,
                    error = %e,
                    "Forecast unavailable, emitting neutral decision"
                );
                self.policy.neutral(snapshot, &e.to_string())
            }
        };
        self.metrics.record_decision(&decision);
        self.logger.log_decision(&decision);
        decision
    }

    /// Current and forecast-driven cost for `service`
    pub async fn get_cost_metrics(&self, service: &str) -> Result<CostMetrics> {
        validate_service_name(service)?;
        let horizon = self.config.prediction.default_horizon_minutes;
        let (forecast, (current, _), replicas) = tokio::join!(
            self.get_prediction(service, horizon),
            self.telemetry.current(service),
            self.current_replicas(service),
        );
        let snapshot = ServiceSnapshot {
            service,
            current_replicas: replicas,
            current_cpu: current.cpu_percent,
        };
        Ok(self.policy.cost_metrics(snapshot, &forecast?))
    }

    /// Forecast every configured service; one failure does not stop the rest
    pub async fn predict_all(&self, horizon_minutes: u32) -> Result<FleetForecast> {
        let horizon = self.resolve_horizon(horizon_minutes)?;
        let services = self.fleet()?;

        let mut predictions = Vec::with_capacity(services.len());
        for service in services {
            let entry = match self.get_prediction(service, horizon).await {
                Ok(forecast) => ServiceForecast {
                    service: service.clone(),
                    forecast: Some(forecast),
                    error: None,
                },
                Err(e) => ServiceForecast {
                    service: service.clone(),
                    forecast: None,
                    error: Some(e.to_string()),
                },
            };
            predictions.push(entry);
        }

        Ok(FleetForecast {
            horizon_minutes: horizon,
            predictions,
            generated_at: Utc::now(),
        })
    }

    /// Cost metrics and decision for every configured service, with totals
    /// over the services whose costs could be computed
    pub async fn cost_analysis_all(&self) -> Result<FleetCostReport> {
        let services = self.fleet()?;

        let mut analyses = Vec::with_capacity(services.len());
        for service in services {
            // The decision warms the prediction cache the cost view reads
            let decision = self.get_scaling_decision(service).await;
            let (cost_metrics, error) = match self.get_cost_metrics(service).await {
                Ok(metrics) => (Some(metrics), None),
                Err(e) => (None, Some(e.to_string())),
            };
            analyses.push(ServiceCostAnalysis {
                service: service.clone(),
                cost_metrics,
                decision,
                error,
            });
        }

        let failed = analyses.iter().filter(|a| a.cost_metrics.is_none()).count();
        let summary = FleetCostSummary::from_metrics(
            analyses.iter().filter_map(|a| a.cost_metrics.as_ref()),
            failed,
        );
        self.logger.log_fleet_costs(&summary);

        Ok(FleetCostReport {
            services: analyses,
            summary,
            generated_at: Utc::now(),
        })
    }

    pub fn get_experiment_status(&self) -> ExperimentStatus {
        self.router.status()
    }

    /// Validate and swap the experiment; the previous one stays on error
    pub fn reload_experiment(&self, config: ExperimentConfig) -> Result<ExperimentStatus> {
        let detail = format!("{:?}", config.traffic_split);
        match self.router.reload(config) {
            Ok(()) => {
                self.logger.log_experiment_reload(true, &detail);
                Ok(self.router.status())
            }
            Err(e) => {
                self.logger.log_experiment_reload(false, &e.to_string());
                Err(e)
            }
        }
    }

    /// Drop the model for (service, kind) and train a replacement now
    ///
    /// Cached forecasts of the service are dropped as well. Training errors
    /// are returned to the caller.
    pub async fn retrain(&self, service: &str, kind: ProviderKind) -> Result<ModelSummary> {
        validate_service_name(service)?;
        let provider = self
            .router
            .provider(kind)
            .ok_or(EngineError::ProviderUnavailable { provider: kind })?;
        self.registry.invalidate(service, kind);
        self.cache.invalidate_service(service);

        let history = self.prepare_history(service).await;
        let model = self.train(provider, service, &history).await?;
        Ok(self.summarize(&model))
    }

    /// Train every deployed provider for `service`
    ///
    /// Per-provider failures are listed in the report; only a malformed
    /// service name is an error.
    pub async fn train_all(&self, service: &str) -> Result<TrainingReport> {
        validate_service_name(service)?;
        let history = self.prepare_history(service).await;
        self.cache.invalidate_service(service);

        let mut trained = Vec::new();
        let mut failed = Vec::new();
        for provider in self.router.providers() {
            let kind = provider.kind();
            match self.train(Arc::clone(provider), service, &history).await {
                Ok(model) => trained.push(self.summarize(&model)),
                Err(e) => failed.push(TrainingFailure {
                    provider: kind,
                    error: e.to_string(),
                }),
            }
        }

        Ok(TrainingReport {
            service: service.to_string(),
            samples: history.rows.len(),
            data_origin: history.origin,
            trained,
            failed,
        })
    }

    /// Every fitted model with its performance and staleness
    pub fn model_performance(&self) -> Vec<ModelSummary> {
        self.registry.snapshot()
    }

    pub fn cost_tiers(&self) -> Vec<CostTier> {
        self.policy.cost_model().tiers().to_vec()
    }

    pub async fn shutdown(&self, reason: &str) {
        self.health.set_ready(false).await;
        self.logger.log_shutdown(reason);
    }

    /// 0 means the configured default; anything above the maximum is rejected
    fn resolve_horizon(&self, horizon_minutes: u32) -> Result<u32> {
        let settings = &self.config.prediction;
        match horizon_minutes {
            0 => Ok(settings.default_horizon_minutes),
            h if h > settings.max_horizon_minutes => Err(EngineError::invalid_request(format!(
                "horizon {} minutes exceeds the maximum of {}",
                h, settings.max_horizon_minutes
            ))),
            h => Ok(h),
        }
    }

    fn fleet(&self) -> Result<&[String]> {
        if self.config.services.is_empty() {
            return Err(EngineError::invalid_config(
                "no services configured for fleet operations",
            ));
        }
        Ok(&self.config.services)
    }

    async fn try_provider(
        &self,
        kind: ProviderKind,
        service: &str,
        history: &PreparedHistory,
        horizon: u32,
    ) -> Result<ForecastResult> {
        let provider = self
            .router
            .provider(kind)
            .ok_or(EngineError::ProviderUnavailable { provider: kind })?;

        // Missing or stale models get one synchronous retrain
        let model = match self.registry.fresh(service, kind) {
            Some(model) => model,
            None => self.train(Arc::clone(&provider), service, history).await?,
        };

        let forecast = provider.predict(&model, &history.rows, horizon)?;
        self.registry.record_prediction(
            service,
            kind,
            forecast.performance.last_prediction_duration_ms,
        );
        Ok(forecast)
    }

    async fn train(
        &self,
        provider: Arc<dyn ForecastProvider>,
        service: &str,
        history: &PreparedHistory,
    ) -> Result<Arc<FittedModel>> {
        let kind = provider.kind();
        match self
            .registry
            .train_coalesced(provider, service, Arc::clone(&history.rows))
            .await
        {
            Ok(model) => {
                let perf = &model.performance;
                self.metrics
                    .observe_training(kind, perf.training_duration_ms / 1000.0);
                self.logger.log_model_trained(
                    service,
                    kind,
                    model.training_rows,
                    perf.training_duration_ms,
                    perf.accuracy_estimate,
                );
                Ok(model)
            }
            Err(e) => {
                self.metrics.inc_training_failures(kind);
                self.logger.log_training_failed(service, kind, &e.to_string());
                Err(e)
            }
        }
    }

    async fn prepare_history(&self, service: &str) -> PreparedHistory {
        let TelemetryBatch {
            samples,
            origin,
            notes,
        } = self.telemetry.history(service).await;

        match origin {
            DataOrigin::Synthetic => {
                let reason = notes.join("; ");
                self.metrics.inc_telemetry_fallbacks();
                self.logger.log_telemetry_fallback(service, &reason);
                self.health
                    .set_degraded(Component::Telemetry, format!("synthetic data: {}", reason))
                    .await;
            }
            DataOrigin::Partial => {
                self.health
                    .set_degraded(Component::Telemetry, notes.join("; "))
                    .await;
            }
            DataOrigin::Observed => self.health.set_healthy(Component::Telemetry).await,
        }

        // Empty history leaves only the heuristic rung able to serve
        let rows = self.pipeline.enrich(&samples).unwrap_or_else(|e| {
            debug!(service = %service, error = %e, "No feature rows");
            Vec::new()
        });
        PreparedHistory {
            rows: Arc::new(rows),
            origin,
            notes,
        }
    }

    async fn current_replicas(&self, service: &str) -> u32 {
        let timeout = self.config.telemetry.timeout();
        let fallback = self.config.policy.default_replicas;
        match tokio::time::timeout(timeout, self.replicas.current_replicas(service)).await {
            Ok(Ok(count)) => count,
            Ok(Err(e)) => {
                warn!(
                    service = %service,
                    error = %e,
                    fallback = fallback,
                    "Replica count unavailable"
                );
                fallback
            }
            Err(_) => {
                warn!(service = %service, fallback = fallback, "Replica count timed out");
                fallback
            }
        }
    }

    async fn finish_forecast(&self, forecast: &ForecastResult, started: Instant) {
        if forecast.is_degraded() {
            self.health
                .set_degraded(
                    Component::Forecaster,
                    format!("served by {}", forecast.provider_used),
                )
                .await;
        } else {
            self.health.set_healthy(Component::Forecaster).await;
        }
        self.metrics
            .observe_forecast(forecast.provider_used, started.elapsed().as_secs_f64());
        self.logger.log_forecast(forecast);
        self.cache.insert(forecast.clone());
    }

    fn summarize(&self, model: &FittedModel) -> ModelSummary {
        ModelSummary {
            service: model.service.clone(),
            provider: model.kind,
            trained_at: model.trained_at,
            stale: self.registry.is_stale(model),
            performance: model.performance.clone(),
        }
    }
}

/// Provider reasoning plus the degradation chain and data provenance
fn compose_reasoning(
    base: &str,
    assigned: ProviderKind,
    degradation: &[DegradationStep],
    history: &PreparedHistory,
) -> String {
    let mut reasoning = base.to_string();
    if !degradation.is_empty() {
        let chain: Vec<String> = degradation
            .iter()
            .map(|step| format!("{} ({})", step.provider, step.reason))
            .collect();
        reasoning.push_str(&format!(
            "; degraded from assigned {}: {}",
            assigned,
            chain.join(" -> ")
        ));
    }
    match history.origin {
        DataOrigin::Synthetic => reasoning.push_str(&format!(
            "; synthetic fallback data used ({})",
            history.notes.join("; ")
        )),
        DataOrigin::Partial => reasoning.push_str("; some metrics derived from CPU"),
        DataOrigin::Observed => {}
    }
    reasoning
}
