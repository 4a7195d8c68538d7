//! Observability infrastructure for the decision engine
//!
//! Provides:
//! - Prometheus metrics (prediction and training latency, provider usage,
//!   degradations, cache efficiency, telemetry fallbacks, decisions)
//! - Structured JSON logging with tracing

use crate::models::{FleetCostSummary, ForecastResult, ProviderKind, RiskLevel, ScalingDecision};
use prometheus::{
    register_gauge_vec, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge_vec, GaugeVec, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
];

/// Global metrics instance (registered once); `None` if registration failed
static GLOBAL_METRICS: OnceLock<Option<EngineMetricsInner>> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct EngineMetricsInner {
    prediction_latency_seconds: HistogramVec,
    training_latency_seconds: HistogramVec,
    forecasts_total: IntCounterVec,
    degradations_total: IntCounterVec,
    training_failures_total: IntCounterVec,
    cache_hits_total: IntCounter,
    cache_misses_total: IntCounter,
    telemetry_fallbacks_total: IntCounter,
    decisions_total: IntCounterVec,
    predicted_cpu_percent: GaugeVec,
    recommended_replicas: IntGaugeVec,
}

impl EngineMetricsInner {
    fn new() -> prometheus::Result<Self> {
        Ok(Self {
            prediction_latency_seconds: register_histogram_vec!(
                "predictive_scaler_prediction_latency_seconds",
                "Time spent producing a forecast, by provider",
                &["provider"],
                LATENCY_BUCKETS.to_vec()
            )?,

            training_latency_seconds: register_histogram_vec!(
                "predictive_scaler_training_latency_seconds",
                "Time spent fitting a model, by provider",
                &["provider"],
                LATENCY_BUCKETS.to_vec()
            )?,

            forecasts_total: register_int_counter_vec!(
                "predictive_scaler_forecasts_total",
                "Forecasts produced, by the provider that produced them",
                &["provider"]
            )?,

            degradations_total: register_int_counter_vec!(
                "predictive_scaler_degradations_total",
                "Ladder rungs skipped, by the provider that could not serve",
                &["provider"]
            )?,

            training_failures_total: register_int_counter_vec!(
                "predictive_scaler_training_failures_total",
                "Failed training attempts, by provider",
                &["provider"]
            )?,

            cache_hits_total: register_int_counter!(
                "predictive_scaler_cache_hits_total",
                "Prediction cache hits"
            )?,

            cache_misses_total: register_int_counter!(
                "predictive_scaler_cache_misses_total",
                "Prediction cache misses"
            )?,

            telemetry_fallbacks_total: register_int_counter!(
                "predictive_scaler_telemetry_fallbacks_total",
                "Requests served from synthetic telemetry"
            )?,

            decisions_total: register_int_counter_vec!(
                "predictive_scaler_decisions_total",
                "Scaling decisions emitted, by risk level",
                &["risk"]
            )?,

            predicted_cpu_percent: register_gauge_vec!(
                "predictive_scaler_predicted_cpu_percent",
                "Most recent predicted CPU utilization per service",
                &["service"]
            )?,

            recommended_replicas: register_int_gauge_vec!(
                "predictive_scaler_recommended_replicas",
                "Most recent recommended replica count per service",
                &["service"]
            )?,
        })
    }
}

/// Engine metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share the
/// same underlying collectors. If registration failed every call is a no-op.
#[derive(Clone)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    /// Create a new metrics handle (registers global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(|| match EngineMetricsInner::new() {
            Ok(inner) => Some(inner),
            Err(e) => {
                warn!(error = %e, "Failed to register engine metrics");
                None
            }
        });
        Self { _private: () }
    }

    fn inner(&self) -> Option<&EngineMetricsInner> {
        GLOBAL_METRICS.get().and_then(Option::as_ref)
    }

    pub fn is_registered(&self) -> bool {
        self.inner().is_some()
    }

    /// Record a forecast served by `provider`
    pub fn observe_forecast(&self, provider: ProviderKind, duration_secs: f64) {
        if let Some(m) = self.inner() {
            m.prediction_latency_seconds
                .with_label_values(&[provider.as_str()])
                .observe(duration_secs);
            m.forecasts_total
                .with_label_values(&[provider.as_str()])
                .inc();
        }
    }

    pub fn observe_training(&self, provider: ProviderKind, duration_secs: f64) {
        if let Some(m) = self.inner() {
            m.training_latency_seconds
                .with_label_values(&[provider.as_str()])
                .observe(duration_secs);
        }
    }

    pub fn inc_training_failures(&self, provider: ProviderKind) {
        if let Some(m) = self.inner() {
            m.training_failures_total
                .with_label_values(&[provider.as_str()])
                .inc();
        }
    }

    pub fn inc_degradations(&self, provider: ProviderKind) {
        if let Some(m) = self.inner() {
            m.degradations_total
                .with_label_values(&[provider.as_str()])
                .inc();
        }
    }

    pub fn inc_cache_hits(&self) {
        if let Some(m) = self.inner() {
            m.cache_hits_total.inc();
        }
    }

    pub fn inc_cache_misses(&self) {
        if let Some(m) = self.inner() {
            m.cache_misses_total.inc();
        }
    }

    pub fn inc_telemetry_fallbacks(&self) {
        if let Some(m) = self.inner() {
            m.telemetry_fallbacks_total.inc();
        }
    }

    /// Record a decision and the per-service gauges it implies
    pub fn record_decision(&self, decision: &ScalingDecision) {
        if let Some(m) = self.inner() {
            m.decisions_total
                .with_label_values(&[risk_label(decision.risk_level)])
                .inc();
            m.recommended_replicas
                .with_label_values(&[decision.service.as_str()])
                .set(i64::from(decision.recommended_replicas));
            if let Some(forecast) = &decision.forecast {
                m.predicted_cpu_percent
                    .with_label_values(&[decision.service.as_str()])
                    .set(forecast.predicted_value);
            }
        }
    }
}

fn risk_label(risk: RiskLevel) -> &'static str {
    match risk {
        RiskLevel::Low => "low",
        RiskLevel::Medium => "medium",
        RiskLevel::High => "high",
    }
}

/// Structured logger for engine events
///
/// Every event carries a fixed `event` field so log pipelines can filter
/// on it regardless of message wording.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Log a forecast leaving the engine (not cache hits)
    pub fn log_forecast(&self, forecast: &ForecastResult) {
        info!(
            event = "forecast_generated",
            instance = %self.instance,
            service = %forecast.service,
            provider = %forecast.provider_used,
            predicted_cpu = forecast.predicted_value,
            lower = forecast.confidence_interval.lower,
            upper = forecast.confidence_interval.upper,
            confidence = forecast.confidence,
            horizon_minutes = forecast.horizon_minutes,
            degraded = forecast.is_degraded(),
            data_origin = ?forecast.data_origin,
            "Generated CPU forecast"
        );
    }

    /// Log one rung of the ladder giving way to the next
    pub fn log_degradation(&self, service: &str, provider: ProviderKind, reason: &str) {
        warn!(
            event = "provider_degraded",
            instance = %self.instance,
            service = %service,
            provider = %provider,
            reason = %reason,
            "Provider could not serve, trying next rung"
        );
    }

    pub fn log_model_trained(
        &self,
        service: &str,
        provider: ProviderKind,
        rows: usize,
        duration_ms: f64,
        accuracy: f64,
    ) {
        info!(
            event = "model_trained",
            instance = %self.instance,
            service = %service,
            provider = %provider,
            rows = rows,
            duration_ms = duration_ms,
            accuracy = accuracy,
            "Model trained"
        );
    }

    pub fn log_training_failed(&self, service: &str, provider: ProviderKind, error: &str) {
        // Expected for data-hungry providers on short histories
        debug!(
            event = "training_failed",
            instance = %self.instance,
            service = %service,
            provider = %provider,
            error = %error,
            "Model training failed"
        );
    }

    pub fn log_telemetry_fallback(&self, service: &str, reason: &str) {
        warn!(
            event = "telemetry_fallback",
            instance = %self.instance,
            service = %service,
            reason = %reason,
            "Using synthetic telemetry"
        );
    }

    pub fn log_decision(&self, decision: &ScalingDecision) {
        info!(
            event = "scaling_decision",
            instance = %self.instance,
            service = %decision.service,
            current_replicas = decision.current_replicas,
            recommended_replicas = decision.recommended_replicas,
            tier = %decision.recommended_tier,
            cost_impact_per_hour = decision.cost_impact_per_hour,
            risk = %decision.risk_level,
            rule = ?decision.rule,
            confidence = decision.confidence,
            "Scaling decision made"
        );
    }

    pub fn log_experiment_reload(&self, accepted: bool, detail: &str) {
        if accepted {
            info!(
                event = "experiment_reloaded",
                instance = %self.instance,
                split = %detail,
                "Experiment configuration reloaded"
            );
        } else {
            warn!(
                event = "experiment_reloaded",
                instance = %self.instance,
                error = %detail,
                "Experiment reload rejected, keeping previous configuration"
            );
        }
    }

    pub fn log_startup(&self, version: &str, providers: &[ProviderKind]) {
        let providers: Vec<&str> = providers.iter().map(|p| p.as_str()).collect();
        info!(
            event = "engine_started",
            instance = %self.instance,
            version = %version,
            providers = ?providers,
            "Decision engine started"
        );
    }

    pub fn log_fleet_costs(&self, summary: &FleetCostSummary) {
        info!(
            event = "fleet_cost_analysis",
            instance = %self.instance,
            services = summary.services_analyzed,
            failed = summary.services_failed,
            current_cost_per_hour = summary.total_current_cost_per_hour,
            predicted_cost_per_hour = summary.total_predicted_cost_per_hour,
            savings_per_hour = summary.total_savings_per_hour,
            "Fleet cost analysis completed"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "engine_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Decision engine shutting down"
        );
    }
}
