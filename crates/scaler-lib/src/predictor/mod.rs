//! Forecasting: feature pipeline, providers, registry, routing and caching

mod cache;
mod ensemble;
mod features;
mod heuristic;
mod linalg;
mod linear;
mod output;
mod registry;
mod router;
mod seasonal;
mod sequence;

pub use cache::PredictionCache;
pub use ensemble::{EnsembleProvider, EnsembleState};
pub use features::{
    hour_and_weekday, is_business_hour, mean, std_dev, variance,
    FeaturePipeline, LAG_OFFSETS, ROLLING_WINDOWS,
};
pub use heuristic::HeuristicProvider;
pub use linear::{LinearProvider, LinearState};
pub use output::{OutputFormatter, CONFIDENCE_FLOOR};
pub use registry::{ModelKey, ModelRegistry};
pub use router::{ExperimentRouter, ExperimentStatus};
pub use seasonal::{SeasonalProvider, SeasonalState};
pub use sequence::{SequenceProvider, SequenceState};

use crate::config::{PredictionSettings, ProviderAvailability};
use crate::error::{EngineError, Result};
use crate::models::{
    ConfidenceInterval, DataOrigin, FeatureVector, ForecastResult, PerformanceRecord, ProviderKind,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;

/// Two-sided 90% normal quantile
pub const DEFAULT_INTERVAL_Z: f64 = 1.645;

/// Spacing assumed between samples when the history cannot tell
const DEFAULT_STEP_SECS: i64 = 60;

/// Rows used to judge recent volatility
const VOLATILITY_WINDOW: usize = 10;

/// Fitted parameters, one variant per provider kind
#[derive(Debug, Clone)]
pub enum ModelState {
    Linear(LinearState),
    Ensemble(EnsembleState),
    Seasonal(SeasonalState),
    Sequence(SequenceState),
    Heuristic,
}

/// A trained model owned by one (service, provider) registry entry
#[derive(Debug, Clone)]
pub struct FittedModel {
    pub service: String,
    pub kind: ProviderKind,
    pub trained_at: DateTime<Utc>,
    pub training_rows: usize,
    pub performance: PerformanceRecord,
    pub state: ModelState,
}

/// Output of a provider's fit: parameters plus in-sample error
#[derive(Debug, Clone)]
pub struct Fit {
    pub state: ModelState,
    pub mean_squared_error: f64,
    pub mean_absolute_error: f64,
    /// Variance of the training target, used for the accuracy estimate
    pub target_variance: f64,
}

impl Fit {
    /// Build a fit from in-sample predictions against their targets
    pub fn from_predictions(state: ModelState, predictions: &[f64], targets: &[f64]) -> Self {
        let n = predictions.len().min(targets.len()).max(1) as f64;
        let (sq, abs) = predictions
            .iter()
            .zip(targets)
            .fold((0.0, 0.0), |(sq, abs), (p, t)| {
                (sq + (p - t).powi(2), abs + (p - t).abs())
            });
        Self {
            state,
            mean_squared_error: sq / n,
            mean_absolute_error: abs / n,
            target_variance: features::variance(targets),
        }
    }

    fn accuracy(&self) -> f64 {
        if self.target_variance > 1e-9 {
            (1.0 - self.mean_squared_error / self.target_variance).max(0.0)
        } else if self.mean_squared_error < 1e-9 {
            1.0
        } else {
            0.0
        }
    }
}

/// What a provider needs to produce one point estimate
#[derive(Debug, Clone, Copy)]
pub struct ForecastRequest<'a> {
    /// Most recent feature rows, oldest first
    pub recent: &'a [FeatureVector],
    /// Horizon expressed in sample steps
    pub steps: usize,
    /// Unix time the forecast targets
    pub target_timestamp: i64,
}

impl<'a> ForecastRequest<'a> {
    pub fn new(recent: &'a [FeatureVector], horizon_minutes: u32) -> Self {
        let horizon_secs = i64::from(horizon_minutes) * 60;
        let step = sample_step_secs(recent);
        let steps = ((horizon_secs + step - 1) / step).max(1) as usize;
        let target_timestamp = recent
            .last()
            .map(|row| row.timestamp)
            .unwrap_or_else(|| Utc::now().timestamp())
            + horizon_secs;
        Self {
            recent,
            steps,
            target_timestamp,
        }
    }

    /// Last row, or an error naming the provider
    pub fn last_row(&self, kind: ProviderKind) -> Result<&'a FeatureVector> {
        self.recent
            .last()
            .ok_or_else(|| EngineError::prediction(kind, "no recent feature rows"))
    }
}

/// Median spacing of the row timestamps in seconds
fn sample_step_secs(rows: &[FeatureVector]) -> i64 {
    let mut gaps: Vec<i64> = rows
        .windows(2)
        .map(|w| w[1].timestamp - w[0].timestamp)
        .filter(|gap| *gap > 0)
        .collect();
    if gaps.is_empty() {
        return DEFAULT_STEP_SECS;
    }
    gaps.sort_unstable();
    gaps[gaps.len() / 2]
}

/// CPU column of a run of feature rows
pub fn cpu_series(rows: &[FeatureVector]) -> Vec<f64> {
    rows.iter().map(|row| row.value_or_zero("cpu")).collect()
}

/// Polymorphic forecasting capability
///
/// Implementors provide `fit` and `forecast`; `train` and `predict` add the
/// shared bookkeeping (minimum-sample checks, timing, error statistics,
/// interval and confidence construction).
pub trait ForecastProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Fewest feature rows `train` accepts
    fn min_samples(&self) -> usize;

    /// Confidence reported by a perfectly accurate model of this kind
    fn confidence_baseline(&self) -> f64;

    /// Normal quantile used for the interval half-width
    fn interval_z(&self) -> f64 {
        DEFAULT_INTERVAL_Z
    }

    /// Fit parameters and report in-sample error
    fn fit(&self, rows: &[FeatureVector]) -> Result<Fit>;

    /// Raw point estimate of CPU percent at the request's horizon
    fn forecast(&self, state: &ModelState, request: &ForecastRequest<'_>) -> Result<f64>;

    fn interval(
        &self,
        formatter: &OutputFormatter,
        predicted: f64,
        performance: &PerformanceRecord,
        steps: usize,
    ) -> ConfidenceInterval {
        formatter.interval(
            predicted,
            performance.root_mean_squared_error(),
            self.interval_z(),
            steps,
        )
    }

    fn train(&self, service: &str, rows: &[FeatureVector]) -> Result<FittedModel> {
        let kind = self.kind();
        if rows.len() < self.min_samples() {
            return Err(EngineError::insufficient(kind, self.min_samples(), rows.len()));
        }

        let started = Instant::now();
        let fit = self.fit(rows)?;
        let training_duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        let accuracy_estimate = fit.accuracy();

        Ok(FittedModel {
            service: service.to_string(),
            kind,
            trained_at: Utc::now(),
            training_rows: rows.len(),
            performance: PerformanceRecord {
                provider_kind: kind,
                mean_squared_error: fit.mean_squared_error,
                mean_absolute_error: fit.mean_absolute_error,
                accuracy_estimate,
                training_duration_ms,
                last_prediction_duration_ms: 0.0,
                confidence_baseline: self.confidence_baseline(),
            },
            state: fit.state,
        })
    }

    fn predict(
        &self,
        model: &FittedModel,
        recent: &[FeatureVector],
        horizon_minutes: u32,
    ) -> Result<ForecastResult> {
        let kind = self.kind();
        if model.kind != kind {
            return Err(EngineError::prediction(
                kind,
                format!("model was fitted by {}", model.kind),
            ));
        }

        let started = Instant::now();
        let request = ForecastRequest::new(recent, horizon_minutes);
        let raw = self.forecast(&model.state, &request)?;
        if !raw.is_finite() {
            return Err(EngineError::prediction(kind, "non-finite forecast"));
        }

        let formatter = OutputFormatter::new();
        let predicted_value = formatter.clamp_prediction(raw);
        let confidence_interval =
            self.interval(&formatter, predicted_value, &model.performance, request.steps);

        let cpu = cpu_series(recent);
        let tail = &cpu[cpu.len().saturating_sub(VOLATILITY_WINDOW)..];
        let confidence = formatter.confidence(&model.performance, features::std_dev(tail));

        let mut performance = model.performance.clone();
        performance.last_prediction_duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        Ok(ForecastResult {
            service: model.service.clone(),
            provider_used: kind,
            predicted_value,
            confidence_interval,
            confidence,
            performance,
            horizon_minutes,
            generated_at: Utc::now(),
            recommendation: formatter.recommendation(predicted_value).to_string(),
            reasoning: format!(
                "{} model trained on {} rows predicts {:.1}% CPU in {} min",
                kind, model.training_rows, predicted_value, horizon_minutes
            ),
            degradation: Vec::new(),
            data_origin: DataOrigin::Observed,
        })
    }
}

/// Build the provider set for a deployment
///
/// Linear regression, ensemble and heuristic are always present; the
/// sequence and seasonal providers follow the availability flags.
pub fn build_providers(
    settings: &PredictionSettings,
    availability: ProviderAvailability,
    seed: u64,
) -> Vec<Arc<dyn ForecastProvider>> {
    let mut providers: Vec<Arc<dyn ForecastProvider>> = Vec::new();
    if availability.sequence_model {
        providers.push(Arc::new(SequenceProvider::new(settings.sequence_length)));
    }
    if availability.seasonal {
        providers.push(Arc::new(SeasonalProvider::new()));
    }
    providers.push(Arc::new(LinearProvider::new()));
    providers.push(Arc::new(EnsembleProvider::new(settings.ensemble_trees, seed)));
    providers.push(Arc::new(HeuristicProvider::new()));
    providers
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::models::ResourceSample;

    // 2024-01-01 00:00 UTC, a Monday
    pub const EPOCH: i64 = 1_704_067_200;

    /// Daily-cycle CPU series with a mild deterministic wobble
    pub fn cyclic_samples(count: usize, step_secs: i64) -> Vec<ResourceSample> {
        (0..count)
            .map(|i| {
                let timestamp = EPOCH + i as i64 * step_secs;
                let hour = ((timestamp % 86_400) as f64) / 3600.0;
                let cpu = 40.0 + 15.0 * (hour * std::f64::consts::PI / 12.0).sin()
                    + ((i * 7919) % 13) as f64 * 0.3;
                ResourceSample {
                    timestamp,
                    cpu_percent: cpu,
                    memory_mb: cpu * 1.2,
                    request_rate: cpu / 2.0,
                    response_time_ms: 200.0 - cpu,
                }
            })
            .collect()
    }

    pub fn flat_samples(count: usize, cpu: f64) -> Vec<ResourceSample> {
        (0..count)
            .map(|i| ResourceSample {
                timestamp: EPOCH + 9 * 3600 + i as i64 * 30,
                cpu_percent: cpu,
                memory_mb: cpu * 1.2,
                request_rate: cpu / 2.0,
                response_time_ms: 200.0 - cpu,
            })
            .collect()
    }

    pub fn rows(samples: &[ResourceSample]) -> Vec<FeatureVector> {
        FeaturePipeline::new().enrich(samples).unwrap()
    }
}
