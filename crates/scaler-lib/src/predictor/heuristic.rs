//! Time-of-day heuristic, the terminal rung of the degradation ladder
//!
//! Needs no history and cannot fail: it answers a fixed busy-hours or
//! off-hours baseline with the confidence floor.

use super::features::hour_and_weekday;
use super::output::{OutputFormatter, CONFIDENCE_FLOOR};
use super::{Fit, ForecastProvider, ForecastRequest, ModelState};
use crate::error::Result;
use crate::models::{ConfidenceInterval, FeatureVector, PerformanceRecord, ProviderKind};

/// Baseline CPU percent between 08:00 and 18:59
pub const BUSY_HOURS_CPU: f64 = 35.0;

/// Baseline CPU percent outside busy hours
pub const QUIET_HOURS_CPU: f64 = 15.0;

/// Error the heuristic assumes for itself
const ASSUMED_ERROR: f64 = 10.0;

/// Relative half-width of the reported interval
const INTERVAL_SPREAD: f64 = 0.2;

#[derive(Debug, Clone, Default)]
pub struct HeuristicProvider;

impl HeuristicProvider {
    pub fn new() -> Self {
        Self
    }

    /// Baseline for the hour a forecast targets
    pub fn baseline_at(timestamp: i64) -> f64 {
        let (hour, _) = hour_and_weekday(timestamp);
        if (8..=18).contains(&hour) {
            BUSY_HOURS_CPU
        } else {
            QUIET_HOURS_CPU
        }
    }
}

impl ForecastProvider for HeuristicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Heuristic
    }

    fn min_samples(&self) -> usize {
        0
    }

    fn confidence_baseline(&self) -> f64 {
        CONFIDENCE_FLOOR
    }

    fn fit(&self, _rows: &[FeatureVector]) -> Result<Fit> {
        Ok(Fit {
            state: ModelState::Heuristic,
            mean_squared_error: ASSUMED_ERROR * ASSUMED_ERROR,
            mean_absolute_error: ASSUMED_ERROR,
            target_variance: 0.0,
        })
    }

    fn forecast(&self, _state: &ModelState, request: &ForecastRequest<'_>) -> Result<f64> {
        Ok(Self::baseline_at(request.target_timestamp))
    }

    fn interval(
        &self,
        _formatter: &OutputFormatter,
        predicted: f64,
        _performance: &PerformanceRecord,
        _steps: usize,
    ) -> ConfidenceInterval {
        ConfidenceInterval {
            lower: predicted * (1.0 - INTERVAL_SPREAD),
            upper: predicted * (1.0 + INTERVAL_SPREAD),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn test_trains_and_predicts_without_history() {
        let provider = HeuristicProvider::new();
        let model = provider.train("cold-start", &[]).unwrap();
        let forecast = provider.predict(&model, &[], 5).unwrap();
        assert!(
            forecast.predicted_value == BUSY_HOURS_CPU
                || forecast.predicted_value == QUIET_HOURS_CPU
        );
        assert_eq!(forecast.confidence, CONFIDENCE_FLOOR);
        assert_eq!(model.performance.accuracy_estimate, 0.0);
    }

    #[test]
    fn test_busy_and_quiet_hours() {
        assert_eq!(HeuristicProvider::baseline_at(EPOCH + 10 * 3600), BUSY_HOURS_CPU);
        assert_eq!(HeuristicProvider::baseline_at(EPOCH + 18 * 3600), BUSY_HOURS_CPU);
        assert_eq!(HeuristicProvider::baseline_at(EPOCH + 3 * 3600), QUIET_HOURS_CPU);
        assert_eq!(HeuristicProvider::baseline_at(EPOCH + 20 * 3600), QUIET_HOURS_CPU);
    }

    #[test]
    fn test_interval_is_twenty_percent_each_side() {
        let provider = HeuristicProvider::new();
        let data = rows(&flat_samples(5, 90.0));
        let model = provider.train("svc", &data).unwrap();
        let forecast = provider.predict(&model, &data, 5).unwrap();
        // flat_samples start at 09:00, so the target is inside busy hours
        assert_eq!(forecast.predicted_value, BUSY_HOURS_CPU);
        assert!((forecast.confidence_interval.lower - 28.0).abs() < 1e-9);
        assert!((forecast.confidence_interval.upper - 42.0).abs() < 1e-9);
    }

    #[test]
    fn test_volatile_history_keeps_floor_confidence() {
        let mut samples = flat_samples(12, 10.0);
        for (i, s) in samples.iter_mut().enumerate() {
            s.cpu_percent = if i % 2 == 0 { 5.0 } else { 95.0 };
        }
        let data = rows(&samples);
        let provider = HeuristicProvider::new();
        let model = provider.train("svc", &data).unwrap();
        let forecast = provider.predict(&model, &data, 5).unwrap();
        assert_eq!(forecast.confidence, CONFIDENCE_FLOOR);
    }
}
