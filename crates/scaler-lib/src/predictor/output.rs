//! Forecast output post-processing
//!
//! Turns a provider's raw point estimate and error statistics into the
//! published interval, confidence and load label.

use crate::models::{ConfidenceInterval, PerformanceRecord};

/// Lowest confidence any forecast reports
pub const CONFIDENCE_FLOOR: f64 = 0.3;

/// Predicted CPU above which the forecast is labelled SCALE_UP
pub const SCALE_UP_THRESHOLD: f64 = 70.0;

/// Predicted CPU below which the forecast is labelled SCALE_DOWN
pub const SCALE_DOWN_THRESHOLD: f64 = 20.0;

/// Recent CPU standard deviation treated as a volatile series
pub const VOLATILITY_THRESHOLD: f64 = 20.0;

/// Confidence multiplier applied to volatile series
pub const VOLATILITY_PENALTY: f64 = 0.7;

/// Cap on interval widening for long horizons
const MAX_HORIZON_FACTOR: f64 = 3.0;

/// Smallest error used when building an interval
const MIN_INTERVAL_ERROR: f64 = 0.5;

/// Formats raw provider output into published forecast fields
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputFormatter;

impl OutputFormatter {
    pub fn new() -> Self {
        Self
    }

    /// Clamp a raw point estimate into the CPU percent range
    pub fn clamp_prediction(&self, raw: f64) -> f64 {
        if raw.is_finite() {
            raw.clamp(0.0, 100.0)
        } else {
            0.0
        }
    }

    /// Symmetric interval of `z · error` widened with the horizon
    ///
    /// Width never decreases as `error` grows; the lower bound is clamped
    /// at zero, which keeps `lower <= predicted`.
    pub fn interval(&self, predicted: f64, error: f64, z: f64, steps: usize) -> ConfidenceInterval {
        let half_width = z * error.max(MIN_INTERVAL_ERROR) * horizon_factor(steps);
        ConfidenceInterval {
            lower: (predicted - half_width).max(0.0),
            upper: predicted + half_width,
        }
    }

    /// Confidence from the model's baseline and in-sample accuracy
    pub fn confidence(&self, performance: &PerformanceRecord, recent_cpu_std: f64) -> f64 {
        let accuracy = performance.accuracy_estimate.clamp(0.0, 1.0);
        let mut confidence = performance.confidence_baseline * (0.5 + 0.5 * accuracy);
        if recent_cpu_std > VOLATILITY_THRESHOLD {
            confidence *= VOLATILITY_PENALTY;
        }
        confidence.clamp(CONFIDENCE_FLOOR, 1.0)
    }

    /// SCALE_UP / SCALE_DOWN / MAINTAIN label for a predicted load
    pub fn recommendation(&self, predicted: f64) -> &'static str {
        if predicted > SCALE_UP_THRESHOLD {
            "SCALE_UP"
        } else if predicted < SCALE_DOWN_THRESHOLD {
            "SCALE_DOWN"
        } else {
            "MAINTAIN"
        }
    }
}

/// Interval growth for multi-step forecasts: sqrt of the step count, capped
fn horizon_factor(steps: usize) -> f64 {
    (steps.max(1) as f64).sqrt().min(MAX_HORIZON_FACTOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProviderKind;

    fn record(accuracy: f64, baseline: f64) -> PerformanceRecord {
        PerformanceRecord {
            provider_kind: ProviderKind::LinearRegression,
            mean_squared_error: 4.0,
            mean_absolute_error: 1.5,
            accuracy_estimate: accuracy,
            training_duration_ms: 1.0,
            last_prediction_duration_ms: 0.0,
            confidence_baseline: baseline,
        }
    }

    #[test]
    fn test_interval_contains_prediction() {
        let formatter = OutputFormatter::new();
        for (pred, err) in [(0.0, 5.0), (3.0, 50.0), (50.0, 0.0), (99.0, 10.0)] {
            let interval = formatter.interval(pred, err, 1.645, 10);
            assert!(interval.contains(pred), "{:?} misses {}", interval, pred);
        }
    }

    #[test]
    fn test_interval_width_monotonic_in_error() {
        let formatter = OutputFormatter::new();
        let mut last = 0.0;
        for err in [0.0, 0.5, 1.0, 2.0, 8.0, 32.0] {
            let width = formatter.interval(60.0, err, 1.645, 1).width();
            assert!(width >= last);
            last = width;
        }
    }

    #[test]
    fn test_interval_widens_with_horizon_until_cap() {
        let formatter = OutputFormatter::new();
        let short = formatter.interval(50.0, 2.0, 1.0, 1).width();
        let long = formatter.interval(50.0, 2.0, 1.0, 9).width();
        let capped = formatter.interval(50.0, 2.0, 1.0, 400).width();
        assert!((long - 3.0 * short).abs() < 1e-9);
        assert!((capped - long).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_floor_and_volatility() {
        let formatter = OutputFormatter::new();
        assert!((formatter.confidence(&record(1.0, 0.8), 2.0) - 0.8).abs() < 1e-9);
        assert!((formatter.confidence(&record(1.0, 0.8), 25.0) - 0.56).abs() < 1e-9);
        assert_eq!(formatter.confidence(&record(0.0, 0.3), 40.0), CONFIDENCE_FLOOR);
    }

    #[test]
    fn test_recommendation_labels() {
        let formatter = OutputFormatter::new();
        assert_eq!(formatter.recommendation(85.0), "SCALE_UP");
        assert_eq!(formatter.recommendation(10.0), "SCALE_DOWN");
        assert_eq!(formatter.recommendation(45.0), "MAINTAIN");
        assert_eq!(formatter.recommendation(70.0), "MAINTAIN");
    }

    #[test]
    fn test_clamp_prediction() {
        let formatter = OutputFormatter::new();
        assert_eq!(formatter.clamp_prediction(-4.0), 0.0);
        assert_eq!(formatter.clamp_prediction(140.0), 100.0);
        assert_eq!(formatter.clamp_prediction(f64::NAN), 0.0);
    }
}
