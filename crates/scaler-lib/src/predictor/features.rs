//! Feature pipeline
//!
//! Turns an ordered run of resource samples into one feature vector per
//! sample: calendar context, rolling CPU statistics, lags, rates of change
//! and cross-signal interactions. Rows that lack a full window are filled
//! back-then-forward instead of being dropped, so row `i` always lines up
//! with sample `i`.

use crate::error::{EngineError, Result};
use crate::models::{FeatureVector, ResourceSample};
use chrono::{DateTime, Datelike, Timelike};

/// Rolling window sizes applied to the CPU signal
pub const ROLLING_WINDOWS: [usize; 3] = [5, 10, 20];

/// Lag offsets applied to CPU and request rate
pub const LAG_OFFSETS: [usize; 4] = [1, 2, 3, 5];

/// First business hour (inclusive)
pub const BUSINESS_HOURS_START: u32 = 9;

/// Last business hour (inclusive)
pub const BUSINESS_HOURS_END: u32 = 17;

const SUBJECT: &str = "feature_pipeline";

/// Stateless sample-to-feature transformer
#[derive(Debug, Clone, Copy, Default)]
pub struct FeaturePipeline;

/// One named column under construction; `None` marks a missing value
struct Column {
    name: String,
    values: Vec<Option<f64>>,
}

impl Column {
    fn new(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    fn complete(name: impl Into<String>, values: impl Iterator<Item = f64>) -> Self {
        Self::new(name, values.map(Some).collect())
    }

    /// Back-fill, then forward-fill, then zero anything left
    fn fill(self) -> (String, Vec<f64>) {
        let mut values = self.values;
        let mut next = None;
        for v in values.iter_mut().rev() {
            match *v {
                Some(x) if x.is_finite() => next = Some(x),
                _ => *v = next,
            }
        }
        let mut prev = None;
        for v in values.iter_mut() {
            match *v {
                Some(x) => prev = Some(x),
                None => *v = prev,
            }
        }
        (
            self.name,
            values.into_iter().map(|v| v.unwrap_or(0.0)).collect(),
        )
    }
}

impl FeaturePipeline {
    pub fn new() -> Self {
        Self
    }

    /// Enrich samples into feature vectors of the same length
    ///
    /// Fails only on an empty input.
    pub fn enrich(&self, samples: &[ResourceSample]) -> Result<Vec<FeatureVector>> {
        if samples.is_empty() {
            return Err(EngineError::insufficient(SUBJECT, 1, 0));
        }

        let cpu: Vec<f64> = samples.iter().map(|s| s.cpu_percent).collect();
        let requests: Vec<f64> = samples.iter().map(|s| s.request_rate).collect();

        let mut columns = vec![
            Column::complete("cpu", cpu.iter().copied()),
            Column::complete("memory_mb", samples.iter().map(|s| s.memory_mb)),
            Column::complete("request_rate", requests.iter().copied()),
            Column::complete("response_time_ms", samples.iter().map(|s| s.response_time_ms)),
        ];
        columns.extend(calendar_columns(samples));

        for window in ROLLING_WINDOWS {
            columns.push(Column::new(
                format!("cpu_rolling_mean_{}", window),
                rolling(&cpu, window, mean),
            ));
            columns.push(Column::new(
                format!("cpu_rolling_std_{}", window),
                rolling(&cpu, window, std_dev),
            ));
            columns.push(Column::new(
                format!("cpu_rolling_max_{}", window),
                rolling(&cpu, window, max),
            ));
        }

        for offset in LAG_OFFSETS {
            columns.push(Column::new(format!("cpu_lag_{}", offset), lag(&cpu, offset)));
            columns.push(Column::new(
                format!("requests_lag_{}", offset),
                lag(&requests, offset),
            ));
        }

        columns.push(Column::new("cpu_rate_of_change", first_difference(&cpu)));
        columns.push(Column::new(
            "requests_rate_of_change",
            first_difference(&requests),
        ));
        columns.push(Column::complete(
            "cpu_requests_ratio",
            cpu.iter().zip(&requests).map(|(c, r)| c / (r + 1.0)),
        ));
        columns.push(Column::complete(
            "load_factor",
            cpu.iter().zip(&requests).map(|(c, r)| c * r / 100.0),
        ));

        let filled: Vec<(String, Vec<f64>)> = columns.into_iter().map(Column::fill).collect();

        Ok(samples
            .iter()
            .enumerate()
            .map(|(i, sample)| {
                let mut row = FeatureVector::with_capacity(sample.timestamp, filled.len());
                for (name, values) in &filled {
                    row.insert(name.as_str(), values[i]);
                }
                row
            })
            .collect())
    }

    /// Number of leading rows whose rolling or lag features were back-filled
    pub fn warmup_rows() -> usize {
        ROLLING_WINDOWS
            .iter()
            .copied()
            .max()
            .unwrap_or(0)
            .saturating_sub(1)
            .max(LAG_OFFSETS.iter().copied().max().unwrap_or(0))
    }
}

fn calendar_columns(samples: &[ResourceSample]) -> Vec<Column> {
    let mut hour = Vec::with_capacity(samples.len());
    let mut day = Vec::with_capacity(samples.len());
    let mut weekend = Vec::with_capacity(samples.len());
    let mut business = Vec::with_capacity(samples.len());

    for sample in samples {
        let (h, d) = hour_and_weekday(sample.timestamp);
        hour.push(h as f64);
        day.push(d as f64);
        weekend.push(flag(d >= 5));
        business.push(flag(is_business_hour(h)));
    }

    vec![
        Column::complete("hour", hour.into_iter()),
        Column::complete("day_of_week", day.into_iter()),
        Column::complete("is_weekend", weekend.into_iter()),
        Column::complete("is_business_hours", business.into_iter()),
    ]
}

/// Hour of day and day of week (Monday = 0) for a Unix timestamp
pub fn hour_and_weekday(timestamp: i64) -> (u32, u32) {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| (dt.hour(), dt.weekday().num_days_from_monday()))
        .unwrap_or((0, 0))
}

pub fn is_business_hour(hour: u32) -> bool {
    (BUSINESS_HOURS_START..=BUSINESS_HOURS_END).contains(&hour)
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

fn rolling(values: &[f64], window: usize, stat: fn(&[f64]) -> f64) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| (i + 1 >= window).then(|| stat(&values[i + 1 - window..=i])))
        .collect()
}

fn lag(values: &[f64], offset: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| (i >= offset).then(|| values[i - offset]))
        .collect()
}

fn first_difference(values: &[f64]) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| (i >= 1).then(|| values[i] - values[i - 1]))
        .collect()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance (n - 1 denominator)
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    sum_sq / (values.len() - 1) as f64
}

pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-01-01 was a Monday
    const MONDAY_MIDNIGHT: i64 = 1_704_067_200;

    fn samples(cpu: &[f64], step_secs: i64) -> Vec<ResourceSample> {
        cpu.iter()
            .enumerate()
            .map(|(i, c)| ResourceSample {
                timestamp: MONDAY_MIDNIGHT + i as i64 * step_secs,
                cpu_percent: *c,
                memory_mb: c * 1.2,
                request_rate: c / 2.0,
                response_time_ms: 200.0 - c,
            })
            .collect()
    }

    #[test]
    fn test_empty_input_is_insufficient() {
        let err = FeaturePipeline::new().enrich(&[]).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData { available: 0, .. }));
    }

    #[test]
    fn test_output_length_matches_and_has_no_nan() {
        for n in [1usize, 3, 7, 25, 60] {
            let cpu: Vec<f64> = (0..n).map(|i| 10.0 + (i as f64 * 0.7).sin() * 5.0).collect();
            let rows = FeaturePipeline::new().enrich(&samples(&cpu, 60)).unwrap();
            assert_eq!(rows.len(), n);
            for row in &rows {
                assert!(row.values().all(|v| v.is_finite()), "n = {}", n);
            }
        }
    }

    #[test]
    fn test_single_sample_has_every_feature() {
        let rows = FeaturePipeline::new().enrich(&samples(&[42.0], 60)).unwrap();
        let row = &rows[0];
        // Nothing to fill a lag from, so it falls back to zero
        assert_eq!(row.get("cpu_lag_1"), Some(0.0));
        assert_eq!(row.get("cpu_rolling_mean_5"), Some(0.0));
        assert_eq!(row.get("cpu_rolling_std_5"), Some(0.0));
        assert_eq!(row.get("cpu_rate_of_change"), Some(0.0));
        assert!(row.get("cpu_rolling_max_20").is_some());
    }

    #[test]
    fn test_calendar_features() {
        // Monday 10:00 and Saturday 22:00
        let ts = [MONDAY_MIDNIGHT + 10 * 3600, MONDAY_MIDNIGHT + 5 * 86400 + 22 * 3600];
        let input: Vec<ResourceSample> = ts
            .iter()
            .map(|t| ResourceSample {
                timestamp: *t,
                cpu_percent: 10.0,
                memory_mb: 12.0,
                request_rate: 5.0,
                response_time_ms: 190.0,
            })
            .collect();
        let rows = FeaturePipeline::new().enrich(&input).unwrap();
        assert_eq!(rows[0].get("hour"), Some(10.0));
        assert_eq!(rows[0].get("day_of_week"), Some(0.0));
        assert_eq!(rows[0].get("is_weekend"), Some(0.0));
        assert_eq!(rows[0].get("is_business_hours"), Some(1.0));
        assert_eq!(rows[1].get("day_of_week"), Some(5.0));
        assert_eq!(rows[1].get("is_weekend"), Some(1.0));
        assert_eq!(rows[1].get("is_business_hours"), Some(0.0));
    }

    #[test]
    fn test_rolling_and_lag_values() {
        let cpu: Vec<f64> = (1..=10).map(|i| i as f64).collect();
        let rows = FeaturePipeline::new().enrich(&samples(&cpu, 60)).unwrap();
        let last = &rows[9];
        assert_eq!(last.get("cpu_rolling_mean_5"), Some(8.0));
        assert_eq!(last.get("cpu_rolling_max_5"), Some(10.0));
        assert!((last.value_or_zero("cpu_rolling_std_5") - 2.5f64.sqrt()).abs() < 1e-9);
        assert_eq!(last.get("cpu_lag_1"), Some(9.0));
        assert_eq!(last.get("cpu_lag_5"), Some(5.0));
        assert_eq!(last.get("cpu_rate_of_change"), Some(1.0));
        assert_eq!(last.get("requests_lag_2"), Some(4.0));
    }

    #[test]
    fn test_interaction_guards_zero_requests() {
        let mut input = samples(&[30.0], 60);
        input[0].request_rate = 0.0;
        let rows = FeaturePipeline::new().enrich(&input).unwrap();
        assert_eq!(rows[0].get("cpu_requests_ratio"), Some(30.0));
        assert_eq!(rows[0].get("load_factor"), Some(0.0));
    }

    #[test]
    fn test_no_lookahead_after_warmup() {
        let cpu: Vec<f64> = (0..60).map(|i| 20.0 + (i % 7) as f64).collect();
        let full = FeaturePipeline::new().enrich(&samples(&cpu, 60)).unwrap();

        // Truncating the future must not change any row past the warmup region
        for cut in [30usize, 45] {
            let prefix = FeaturePipeline::new()
                .enrich(&samples(&cpu[..cut], 60))
                .unwrap();
            for i in FeaturePipeline::warmup_rows()..cut {
                assert_eq!(prefix[i], full[i], "row {} differs with cut {}", i, cut);
            }
        }
    }

    #[test]
    fn test_feature_order_is_stable() {
        let a = FeaturePipeline::new().enrich(&samples(&[1.0, 2.0], 60)).unwrap();
        let b = FeaturePipeline::new()
            .enrich(&samples(&[5.0, 6.0, 7.0], 30))
            .unwrap();
        let names_a: Vec<_> = a[0].names().collect();
        let names_b: Vec<_> = b[2].names().collect();
        assert_eq!(names_a, names_b);
    }

    #[test]
    fn test_variance_calculation() {
        let values = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((variance(&values) - 4.571).abs() < 0.01);
    }
}
