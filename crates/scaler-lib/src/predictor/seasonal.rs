//! Seasonal decomposition provider
//!
//! Splits the CPU series into an hour-of-day profile and a deseasonalized
//! remainder tracked by Holt's linear smoothing. A forecast is the smoothed
//! level projected along its trend plus the profile at the target hour.

use super::features::{hour_and_weekday, mean};
use super::{cpu_series, Fit, ForecastProvider, ForecastRequest, ModelState};
use crate::error::{EngineError, Result};
use crate::models::{FeatureVector, ProviderKind};

const MIN_SAMPLES: usize = 100;
const CONFIDENCE_BASELINE: f64 = 0.8;
/// Two-sided 80% normal quantile
const INTERVAL_Z: f64 = 1.28;
const ALPHA: f64 = 0.3;
const BETA: f64 = 0.1;
/// Trend projection never runs further than this many steps
const MAX_TREND_STEPS: usize = 120;

/// Fitted seasonal model
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonalState {
    /// Mean deviation from the overall level for each hour of day
    hourly_profile: [f64; 24],
    level: f64,
    trend: f64,
}

impl SeasonalState {
    pub fn hourly_profile(&self) -> &[f64; 24] {
        &self.hourly_profile
    }

    fn season_at(&self, timestamp: i64) -> f64 {
        let (hour, _) = hour_and_weekday(timestamp);
        self.hourly_profile[hour as usize % 24]
    }
}

#[derive(Debug, Clone, Default)]
pub struct SeasonalProvider;

impl SeasonalProvider {
    pub fn new() -> Self {
        Self
    }
}

fn hourly_profile(rows: &[FeatureVector], cpu: &[f64]) -> [f64; 24] {
    let overall = mean(cpu);
    let mut sums = [0.0; 24];
    let mut counts = [0usize; 24];
    for (row, value) in rows.iter().zip(cpu) {
        let (hour, _) = hour_and_weekday(row.timestamp);
        let slot = hour as usize % 24;
        sums[slot] += value - overall;
        counts[slot] += 1;
    }
    let mut profile = [0.0; 24];
    for hour in 0..24 {
        if counts[hour] > 0 {
            profile[hour] = sums[hour] / counts[hour] as f64;
        }
    }
    profile
}

impl ForecastProvider for SeasonalProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Seasonal
    }

    fn min_samples(&self) -> usize {
        MIN_SAMPLES
    }

    fn confidence_baseline(&self) -> f64 {
        CONFIDENCE_BASELINE
    }

    fn interval_z(&self) -> f64 {
        INTERVAL_Z
    }

    fn fit(&self, rows: &[FeatureVector]) -> Result<Fit> {
        let cpu = cpu_series(rows);
        let profile = hourly_profile(rows, &cpu);
        let mut state = SeasonalState {
            hourly_profile: profile,
            level: 0.0,
            trend: 0.0,
        };

        let deseasonalized: Vec<f64> = rows
            .iter()
            .zip(&cpu)
            .map(|(row, value)| value - state.season_at(row.timestamp))
            .collect();

        state.level = deseasonalized[0];
        let mut predictions = Vec::with_capacity(cpu.len() - 1);
        for (row, value) in rows.iter().zip(&deseasonalized).skip(1) {
            predictions.push(state.level + state.trend + state.season_at(row.timestamp));
            let previous = state.level;
            state.level = ALPHA * value + (1.0 - ALPHA) * (state.level + state.trend);
            state.trend = BETA * (state.level - previous) + (1.0 - BETA) * state.trend;
        }

        if !state.level.is_finite() || !state.trend.is_finite() {
            return Err(EngineError::prediction(self.kind(), "smoothing diverged"));
        }
        Ok(Fit::from_predictions(
            ModelState::Seasonal(state),
            &predictions,
            &cpu[1..],
        ))
    }

    fn forecast(&self, state: &ModelState, request: &ForecastRequest<'_>) -> Result<f64> {
        let ModelState::Seasonal(state) = state else {
            return Err(EngineError::prediction(self.kind(), "unexpected model state"));
        };
        let steps = request.steps.min(MAX_TREND_STEPS) as f64;
        Ok(state.level + state.trend * steps + state.season_at(request.target_timestamp))
    }
}
