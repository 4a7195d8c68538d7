//! Windowed sequence model
//!
//! Learns the next CPU value from a fixed-length window of min-max scaled
//! history plus time-of-day context. Multi-step horizons are rolled out one
//! step at a time, feeding each prediction back into the window.

use super::features::{hour_and_weekday, is_business_hour};
use super::linalg;
use super::{cpu_series, Fit, ForecastProvider, ForecastRequest, ModelState};
use crate::error::{EngineError, Result};
use crate::models::{FeatureVector, ProviderKind};

const MIN_SAMPLES: usize = 50;
/// Windows required on top of the raw sample minimum
const MIN_WINDOWS: usize = 20;
const CONFIDENCE_BASELINE: f64 = 0.85;
const RIDGE_LAMBDA: f64 = 0.1;
/// Longest rollout; later steps reuse the last value
const MAX_ROLLOUT: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq)]
struct MinMax {
    min: f64,
    max: f64,
}

impl MinMax {
    fn fit(values: &[f64]) -> Self {
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Self { min, max }
    }

    fn range(&self) -> f64 {
        let r = self.max - self.min;
        if r > 1e-9 {
            r
        } else {
            1.0
        }
    }

    fn scale(&self, v: f64) -> f64 {
        (v - self.min) / self.range()
    }

    fn unscale(&self, v: f64) -> f64 {
        v * self.range() + self.min
    }
}

/// Fitted sequence model
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceState {
    window: usize,
    cpu_scale: MinMax,
    request_scale: MinMax,
    weights: Vec<f64>,
}

impl SequenceState {
    pub fn window(&self) -> usize {
        self.window
    }

    fn inputs(&self, window: &[f64], row: &FeatureVector, timestamp: i64) -> Vec<f64> {
        let (hour, _) = hour_and_weekday(timestamp);
        let mut x = Vec::with_capacity(window.len() + 3);
        x.extend_from_slice(window);
        x.push(hour as f64 / 23.0);
        x.push(if is_business_hour(hour) { 1.0 } else { 0.0 });
        x.push(self.request_scale.scale(row.value_or_zero("request_rate")));
        x
    }
}

#[derive(Debug, Clone)]
pub struct SequenceProvider {
    window: usize,
}

impl SequenceProvider {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
        }
    }
}

impl ForecastProvider for SequenceProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::SequenceModel
    }

    fn min_samples(&self) -> usize {
        MIN_SAMPLES.max(self.window + MIN_WINDOWS)
    }

    fn confidence_baseline(&self) -> f64 {
        CONFIDENCE_BASELINE
    }

    fn fit(&self, rows: &[FeatureVector]) -> Result<Fit> {
        let cpu = cpu_series(rows);
        let requests: Vec<f64> = rows.iter().map(|r| r.value_or_zero("request_rate")).collect();
        let mut state = SequenceState {
            window: self.window,
            cpu_scale: MinMax::fit(&cpu),
            request_scale: MinMax::fit(&requests),
            weights: Vec::new(),
        };
        let scaled: Vec<f64> = cpu.iter().map(|v| state.cpu_scale.scale(*v)).collect();

        let windows = cpu.len().saturating_sub(self.window);
        if windows < MIN_WINDOWS {
            return Err(EngineError::insufficient(
                self.kind(),
                self.window + MIN_WINDOWS,
                cpu.len(),
            ));
        }

        let mut inputs = Vec::with_capacity(windows);
        let mut targets = Vec::with_capacity(windows);
        for t in self.window..cpu.len() {
            let context = &rows[t - 1];
            inputs.push(state.inputs(&scaled[t - self.window..t], context, rows[t].timestamp));
            targets.push(scaled[t]);
        }

        state.weights = linalg::ridge(&inputs, &targets, RIDGE_LAMBDA)
            .ok_or_else(|| EngineError::prediction(self.kind(), "singular normal equations"))?;

        let predictions: Vec<f64> = inputs
            .iter()
            .map(|x| state.cpu_scale.unscale(linalg::dot_with_intercept(&state.weights, x)))
            .collect();
        Ok(Fit::from_predictions(
            ModelState::Sequence(state),
            &predictions,
            &cpu[self.window..],
        ))
    }

    fn forecast(&self, state: &ModelState, request: &ForecastRequest<'_>) -> Result<f64> {
        let ModelState::Sequence(state) = state else {
            return Err(EngineError::prediction(self.kind(), "unexpected model state"));
        };
        let last = request.last_row(self.kind())?;

        let history: Vec<f64> = cpu_series(request.recent)
            .iter()
            .map(|v| state.cpu_scale.scale(*v))
            .collect();
        let mut window: Vec<f64> = if history.len() >= state.window {
            history[history.len() - state.window..].to_vec()
        } else {
            // Short history is left-padded with its oldest value
            let pad = history.first().copied().unwrap_or(0.0);
            let mut padded = vec![pad; state.window - history.len()];
            padded.extend_from_slice(&history);
            padded
        };

        let step_secs = (request.target_timestamp - last.timestamp) / request.steps.max(1) as i64;
        let mut next = window.last().copied().unwrap_or(0.0);
        for step in 1..=request.steps.min(MAX_ROLLOUT) {
            let timestamp = last.timestamp + step_secs * step as i64;
            let x = state.inputs(&window, last, timestamp);
            // Keep the rollout inside a sane band around the training range
            next = linalg::dot_with_intercept(&state.weights, &x).clamp(-0.5, 1.5);
            window.remove(0);
            window.push(next);
        }
        Ok(state.cpu_scale.unscale(next))
    }
}
