//! Linear regression over engineered features
//!
//! Ridge-regularized least squares on standardized features, fitted to the
//! next sample's CPU. Trainable on little history, so it is the regression
//! rung of the degradation ladder.

use super::linalg::{self, Standardizer};
use super::{cpu_series, Fit, ForecastProvider, ForecastRequest, ModelState};
use crate::error::{EngineError, Result};
use crate::models::{FeatureVector, ProviderKind};

const MIN_SAMPLES: usize = 20;
const CONFIDENCE_BASELINE: f64 = 0.75;
const RIDGE_LAMBDA: f64 = 1.0;

/// Fitted linear model
#[derive(Debug, Clone, PartialEq)]
pub struct LinearState {
    feature_names: Vec<String>,
    scaler: Standardizer,
    /// Intercept followed by one weight per feature
    weights: Vec<f64>,
}

impl LinearState {
    fn predict_row(&self, row: &FeatureVector) -> f64 {
        let raw: Vec<f64> = self
            .feature_names
            .iter()
            .map(|name| row.value_or_zero(name))
            .collect();
        linalg::dot_with_intercept(&self.weights, &self.scaler.transform(&raw))
    }
}

#[derive(Debug, Clone, Default)]
pub struct LinearProvider;

impl LinearProvider {
    pub fn new() -> Self {
        Self
    }
}

impl ForecastProvider for LinearProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::LinearRegression
    }

    fn min_samples(&self) -> usize {
        MIN_SAMPLES
    }

    fn confidence_baseline(&self) -> f64 {
        CONFIDENCE_BASELINE
    }

    fn fit(&self, rows: &[FeatureVector]) -> Result<Fit> {
        let feature_names: Vec<String> = rows
            .first()
            .map(|row| row.names().map(str::to_string).collect())
            .unwrap_or_default();
        let cpu = cpu_series(rows);

        // Row i predicts the CPU of row i + 1
        let inputs: Vec<Vec<f64>> = rows[..rows.len() - 1]
            .iter()
            .map(|row| feature_names.iter().map(|n| row.value_or_zero(n)).collect())
            .collect();
        let targets = &cpu[1..];

        let scaler = Standardizer::fit(&inputs);
        let scaled: Vec<Vec<f64>> = inputs.iter().map(|r| scaler.transform(r)).collect();
        let weights = linalg::ridge(&scaled, targets, RIDGE_LAMBDA)
            .ok_or_else(|| EngineError::prediction(self.kind(), "singular normal equations"))?;

        let state = LinearState {
            feature_names,
            scaler,
            weights,
        };
        let predictions: Vec<f64> = rows[..rows.len() - 1]
            .iter()
            .map(|row| state.predict_row(row))
            .collect();

        Ok(Fit::from_predictions(
            ModelState::Linear(state),
            &predictions,
            targets,
        ))
    }

    fn forecast(&self, state: &ModelState, request: &ForecastRequest<'_>) -> Result<f64> {
        let ModelState::Linear(state) = state else {
            return Err(EngineError::prediction(self.kind(), "unexpected model state"));
        };
        Ok(state.predict_row(request.last_row(self.kind())?))
    }
}
