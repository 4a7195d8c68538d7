//! Experiment router
//!
//! Assigns each prediction request to a provider by sampling the A/B traffic
//! split, and lays out the degradation ladder tried when that provider has
//! no usable model.

use super::ForecastProvider;
use crate::error::{EngineError, Result};
use crate::models::{ExperimentConfig, ProviderKind};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Allowed deviation of the split total from 1.0
const SPLIT_TOLERANCE: f64 = 1e-6;

/// Snapshot of the experiment and the providers it can route to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentStatus {
    pub config: ExperimentConfig,
    pub available_providers: Vec<ProviderKind>,
    pub age_days: f64,
    pub ends_at: DateTime<Utc>,
    pub active: bool,
}

pub struct ExperimentRouter {
    config: RwLock<ExperimentConfig>,
    providers: Vec<Arc<dyn ForecastProvider>>,
    rng: Mutex<StdRng>,
}

impl ExperimentRouter {
    /// Router over a fixed provider set
    ///
    /// The set must contain the linear regression and heuristic providers,
    /// which anchor the bottom of every ladder.
    pub fn new(
        config: ExperimentConfig,
        providers: Vec<Arc<dyn ForecastProvider>>,
        seed: u64,
    ) -> Result<Self> {
        Self::validate(&config)?;
        for required in [ProviderKind::LinearRegression, ProviderKind::Heuristic] {
            if !providers.iter().any(|p| p.kind() == required) {
                return Err(EngineError::invalid_config(format!(
                    "provider set lacks {}",
                    required
                )));
            }
        }
        Ok(Self {
            config: RwLock::new(config),
            providers,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        })
    }

    /// Check a split: non-negative finite weights summing to 1.0
    pub fn validate(config: &ExperimentConfig) -> Result<()> {
        if config.traffic_split.is_empty() {
            return Err(EngineError::invalid_config("traffic split is empty"));
        }
        if let Some((kind, weight)) = config
            .traffic_split
            .iter()
            .find(|(_, w)| !w.is_finite() || **w < 0.0)
        {
            return Err(EngineError::invalid_config(format!(
                "weight {} for {} must be a non-negative number",
                weight, kind
            )));
        }
        let total: f64 = config.traffic_split.values().sum();
        if (total - 1.0).abs() > SPLIT_TOLERANCE {
            return Err(EngineError::invalid_config(format!(
                "traffic split sums to {}, expected 1.0",
                total
            )));
        }
        Ok(())
    }

    /// Draw a provider by cumulative-probability selection
    ///
    /// A draw past the cumulative total (rounding) goes to the current best
    /// provider.
    pub fn assign(&self) -> ProviderKind {
        let config = self.config.read().unwrap_or_else(PoisonError::into_inner);
        let draw: f64 = self
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen();
        let mut cumulative = 0.0;
        for kind in ProviderKind::ALL {
            cumulative += config.weight(kind);
            if draw < cumulative {
                return kind;
            }
        }
        config.current_best_provider
    }

    /// Providers to try, in order, when `assigned` is the first choice
    ///
    /// assigned, then the next more general optional provider that is
    /// deployed, then linear regression, then the heuristic.
    pub fn ladder(&self, assigned: ProviderKind) -> Vec<ProviderKind> {
        let mut ladder = vec![assigned];
        let next = ProviderKind::BY_SPECIFICITY
            .iter()
            .copied()
            .filter(|k| k.specificity_rank() > assigned.specificity_rank())
            .filter(|k| !matches!(k, ProviderKind::LinearRegression | ProviderKind::Heuristic))
            .find(|k| self.is_available(*k));
        ladder.extend(next);
        if assigned != ProviderKind::Heuristic {
            ladder.push(ProviderKind::LinearRegression);
        }
        ladder.push(ProviderKind::Heuristic);

        let mut seen = Vec::with_capacity(ladder.len());
        ladder.retain(|k| {
            if seen.contains(k) {
                false
            } else {
                seen.push(*k);
                true
            }
        });
        ladder
    }

    pub fn provider(&self, kind: ProviderKind) -> Option<Arc<dyn ForecastProvider>> {
        self.providers.iter().find(|p| p.kind() == kind).cloned()
    }

    pub fn providers(&self) -> &[Arc<dyn ForecastProvider>] {
        &self.providers
    }

    pub fn is_available(&self, kind: ProviderKind) -> bool {
        self.providers.iter().any(|p| p.kind() == kind)
    }

    /// Validate and swap the process-wide experiment configuration
    pub fn reload(&self, config: ExperimentConfig) -> Result<()> {
        Self::validate(&config)?;
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
        Ok(())
    }

    pub fn config(&self) -> ExperimentConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn status(&self) -> ExperimentStatus {
        let config = self.config();
        let now = Utc::now();
        let ends_at = config.start_time + ChronoDuration::days(i64::from(config.duration_days));
        let age_days = (now - config.start_time).num_seconds().max(0) as f64 / 86_400.0;
        ExperimentStatus {
            available_providers: self.providers.iter().map(|p| p.kind()).collect(),
            age_days,
            ends_at,
            active: now < ends_at,
            config,
        }
    }
}
