//! Engine configuration
//!
//! Every field has a default so a partially specified file or environment
//! still yields a complete configuration.

use crate::error::{EngineError, Result};
use crate::models::{validate_service_name, ExperimentConfig, ProviderKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub prediction: PredictionSettings,
    pub telemetry: TelemetrySettings,
    pub providers: ProviderAvailability,
    pub experiment: ExperimentConfig,
    pub policy: PolicyConfig,
    pub cost: CostRates,
    /// Services covered by the fleet-wide forecast and cost operations
    pub services: Vec<String>,
}

impl EngineConfig {
    /// Check cross-field constraints the type system cannot express
    pub fn validate(&self) -> Result<()> {
        if self.policy.min_replicas == 0 {
            return Err(EngineError::invalid_config("min_replicas must be at least 1"));
        }
        if self.policy.max_replicas < self.policy.min_replicas {
            return Err(EngineError::invalid_config(
                "max_replicas must not be below min_replicas",
            ));
        }
        if self.policy.target_utilization <= 0.0 {
            return Err(EngineError::invalid_config(
                "target_utilization must be positive",
            ));
        }
        if self.prediction.default_horizon_minutes == 0
            || self.prediction.default_horizon_minutes > self.prediction.max_horizon_minutes
        {
            return Err(EngineError::invalid_config(
                "default_horizon_minutes must be between 1 and max_horizon_minutes",
            ));
        }
        for service in &self.services {
            validate_service_name(service).map_err(|e| {
                EngineError::invalid_config(format!("services: {}", e))
            })?;
        }
        if self.telemetry.step_secs == 0 {
            return Err(EngineError::invalid_config("telemetry step must be positive"));
        }
        let t = &self.cost.tier_thresholds;
        if t.windows(2).any(|w| w[0] >= w[1]) || t[0] <= 0.0 || t[3] >= 100.0 {
            return Err(EngineError::invalid_config(
                "tier thresholds must be strictly increasing inside (0, 100)",
            ));
        }
        Ok(())
    }
}

/// Forecasting, caching and registry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionSettings {
    pub default_horizon_minutes: u32,
    /// Longest horizon a caller may request
    pub max_horizon_minutes: u32,
    pub cache_ttl_secs: u64,
    pub staleness_window_secs: u64,
    /// Window length for the sequence model
    pub sequence_length: usize,
    /// Number of bagged trees in the ensemble provider
    pub ensemble_trees: usize,
    /// Seed for routing, bagging and synthetic telemetry; random when unset
    pub seed: Option<u64>,
}

impl Default for PredictionSettings {
    fn default() -> Self {
        Self {
            default_horizon_minutes: 5,
            max_horizon_minutes: 24 * 60,
            cache_ttl_secs: 60,
            staleness_window_secs: 30 * 60,
            sequence_length: 20,
            ensemble_trees: 20,
            seed: None,
        }
    }
}

impl PredictionSettings {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn staleness_window(&self) -> Duration {
        Duration::from_secs(self.staleness_window_secs)
    }
}

/// Telemetry backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Prometheus base URL; synthetic data only when unset
    pub prometheus_url: Option<String>,
    /// History fetched for training and prediction
    pub lookback_secs: u64,
    /// History fetched for the current-utilization snapshot
    pub snapshot_lookback_secs: u64,
    pub step_secs: u64,
    /// Upper bound on every backend call
    pub timeout_ms: u64,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            prometheus_url: None,
            lookback_secs: 6 * 60 * 60,
            snapshot_lookback_secs: 5 * 60,
            step_secs: 30,
            timeout_ms: 2_000,
        }
    }
}

impl TelemetrySettings {
    pub fn lookback(&self) -> Duration {
        Duration::from_secs(self.lookback_secs)
    }

    pub fn snapshot_lookback(&self) -> Duration {
        Duration::from_secs(self.snapshot_lookback_secs)
    }

    pub fn step(&self) -> Duration {
        Duration::from_secs(self.step_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Optional provider capabilities, resolved once at start-up
///
/// Regression and heuristic providers are always present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderAvailability {
    pub sequence_model: bool,
    pub seasonal: bool,
}

impl Default for ProviderAvailability {
    fn default() -> Self {
        Self {
            sequence_model: true,
            seasonal: true,
        }
    }
}

impl ProviderAvailability {
    /// Only the always-present providers
    pub fn minimal() -> Self {
        Self {
            sequence_model: false,
            seasonal: false,
        }
    }

    pub fn is_available(&self, kind: ProviderKind) -> bool {
        match kind {
            ProviderKind::SequenceModel => self.sequence_model,
            ProviderKind::Seasonal => self.seasonal,
            ProviderKind::LinearRegression
            | ProviderKind::EnsembleTree
            | ProviderKind::Heuristic => true,
        }
    }
}

/// Scaling policy thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// CPU percent the replica count should converge toward
    pub target_utilization: f64,
    pub min_replicas: u32,
    pub max_replicas: u32,
    /// Hourly savings above which a scale-down is worth taking in full
    pub significant_savings_per_hour: f64,
    /// Hourly cost increase above which a scale-up is capped to one replica
    pub significant_increase_per_hour: f64,
    /// Efficiency score (0-100) above which the forecast is trusted
    pub efficiency_threshold: f64,
    /// Forecast confidence at or above which the forecast is trusted
    pub confidence_threshold: f64,
    /// Current CPU above which decreases are forbidden
    pub high_risk_cpu: f64,
    /// Current CPU below which at most one replica is removed
    pub low_risk_cpu: f64,
    /// Replica count assumed when the replica collaborator fails
    pub default_replicas: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            target_utilization: 50.0,
            min_replicas: 1,
            max_replicas: 10,
            significant_savings_per_hour: 0.05,
            significant_increase_per_hour: 0.10,
            efficiency_threshold: 60.0,
            confidence_threshold: 0.5,
            high_risk_cpu: 80.0,
            low_risk_cpu: 10.0,
            default_replicas: 2,
        }
    }
}

/// Unit prices (USD) and per-replica volumes for the cost model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CostRates {
    pub cpu_per_core_hour: f64,
    pub memory_per_gb_hour: f64,
    pub storage_per_gb_hour: f64,
    pub network_per_gb: f64,
    pub storage_gb_per_replica: f64,
    pub network_gb_per_replica_hour: f64,
    /// Upper CPU bounds of micro, small, medium and large
    pub tier_thresholds: [f64; 4],
}

impl Default for CostRates {
    fn default() -> Self {
        Self {
            cpu_per_core_hour: 0.048,
            memory_per_gb_hour: 0.0053,
            storage_per_gb_hour: 0.0001,
            network_per_gb: 0.09,
            storage_gb_per_replica: 0.5,
            network_gb_per_replica_hour: 0.1,
            tier_thresholds: [20.0, 35.0, 50.0, 75.0],
        }
    }
}
