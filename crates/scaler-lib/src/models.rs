//! Core data models for the decision engine

use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Longest accepted service name
pub const MAX_SERVICE_NAME_LEN: usize = 253;

/// Service names are Kubernetes-style: ASCII alphanumerics plus `-`, `_`
/// and `.`, starting with an alphanumeric
pub fn validate_service_name(name: &str) -> Result<()> {
    let starts_ok = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric());
    let chars_ok = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if starts_ok && chars_ok && name.len() <= MAX_SERVICE_NAME_LEN {
        Ok(())
    } else {
        Err(EngineError::invalid_request(format!(
            "invalid service name {:?}",
            name
        )))
    }
}

/// One observation of a service's resource usage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    /// Unix timestamp in seconds
    pub timestamp: i64,
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub request_rate: f64,
    pub response_time_ms: f64,
}

/// Named features derived from a sample and the samples before it
///
/// Feature order is stable for a given pipeline, so rows produced by the
/// same pipeline can be laid out as a matrix by position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub timestamp: i64,
    features: Vec<(String, f64)>,
}

impl FeatureVector {
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            features: Vec::new(),
        }
    }

    pub fn with_capacity(timestamp: i64, capacity: usize) -> Self {
        Self {
            timestamp,
            features: Vec::with_capacity(capacity),
        }
    }

    /// Append a feature; an existing name is overwritten in place
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        match self.features.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.features.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.features
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    /// Value of a feature, or 0.0 when the pipeline did not produce it
    pub fn value_or_zero(&self, name: &str) -> f64 {
        self.get(name).unwrap_or(0.0)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(|(n, _)| n.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.features.iter().map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Category of forecasting strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Windowed sequence model over fixed-length history
    SequenceModel,
    /// Seasonal decomposition (daily profile plus smoothed level/trend)
    Seasonal,
    /// Linear regression over engineered features
    LinearRegression,
    /// Bagged regression trees over engineered features
    EnsembleTree,
    /// Stateless time-of-day heuristic; never fails
    Heuristic,
}

impl ProviderKind {
    /// Enumeration order used for cumulative traffic-split selection
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::SequenceModel,
        ProviderKind::Seasonal,
        ProviderKind::LinearRegression,
        ProviderKind::EnsembleTree,
        ProviderKind::Heuristic,
    ];

    /// Providers ordered from most to least specific
    pub const BY_SPECIFICITY: [ProviderKind; 5] = [
        ProviderKind::SequenceModel,
        ProviderKind::Seasonal,
        ProviderKind::EnsembleTree,
        ProviderKind::LinearRegression,
        ProviderKind::Heuristic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::SequenceModel => "sequence_model",
            ProviderKind::Seasonal => "seasonal",
            ProviderKind::LinearRegression => "linear_regression",
            ProviderKind::EnsembleTree => "ensemble_tree",
            ProviderKind::Heuristic => "heuristic",
        }
    }

    /// Rank in the specificity ladder, 0 being the most specific
    pub fn specificity_rank(&self) -> usize {
        Self::BY_SPECIFICITY
            .iter()
            .position(|k| k == self)
            .unwrap_or(Self::BY_SPECIFICITY.len())
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ProviderKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown provider kind '{}'", s))
    }
}

/// Error and timing statistics of one fitted model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub provider_kind: ProviderKind,
    pub mean_squared_error: f64,
    pub mean_absolute_error: f64,
    /// 1 - mse / variance(target), floored at 0
    pub accuracy_estimate: f64,
    pub training_duration_ms: f64,
    pub last_prediction_duration_ms: f64,
    pub confidence_baseline: f64,
}

impl PerformanceRecord {
    pub fn root_mean_squared_error(&self) -> f64 {
        self.mean_squared_error.max(0.0).sqrt()
    }
}

/// Interval around a point forecast; lower <= predicted <= upper
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceInterval {
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// Where the samples behind a forecast came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataOrigin {
    /// Every metric came from the telemetry backend
    Observed,
    /// CPU was observed, some secondary metrics were synthesized
    Partial,
    /// Telemetry was unavailable; the whole series is synthetic
    Synthetic,
}

/// One rung of the degradation ladder that did not produce the forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradationStep {
    pub provider: ProviderKind,
    pub reason: String,
}

/// Forecast of CPU utilization for one service and horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub service: String,
    pub provider_used: ProviderKind,
    /// Predicted CPU utilization in percent
    pub predicted_value: f64,
    pub confidence_interval: ConfidenceInterval,
    pub confidence: f64,
    pub performance: PerformanceRecord,
    pub horizon_minutes: u32,
    pub generated_at: DateTime<Utc>,
    /// SCALE_UP / SCALE_DOWN / MAINTAIN label for the predicted load
    pub recommendation: String,
    pub reasoning: String,
    /// Rungs tried before `provider_used`, in ladder order
    pub degradation: Vec<DegradationStep>,
    pub data_origin: DataOrigin,
}

impl ForecastResult {
    /// True when the forecast did not come from the assigned provider
    pub fn is_degraded(&self) -> bool {
        !self.degradation.is_empty()
    }
}

/// Process-wide A/B configuration for provider assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Probability of routing a request to each provider; sums to 1.0
    pub traffic_split: BTreeMap<ProviderKind, f64>,
    pub eligible_metrics: Vec<String>,
    pub current_best_provider: ProviderKind,
    #[serde(default = "Utc::now")]
    pub start_time: DateTime<Utc>,
    #[serde(default = "default_duration_days")]
    pub duration_days: u32,
}

fn default_duration_days() -> u32 {
    7
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        let mut traffic_split = BTreeMap::new();
        traffic_split.insert(ProviderKind::SequenceModel, 0.4);
        traffic_split.insert(ProviderKind::LinearRegression, 0.3);
        traffic_split.insert(ProviderKind::Seasonal, 0.3);
        Self {
            traffic_split,
            eligible_metrics: vec![
                "mse".to_string(),
                "mae".to_string(),
                "prediction_time".to_string(),
                "business_impact".to_string(),
            ],
            current_best_provider: ProviderKind::SequenceModel,
            start_time: Utc::now(),
            duration_days: default_duration_days(),
        }
    }
}

impl ExperimentConfig {
    /// Split with all traffic routed to one provider
    pub fn single(provider: ProviderKind) -> Self {
        let mut traffic_split = BTreeMap::new();
        traffic_split.insert(provider, 1.0);
        Self {
            traffic_split,
            current_best_provider: provider,
            ..Self::default()
        }
    }

    /// Weight of a provider in the split (0.0 when absent)
    pub fn weight(&self, provider: ProviderKind) -> f64 {
        self.traffic_split.get(&provider).copied().unwrap_or(0.0)
    }
}

/// Named resource tier, ordered by footprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierName {
    Micro,
    Small,
    Medium,
    Large,
    Xlarge,
}

impl TierName {
    pub const ALL: [TierName; 5] = [
        TierName::Micro,
        TierName::Small,
        TierName::Medium,
        TierName::Large,
        TierName::Xlarge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TierName::Micro => "micro",
            TierName::Small => "small",
            TierName::Medium => "medium",
            TierName::Large => "large",
            TierName::Xlarge => "xlarge",
        }
    }
}

impl fmt::Display for TierName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-replica resource footprint of a tier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostTier {
    pub name: TierName,
    pub cpu_units: f64,
    pub memory_mb: f64,
    pub cost_multiplier: f64,
}

impl CostTier {
    pub fn memory_gb(&self) -> f64 {
        self.memory_mb / 1024.0
    }
}

/// Risk attached to a scaling decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        };
        f.write_str(s)
    }
}

/// Which policy rule determined a decision's replica count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionRule {
    CostGate,
    SafetyOverride,
    Default,
    /// Forecast unavailable; replicas held
    Neutral,
}

/// Final recommendation for one service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingDecision {
    pub service: String,
    pub current_replicas: u32,
    pub recommended_replicas: u32,
    pub recommended_tier: TierName,
    pub cost_impact_per_hour: f64,
    pub risk_level: RiskLevel,
    pub confidence: f64,
    pub rule: DecisionRule,
    pub reasoning: String,
    /// Forecast the decision was derived from, degraded or not
    pub forecast: Option<ForecastResult>,
    pub decided_at: DateTime<Utc>,
}

/// Cost view of the current and forecast-driven configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostMetrics {
    pub service: String,
    pub current_replicas: u32,
    pub predicted_replicas: u32,
    pub current_tier: TierName,
    pub predicted_tier: TierName,
    pub current_cost_per_hour: f64,
    pub predicted_cost_per_hour: f64,
    /// current - predicted; positive means the forecast saves money
    pub savings_per_hour: f64,
    /// 0-100 blend of utilization, cost delta and forecast confidence
    pub efficiency_score: f64,
    pub recommendation: String,
}

impl CostMetrics {
    pub fn savings_per_day(&self) -> f64 {
        self.savings_per_hour * 24.0
    }

    pub fn savings_per_month(&self) -> f64 {
        self.savings_per_hour * 24.0 * 30.0
    }
}

/// Registry view of one fitted model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub service: String,
    pub provider: ProviderKind,
    pub trained_at: DateTime<Utc>,
    pub stale: bool,
    pub performance: PerformanceRecord,
}

/// Provider that could not be trained, and why
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingFailure {
    pub provider: ProviderKind,
    pub error: String,
}

/// Outcome of training every deployed provider for one service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub service: String,
    pub samples: usize,
    pub data_origin: DataOrigin,
    pub trained: Vec<ModelSummary>,
    pub failed: Vec<TrainingFailure>,
}

/// Forecast for one service of the fleet, or why there is none
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceForecast {
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast: Option<ForecastResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Forecasts for every configured service at one horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetForecast {
    pub horizon_minutes: u32,
    pub predictions: Vec<ServiceForecast>,
    pub generated_at: DateTime<Utc>,
}

/// Cost view and decision for one service of the fleet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCostAnalysis {
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_metrics: Option<CostMetrics>,
    pub decision: ScalingDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Totals over the services whose cost metrics could be computed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetCostSummary {
    pub services_analyzed: usize,
    pub services_failed: usize,
    pub total_current_cost_per_hour: f64,
    pub total_predicted_cost_per_hour: f64,
    pub total_savings_per_hour: f64,
    pub total_savings_per_day: f64,
    pub total_savings_per_month: f64,
}

impl FleetCostSummary {
    pub fn from_metrics<'a>(
        metrics: impl IntoIterator<Item = &'a CostMetrics>,
        failed: usize,
    ) -> Self {
        let mut summary = Self {
            services_failed: failed,
            ..Self::default()
        };
        for m in metrics {
            summary.services_analyzed += 1;
            summary.total_current_cost_per_hour += m.current_cost_per_hour;
            summary.total_predicted_cost_per_hour += m.predicted_cost_per_hour;
        }
        summary.total_savings_per_hour =
            summary.total_current_cost_per_hour - summary.total_predicted_cost_per_hour;
        summary.total_savings_per_day = summary.total_savings_per_hour * 24.0;
        summary.total_savings_per_month = summary.total_savings_per_day * 30.0;
        summary
    }
}

/// Fleet-wide cost analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetCostReport {
    pub services: Vec<ServiceCostAnalysis>,
    pub summary: FleetCostSummary,
    pub generated_at: DateTime<Utc>,
}
