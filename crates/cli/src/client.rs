//! API client for communicating with the Predictive Scaler API

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// API client for the Predictive Scaler API
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;
        Self::send(self.client.get(url)).await
    }

    /// Make a POST request without a body
    pub async fn post<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;
        Self::send(self.client.post(url)).await
    }

    /// Make a PUT request with JSON body
    pub async fn put<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;
        Self::send(self.client.put(url).json(body)).await
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
        let response = request.send().await.context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            anyhow::bail!("API error ({}): {}", status, message);
        }

        response.json().await.context("Failed to parse response")
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub provider_kind: String,
    pub mean_squared_error: f64,
    pub mean_absolute_error: f64,
    pub accuracy_estimate: f64,
    pub training_duration_ms: f64,
    pub last_prediction_duration_ms: f64,
    pub confidence_baseline: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegradationStep {
    pub provider: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast {
    pub service: String,
    pub provider_used: String,
    pub predicted_value: f64,
    pub confidence_interval: ConfidenceInterval,
    pub confidence: f64,
    pub performance: PerformanceRecord,
    pub horizon_minutes: u32,
    pub generated_at: String,
    pub recommendation: String,
    pub reasoning: String,
    #[serde(default)]
    pub degradation: Vec<DegradationStep>,
    pub data_origin: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingDecision {
    pub service: String,
    pub current_replicas: u32,
    pub recommended_replicas: u32,
    pub recommended_tier: String,
    pub cost_impact_per_hour: f64,
    pub risk_level: String,
    pub confidence: f64,
    pub rule: String,
    pub reasoning: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast: Option<Forecast>,
    pub decided_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostMetrics {
    pub service: String,
    pub current_replicas: u32,
    pub predicted_replicas: u32,
    pub current_tier: String,
    pub predicted_tier: String,
    pub current_cost_per_hour: f64,
    pub predicted_cost_per_hour: f64,
    pub savings_per_hour: f64,
    pub efficiency_score: f64,
    pub recommendation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceForecast {
    pub service: String,
    #[serde(default)]
    pub forecast: Option<Forecast>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetForecast {
    pub horizon_minutes: u32,
    pub predictions: Vec<ServiceForecast>,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCostAnalysis {
    pub service: String,
    #[serde(default)]
    pub cost_metrics: Option<CostMetrics>,
    pub decision: ScalingDecision,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetCostSummary {
    pub services_analyzed: usize,
    pub services_failed: usize,
    pub total_current_cost_per_hour: f64,
    pub total_predicted_cost_per_hour: f64,
    pub total_savings_per_hour: f64,
    pub total_savings_per_day: f64,
    pub total_savings_per_month: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetCostReport {
    pub services: Vec<ServiceCostAnalysis>,
    pub summary: FleetCostSummary,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostTier {
    pub name: String,
    pub cpu_units: f64,
    pub memory_mb: f64,
    pub cost_multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSummary {
    pub service: String,
    pub provider: String,
    pub trained_at: String,
    pub stale: bool,
    pub performance: PerformanceRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingFailure {
    pub provider: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub service: String,
    pub samples: usize,
    pub data_origin: String,
    pub trained: Vec<ModelSummary>,
    pub failed: Vec<TrainingFailure>,
}

/// Experiment configuration as accepted by `PUT /api/v1/experiment`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub traffic_split: BTreeMap<String, f64>,
    pub eligible_metrics: Vec<String>,
    pub current_best_provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_days: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentStatus {
    pub config: ExperimentConfig,
    pub available_providers: Vec<String>,
    pub age_days: f64,
    pub ends_at: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}
