//! Current replica counts

use super::async_trait;
use super::prometheus::quote_label;
use crate::error::{EngineError, Result};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// Reports how many replicas a service is running right now
#[async_trait]
pub trait ReplicaSource: Send + Sync {
    async fn current_replicas(&self, service: &str) -> Result<u32>;
}

/// Fixed replica counts, with a default for unknown services
#[derive(Debug, Clone)]
pub struct StaticReplicaSource {
    counts: HashMap<String, u32>,
    default: u32,
}

impl StaticReplicaSource {
    pub fn new(default: u32) -> Self {
        Self {
            counts: HashMap::new(),
            default,
        }
    }

    pub fn with(mut self, service: impl Into<String>, replicas: u32) -> Self {
        self.counts.insert(service.into(), replicas);
        self
    }
}

#[async_trait]
impl ReplicaSource for StaticReplicaSource {
    async fn current_replicas(&self, service: &str) -> Result<u32> {
        Ok(self.counts.get(service).copied().unwrap_or(self.default))
    }
}

/// Reads `kube_deployment_status_replicas` through a Prometheus instant query
pub struct PrometheusReplicaSource {
    client: Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct InstantResponse {
    status: String,
    #[serde(default)]
    data: Option<InstantData>,
}

#[derive(Debug, Deserialize)]
struct InstantData {
    #[serde(default)]
    result: Vec<InstantSample>,
}

#[derive(Debug, Deserialize)]
struct InstantSample {
    value: (f64, String),
}

impl PrometheusReplicaSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::telemetry(format!("failed to create HTTP client: {}", e)))?;
        let base_url = Url::parse(base_url)
            .map_err(|e| EngineError::invalid_config(format!("invalid Prometheus URL: {}", e)))?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl ReplicaSource for PrometheusReplicaSource {
    async fn current_replicas(&self, service: &str) -> Result<u32> {
        let url = self
            .base_url
            .join("api/v1/query")
            .map_err(|e| EngineError::telemetry(format!("invalid query URL: {}", e)))?;
        let query = format!(
            "kube_deployment_status_replicas{{deployment=\"{}\"}}",
            quote_label(service)
        );

        let response = self
            .client
            .get(url)
            .query(&[("query", query.as_str())])
            .send()
            .await
            .map_err(|e| EngineError::telemetry(format!("replica query failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(EngineError::telemetry(format!(
                "replica query returned {}",
                response.status()
            )));
        }

        let body: InstantResponse = response
            .json()
            .await
            .map_err(|e| EngineError::telemetry(format!("malformed replica response: {}", e)))?;
        if body.status != "success" {
            return Err(EngineError::telemetry("replica query was not successful"));
        }

        let value = body
            .data
            .and_then(|d| d.result.into_iter().next())
            .and_then(|s| s.value.1.parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
            .ok_or_else(|| {
                EngineError::telemetry(format!("no replica count reported for {}", service))
            })?;
        Ok(value.round() as u32)
    }
}
