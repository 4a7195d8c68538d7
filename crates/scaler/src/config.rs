//! Service configuration

use anyhow::{Context, Result};
use scaler_lib::EngineConfig;
use serde::Deserialize;
use std::path::Path;

/// Environment variable naming an optional configuration file
pub const CONFIG_PATH_ENV: &str = "SCALER_CONFIG";

/// Service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Name attached to every structured log event
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// Port for the engine API, health and metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Decision engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "predictive-scaler".to_string())
}

fn default_api_port() -> u16 {
    8080
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            api_port: default_api_port(),
            engine: EngineConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load from `SCALER_CONFIG` (if set) overlaid with `SCALER__*` variables
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).ok();
        Self::load_from(path.as_deref().map(Path::new))
    }

    /// Load from an optional file overlaid with `SCALER__*` variables
    ///
    /// Nested keys use `__`, e.g. `SCALER__ENGINE__POLICY__MAX_REPLICAS=20`.
    /// The fleet list is comma separated: `SCALER__ENGINE__SERVICES=api,web`.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix("SCALER")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("engine.services")
                    .try_parsing(true),
            )
            .build()
            .context("failed to read configuration")?;

        let service: ServiceConfig = config
            .try_deserialize()
            .context("failed to parse configuration")?;
        service
            .engine
            .validate()
            .context("invalid engine configuration")?;
        Ok(service)
    }
}
