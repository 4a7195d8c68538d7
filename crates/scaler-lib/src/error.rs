//! Error taxonomy for the decision engine
//!
//! `InsufficientData` and `ProviderUnavailable` are absorbed by the
//! degradation ladder, `TelemetryUnavailable` by the synthetic data path.
//! The remaining variants only reach callers of explicit admin operations.

use crate::models::ProviderKind;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised inside the engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Too few samples or feature rows for a provider's minimum
    #[error("insufficient data for {subject}: {available} rows, need {required}")]
    InsufficientData {
        subject: String,
        required: usize,
        available: usize,
    },

    /// Provider dependency not present in this deployment
    #[error("provider {provider} is not available in this deployment")]
    ProviderUnavailable { provider: ProviderKind },

    /// A fitted model exists but inference failed
    #[error("prediction failed for {provider}: {message}")]
    PredictionError {
        provider: ProviderKind,
        message: String,
    },

    /// Telemetry collaborator unreachable or malformed response
    #[error("telemetry unavailable: {message}")]
    TelemetryUnavailable { message: String },

    /// Rejected configuration (experiment reload, engine settings)
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Caller input outside what the engine accepts
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// The terminal heuristic rung failed; indicates a defect
    #[error("decision unavailable: {message}")]
    DecisionUnavailable { message: String },
}

impl EngineError {
    pub fn insufficient(subject: impl ToString, required: usize, available: usize) -> Self {
        Self::InsufficientData {
            subject: subject.to_string(),
            required,
            available,
        }
    }

    pub fn prediction(provider: ProviderKind, message: impl Into<String>) -> Self {
        Self::PredictionError {
            provider,
            message: message.into(),
        }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::TelemetryUnavailable {
            message: message.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Short machine-readable code used by the HTTP layer
    pub fn code(&self) -> &'static str {
        match self {
            Self::InsufficientData { .. } => "insufficient_data",
            Self::ProviderUnavailable { .. } => "provider_unavailable",
            Self::PredictionError { .. } => "prediction_error",
            Self::TelemetryUnavailable { .. } => "telemetry_unavailable",
            Self::InvalidConfig { .. } => "invalid_config",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::DecisionUnavailable { .. } => "decision_unavailable",
        }
    }

    /// Whether the degradation ladder may recover from this error by
    /// moving to the next rung
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientData { .. }
                | Self::ProviderUnavailable { .. }
                | Self::PredictionError { .. }
        )
    }
}
