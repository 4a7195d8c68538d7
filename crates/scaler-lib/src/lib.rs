//! Predictive autoscaling decision engine
//!
//! This crate provides the core functionality for:
//! - Telemetry retrieval with synthetic fallback
//! - Feature engineering and multi-provider CPU forecasting
//! - A/B provider routing with a degradation ladder
//! - Cost modelling and cost-aware scaling decisions
//! - Health checks and observability

pub mod config;
pub mod cost;
pub mod engine;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod telemetry;

pub use config::EngineConfig;
pub use engine::{EngineBuilder, ScalingEngine};
pub use error::{EngineError, Result};
pub use health::{
    Component, ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{EngineMetrics, StructuredLogger};
pub use predictor::ExperimentStatus;
