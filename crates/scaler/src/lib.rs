//! Predictive scaler service
//!
//! HTTP layer and process configuration around the decision engine.

pub mod api;
pub mod config;
