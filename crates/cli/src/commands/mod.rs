//! Subcommand implementations

pub mod costs;
pub mod experiment;
pub mod fleet;
pub mod forecast;
pub mod models;
