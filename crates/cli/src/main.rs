//! Predictive Scaler CLI
//!
//! A command-line tool for querying forecasts, scaling decisions and costs,
//! and for managing models and the provider experiment.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{costs, experiment, fleet, forecast, models};
use std::path::PathBuf;

/// Predictive Scaler CLI
#[derive(Parser)]
#[command(name = "psctl")]
#[command(author, version, about = "CLI for the Predictive Scaler", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via PSCTL_API_URL env var)
    #[arg(long, env = "PSCTL_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    /// Config file (defaults to ~/.config/psctl/config.json)
    #[arg(long, env = "PSCTL_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Forecast CPU utilization for a service
    Predict {
        /// Service name
        service: String,

        /// Minutes ahead (server default when omitted)
        #[arg(long)]
        horizon: Option<u32>,
    },

    /// Get the scaling decision for a service
    Decide {
        /// Service name
        service: String,
    },

    /// View cost analysis and tiers
    #[command(subcommand)]
    Costs(CostsCommands),

    /// Forecasts and costs across every configured service
    #[command(subcommand)]
    Fleet(FleetCommands),

    /// Inspect and train forecast models
    #[command(subcommand)]
    Models(ModelsCommands),

    /// Inspect or replace the provider experiment
    #[command(subcommand)]
    Experiment(ExperimentCommands),

    /// Save defaults to the config file
    Configure {
        /// Default API endpoint URL
        #[arg(long = "set-api-url")]
        set_api_url: Option<String>,

        /// Default output format
        #[arg(long = "set-format")]
        set_format: Option<output::OutputFormat>,
    },
}

#[derive(Subcommand)]
pub enum CostsCommands {
    /// Show current vs forecast cost for a service
    Show {
        /// Service name
        service: String,
    },

    /// List resource tiers
    Tiers,
}

#[derive(Subcommand)]
pub enum FleetCommands {
    /// Forecast every configured service
    Predict {
        /// Minutes ahead (server default when omitted)
        #[arg(long)]
        horizon: Option<u32>,
    },

    /// Per-service costs and decisions with fleet totals
    Costs,
}

#[derive(Subcommand)]
pub enum ModelsCommands {
    /// List fitted models
    List {
        /// Only show models for this service
        #[arg(long, short)]
        service: Option<String>,
    },

    /// Train every deployed provider for a service
    Train {
        /// Service name
        service: String,
    },

    /// Retrain one provider for a service
    Retrain {
        /// Service name
        service: String,

        /// Provider (linear_regression, ensemble_tree, seasonal, sequence_model, heuristic)
        provider: String,
    },
}

#[derive(Subcommand)]
pub enum ExperimentCommands {
    /// Show the active experiment
    Status,

    /// Replace the experiment from a JSON file
    Reload {
        /// Path to the experiment config
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => config::Config::config_path()?,
    };
    let mut file_config = config::Config::load_from(&config_path)?;
    let format = file_config.resolve_format(cli.format);

    if let Commands::Configure {
        set_api_url,
        set_format,
    } = cli.command
    {
        if set_api_url.is_some() {
            file_config.api_url = set_api_url;
        }
        if set_format.is_some() {
            file_config.default_format = set_format;
        }
        file_config.save_to(&config_path)?;
        output::print_success(&format!("Saved {}", config_path.display()));
        return Ok(());
    }

    // Initialize client
    let client = client::ApiClient::new(&file_config.resolve_api_url(cli.api_url))?;

    // Execute command
    match cli.command {
        Commands::Predict { service, horizon } => {
            forecast::show_prediction(&client, &service, horizon, format).await?;
        }
        Commands::Decide { service } => {
            forecast::show_decision(&client, &service, format).await?;
        }
        Commands::Costs(costs_cmd) => match costs_cmd {
            CostsCommands::Show { service } => {
                costs::show_costs(&client, &service, format).await?;
            }
            CostsCommands::Tiers => {
                costs::show_tiers(&client, format).await?;
            }
        },
        Commands::Fleet(fleet_cmd) => match fleet_cmd {
            FleetCommands::Predict { horizon } => {
                fleet::show_predictions(&client, horizon, format).await?;
            }
            FleetCommands::Costs => {
                fleet::show_costs(&client, format).await?;
            }
        },
        Commands::Models(models_cmd) => match models_cmd {
            ModelsCommands::List { service } => {
                models::list_models(&client, service, format).await?;
            }
            ModelsCommands::Train { service } => {
                models::train(&client, &service, format).await?;
            }
            ModelsCommands::Retrain { service, provider } => {
                models::retrain(&client, &service, &provider, format).await?;
            }
        },
        Commands::Experiment(experiment_cmd) => match experiment_cmd {
            ExperimentCommands::Status => {
                experiment::show_status(&client, format).await?;
            }
            ExperimentCommands::Reload { file } => {
                experiment::reload(&client, &file, format).await?;
            }
        },
        Commands::Configure { .. } => {}
    }

    Ok(())
}
