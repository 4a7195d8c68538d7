//! A/B experiment commands

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use tabled::Tabled;

use crate::client::{ApiClient, ExperimentConfig, ExperimentStatus};
use crate::output::{
    format_timestamp, print_heading, print_json, print_rows, print_success, OutputFormat,
};

/// Row for the traffic split table
#[derive(Tabled)]
struct SplitRow {
    #[tabled(rename = "Provider")]
    provider: String,
    #[tabled(rename = "Traffic")]
    weight: String,
    #[tabled(rename = "Deployed")]
    deployed: String,
}

/// Show the active experiment
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status: ExperimentStatus = client.get("api/v1/experiment").await?;

    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Table => print_status(&status),
    }

    Ok(())
}

/// Replace the experiment with the contents of a JSON file
pub async fn reload(client: &ApiClient, file: &Path, format: OutputFormat) -> Result<()> {
    let config = read_config(file)?;
    let status: ExperimentStatus = client.put("api/v1/experiment", &config).await?;

    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Table => {
            print_success("Experiment reloaded");
            println!();
            print_status(&status);
        }
    }

    Ok(())
}

fn read_config(file: &Path) -> Result<ExperimentConfig> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse experiment config {}", file.display()))
}

fn print_status(status: &ExperimentStatus) {
    print_heading("Experiment");
    let state = if status.active {
        "active".green()
    } else {
        "expired".yellow()
    };
    println!("State:                  {}", state);
    println!(
        "Best provider:          {}",
        status.config.current_best_provider.cyan()
    );
    println!("Age:                    {:.1} days", status.age_days);
    println!(
        "Ends:                   {}",
        format_timestamp(&status.ends_at)
    );
    println!(
        "Metrics:                {}",
        status.config.eligible_metrics.join(", ")
    );
    println!();

    let rows: Vec<SplitRow> = status
        .config
        .traffic_split
        .iter()
        .map(|(provider, weight)| SplitRow {
            provider: provider.clone(),
            weight: format!("{:.0}%", weight * 100.0),
            deployed: if status.available_providers.contains(provider) {
                "yes".to_string()
            } else {
                "no".red().to_string()
            },
        })
        .collect();
    print_rows(rows);
}
