//! Cost-related CLI commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, CostMetrics, CostTier};
use crate::output::{format_usd, print_heading, print_json, print_rows, OutputFormat};

/// Row for the tier table
#[derive(Tabled)]
struct TierRow {
    #[tabled(rename = "Tier")]
    name: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Multiplier")]
    multiplier: String,
}

/// Show current vs forecast-driven cost for a service
pub async fn show_costs(client: &ApiClient, service: &str, format: OutputFormat) -> Result<()> {
    let result: CostMetrics = client.get(&format!("api/v1/costs/{}", service)).await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            print_heading("Cost Analysis");
            println!("Service:                {}", result.service.cyan());
            println!(
                "Current:                {} x {} at {}/h",
                result.current_replicas,
                result.current_tier,
                format_usd(result.current_cost_per_hour)
            );
            println!(
                "Forecast:               {} x {} at {}/h",
                result.predicted_replicas,
                result.predicted_tier,
                format_usd(result.predicted_cost_per_hour).green()
            );
            println!();

            let daily = result.savings_per_hour * 24.0;
            let monthly = daily * 30.0;
            let savings = format!("{}/day, {}/month", format_usd(daily), format_usd(monthly));
            let savings = if result.savings_per_hour >= 0.0 {
                savings.green().bold()
            } else {
                savings.red().bold()
            };
            println!("{} {}", "Savings:".bold(), savings);
            println!("Efficiency score:       {:.1}/100", result.efficiency_score);
            println!();
            println!("{}", result.recommendation);
        }
    }

    Ok(())
}

/// Show the resource tiers used for cost estimates
pub async fn show_tiers(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let tiers: Vec<CostTier> = client.get("api/v1/tiers").await?;

    match format {
        OutputFormat::Json => print_json(&tiers)?,
        OutputFormat::Table => {
            let rows: Vec<TierRow> = tiers
                .iter()
                .map(|t| TierRow {
                    name: t.name.clone(),
                    cpu: format!("{}", t.cpu_units),
                    memory: format!("{}Mi", t.memory_mb),
                    multiplier: format!("x{:.1}", t.cost_multiplier),
                })
                .collect();
            print_rows(rows);
        }
    }

    Ok(())
}
