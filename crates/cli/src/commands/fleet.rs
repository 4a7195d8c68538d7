//! Fleet-wide forecast and cost commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, FleetCostReport, FleetForecast};
use crate::output::{
    color_confidence, color_risk, format_delta, format_percent, format_usd, print_heading,
    print_json, print_rows, print_warning, OutputFormat,
};

#[derive(Tabled)]
struct ForecastRow {
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
    #[tabled(rename = "Provider")]
    provider: String,
    #[tabled(rename = "Recommendation")]
    recommendation: String,
}

#[derive(Tabled)]
struct CostRow {
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Replicas")]
    replicas: String,
    #[tabled(rename = "Current")]
    current: String,
    #[tabled(rename = "Forecast")]
    predicted: String,
    #[tabled(rename = "Impact")]
    impact: String,
    #[tabled(rename = "Risk")]
    risk: String,
}

/// Forecast every service the server is configured to cover
pub async fn show_predictions(
    client: &ApiClient,
    horizon: Option<u32>,
    format: OutputFormat,
) -> Result<()> {
    let path = match horizon {
        Some(minutes) => format!("api/v1/predictions?horizon={}", minutes),
        None => "api/v1/predictions".to_string(),
    };
    let fleet: FleetForecast = client.get(&path).await?;

    match format {
        OutputFormat::Json => print_json(&fleet)?,
        OutputFormat::Table => {
            print_heading(&format!("Fleet forecast, {} min ahead", fleet.horizon_minutes));
            let rows: Vec<ForecastRow> = fleet
                .predictions
                .iter()
                .filter_map(|p| p.forecast.as_ref())
                .map(|f| ForecastRow {
                    service: f.service.clone(),
                    cpu: format_percent(f.predicted_value),
                    confidence: color_confidence(f.confidence),
                    provider: f.provider_used.clone(),
                    recommendation: f.recommendation.clone(),
                })
                .collect();
            print_rows(rows);

            for failed in fleet.predictions.iter().filter(|p| p.forecast.is_none()) {
                print_warning(&format!(
                    "{}: {}",
                    failed.service,
                    failed.error.as_deref().unwrap_or("no forecast")
                ));
            }
        }
    }

    Ok(())
}

/// Per-service costs and decisions followed by fleet totals
pub async fn show_costs(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let report: FleetCostReport = client.get("api/v1/costs").await?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            print_heading("Fleet Cost Analysis");
            let rows: Vec<CostRow> = report
                .services
                .iter()
                .map(|a| {
                    let decision = &a.decision;
                    let (current, predicted) = match &a.cost_metrics {
                        Some(m) => (
                            format!("{}/h", format_usd(m.current_cost_per_hour)),
                            format!("{}/h", format_usd(m.predicted_cost_per_hour)),
                        ),
                        None => ("-".to_string(), "-".to_string()),
                    };
                    CostRow {
                        service: a.service.clone(),
                        replicas: format!(
                            "{} -> {}",
                            decision.current_replicas, decision.recommended_replicas
                        ),
                        current,
                        predicted,
                        impact: format_delta(decision.cost_impact_per_hour),
                        risk: color_risk(&decision.risk_level),
                    }
                })
                .collect();
            print_rows(rows);

            for failed in report.services.iter().filter(|a| a.error.is_some()) {
                print_warning(&format!(
                    "{}: {}",
                    failed.service,
                    failed.error.as_deref().unwrap_or_default()
                ));
            }

            let summary = &report.summary;
            println!();
            println!(
                "Services:               {} analyzed, {} failed",
                summary.services_analyzed, summary.services_failed
            );
            println!(
                "Total:                  {}/h now, {}/h forecast",
                format_usd(summary.total_current_cost_per_hour),
                format_usd(summary.total_predicted_cost_per_hour)
            );
            let savings = format!(
                "{}/h, {}/day, {}/month",
                format_usd(summary.total_savings_per_hour),
                format_usd(summary.total_savings_per_day),
                format_usd(summary.total_savings_per_month)
            );
            let savings = if summary.total_savings_per_hour >= 0.0 {
                savings.green().bold()
            } else {
                savings.red().bold()
            };
            println!("{} {}", "Savings:".bold(), savings);
        }
    }

    Ok(())
}
