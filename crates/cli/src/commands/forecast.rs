//! Forecast and scaling decision commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, Forecast, ScalingDecision};
use crate::output::{
    color_confidence, color_origin, color_risk, format_delta, format_percent, format_timestamp,
    print_heading, print_json, print_rows, print_warning, OutputFormat,
};

/// Row for the degradation chain table
#[derive(Tabled)]
struct DegradationRow {
    #[tabled(rename = "Provider")]
    provider: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// Show the CPU forecast for a service
pub async fn show_prediction(
    client: &ApiClient,
    service: &str,
    horizon: Option<u32>,
    format: OutputFormat,
) -> Result<()> {
    let path = match horizon {
        Some(minutes) => format!("api/v1/predictions/{}?horizon={}", service, minutes),
        None => format!("api/v1/predictions/{}", service),
    };
    let forecast: Forecast = client.get(&path).await?;

    match format {
        OutputFormat::Json => print_json(&forecast)?,
        OutputFormat::Table => print_forecast(&forecast),
    }

    Ok(())
}

fn print_forecast(forecast: &Forecast) {
    print_heading(&format!("Forecast for {}", forecast.service.cyan()));
    println!(
        "Predicted CPU:          {} in {} min",
        format_percent(forecast.predicted_value).bold(),
        forecast.horizon_minutes
    );
    println!(
        "Interval:               {} - {}",
        format_percent(forecast.confidence_interval.lower),
        format_percent(forecast.confidence_interval.upper)
    );
    println!(
        "Confidence:             {}",
        color_confidence(forecast.confidence)
    );
    println!("Provider:               {}", forecast.provider_used);
    println!(
        "Data:                   {}",
        color_origin(&forecast.data_origin)
    );
    println!("Recommendation:         {}", forecast.recommendation.bold());
    println!();
    println!("{}", forecast.reasoning);

    if !forecast.degradation.is_empty() {
        println!();
        print_warning("Served by a fallback provider");
        let rows: Vec<DegradationRow> = forecast
            .degradation
            .iter()
            .map(|step| DegradationRow {
                provider: step.provider.clone(),
                reason: step.reason.clone(),
            })
            .collect();
        print_rows(rows);
    }

    println!();
    println!(
        "Generated: {}",
        format_timestamp(&forecast.generated_at).dimmed()
    );
}

/// Show the scaling decision for a service
pub async fn show_decision(client: &ApiClient, service: &str, format: OutputFormat) -> Result<()> {
    let decision: ScalingDecision = client.get(&format!("api/v1/decisions/{}", service)).await?;

    match format {
        OutputFormat::Json => print_json(&decision)?,
        OutputFormat::Table => {
            print_heading(&format!("Scaling decision for {}", decision.service.cyan()));

            let arrow = match decision
                .recommended_replicas
                .cmp(&decision.current_replicas)
            {
                std::cmp::Ordering::Greater => "↑".green().to_string(),
                std::cmp::Ordering::Less => "↓".yellow().to_string(),
                std::cmp::Ordering::Equal => "=".dimmed().to_string(),
            };
            println!(
                "Replicas:               {} -> {} {}",
                decision.current_replicas,
                decision.recommended_replicas.to_string().bold(),
                arrow
            );
            println!("Tier:                   {}", decision.recommended_tier);
            println!(
                "Cost impact:            {}",
                format_delta(decision.cost_impact_per_hour)
            );
            println!("Risk:                   {}", color_risk(&decision.risk_level));
            println!(
                "Confidence:             {}",
                color_confidence(decision.confidence)
            );
            println!("Rule:                   {}", decision.rule);
            println!();
            println!("{}", decision.reasoning);

            if decision.forecast.is_none() {
                println!();
                print_warning("No forecast was available; replicas held");
            }
        }
    }

    Ok(())
}
