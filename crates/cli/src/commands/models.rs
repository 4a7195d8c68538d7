//! Model registry commands

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, ModelSummary, TrainingReport};
use crate::output::{
    color_origin, format_timestamp, print_info, print_json, print_rows, print_success,
    print_warning, OutputFormat,
};

/// Row for models table
#[derive(Tabled)]
struct ModelRow {
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Provider")]
    provider: String,
    #[tabled(rename = "Trained")]
    trained_at: String,
    #[tabled(rename = "RMSE")]
    rmse: String,
    #[tabled(rename = "MAE")]
    mae: String,
    #[tabled(rename = "Accuracy")]
    accuracy: String,
    #[tabled(rename = "Stale")]
    stale: String,
}

impl From<&ModelSummary> for ModelRow {
    fn from(m: &ModelSummary) -> Self {
        Self {
            service: m.service.clone(),
            provider: m.provider.clone(),
            trained_at: format_timestamp(&m.trained_at),
            rmse: format!("{:.3}", m.performance.mean_squared_error.max(0.0).sqrt()),
            mae: format!("{:.3}", m.performance.mean_absolute_error),
            accuracy: format!("{:.0}%", m.performance.accuracy_estimate * 100.0),
            stale: if m.stale { "yes" } else { "no" }.to_string(),
        }
    }
}

/// List fitted models and their error statistics
pub async fn list_models(
    client: &ApiClient,
    service: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let models: Vec<ModelSummary> = client.get("api/v1/models").await?;
    let filtered: Vec<_> = models
        .into_iter()
        .filter(|m| service.as_ref().map(|s| &m.service == s).unwrap_or(true))
        .collect();

    match format {
        OutputFormat::Json => print_json(&filtered)?,
        OutputFormat::Table => {
            if filtered.is_empty() {
                print_warning("No trained models");
                return Ok(());
            }
            print_rows(filtered.iter().map(ModelRow::from).collect());
            println!("\nTotal: {} models", filtered.len());
        }
    }

    Ok(())
}

/// Train every deployed provider for a service
pub async fn train(client: &ApiClient, service: &str, format: OutputFormat) -> Result<()> {
    let report: TrainingReport = client
        .post(&format!("api/v1/models/{}/train", service))
        .await?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            print_info(&format!(
                "Trained on {} samples ({} data)",
                report.samples,
                color_origin(&report.data_origin)
            ));
            if !report.trained.is_empty() {
                print_rows(report.trained.iter().map(ModelRow::from).collect());
            }
            for failure in &report.failed {
                print_warning(&format!("{}: {}", failure.provider, failure.error));
            }
            print_success(&format!(
                "{} trained, {} failed",
                report.trained.len(),
                report.failed.len()
            ));
        }
    }

    Ok(())
}

/// Retrain one provider's model for a service
pub async fn retrain(
    client: &ApiClient,
    service: &str,
    provider: &str,
    format: OutputFormat,
) -> Result<()> {
    let summary: ModelSummary = client
        .post(&format!("api/v1/models/{}/{}/retrain", service, provider))
        .await?;

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => {
            print_success(&format!("Retrained {} for {}", summary.provider, summary.service));
            print_rows(vec![ModelRow::from(&summary)]);
        }
    }

    Ok(())
}
