//! Prometheus range-query telemetry source

use super::{async_trait, Metric, QueryRange, TelemetrySource};
use crate::error::{EngineError, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Telemetry source backed by `/api/v1/query_range`
pub struct PrometheusSource {
    client: Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<RangeSeries>,
}

#[derive(Debug, Deserialize)]
struct RangeSeries {
    #[serde(default)]
    values: Vec<(f64, String)>,
}

impl PrometheusSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::telemetry(format!("failed to create HTTP client: {}", e)))?;
        let base_url = Url::parse(base_url)
            .map_err(|e| EngineError::invalid_config(format!("invalid Prometheus URL: {}", e)))?;
        Ok(Self { client, base_url })
    }

    /// PromQL for one metric of one service
    pub fn selector(metric: Metric, service: &str) -> String {
        let pod = regex_literal(service);
        let label = quote_label(service);
        match metric {
            Metric::Cpu => format!(
                "rate(container_cpu_usage_seconds_total{{pod=~\"{}.*\"}}[1m]) * 100",
                pod
            ),
            Metric::Memory => format!(
                "container_memory_usage_bytes{{pod=~\"{}.*\"}} / 1024 / 1024",
                pod
            ),
            Metric::Requests => format!(
                "rate(flask_http_request_total{{service=\"{}\"}}[1m])",
                label
            ),
            Metric::ResponseTime => format!(
                "flask_http_request_duration_seconds_sum{{service=\"{0}\"}} / flask_http_request_duration_seconds_count{{service=\"{0}\"}} * 1000",
                label
            ),
        }
    }
}

/// Escape a value for use inside a double-quoted PromQL label matcher
pub(crate) fn quote_label(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '\n' => quoted.push_str("\\n"),
            c => quoted.push(c),
        }
    }
    quoted
}

/// Match `value` literally in a `=~` matcher, quoted for the label string
pub(crate) fn regex_literal(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len());
    for c in value.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    quote_label(&pattern)
}

#[async_trait]
impl TelemetrySource for PrometheusSource {
    async fn query(
        &self,
        metric: Metric,
        service: &str,
        range: QueryRange,
    ) -> Result<Vec<(i64, f64)>> {
        let url = self
            .base_url
            .join("api/v1/query_range")
            .map_err(|e| EngineError::telemetry(format!("invalid query URL: {}", e)))?;
        let step = format!("{}s", range.step.as_secs().max(1));
        let start = range.start.timestamp().to_string();
        let end = range.end.timestamp().to_string();

        let response = self
            .client
            .get(url)
            .query(&[
                ("query", Self::selector(metric, service).as_str()),
                ("start", start.as_str()),
                ("end", end.as_str()),
                ("step", step.as_str()),
            ])
            .send()
            .await
            .map_err(|e| EngineError::telemetry(format!("{} query failed: {}", metric, e)))?;

        if !response.status().is_success() {
            return Err(EngineError::telemetry(format!(
                "{} query returned {}",
                metric,
                response.status()
            )));
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| EngineError::telemetry(format!("malformed {} response: {}", metric, e)))?;
        if body.status != "success" {
            return Err(EngineError::telemetry(format!(
                "{} query failed: {}",
                metric,
                body.error.unwrap_or_else(|| body.status.clone())
            )));
        }

        // Every matched series contributes; the gateway averages shared timestamps
        let mut points: Vec<(i64, f64)> = body
            .data
            .map(|d| d.result)
            .unwrap_or_default()
            .into_iter()
            .flat_map(|series| series.values)
            .filter_map(|(ts, raw)| {
                raw.parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .map(|v| (ts as i64, v))
            })
            .collect();
        points.sort_by_key(|(ts, _)| *ts);
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use mockito::Matcher;

    fn range() -> QueryRange {
        QueryRange {
            start: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            end: Utc.timestamp_opt(1_700_000_060, 0).unwrap(),
            step: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn test_parses_matrix_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/query_range")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("step".into(), "30s".into()),
                Matcher::UrlEncoded("start".into(), "1700000000".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"status":"success","data":{"resultType":"matrix","result":[
                    {"metric":{"pod":"api-1"},"values":[[1700000030,"20.5"],[1700000000,"10"]]},
                    {"metric":{"pod":"api-2"},"values":[[1700000000,"NaN"]]}
                ]}}"#,
            )
            .create_async()
            .await;

        let source = PrometheusSource::new(&server.url(), Duration::from_secs(2)).unwrap();
        let points = source.query(Metric::Cpu, "api", range()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(points, vec![(1_700_000_000, 10.0), (1_700_000_030, 20.5)]);
    }

    #[tokio::test]
    async fn test_empty_result_is_empty() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/query_range")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"status":"success","data":{"resultType":"matrix","result":[]}}"#)
            .create_async()
            .await;

        let source = PrometheusSource::new(&server.url(), Duration::from_secs(2)).unwrap();
        let points = source.query(Metric::Memory, "api", range()).await.unwrap();
        assert!(points.is_empty());
    }

    #[tokio::test]
    async fn test_server_error_is_telemetry_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/query_range")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let source = PrometheusSource::new(&server.url(), Duration::from_secs(2)).unwrap();
        let err = source.query(Metric::Cpu, "api", range()).await.unwrap_err();
        assert!(matches!(err, EngineError::TelemetryUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_error_status_in_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/query_range")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"status":"error","errorType":"bad_data","error":"parse error"}"#)
            .create_async()
            .await;

        let source = PrometheusSource::new(&server.url(), Duration::from_secs(2)).unwrap();
        let err = source.query(Metric::Cpu, "api", range()).await.unwrap_err();
        assert!(err.to_string().contains("parse error"));
    }

    #[test]
    fn test_selectors_name_the_service() {
        for metric in Metric::ALL {
            assert!(PrometheusSource::selector(metric, "checkout").contains("checkout"));
        }
        assert!(PrometheusSource::selector(Metric::Cpu, "x").starts_with("rate("));
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(PrometheusSource::new("not a url", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_selectors_escape_service_names() {
        let cpu = PrometheusSource::selector(Metric::Cpu, "web.v2");
        assert!(cpu.contains(r#"pod=~"web\\.v2.*""#));

        let requests = PrometheusSource::selector(Metric::Requests, r#"api"} or up{x=""#);
        assert!(requests.contains(r#"service="api\"} or up{x=\"""#));
        assert_eq!(requests.matches("{service=").count(), 1);
    }

    #[test]
    fn test_label_quoting() {
        assert_eq!(quote_label("plain-name_1"), "plain-name_1");
        assert_eq!(quote_label("a\"b\\c\nd"), r#"a\"b\\c\nd"#);
        assert_eq!(regex_literal("a.b*"), r#"a\\.b\\*"#);
        assert_eq!(regex_literal("(x|y)"), r#"\\(x\\|y\\)"#);
    }
}
