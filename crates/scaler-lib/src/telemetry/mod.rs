//! Telemetry retrieval
//!
//! The engine reads time-stamped samples through [`TelemetrySource`]. The
//! [`TelemetryGateway`] bounds every backend call with a timeout, merges
//! per-metric series into samples, and substitutes synthetic data when the
//! backend is absent, slow or empty.

mod prometheus;
mod replicas;
mod synthetic;

pub use prometheus::PrometheusSource;
pub use replicas::{PrometheusReplicaSource, ReplicaSource, StaticReplicaSource};
pub use synthetic::{correlated_sample, SyntheticGenerator};

use crate::config::TelemetrySettings;
use crate::error::{EngineError, Result};
use crate::models::{DataOrigin, ResourceSample};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub use async_trait::async_trait;

/// Metric families the engine asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Cpu,
    Memory,
    Requests,
    ResponseTime,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::Cpu,
        Metric::Memory,
        Metric::Requests,
        Metric::ResponseTime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cpu => "cpu",
            Metric::Memory => "memory",
            Metric::Requests => "requests",
            Metric::ResponseTime => "response_time",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive time range sampled at a fixed step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub step: Duration,
}

impl QueryRange {
    /// Range ending now and reaching `lookback` into the past
    pub fn last(lookback: Duration, step: Duration) -> Self {
        let end = Utc::now();
        let start = end
            - chrono::Duration::from_std(lookback).unwrap_or_else(|_| chrono::Duration::hours(6));
        Self { start, end, step }
    }

    /// Timestamps from start to end at `step`, in seconds
    pub fn timestamps(&self) -> impl Iterator<Item = i64> {
        let step = self.step.as_secs().max(1) as i64;
        let start = self.start.timestamp();
        let end = self.end.timestamp();
        (0..)
            .map(move |i| start + i * step)
            .take_while(move |t| *t <= end)
    }
}

/// Backend that answers range queries for one metric of one service
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Ordered (unix seconds, value) pairs; empty when nothing matched
    async fn query(&self, metric: Metric, service: &str, range: QueryRange)
        -> Result<Vec<(i64, f64)>>;
}

/// Samples plus where they came from
#[derive(Debug, Clone)]
pub struct TelemetryBatch {
    pub samples: Vec<ResourceSample>,
    pub origin: DataOrigin,
    /// Why metrics were synthesized, if any were
    pub notes: Vec<String>,
}

pub struct TelemetryGateway {
    source: Option<Arc<dyn TelemetrySource>>,
    synthetic: SyntheticGenerator,
    settings: TelemetrySettings,
}

impl TelemetryGateway {
    pub fn new(
        source: Option<Arc<dyn TelemetrySource>>,
        settings: TelemetrySettings,
        seed: u64,
    ) -> Self {
        Self {
            source,
            synthetic: SyntheticGenerator::new(seed),
            settings,
        }
    }

    pub fn has_backend(&self) -> bool {
        self.source.is_some()
    }

    /// Training and prediction history for a service
    pub async fn history(&self, service: &str) -> TelemetryBatch {
        let range = QueryRange::last(self.settings.lookback(), self.settings.step());
        self.fetch(service, range).await
    }

    /// Latest observed sample for a service
    pub async fn current(&self, service: &str) -> (ResourceSample, DataOrigin) {
        let range = QueryRange::last(self.settings.snapshot_lookback(), self.settings.step());
        let batch = self.fetch(service, range).await;
        match batch.samples.last() {
            Some(sample) => (*sample, batch.origin),
            None => (
                self.synthetic.sample(range.end.timestamp()),
                DataOrigin::Synthetic,
            ),
        }
    }

    async fn fetch(&self, service: &str, range: QueryRange) -> TelemetryBatch {
        let Some(source) = &self.source else {
            return self.synthesize(range, "no telemetry backend configured".to_string());
        };

        let (cpu, memory, requests, response_time) = tokio::join!(
            self.query_bounded(source.as_ref(), Metric::Cpu, service, range),
            self.query_bounded(source.as_ref(), Metric::Memory, service, range),
            self.query_bounded(source.as_ref(), Metric::Requests, service, range),
            self.query_bounded(source.as_ref(), Metric::ResponseTime, service, range),
        );

        let cpu = match cpu {
            Ok(points) if !points.is_empty() => points,
            Ok(_) => return self.synthesize(range, "cpu query returned no data".to_string()),
            Err(e) => return self.synthesize(range, e.to_string()),
        };

        let mut notes = Vec::new();
        let mut secondary = Vec::with_capacity(3);
        for (metric, outcome) in [
            (Metric::Memory, memory),
            (Metric::Requests, requests),
            (Metric::ResponseTime, response_time),
        ] {
            match outcome {
                Ok(points) if !points.is_empty() => secondary.push(Some(points)),
                Ok(_) => {
                    notes.push(format!("{} returned no data", metric));
                    secondary.push(None);
                }
                Err(e) => {
                    notes.push(format!("{}: {}", metric, e));
                    secondary.push(None);
                }
            }
        }

        let samples = merge_series(&cpu, &secondary);
        let origin = if notes.is_empty() {
            DataOrigin::Observed
        } else {
            debug!(service = %service, missing = ?notes, "Derived secondary metrics from CPU");
            DataOrigin::Partial
        };
        TelemetryBatch {
            samples,
            origin,
            notes,
        }
    }

    async fn query_bounded(
        &self,
        source: &dyn TelemetrySource,
        metric: Metric,
        service: &str,
        range: QueryRange,
    ) -> Result<Vec<(i64, f64)>> {
        match tokio::time::timeout(self.settings.timeout(), source.query(metric, service, range))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(EngineError::telemetry(format!(
                "{} query timed out after {:?}",
                metric,
                self.settings.timeout()
            ))),
        }
    }

    fn synthesize(&self, range: QueryRange, reason: String) -> TelemetryBatch {
        warn!(reason = %reason, "Telemetry unavailable, generating synthetic samples");
        TelemetryBatch {
            samples: self.synthetic.generate(&range),
            origin: DataOrigin::Synthetic,
            notes: vec![reason],
        }
    }
}

/// Join secondary series onto the CPU timeline
///
/// Duplicate timestamps are averaged. A secondary metric that is absent,
/// or has no point at a CPU timestamp, is derived from CPU.
fn merge_series(cpu: &[(i64, f64)], secondary: &[Option<Vec<(i64, f64)>>]) -> Vec<ResourceSample> {
    let averaged = |points: &[(i64, f64)]| -> BTreeMap<i64, f64> {
        let mut sums: BTreeMap<i64, (f64, usize)> = BTreeMap::new();
        for (t, v) in points {
            let slot = sums.entry(*t).or_insert((0.0, 0));
            slot.0 += v;
            slot.1 += 1;
        }
        sums.into_iter()
            .map(|(t, (sum, n))| (t, sum / n as f64))
            .collect()
    };

    let cpu = averaged(cpu);
    let others: Vec<Option<BTreeMap<i64, f64>>> = secondary
        .iter()
        .map(|series| series.as_deref().map(averaged))
        .collect();
    let lookup = |index: usize, t: i64| -> Option<f64> {
        others
            .get(index)
            .and_then(|s| s.as_ref())
            .and_then(|s| s.get(&t).copied())
    };

    cpu.into_iter()
        .map(|(t, cpu_percent)| {
            let derived = correlated_sample(t, cpu_percent);
            ResourceSample {
                timestamp: t,
                cpu_percent,
                memory_mb: lookup(0, t).unwrap_or(derived.memory_mb),
                request_rate: lookup(1, t).unwrap_or(derived.request_rate),
                response_time_ms: lookup(2, t).unwrap_or(derived.response_time_ms),
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory source returning canned series per metric
    #[derive(Default)]
    pub struct MockSource {
        pub series: HashMap<Metric, Vec<(i64, f64)>>,
        pub failing: Vec<Metric>,
        pub delay: Option<Duration>,
        pub calls: AtomicUsize,
    }

    impl MockSource {
        /// CPU-only series at a fixed value, one point per 30 s ending now
        pub fn flat_cpu(count: usize, cpu: f64) -> Self {
            let now = Utc::now().timestamp();
            let points = (0..count)
                .map(|i| (now - (count - 1 - i) as i64 * 30, cpu))
                .collect();
            let mut series = HashMap::new();
            series.insert(Metric::Cpu, points);
            Self {
                series,
                ..Self::default()
            }
        }

        pub fn with_series(mut self, metric: Metric, points: Vec<(i64, f64)>) -> Self {
            self.series.insert(metric, points);
            self
        }
    }

    #[async_trait]
    impl TelemetrySource for MockSource {
        async fn query(
            &self,
            metric: Metric,
            _service: &str,
            _range: QueryRange,
        ) -> Result<Vec<(i64, f64)>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing.contains(&metric) {
                return Err(EngineError::telemetry(format!("{} backend error", metric)));
            }
            Ok(self.series.get(&metric).cloned().unwrap_or_default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::MockSource;
    use super::*;

    fn settings() -> TelemetrySettings {
        TelemetrySettings {
            lookback_secs: 3600,
            timeout_ms: 200,
            ..TelemetrySettings::default()
        }
    }

    #[tokio::test]
    async fn test_no_backend_means_synthetic() {
        let gateway = TelemetryGateway::new(None, settings(), 1);
        let batch = gateway.history("api").await;
        assert_eq!(batch.origin, DataOrigin::Synthetic);
        assert_eq!(batch.samples.len(), 121);
        assert!(!gateway.has_backend());
    }

    #[tokio::test]
    async fn test_empty_results_fall_back_to_synthetic() {
        let gateway = TelemetryGateway::new(Some(Arc::new(MockSource::default())), settings(), 1);
        let batch = gateway.history("api").await;
        assert_eq!(batch.origin, DataOrigin::Synthetic);
        assert!(!batch.samples.is_empty());
        assert!(batch.notes[0].contains("no data"));
    }

    #[tokio::test]
    async fn test_cpu_only_is_partial_with_derived_columns() {
        let source = MockSource::flat_cpu(10, 40.0);
        let gateway = TelemetryGateway::new(Some(Arc::new(source)), settings(), 1);
        let batch = gateway.history("api").await;
        assert_eq!(batch.origin, DataOrigin::Partial);
        assert_eq!(batch.samples.len(), 10);
        assert_eq!(batch.samples[0].memory_mb, 48.0);
        assert_eq!(batch.samples[0].request_rate, 20.0);
        assert_eq!(batch.notes.len(), 3);
    }

    #[tokio::test]
    async fn test_full_series_is_observed_and_merged() {
        let cpu = vec![(100, 10.0), (130, 20.0), (130, 30.0)];
        let source = MockSource::default()
            .with_series(Metric::Cpu, cpu)
            .with_series(Metric::Memory, vec![(100, 512.0), (130, 600.0)])
            .with_series(Metric::Requests, vec![(100, 3.0)])
            .with_series(Metric::ResponseTime, vec![(130, 120.0)]);
        let gateway = TelemetryGateway::new(Some(Arc::new(source)), settings(), 1);
        let batch = gateway.history("api").await;

        assert_eq!(batch.origin, DataOrigin::Observed);
        assert_eq!(batch.samples.len(), 2);
        assert_eq!(batch.samples[1].cpu_percent, 25.0);
        assert_eq!(batch.samples[1].memory_mb, 600.0);
        assert_eq!(batch.samples[0].request_rate, 3.0);
        // No request point at 130, derived from cpu 25
        assert_eq!(batch.samples[1].request_rate, 12.5);
        assert_eq!(batch.samples[1].response_time_ms, 120.0);
    }

    #[tokio::test]
    async fn test_cpu_failure_falls_back() {
        let source = MockSource {
            failing: vec![Metric::Cpu],
            ..MockSource::flat_cpu(10, 40.0)
        };
        let gateway = TelemetryGateway::new(Some(Arc::new(source)), settings(), 1);
        let batch = gateway.history("api").await;
        assert_eq!(batch.origin, DataOrigin::Synthetic);
        assert!(batch.notes[0].contains("backend error"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_backend_times_out() {
        let source = MockSource {
            delay: Some(Duration::from_secs(30)),
            ..MockSource::flat_cpu(10, 40.0)
        };
        let gateway = TelemetryGateway::new(Some(Arc::new(source)), settings(), 1);
        let batch = gateway.history("api").await;
        assert_eq!(batch.origin, DataOrigin::Synthetic);
        assert!(batch.notes[0].contains("timed out"));
    }

    #[tokio::test]
    async fn test_current_returns_latest_sample() {
        let source = MockSource::flat_cpu(10, 85.0);
        let gateway = TelemetryGateway::new(Some(Arc::new(source)), settings(), 1);
        let (sample, origin) = gateway.current("api").await;
        assert_eq!(sample.cpu_percent, 85.0);
        assert_eq!(origin, DataOrigin::Partial);
    }

    #[test]
    fn test_query_range_timestamps() {
        let range = QueryRange::last(Duration::from_secs(300), Duration::from_secs(30));
        let ts: Vec<i64> = range.timestamps().collect();
        assert_eq!(ts.len(), 11);
        assert_eq!(ts[1] - ts[0], 30);
    }
}
