//! Model registry
//!
//! Maps (service, provider kind) to the most recent fitted model. Reads
//! clone an `Arc` out of the map and never wait on training; training runs
//! on the blocking pool, and concurrent requests for the same key share one
//! in-flight run.

use super::{FittedModel, ForecastProvider};
use crate::error::{EngineError, Result};
use crate::models::{FeatureVector, ModelSummary, ProviderKind};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

/// Registry key: one model per service and provider kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelKey {
    pub service: String,
    pub kind: ProviderKind,
}

impl ModelKey {
    pub fn new(service: impl Into<String>, kind: ProviderKind) -> Self {
        Self {
            service: service.into(),
            kind,
        }
    }
}

type TrainingCell = Arc<OnceCell<Result<Arc<FittedModel>>>>;

pub struct ModelRegistry {
    entries: DashMap<ModelKey, Arc<FittedModel>>,
    in_flight: DashMap<ModelKey, TrainingCell>,
    staleness_window: Duration,
}

impl ModelRegistry {
    /// Empty registry; models older than `staleness_window` are stale
    pub fn new(staleness_window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            in_flight: DashMap::new(),
            staleness_window,
        }
    }

    pub fn staleness_window(&self) -> Duration {
        self.staleness_window
    }

    pub fn get(&self, service: &str, kind: ProviderKind) -> Option<Arc<FittedModel>> {
        self.entries
            .get(&ModelKey::new(service, kind))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Model for the key if one exists and is not stale
    pub fn fresh(&self, service: &str, kind: ProviderKind) -> Option<Arc<FittedModel>> {
        self.get(service, kind).filter(|model| !self.is_stale(model))
    }

    pub fn is_stale(&self, model: &FittedModel) -> bool {
        (Utc::now() - model.trained_at)
            .to_std()
            .map(|age| age > self.staleness_window)
            .unwrap_or(false)
    }

    /// Store a fitted model, replacing any previous one for its key
    pub fn insert(&self, model: FittedModel) -> Arc<FittedModel> {
        let model = Arc::new(model);
        self.entries.insert(
            ModelKey::new(model.service.clone(), model.kind),
            Arc::clone(&model),
        );
        model
    }

    /// Train `provider` for `service`, joining a run already in flight
    ///
    /// Every caller that joins a run observes the same outcome, success or
    /// error. A successful outcome replaces the registry entry.
    pub async fn train_coalesced(
        &self,
        provider: Arc<dyn ForecastProvider>,
        service: &str,
        rows: Arc<Vec<FeatureVector>>,
    ) -> Result<Arc<FittedModel>> {
        let kind = provider.kind();
        let key = ModelKey::new(service, kind);
        let cell: TrainingCell = self
            .in_flight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let outcome = cell
            .get_or_init(|| async {
                let owned_service = service.to_string();
                let result = tokio::task::spawn_blocking(move || {
                    provider.train(&owned_service, &rows)
                })
                .await
                .map_err(|e| EngineError::prediction(kind, format!("training task failed: {}", e)))
                .and_then(|trained| trained)
                .map(|model| self.insert(model));
                debug!(
                    service = %service,
                    provider = %kind,
                    ok = result.is_ok(),
                    "Training run finished"
                );
                result
            })
            .await
            .clone();

        // Retire the finished run so the next request trains afresh
        self.in_flight
            .remove_if(&key, |_, current| Arc::ptr_eq(current, &cell));
        outcome
    }

    /// Record the latency of the latest prediction on a model
    pub fn record_prediction(&self, service: &str, kind: ProviderKind, duration_ms: f64) {
        if let Some(mut entry) = self.entries.get_mut(&ModelKey::new(service, kind)) {
            Arc::make_mut(entry.value_mut())
                .performance
                .last_prediction_duration_ms = duration_ms;
        }
    }

    /// Drop one model; returns whether it existed
    pub fn invalidate(&self, service: &str, kind: ProviderKind) -> bool {
        self.entries.remove(&ModelKey::new(service, kind)).is_some()
    }

    /// Summaries of every stored model, ordered by service then kind
    pub fn snapshot(&self) -> Vec<ModelSummary> {
        let mut summaries: Vec<ModelSummary> = self
            .entries
            .iter()
            .map(|entry| {
                let model = entry.value();
                ModelSummary {
                    service: model.service.clone(),
                    provider: model.kind,
                    trained_at: model.trained_at,
                    stale: self.is_stale(model),
                    performance: model.performance.clone(),
                }
            })
            .collect();
        summaries.sort_by(|a, b| {
            a.service
                .cmp(&b.service)
                .then_with(|| a.provider.cmp(&b.provider))
        });
        summaries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{Fit, ForecastRequest, HeuristicProvider, LinearProvider, ModelState};
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider whose fit is slow and counted
    struct CountingProvider {
        fits: AtomicUsize,
        fail: bool,
    }

    impl ForecastProvider for CountingProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::EnsembleTree
        }

        fn min_samples(&self) -> usize {
            0
        }

        fn confidence_baseline(&self) -> f64 {
            0.5
        }

        fn fit(&self, _rows: &[FeatureVector]) -> Result<Fit> {
            self.fits.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(100));
            if self.fail {
                return Err(EngineError::prediction(self.kind(), "boom"));
            }
            Ok(Fit {
                state: ModelState::Heuristic,
                mean_squared_error: 1.0,
                mean_absolute_error: 1.0,
                target_variance: 4.0,
            })
        }

        fn forecast(&self, _state: &ModelState, _request: &ForecastRequest<'_>) -> Result<f64> {
            Ok(50.0)
        }
    }

    fn counting(fail: bool) -> Arc<CountingProvider> {
        Arc::new(CountingProvider {
            fits: AtomicUsize::new(0),
            fail,
        })
    }

    #[tokio::test]
    async fn test_train_populates_registry() {
        let registry = ModelRegistry::new(Duration::from_secs(1800));
        let data = Arc::new(rows(&cyclic_samples(40, 60)));
        let model = registry
            .train_coalesced(Arc::new(LinearProvider::new()), "api", data)
            .await
            .unwrap();
        assert_eq!(model.kind, ProviderKind::LinearRegression);
        assert!(registry.fresh("api", ProviderKind::LinearRegression).is_some());
        assert!(registry.get("api", ProviderKind::Seasonal).is_none());
        assert!(registry.get("other", ProviderKind::LinearRegression).is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_trains_coalesce() {
        let registry = ModelRegistry::new(Duration::from_secs(1800));
        let provider = counting(false);
        let data = Arc::new(Vec::new());

        let (a, b) = tokio::join!(
            registry.train_coalesced(provider.clone(), "api", data.clone()),
            registry.train_coalesced(provider.clone(), "api", data.clone()),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(provider.fits.load(Ordering::SeqCst), 1);

        // A later request starts a new run
        registry
            .train_coalesced(provider.clone(), "api", data)
            .await
            .unwrap();
        assert_eq!(provider.fits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_coalesced_failure_is_shared() {
        let registry = ModelRegistry::new(Duration::from_secs(1800));
        let provider = counting(true);
        let data = Arc::new(Vec::new());

        let (a, b) = tokio::join!(
            registry.train_coalesced(provider.clone(), "api", data.clone()),
            registry.train_coalesced(provider.clone(), "api", data.clone()),
        );
        assert_eq!(a.unwrap_err(), b.unwrap_err());
        assert_eq!(provider.fits.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_different_services_do_not_coalesce() {
        let registry = ModelRegistry::new(Duration::from_secs(1800));
        let provider = counting(false);
        let data = Arc::new(Vec::new());

        let (a, b) = tokio::join!(
            registry.train_coalesced(provider.clone(), "api", data.clone()),
            registry.train_coalesced(provider.clone(), "web", data.clone()),
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(provider.fits.load(Ordering::SeqCst), 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_staleness() {
        let registry = ModelRegistry::new(Duration::from_secs(1800));
        let mut model = HeuristicProvider::new().train("api", &[]).unwrap();
        model.trained_at = Utc::now() - chrono::Duration::minutes(31);
        registry.insert(model);

        assert!(registry.get("api", ProviderKind::Heuristic).is_some());
        assert!(registry.fresh("api", ProviderKind::Heuristic).is_none());
        assert!(registry.snapshot()[0].stale);
    }

    #[test]
    fn test_invalidate_and_record_prediction() {
        let registry = ModelRegistry::new(Duration::from_secs(1800));
        registry.insert(HeuristicProvider::new().train("api", &[]).unwrap());
        registry.insert(HeuristicProvider::new().train("web", &[]).unwrap());

        registry.record_prediction("api", ProviderKind::Heuristic, 3.5);
        let model = registry.get("api", ProviderKind::Heuristic).unwrap();
        assert_eq!(model.performance.last_prediction_duration_ms, 3.5);

        assert!(registry.invalidate("api", ProviderKind::Heuristic));
        assert!(!registry.invalidate("api", ProviderKind::Heuristic));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("web", ProviderKind::Heuristic).is_some());
    }
}
