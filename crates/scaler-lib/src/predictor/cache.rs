//! Prediction cache
//!
//! Memoizes forecasts by (service, horizon) for a short TTL. Hits return
//! the stored forecast unmodified, including its original `generated_at`.
//! Failures are never cached.

use crate::models::ForecastResult;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CachedForecast {
    forecast: ForecastResult,
    stored_at: Instant,
}

pub struct PredictionCache {
    entries: DashMap<(String, u32), CachedForecast>,
    ttl: Duration,
}

impl PredictionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached forecast if still within its TTL; expired entries are dropped
    pub fn get(&self, service: &str, horizon_minutes: u32) -> Option<ForecastResult> {
        let key = (service.to_string(), horizon_minutes);
        let hit = self.entries.get(&key).and_then(|entry| {
            (entry.stored_at.elapsed() < self.ttl).then(|| entry.forecast.clone())
        });
        if hit.is_none() {
            self.entries
                .remove_if(&key, |_, entry| entry.stored_at.elapsed() >= self.ttl);
        }
        hit
    }

    /// Store a forecast; a concurrent store for the same key wins last
    ///
    /// Expired entries for every key are dropped first, so the map never
    /// holds more than one TTL's worth of distinct keys.
    pub fn insert(&self, forecast: ForecastResult) {
        self.purge_expired();
        let key = (forecast.service.clone(), forecast.horizon_minutes);
        self.entries.insert(
            key,
            CachedForecast {
                forecast,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop every horizon cached for a service
    pub fn invalidate_service(&self, service: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(s, _), _| s != service);
        before - self.entries.len()
    }

    /// Drop expired entries; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.stored_at.elapsed() < self.ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
