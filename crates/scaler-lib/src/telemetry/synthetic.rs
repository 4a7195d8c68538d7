//! Synthetic telemetry
//!
//! Stand-in series used when the backend has nothing to offer: a daily
//! sinusoid, damped on weekends, with Gaussian noise and occasional
//! business-hour spikes. Secondary metrics are correlated with CPU.

use super::QueryRange;
use crate::models::ResourceSample;
use chrono::{DateTime, Datelike, Timelike};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::sync::{Mutex, PoisonError};

const BASE_CPU: f64 = 20.0;
const DAILY_AMPLITUDE: f64 = 15.0;
const WEEKEND_FACTOR: f64 = 0.7;
const CPU_NOISE_STD: f64 = 5.0;
const SPIKE_PROBABILITY: f64 = 0.1;
const SPIKE_CPU: f64 = 30.0;
const MIN_CPU: f64 = 5.0;
const MAX_CPU: f64 = 95.0;

pub struct SyntheticGenerator {
    rng: Mutex<StdRng>,
}

impl SyntheticGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// One sample per step across the range, oldest first
    pub fn generate(&self, range: &QueryRange) -> Vec<ResourceSample> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        range
            .timestamps()
            .map(|timestamp| sample_at(&mut *rng, timestamp))
            .collect()
    }

    /// A single sample for the given instant
    pub fn sample(&self, timestamp: i64) -> ResourceSample {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        sample_at(&mut *rng, timestamp)
    }
}

/// Deterministic secondary metrics for an observed CPU value
pub fn correlated_sample(timestamp: i64, cpu_percent: f64) -> ResourceSample {
    ResourceSample {
        timestamp,
        cpu_percent,
        memory_mb: cpu_percent * 1.2,
        request_rate: (cpu_percent / 2.0).max(0.0),
        response_time_ms: (200.0 - cpu_percent).max(50.0),
    }
}

fn sample_at<R: Rng + ?Sized>(rng: &mut R, timestamp: i64) -> ResourceSample {
    let (hour, weekday) = DateTime::from_timestamp(timestamp, 0)
        .map(|dt| (dt.hour(), dt.weekday().num_days_from_monday()))
        .unwrap_or((0, 0));
    let weekend = weekday >= 5;

    let base = BASE_CPU + DAILY_AMPLITUDE * (hour as f64 * PI / 12.0).sin();
    let factor = if weekend { WEEKEND_FACTOR } else { 1.0 };
    let spike = if (9..=17).contains(&hour) && !weekend && rng.gen::<f64>() < SPIKE_PROBABILITY {
        SPIKE_CPU
    } else {
        0.0
    };
    let cpu = (base * factor + gaussian(rng, CPU_NOISE_STD) + spike).clamp(MIN_CPU, MAX_CPU);

    ResourceSample {
        timestamp,
        cpu_percent: cpu,
        memory_mb: cpu * 1.2 + gaussian(rng, 3.0),
        request_rate: (cpu / 2.0 + gaussian(rng, 2.0)).max(0.0),
        response_time_ms: (200.0 - cpu + gaussian(rng, 10.0)).max(50.0),
    }
}

/// Zero-mean normal draw via Box-Muller
fn gaussian<R: Rng + ?Sized>(rng: &mut R, std_dev: f64) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    std_dev * (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}
