//! Hourly cost of a replica count at a resource tier

use crate::config::CostRates;
use crate::models::{CostTier, TierName};

/// The fixed tier ladder, smallest footprint first
pub const COST_TIERS: [CostTier; 5] = [
    CostTier {
        name: TierName::Micro,
        cpu_units: 0.1,
        memory_mb: 128.0,
        cost_multiplier: 1.0,
    },
    CostTier {
        name: TierName::Small,
        cpu_units: 0.25,
        memory_mb: 256.0,
        cost_multiplier: 1.2,
    },
    CostTier {
        name: TierName::Medium,
        cpu_units: 0.5,
        memory_mb: 512.0,
        cost_multiplier: 1.5,
    },
    CostTier {
        name: TierName::Large,
        cpu_units: 1.0,
        memory_mb: 1024.0,
        cost_multiplier: 2.0,
    },
    CostTier {
        name: TierName::Xlarge,
        cpu_units: 2.0,
        memory_mb: 2048.0,
        cost_multiplier: 3.5,
    },
];

/// Cost differences below this are reported as cost-neutral
const NEUTRAL_COST_DELTA: f64 = 0.01;
/// Efficiency above which a cost increase is presented as worthwhile
const INVEST_EFFICIENCY: f64 = 75.0;
/// CPU percent counted as fully efficient utilization
const EFFICIENT_CPU: f64 = 70.0;

#[derive(Debug, Clone)]
pub struct CostModel {
    rates: CostRates,
}

impl CostModel {
    pub fn new(rates: CostRates) -> Self {
        Self { rates }
    }

    pub fn rates(&self) -> &CostRates {
        &self.rates
    }

    pub fn tiers(&self) -> &'static [CostTier] {
        &COST_TIERS
    }

    pub fn tier(&self, name: TierName) -> CostTier {
        COST_TIERS
            .iter()
            .copied()
            .find(|t| t.name == name)
            .unwrap_or(COST_TIERS[0])
    }

    /// Tier whose CPU band contains `cpu_percent`
    ///
    /// Thresholds are exclusive upper bounds; anything at or above the last
    /// one (or not a number) lands in the largest tier.
    pub fn tier_for(&self, cpu_percent: f64) -> CostTier {
        let index = self
            .rates
            .tier_thresholds
            .iter()
            .position(|bound| cpu_percent < *bound)
            .unwrap_or(COST_TIERS.len() - 1);
        COST_TIERS[index]
    }

    /// Compute cost scaled by the tier multiplier, plus per-replica storage
    /// and network overhead
    pub fn hourly_cost(&self, replicas: u32, tier: &CostTier) -> f64 {
        let r = f64::from(replicas);
        let cpu = r * tier.cpu_units * self.rates.cpu_per_core_hour;
        let memory = r * tier.memory_gb() * self.rates.memory_per_gb_hour;
        (cpu + memory) * tier.cost_multiplier + self.overhead(replicas)
    }

    fn overhead(&self, replicas: u32) -> f64 {
        let r = f64::from(replicas);
        r * self.rates.storage_gb_per_replica * self.rates.storage_per_gb_hour
            + r * self.rates.network_gb_per_replica_hour * self.rates.network_per_gb
    }

    /// 0-100 blend: 40% utilization, 40% cost delta, 20% confidence
    pub fn efficiency_score(
        &self,
        current_cpu: f64,
        current_cost: f64,
        predicted_cost: f64,
        confidence: f64,
    ) -> f64 {
        let cpu_efficiency = (current_cpu.max(0.0) / EFFICIENT_CPU * 100.0).min(100.0);
        let cost_efficiency = if predicted_cost <= current_cost {
            100.0
        } else if current_cost > 0.0 {
            (100.0 - (predicted_cost - current_cost) / current_cost * 100.0).max(0.0)
        } else {
            0.0
        };
        let score =
            cpu_efficiency * 0.4 + cost_efficiency * 0.4 + confidence.clamp(0.0, 1.0) * 100.0 * 0.2;
        if score.is_finite() {
            score.clamp(0.0, 100.0)
        } else {
            50.0
        }
    }

    /// Operator-facing summary of moving from the current to the predicted
    /// configuration
    pub fn recommendation(
        &self,
        current_replicas: u32,
        predicted_replicas: u32,
        current_cost: f64,
        predicted_cost: f64,
        efficiency_score: f64,
    ) -> String {
        let diff = predicted_cost - current_cost;
        if diff.abs() < NEUTRAL_COST_DELTA {
            "MAINTAIN: Current scaling is cost-optimal".to_string()
        } else if diff < 0.0 {
            let per_day = diff.abs() * 24.0;
            if predicted_replicas < current_replicas {
                format!(
                    "SCALE DOWN: Save ${:.2}/day by reducing to {} replicas",
                    per_day, predicted_replicas
                )
            } else {
                format!(
                    "OPTIMIZE: Save ${:.2}/day with better resource allocation",
                    per_day
                )
            }
        } else {
            let per_day = diff * 24.0;
            if efficiency_score > INVEST_EFFICIENCY {
                format!(
                    "SCALE UP: Invest ${:.2}/day for better performance (high efficiency)",
                    per_day
                )
            } else {
                format!(
                    "REVIEW: ${:.2}/day increase - verify the performance gain justifies the cost",
                    per_day
                )
            }
        }
    }
}

impl Default for CostModel {
    fn default() -> Self {
        Self::new(CostRates::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_tier_boundaries() {
        let model = CostModel::default();
        let cases = [
            (0.0, TierName::Micro),
            (19.99, TierName::Micro),
            (20.0, TierName::Small),
            (34.9, TierName::Small),
            (35.0, TierName::Medium),
            (50.0, TierName::Large),
            (74.9, TierName::Large),
            (75.0, TierName::Xlarge),
            (100.0, TierName::Xlarge),
            (f64::NAN, TierName::Xlarge),
        ];
        for (cpu, expected) in cases {
            assert_eq!(model.tier_for(cpu).name, expected, "cpu {}", cpu);
        }
    }

    #[test]
    fn test_tier_ladder_is_ordered() {
        for pair in COST_TIERS.windows(2) {
            assert!(pair[0].name < pair[1].name);
            assert!(pair[0].cpu_units < pair[1].cpu_units);
            assert!(pair[0].memory_mb < pair[1].memory_mb);
        }
    }

    #[test]
    fn test_hourly_cost_formula() {
        let model = CostModel::default();
        let micro = model.tier(TierName::Micro);
        // (0.1 * 0.048 + 0.125 * 0.0053) * 1.0 + 0.5 * 0.0001 + 0.1 * 0.09
        let per_replica = 0.0048 + 0.0006625 + 0.00005 + 0.009;
        assert!(approx(model.hourly_cost(1, &micro), per_replica));
        assert!(approx(model.hourly_cost(3, &micro), 3.0 * per_replica));
        assert_eq!(model.hourly_cost(0, &micro), 0.0);
    }

    #[test]
    fn test_cost_grows_with_tier() {
        let model = CostModel::default();
        let costs: Vec<f64> = COST_TIERS.iter().map(|t| model.hourly_cost(2, t)).collect();
        assert!(costs.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_efficiency_score() {
        let model = CostModel::default();
        // 35/70 -> 50, cost down -> 100, confidence 0.5 -> 50
        assert!(approx(model.efficiency_score(35.0, 1.0, 0.5, 0.5), 20.0 + 40.0 + 10.0));
        // Doubling the cost zeroes the cost term
        assert!(approx(model.efficiency_score(70.0, 1.0, 2.0, 1.0), 40.0 + 0.0 + 20.0));
        assert!(model.efficiency_score(500.0, 0.0, 1.0, 2.0) <= 100.0);
    }

    #[test]
    fn test_recommendation_text() {
        let model = CostModel::default();
        assert!(model
            .recommendation(2, 2, 1.0, 1.005, 50.0)
            .starts_with("MAINTAIN"));
        assert!(model
            .recommendation(4, 2, 1.0, 0.5, 50.0)
            .starts_with("SCALE DOWN: Save $12.00/day"));
        assert!(model.recommendation(2, 2, 1.0, 0.5, 50.0).starts_with("OPTIMIZE"));
        assert!(model.recommendation(2, 4, 0.5, 1.0, 80.0).starts_with("SCALE UP"));
        assert!(model.recommendation(2, 4, 0.5, 1.0, 40.0).starts_with("REVIEW"));
    }
}
