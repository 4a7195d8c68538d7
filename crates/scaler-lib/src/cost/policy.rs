//! Scaling decision policy
//!
//! Reconciles a forecast against cost and safety constraints:
//!
//! 1. Target-utilization replicas from the predicted CPU
//! 2. Cost gating on the projected hourly savings
//! 3. Safety overrides on the current CPU, which win over cost gating
//! 4. Cost impact, risk and reasoning for the final count

use super::CostModel;
use crate::config::PolicyConfig;
use crate::models::{
    CostMetrics, DecisionRule, ForecastResult, RiskLevel, ScalingDecision,
};
use crate::predictor::CONFIDENCE_FLOOR;
use chrono::Utc;

/// Observed state of a service at decision time
#[derive(Debug, Clone, Copy)]
pub struct ServiceSnapshot<'a> {
    pub service: &'a str,
    pub current_replicas: u32,
    pub current_cpu: f64,
}

/// Replica counts after each policy stage
#[derive(Debug, Clone, Copy, PartialEq)]
struct Outcome {
    replicas: u32,
    rule: DecisionRule,
}

#[derive(Debug, Clone)]
pub struct ScalingPolicy {
    config: PolicyConfig,
    cost: CostModel,
}

impl ScalingPolicy {
    pub fn new(config: PolicyConfig, cost: CostModel) -> Self {
        Self { config, cost }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.cost
    }

    /// Replicas that bring the predicted utilization to the target
    pub fn target_replicas(&self, current_replicas: u32, predicted_cpu: f64) -> u32 {
        let raw = f64::from(current_replicas.max(1)) * predicted_cpu.max(0.0)
            / self.config.target_utilization;
        let bounded = if raw.is_finite() {
            raw.ceil()
                .clamp(f64::from(self.config.min_replicas), f64::from(self.config.max_replicas))
        } else {
            f64::from(current_replicas)
        };
        bounded as u32
    }

    pub fn decide(
        &self,
        snapshot: ServiceSnapshot<'_>,
        forecast: &ForecastResult,
    ) -> ScalingDecision {
        let current = snapshot.current_replicas;
        let predicted_cpu = forecast.predicted_value;
        let ml_replicas = self.target_replicas(current, predicted_cpu);

        let current_tier = self.cost.tier_for(snapshot.current_cpu);
        let predicted_tier = self.cost.tier_for(predicted_cpu);
        let current_cost = self.cost.hourly_cost(current, &current_tier);
        let ml_cost = self.cost.hourly_cost(ml_replicas, &predicted_tier);
        let savings = current_cost - ml_cost;
        let efficiency = self.cost.efficiency_score(
            snapshot.current_cpu,
            current_cost,
            ml_cost,
            forecast.confidence,
        );

        let (gated, mut reasoning) =
            self.cost_gate(current, ml_replicas, savings, efficiency, forecast.confidence);
        let (outcome, safety_reason) = self.safety_override(current, snapshot.current_cpu, gated);
        if let Some(reason) = safety_reason {
            reasoning = reason;
        }

        let final_cost = self.cost.hourly_cost(outcome.replicas, &predicted_tier);
        let risk_level = self.risk(current, outcome.replicas, snapshot.current_cpu);

        let mut reasoning = format!(
            "{} ({}): {} -> {} replicas, forecast {:.1}% CPU by {}",
            reasoning,
            rule_name(outcome.rule),
            current,
            outcome.replicas,
            predicted_cpu,
            forecast.provider_used
        );
        if forecast.is_degraded() {
            reasoning.push_str("; forecast degraded via ");
            let chain: Vec<&str> = forecast
                .degradation
                .iter()
                .map(|step| step.provider.as_str())
                .collect();
            reasoning.push_str(&chain.join(" -> "));
        }

        ScalingDecision {
            service: snapshot.service.to_string(),
            current_replicas: current,
            recommended_replicas: outcome.replicas,
            recommended_tier: predicted_tier.name,
            cost_impact_per_hour: final_cost - current_cost,
            risk_level,
            confidence: forecast.confidence,
            rule: outcome.rule,
            reasoning,
            forecast: Some(forecast.clone()),
            decided_at: Utc::now(),
        }
    }

    /// Decision used when no forecast could be produced
    pub fn neutral(&self, snapshot: ServiceSnapshot<'_>, reason: &str) -> ScalingDecision {
        let tier = self.cost.tier_for(snapshot.current_cpu);
        ScalingDecision {
            service: snapshot.service.to_string(),
            current_replicas: snapshot.current_replicas,
            recommended_replicas: snapshot.current_replicas,
            recommended_tier: tier.name,
            cost_impact_per_hour: 0.0,
            risk_level: RiskLevel::Low,
            confidence: CONFIDENCE_FLOOR,
            rule: DecisionRule::Neutral,
            reasoning: format!(
                "Holding {} replicas, forecast unavailable: {}",
                snapshot.current_replicas, reason
            ),
            forecast: None,
            decided_at: Utc::now(),
        }
    }

    /// Cost view of following the forecast's target-utilization count
    pub fn cost_metrics(
        &self,
        snapshot: ServiceSnapshot<'_>,
        forecast: &ForecastResult,
    ) -> CostMetrics {
        let predicted_replicas =
            self.target_replicas(snapshot.current_replicas, forecast.predicted_value);
        let current_tier = self.cost.tier_for(snapshot.current_cpu);
        let predicted_tier = self.cost.tier_for(forecast.predicted_value);
        let current_cost = self.cost.hourly_cost(snapshot.current_replicas, &current_tier);
        let predicted_cost = self.cost.hourly_cost(predicted_replicas, &predicted_tier);
        let efficiency_score = self.cost.efficiency_score(
            snapshot.current_cpu,
            current_cost,
            predicted_cost,
            forecast.confidence,
        );
        let recommendation = self.cost.recommendation(
            snapshot.current_replicas,
            predicted_replicas,
            current_cost,
            predicted_cost,
            efficiency_score,
        );

        CostMetrics {
            service: snapshot.service.to_string(),
            current_replicas: snapshot.current_replicas,
            predicted_replicas,
            current_tier: current_tier.name,
            predicted_tier: predicted_tier.name,
            current_cost_per_hour: current_cost,
            predicted_cost_per_hour: predicted_cost,
            savings_per_hour: current_cost - predicted_cost,
            efficiency_score,
            recommendation,
        }
    }

    fn cost_gate(
        &self,
        current: u32,
        ml_replicas: u32,
        savings: f64,
        efficiency: f64,
        confidence: f64,
    ) -> (Outcome, String) {
        let trusted = efficiency > self.config.efficiency_threshold
            && confidence >= self.config.confidence_threshold;

        if savings > self.config.significant_savings_per_hour {
            if trusted {
                (
                    Outcome { replicas: ml_replicas, rule: DecisionRule::CostGate },
                    format!("Forecast accepted with significant savings of ${:.4}/hour", savings),
                )
            } else {
                (
                    Outcome {
                        replicas: self.step_toward(current, ml_replicas),
                        rule: DecisionRule::CostGate,
                    },
                    format!(
                        "Conservative single step, low efficiency ({:.0}) or confidence ({:.2})",
                        efficiency, confidence
                    ),
                )
            }
        } else if -savings > self.config.significant_increase_per_hour && ml_replicas > current {
            (
                Outcome {
                    replicas: ml_replicas.min(current.saturating_add(1)),
                    rule: DecisionRule::CostGate,
                },
                format!("Scale-up limited to one replica, cost rises ${:.4}/hour", -savings),
            )
        } else if ml_replicas == current {
            (
                Outcome { replicas: current, rule: DecisionRule::Default },
                "Maintain current replicas".to_string(),
            )
        } else if ml_replicas < current {
            // Scale-downs must pay for themselves
            (
                Outcome { replicas: current, rule: DecisionRule::Default },
                format!(
                    "Maintain current replicas, savings of ${:.4}/hour below significant threshold",
                    savings.max(0.0)
                ),
            )
        } else {
            (
                Outcome { replicas: ml_replicas, rule: DecisionRule::Default },
                "Standard forecast-based scaling".to_string(),
            )
        }
    }

    /// Current-utilization overrides; they win over cost gating
    fn safety_override(
        &self,
        current: u32,
        current_cpu: f64,
        gated: Outcome,
    ) -> (Outcome, Option<String>) {
        if current_cpu > self.config.high_risk_cpu && gated.replicas < current {
            return (
                Outcome { replicas: current, rule: DecisionRule::SafetyOverride },
                Some(format!(
                    "Scale-down blocked, current CPU {:.1}% above {:.0}%",
                    current_cpu, self.config.high_risk_cpu
                )),
            );
        }
        let floor = current.saturating_sub(1);
        if current_cpu < self.config.low_risk_cpu && gated.replicas < floor {
            return (
                Outcome { replicas: floor, rule: DecisionRule::SafetyOverride },
                Some(format!(
                    "Scale-down limited to one replica, current CPU {:.1}% below {:.0}%",
                    current_cpu, self.config.low_risk_cpu
                )),
            );
        }
        (gated, None)
    }

    fn step_toward(&self, current: u32, target: u32) -> u32 {
        let stepped = match target.cmp(&current) {
            std::cmp::Ordering::Less => current - 1,
            std::cmp::Ordering::Greater => current.saturating_add(1),
            std::cmp::Ordering::Equal => current,
        };
        stepped.max(self.config.min_replicas)
    }

    /// Risk by size of the change, at least MEDIUM while CPU is in the
    /// high-risk band
    fn risk(&self, current: u32, recommended: u32, current_cpu: f64) -> RiskLevel {
        let by_delta = match current.abs_diff(recommended) {
            0..=1 => RiskLevel::Low,
            2..=3 => RiskLevel::Medium,
            _ => RiskLevel::High,
        };
        if current_cpu > self.config.high_risk_cpu {
            by_delta.max(RiskLevel::Medium)
        } else {
            by_delta
        }
    }
}

fn rule_name(rule: DecisionRule) -> &'static str {
    match rule {
        DecisionRule::CostGate => "cost-gate",
        DecisionRule::SafetyOverride => "safety-override",
        DecisionRule::Default => "default",
        DecisionRule::Neutral => "neutral",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ConfidenceInterval, DataOrigin, DegradationStep, PerformanceRecord, ProviderKind, TierName,
    };

    fn forecast(predicted: f64, confidence: f64) -> ForecastResult {
        ForecastResult {
            service: "api".to_string(),
            provider_used: ProviderKind::LinearRegression,
            predicted_value: predicted,
            confidence_interval: ConfidenceInterval {
                lower: predicted - 1.0,
                upper: predicted + 1.0,
            },
            confidence,
            performance: PerformanceRecord {
                provider_kind: ProviderKind::LinearRegression,
                mean_squared_error: 1.0,
                mean_absolute_error: 1.0,
                accuracy_estimate: 0.9,
                training_duration_ms: 1.0,
                last_prediction_duration_ms: 0.1,
                confidence_baseline: 0.75,
            },
            horizon_minutes: 5,
            generated_at: Utc::now(),
            recommendation: "MAINTAIN".to_string(),
            reasoning: String::new(),
            degradation: Vec::new(),
            data_origin: DataOrigin::Observed,
        }
    }

    fn policy() -> ScalingPolicy {
        ScalingPolicy::new(PolicyConfig::default(), CostModel::default())
    }

    fn snapshot(replicas: u32, cpu: f64) -> ServiceSnapshot<'static> {
        ServiceSnapshot {
            service: "api",
            current_replicas: replicas,
            current_cpu: cpu,
        }
    }

    #[test]
    fn test_target_replicas() {
        let p = policy();
        assert_eq!(p.target_replicas(2, 50.0), 2);
        assert_eq!(p.target_replicas(2, 51.0), 3);
        assert_eq!(p.target_replicas(2, 15.0), 1);
        assert_eq!(p.target_replicas(2, 0.0), 1);
        assert_eq!(p.target_replicas(8, 100.0), 10);
        assert_eq!(p.target_replicas(0, 80.0), 2);
    }

    #[test]
    fn test_flat_low_load_holds_on_small_tier() {
        // 2 -> 1 micro replica saves about $0.0145/hour, under the $0.05 bar
        let decision = policy().decide(snapshot(2, 15.0), &forecast(15.0, 0.8));
        assert_eq!(decision.recommended_replicas, 2);
        assert_eq!(decision.recommended_tier, TierName::Micro);
        assert_eq!(decision.risk_level, RiskLevel::Low);
        assert_eq!(decision.rule, DecisionRule::Default);
        assert!(decision.reasoning.starts_with("Maintain current replicas"));
        assert!(decision.reasoning.contains("below significant threshold"));
        assert!(decision.cost_impact_per_hour.abs() < 1e-12);
    }

    #[test]
    fn test_insignificant_scale_up_follows_forecast() {
        let config = PolicyConfig {
            significant_increase_per_hour: 100.0,
            ..PolicyConfig::default()
        };
        let p = ScalingPolicy::new(config, CostModel::default());
        let d = p.decide(snapshot(2, 40.0), &forecast(60.0, 0.8));
        assert_eq!(d.recommended_replicas, 3);
        assert!(d.reasoning.starts_with("Standard forecast-based scaling"));
    }

    #[test]
    fn test_high_cpu_never_decreases() {
        let p = policy();
        for predicted in [0.0, 10.0, 40.0, 85.0, 100.0] {
            for replicas in [1, 2, 5, 10, 12] {
                let d = p.decide(snapshot(replicas, 85.0), &forecast(predicted, 0.9));
                assert!(d.recommended_replicas >= replicas);
                assert_ne!(d.risk_level, RiskLevel::Low);
            }
        }
    }

    #[test]
    fn test_high_cpu_blocks_scale_down_with_override() {
        let d = policy().decide(snapshot(6, 85.0), &forecast(10.0, 0.9));
        assert_eq!(d.recommended_replicas, 6);
        assert_eq!(d.rule, DecisionRule::SafetyOverride);
        assert!(d.reasoning.contains("safety-override"));
    }

    #[test]
    fn test_low_cpu_removes_at_most_one() {
        let p = policy();
        for predicted in [0.0, 5.0, 60.0] {
            for replicas in [1, 2, 6, 10] {
                let d = p.decide(snapshot(replicas, 5.0), &forecast(predicted, 0.9));
                assert!(d.recommended_replicas + 1 >= replicas);
            }
        }
        let d = p.decide(snapshot(8, 5.0), &forecast(2.0, 0.95));
        assert_eq!(d.recommended_replicas, 7);
        assert_eq!(d.rule, DecisionRule::SafetyOverride);
    }

    #[test]
    fn test_spike_caps_expensive_scale_up() {
        // 2 -> 4 xlarge replicas costs well over $0.10/hour more
        let d = policy().decide(snapshot(2, 85.0), &forecast(85.0, 0.9));
        assert_eq!(d.recommended_replicas, 3);
        assert_eq!(d.rule, DecisionRule::CostGate);
        assert_eq!(d.risk_level, RiskLevel::Medium);
        assert!(d.cost_impact_per_hour > 0.0);
    }

    #[test]
    fn test_significant_savings_trusted_vs_damped() {
        let p = policy();
        // 8 large replicas at 60% CPU, forecast 5% -> target 1 replica
        let trusted = p.decide(snapshot(8, 60.0), &forecast(5.0, 0.95));
        assert_eq!(trusted.recommended_replicas, 1);
        assert_eq!(trusted.rule, DecisionRule::CostGate);
        assert_eq!(trusted.risk_level, RiskLevel::High);

        let damped = p.decide(snapshot(8, 60.0), &forecast(5.0, 0.3));
        assert_eq!(damped.recommended_replicas, 7);
        assert!(damped.reasoning.contains("Conservative"));
    }

    #[test]
    fn test_thresholds_are_configuration() {
        let config = PolicyConfig {
            significant_increase_per_hour: 100.0,
            ..PolicyConfig::default()
        };
        let p = ScalingPolicy::new(config, CostModel::default());
        let d = p.decide(snapshot(2, 85.0), &forecast(85.0, 0.9));
        assert_eq!(d.recommended_replicas, 4);
        assert_eq!(d.rule, DecisionRule::Default);
    }

    #[test]
    fn test_degradation_is_cited() {
        let mut f = forecast(40.0, 0.5);
        f.degradation.push(DegradationStep {
            provider: ProviderKind::SequenceModel,
            reason: "insufficient data".to_string(),
        });
        let d = policy().decide(snapshot(2, 40.0), &f);
        assert!(d.reasoning.contains("degraded via sequence_model"));
    }

    #[test]
    fn test_neutral_decision() {
        let d = policy().neutral(snapshot(3, 40.0), "no provider");
        assert_eq!(d.recommended_replicas, 3);
        assert_eq!(d.risk_level, RiskLevel::Low);
        assert_eq!(d.confidence, CONFIDENCE_FLOOR);
        assert_eq!(d.rule, DecisionRule::Neutral);
        assert!(d.forecast.is_none());
    }

    #[test]
    fn test_cost_metrics() {
        let metrics = policy().cost_metrics(snapshot(8, 60.0), &forecast(5.0, 0.9));
        assert_eq!(metrics.predicted_replicas, 1);
        assert_eq!(metrics.current_tier, TierName::Large);
        assert_eq!(metrics.predicted_tier, TierName::Micro);
        assert!(metrics.savings_per_hour > 0.0);
        assert!((metrics.savings_per_day() - metrics.savings_per_hour * 24.0).abs() < 1e-12);
        assert!(metrics.recommendation.starts_with("SCALE DOWN"));
        assert!((0.0..=100.0).contains(&metrics.efficiency_score));
    }
}
