//! Bagged regression trees over engineered features
//!
//! Each tree is grown on a bootstrap resample with a random feature subset
//! per split. Bagging draws from a seeded RNG so a given seed always grows
//! the same forest.

use super::{cpu_series, Fit, ForecastProvider, ForecastRequest, ModelState};
use crate::error::{EngineError, Result};
use crate::models::{FeatureVector, ProviderKind};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

const MIN_SAMPLES: usize = 30;
const CONFIDENCE_BASELINE: f64 = 0.8;
const MAX_DEPTH: usize = 4;
const MIN_LEAF: usize = 3;
/// Candidate thresholds evaluated per feature and split
const MAX_CANDIDATES: usize = 16;

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn evaluate(&self, row: &[f64]) -> f64 {
        match self {
            Node::Leaf(value) => *value,
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if row[*feature] <= *threshold {
                    left.evaluate(row)
                } else {
                    right.evaluate(row)
                }
            }
        }
    }
}

/// Fitted forest
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleState {
    feature_names: Vec<String>,
    trees: Vec<Node>,
}

impl EnsembleState {
    fn predict_row(&self, row: &FeatureVector) -> f64 {
        let raw: Vec<f64> = self
            .feature_names
            .iter()
            .map(|name| row.value_or_zero(name))
            .collect();
        self.predict_raw(&raw)
    }

    fn predict_raw(&self, raw: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|t| t.evaluate(raw)).sum::<f64>() / self.trees.len() as f64
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

#[derive(Debug, Clone)]
pub struct EnsembleProvider {
    trees: usize,
    seed: u64,
}

impl EnsembleProvider {
    pub fn new(trees: usize, seed: u64) -> Self {
        Self {
            trees: trees.max(1),
            seed,
        }
    }
}

struct TreeBuilder<'a> {
    inputs: &'a [Vec<f64>],
    targets: &'a [f64],
    features_per_split: usize,
    rng: &'a mut StdRng,
}

impl TreeBuilder<'_> {
    fn grow(&mut self, indices: &[usize], depth: usize) -> Node {
        let mean = indices.iter().map(|&i| self.targets[i]).sum::<f64>() / indices.len() as f64;
        if depth >= MAX_DEPTH || indices.len() < 2 * MIN_LEAF {
            return Node::Leaf(mean);
        }

        let width = self.inputs[0].len();
        let candidates = index::sample(&mut *self.rng, width, self.features_per_split.min(width));
        let Some((feature, threshold)) = self.best_split(indices, candidates.iter()) else {
            return Node::Leaf(mean);
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .copied()
            .partition(|&i| self.inputs[i][feature] <= threshold);
        Node::Split {
            feature,
            threshold,
            left: Box::new(self.grow(&left, depth + 1)),
            right: Box::new(self.grow(&right, depth + 1)),
        }
    }

    /// Split with the largest squared-error reduction, if any improves
    fn best_split(
        &self,
        indices: &[usize],
        features: impl Iterator<Item = usize>,
    ) -> Option<(usize, f64)> {
        let total: f64 = indices.iter().map(|&i| self.targets[i]).sum();
        let n = indices.len() as f64;
        let parent_score = total * total / n;
        let mut best: Option<(usize, f64, f64)> = None;

        for feature in features {
            let mut ordered: Vec<(f64, f64)> = indices
                .iter()
                .map(|&i| (self.inputs[i][feature], self.targets[i]))
                .collect();
            ordered.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

            let stride = (ordered.len() / MAX_CANDIDATES).max(1);
            let mut left_sum = 0.0;
            for (pos, pair) in ordered.iter().enumerate().take(ordered.len() - 1) {
                left_sum += pair.1;
                let left_n = pos + 1;
                let right_n = ordered.len() - left_n;
                if left_n < MIN_LEAF || right_n < MIN_LEAF || left_n % stride != 0 {
                    continue;
                }
                let next = ordered[pos + 1].0;
                if next <= pair.0 {
                    continue;
                }
                let right_sum = total - left_sum;
                let score = left_sum * left_sum / left_n as f64
                    + right_sum * right_sum / right_n as f64;
                let gain = score - parent_score;
                if gain > 1e-9 && best.map_or(true, |(_, _, g)| gain > g) {
                    best = Some((feature, (pair.0 + next) / 2.0, gain));
                }
            }
        }
        best.map(|(feature, threshold, _)| (feature, threshold))
    }
}

impl ForecastProvider for EnsembleProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::EnsembleTree
    }

    fn min_samples(&self) -> usize {
        MIN_SAMPLES
    }

    fn confidence_baseline(&self) -> f64 {
        CONFIDENCE_BASELINE
    }

    fn fit(&self, rows: &[FeatureVector]) -> Result<Fit> {
        let feature_names: Vec<String> = rows
            .first()
            .map(|row| row.names().map(str::to_string).collect())
            .unwrap_or_default();
        if feature_names.is_empty() {
            return Err(EngineError::prediction(self.kind(), "rows carry no features"));
        }

        let cpu = cpu_series(rows);
        let inputs: Vec<Vec<f64>> = rows[..rows.len() - 1]
            .iter()
            .map(|row| feature_names.iter().map(|n| row.value_or_zero(n)).collect())
            .collect();
        let targets = &cpu[1..];

        let mut rng = StdRng::seed_from_u64(self.seed);
        let features_per_split = ((feature_names.len() as f64).sqrt().ceil() as usize).max(1);
        let mut trees = Vec::with_capacity(self.trees);
        for _ in 0..self.trees {
            let bootstrap: Vec<usize> = (0..inputs.len())
                .map(|_| rng.gen_range(0..inputs.len()))
                .collect();
            let mut builder = TreeBuilder {
                inputs: &inputs,
                targets,
                features_per_split,
                rng: &mut rng,
            };
            trees.push(builder.grow(&bootstrap, 0));
        }

        let state = EnsembleState {
            feature_names,
            trees,
        };
        let predictions: Vec<f64> = inputs.iter().map(|r| state.predict_raw(r)).collect();
        Ok(Fit::from_predictions(
            ModelState::Ensemble(state),
            &predictions,
            targets,
        ))
    }

    fn forecast(&self, state: &ModelState, request: &ForecastRequest<'_>) -> Result<f64> {
        let ModelState::Ensemble(state) = state else {
            return Err(EngineError::prediction(self.kind(), "unexpected model state"));
        };
        Ok(state.predict_row(request.last_row(self.kind())?))
    }
}
