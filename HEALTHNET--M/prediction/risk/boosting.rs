use ndarray::{Array2, ArrayView2};
use rand::{rngs::SmallRng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{
    ensemble::RiskModel,
    tree::{DecisionTree, SquaredError, TreeParams},
    types::RiskLevel,
};

/// Boosting hyper-parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoostingParams {
    /// Boosting rounds; each round fits one tree per class.
    pub rounds: usize,
    /// Shrinkage applied to every tree.
    pub learning_rate: f64,
    /// Maximum depth per tree.
    pub max_depth: usize,
    /// Seed for tree construction.
    pub seed: u64,
}

/// Sequential softmax gradient boosting over regression trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoosting {
    /// Class indices seen during training, ascending.
    classes: Vec<usize>,
    /// Log-prior starting scores, aligned with `classes`.
    init: Vec<f64>,
    /// One tree per class per round.
    stages: Vec<Vec<DecisionTree>>,
    learning_rate: f64,
}

impl GradientBoosting {
    /// Fits the model. `labels` hold [`RiskLevel::index`] values.
    #[must_use]
    pub fn fit(x: ArrayView2<'_, f64>, labels: &[usize], params: BoostingParams) -> Self {
        let rows = x.nrows();
        let mut classes: Vec<usize> = labels.to_vec();
        classes.sort_unstable();
        classes.dedup();
        let k = classes.len();
        let init: Vec<f64> = classes
            .iter()
            .map(|class| {
                let count = labels.iter().filter(|l| *l == class).count();
                (count as f64 / rows.max(1) as f64).ln()
            })
            .collect();
        let mut model = Self {
            classes,
            init,
            stages: Vec::new(),
            learning_rate: params.learning_rate,
        };
        if k < 2 {
            return model;
        }

        let onehot: Vec<Vec<f64>> = model
            .classes
            .iter()
            .map(|class| labels.iter().map(|l| f64::from(u8::from(l == class))).collect())
            .collect();
        let dense: Vec<Vec<f64>> = x.outer_iter().map(|row| row.to_vec()).collect();
        let mut raw = Array2::from_shape_fn((rows, k), |(_, j)| model.init[j]);
        let mut rng = SmallRng::seed_from_u64(params.seed);
        let tree_params = TreeParams::with_depth(params.max_depth);
        let scale = (k as f64 - 1.0) / k as f64;

        for _ in 0..params.rounds {
            let probs = softmax_rows(&raw);
            let mut stage = Vec::with_capacity(k);
            for (j, target) in onehot.iter().enumerate() {
                let residual: Vec<f64> = (0..rows).map(|i| target[i] - probs[[i, j]]).collect();
                let newton = |samples: &[usize]| {
                    let (num, den) = samples.iter().fold((0.0, 0.0), |(num, den), &s| {
                        let r = residual[s];
                        (num + r, den + r.abs() * (1.0 - r.abs()))
                    });
                    if den.abs() < 1e-150 {
                        0.0
                    } else {
                        scale * num / den
                    }
                };
                let criterion = SquaredError::new(&residual, newton);
                let mut samples: Vec<usize> = (0..rows).collect();
                let tree = DecisionTree::fit(x, &mut samples, &criterion, tree_params, &mut rng);
                for (i, row) in dense.iter().enumerate() {
                    let step = tree.leaf_value(row).first().copied().unwrap_or(0.0);
                    raw[[i, j]] += params.learning_rate * step;
                }
                stage.push(tree);
            }
            model.stages.push(stage);
        }
        model
    }

    /// Rounds fitted.
    #[must_use]
    pub fn rounds(&self) -> usize {
        self.stages.len()
    }

    fn raw_scores(&self, features: &[f64]) -> Vec<f64> {
        let mut scores = self.init.clone();
        for stage in &self.stages {
            for (score, tree) in scores.iter_mut().zip(stage) {
                *score += self.learning_rate * tree.leaf_value(features).first().copied().unwrap_or(0.0);
            }
        }
        scores
    }
}

fn softmax_rows(raw: &Array2<f64>) -> Array2<f64> {
    let mut out = raw.clone();
    for mut row in out.outer_iter_mut() {
        let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let total = row.sum();
        row.mapv_inplace(|v| v / total);
    }
    out
}

impl RiskModel for GradientBoosting {
    fn name(&self) -> &'static str {
        "gradient_boosting"
    }

    fn predict_proba(&self, features: &[f64]) -> [f64; 3] {
        let mut out = [0.0; RiskLevel::ALL.len()];
        match self.classes.as_slice() {
            [] => {}
            [only] => out[*only] = 1.0,
            classes => {
                let scores = self.raw_scores(features);
                let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
                let total: f64 = exps.iter().sum();
                for (class, value) in classes.iter().zip(exps) {
                    out[*class] = value / total;
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(rounds: usize) -> BoostingParams {
        BoostingParams {
            rounds,
            learning_rate: 0.1,
            max_depth: 3,
            seed: 42,
        }
    }

    #[test]
    fn zero_rounds_predict_class_priors() {
        let x = Array2::from_shape_vec((4, 1), vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        let model = GradientBoosting::fit(x.view(), &[0, 0, 0, 2], params(0));
        let proba = model.predict_proba(&[1.5]);
        assert!((proba[0] - 0.75).abs() < 1e-9);
        assert_eq!(proba[1], 0.0);
        assert!((proba[2] - 0.25).abs() < 1e-9);
    }

    #[test]
    fn boosting_separates_three_classes() {
        let values: Vec<f64> = (0..30_u32).map(|i| f64::from(i % 3) * 5.0 + f64::from(i) * 0.01).collect();
        let labels: Vec<usize> = (0..30).map(|i| i % 3).collect();
        let x = Array2::from_shape_vec((30, 1), values).unwrap();
        let model = GradientBoosting::fit(x.view(), &labels, params(30));
        assert_eq!(model.rounds(), 30);
        let proba = model.predict_proba(&[10.1]);
        assert!((proba.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(proba[2] > proba[0] && proba[2] > proba[1]);
    }

    #[test]
    fn single_class_is_certain() {
        let x = Array2::from_shape_vec((3, 1), vec![0.0, 1.0, 2.0]).unwrap();
        let model = GradientBoosting::fit(x.view(), &[1, 1, 1], params(10));
        assert_eq!(model.predict_proba(&[0.5]), [0.0, 1.0, 0.0]);
        assert_eq!(model.rounds(), 0);
    }
}
