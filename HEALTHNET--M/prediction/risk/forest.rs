use ndarray::ArrayView2;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{
    ensemble::RiskModel,
    tree::{DecisionTree, Gini, TreeParams},
    types::RiskLevel,
};

const CLASSES: usize = RiskLevel::ALL.len();

/// Bagging hyper-parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForestParams {
    /// Number of trees.
    pub trees: usize,
    /// Maximum depth per tree.
    pub max_depth: usize,
    /// Seed for bootstrap draws and feature sampling.
    pub seed: u64,
}

/// Bagged Gini trees over bootstrap samples, with class weights inversely
/// proportional to class frequency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fits the forest. `labels` hold [`RiskLevel::index`] values.
    #[must_use]
    pub fn fit(x: ArrayView2<'_, f64>, labels: &[usize], params: ForestParams) -> Self {
        let rows = x.nrows();
        if rows == 0 {
            return Self { trees: Vec::new() };
        }
        let class_weights = balanced_weights(labels);
        let max_features = ((x.ncols() as f64).sqrt().floor() as usize).max(1);
        let tree_params = TreeParams {
            max_features: Some(max_features),
            ..TreeParams::with_depth(params.max_depth)
        };
        let mut rng = SmallRng::seed_from_u64(params.seed);
        let trees = (0..params.trees.max(1))
            .map(|_| {
                let mut draws = vec![0.0_f64; rows];
                for _ in 0..rows {
                    draws[rng.gen_range(0..rows)] += 1.0;
                }
                let weights: Vec<f64> = draws
                    .iter()
                    .zip(labels)
                    .map(|(count, label)| count * class_weights[*label])
                    .collect();
                let mut samples: Vec<usize> = (0..rows).filter(|&i| draws[i] > 0.0).collect();
                let gini = Gini::new(labels, &weights, CLASSES);
                DecisionTree::fit(x, &mut samples, &gini, tree_params, &mut rng)
            })
            .collect();
        Self { trees }
    }

    /// Number of fitted trees.
    #[must_use]
    pub fn len(&self) -> usize {
        self.trees.len()
    }

    /// Whether the forest is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }
}

/// `n / (k * count_c)` for each present class `c`; absent classes weigh zero.
fn balanced_weights(labels: &[usize]) -> [f64; CLASSES] {
    let mut counts = [0_usize; CLASSES];
    for &label in labels {
        counts[label] += 1;
    }
    let present = counts.iter().filter(|&&c| c > 0).count().max(1);
    let total = labels.len() as f64;
    let mut weights = [0.0; CLASSES];
    for (weight, count) in weights.iter_mut().zip(counts) {
        if count > 0 {
            *weight = total / (present as f64 * count as f64);
        }
    }
    weights
}

impl RiskModel for RandomForest {
    fn name(&self) -> &'static str {
        "random_forest"
    }

    fn predict_proba(&self, features: &[f64]) -> [f64; 3] {
        let mut out = [0.0; CLASSES];
        if self.trees.is_empty() {
            return out;
        }
        for tree in &self.trees {
            for (slot, value) in out.iter_mut().zip(tree.leaf_value(features)) {
                *slot += value;
            }
        }
        let n = self.trees.len() as f64;
        for slot in &mut out {
            *slot /= n;
        }
        out
    }
}
