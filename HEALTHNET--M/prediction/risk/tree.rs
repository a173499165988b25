//! CART decision trees shared by both ensemble members.

use ndarray::ArrayView2;
use rand::{rngs::SmallRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

/// Growth limits for a single tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeParams {
    /// Maximum depth; the root sits at depth zero.
    pub max_depth: usize,
    /// Nodes with fewer samples become leaves.
    pub min_samples_split: usize,
    /// Each child must keep at least this many samples.
    pub min_samples_leaf: usize,
    /// Features examined per node; all when `None`.
    pub max_features: Option<usize>,
}

impl TreeParams {
    /// Depth-limited tree examining every feature.
    #[must_use]
    pub const fn with_depth(max_depth: usize) -> Self {
        Self {
            max_depth,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        }
    }
}

/// Split quality measure plus the value stored in leaves.
pub trait Criterion {
    /// Running sufficient statistics for one side of a split.
    type Stats: Clone;

    /// Statistics of an empty side.
    fn empty(&self) -> Self::Stats;
    /// Moves a sample into the side.
    fn push(&self, stats: &mut Self::Stats, sample: usize);
    /// Moves a sample out of the side.
    fn pop(&self, stats: &mut Self::Stats, sample: usize);
    /// Weighted impurity of the side; lower is better.
    fn cost(&self, stats: &Self::Stats) -> f64;
    /// Value stored in a leaf holding `samples`.
    fn leaf(&self, samples: &[usize]) -> Vec<f64>;
}

/// Weighted Gini impurity; leaves hold class proportions.
#[derive(Debug)]
pub struct Gini<'a> {
    labels: &'a [usize],
    weights: &'a [f64],
    classes: usize,
}

impl<'a> Gini<'a> {
    /// Builds the criterion over per-sample labels and weights.
    #[must_use]
    pub const fn new(labels: &'a [usize], weights: &'a [f64], classes: usize) -> Self {
        Self {
            labels,
            weights,
            classes,
        }
    }
}

impl Criterion for Gini<'_> {
    type Stats = Vec<f64>;

    fn empty(&self) -> Self::Stats {
        vec![0.0; self.classes]
    }

    fn push(&self, stats: &mut Self::Stats, sample: usize) {
        stats[self.labels[sample]] += self.weights[sample];
    }

    fn pop(&self, stats: &mut Self::Stats, sample: usize) {
        stats[self.labels[sample]] -= self.weights[sample];
    }

    fn cost(&self, stats: &Self::Stats) -> f64 {
        let total: f64 = stats.iter().sum();
        if total <= 0.0 {
            return 0.0;
        }
        total - stats.iter().map(|w| w * w).sum::<f64>() / total
    }

    fn leaf(&self, samples: &[usize]) -> Vec<f64> {
        let mut stats = self.empty();
        for &sample in samples {
            self.push(&mut stats, sample);
        }
        let total: f64 = stats.iter().sum();
        if total > 0.0 {
            for value in &mut stats {
                *value /= total;
            }
        }
        stats
    }
}

/// Squared-error impurity for regression targets; the leaf value is
/// supplied by the caller.
pub struct SquaredError<'a, F> {
    targets: &'a [f64],
    leaf_value: F,
}

impl<'a, F: Fn(&[usize]) -> f64> SquaredError<'a, F> {
    /// Builds the criterion.
    pub const fn new(targets: &'a [f64], leaf_value: F) -> Self {
        Self {
            targets,
            leaf_value,
        }
    }
}

impl<F: Fn(&[usize]) -> f64> Criterion for SquaredError<'_, F> {
    /// Count, sum and sum of squares.
    type Stats = (f64, f64, f64);

    fn empty(&self) -> Self::Stats {
        (0.0, 0.0, 0.0)
    }

    fn push(&self, stats: &mut Self::Stats, sample: usize) {
        let y = self.targets[sample];
        stats.0 += 1.0;
        stats.1 += y;
        stats.2 += y * y;
    }

    fn pop(&self, stats: &mut Self::Stats, sample: usize) {
        let y = self.targets[sample];
        stats.0 -= 1.0;
        stats.1 -= y;
        stats.2 -= y * y;
    }

    fn cost(&self, stats: &Self::Stats) -> f64 {
        if stats.0 <= 0.0 {
            return 0.0;
        }
        (stats.2 - stats.1 * stats.1 / stats.0).max(0.0)
    }

    fn leaf(&self, samples: &[usize]) -> Vec<f64> {
        vec![(self.leaf_value)(samples)]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf(Vec<f64>),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

struct SplitChoice {
    feature: usize,
    threshold: f64,
    cost: f64,
}

/// Binary tree stored as an arena; node zero is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// Grows a tree over the rows listed in `samples`.
    pub fn fit<C: Criterion>(
        x: ArrayView2<'_, f64>,
        samples: &mut [usize],
        criterion: &C,
        params: TreeParams,
        rng: &mut SmallRng,
    ) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(x, samples, criterion, params, 0, rng);
        tree
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Leaf value reached by `row`.
    #[must_use]
    pub fn leaf_value(&self, row: &[f64]) -> &[f64] {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(Node::Leaf(value)) => return value,
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = row.get(*feature).copied().unwrap_or(f64::NAN);
                    idx = if value <= *threshold { *left } else { *right };
                }
                None => return &[],
            }
        }
    }

    fn grow<C: Criterion>(
        &mut self,
        x: ArrayView2<'_, f64>,
        samples: &mut [usize],
        criterion: &C,
        params: TreeParams,
        depth: usize,
        rng: &mut SmallRng,
    ) -> usize {
        let idx = self.nodes.len();
        let mut parent = criterion.empty();
        for &sample in samples.iter() {
            criterion.push(&mut parent, sample);
        }
        let parent_cost = criterion.cost(&parent);
        let stop = depth >= params.max_depth
            || samples.len() < params.min_samples_split
            || samples.len() < 2 * params.min_samples_leaf
            || parent_cost <= 1e-12;
        let choice = if stop {
            None
        } else {
            best_split(x, samples, criterion, &parent, parent_cost, params, rng)
        };
        let Some(choice) = choice else {
            self.nodes.push(Node::Leaf(criterion.leaf(samples)));
            return idx;
        };

        self.nodes.push(Node::Leaf(Vec::new()));
        samples.sort_by(|a, b| x[[*a, choice.feature]].total_cmp(&x[[*b, choice.feature]]));
        let boundary = samples.partition_point(|&s| x[[s, choice.feature]] <= choice.threshold);
        let (left_samples, right_samples) = samples.split_at_mut(boundary);
        let left = self.grow(x, left_samples, criterion, params, depth + 1, rng);
        let right = self.grow(x, right_samples, criterion, params, depth + 1, rng);
        self.nodes[idx] = Node::Split {
            feature: choice.feature,
            threshold: choice.threshold,
            left,
            right,
        };
        idx
    }
}

fn best_split<C: Criterion>(
    x: ArrayView2<'_, f64>,
    samples: &[usize],
    criterion: &C,
    parent: &C::Stats,
    parent_cost: f64,
    params: TreeParams,
    rng: &mut SmallRng,
) -> Option<SplitChoice> {
    let width = x.ncols();
    let mut candidates: Vec<usize> = (0..width).collect();
    let limit = match params.max_features {
        Some(k) if k < width => {
            candidates.shuffle(rng);
            k.max(1)
        }
        _ => width,
    };
    let mut best: Option<SplitChoice> = None;
    let mut order = samples.to_vec();
    let mut visited = 0;
    for feature in candidates {
        if visited >= limit {
            break;
        }
        order.sort_by(|a, b| x[[*a, feature]].total_cmp(&x[[*b, feature]]));
        // constant features do not count towards the limit
        if x[[order[0], feature]] >= x[[order[order.len() - 1], feature]] {
            continue;
        }
        visited += 1;
        let mut left = criterion.empty();
        let mut right = parent.clone();
        for pos in 0..order.len() - 1 {
            criterion.push(&mut left, order[pos]);
            criterion.pop(&mut right, order[pos]);
            let here = x[[order[pos], feature]];
            let next = x[[order[pos + 1], feature]];
            if next <= here {
                continue;
            }
            let left_count = pos + 1;
            if left_count < params.min_samples_leaf || order.len() - left_count < params.min_samples_leaf {
                continue;
            }
            let cost = criterion.cost(&left) + criterion.cost(&right);
            if cost < parent_cost - 1e-12 && best.as_ref().map_or(true, |b| cost < b.cost) {
                let mut threshold = here + (next - here) / 2.0;
                if threshold >= next {
                    threshold = here;
                }
                best = Some(SplitChoice {
                    feature,
                    threshold,
                    cost,
                });
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    #[test]
    fn gini_tree_separates_classes() {
        let x = array![[0.1, 5.0], [0.2, 4.0], [0.9, 5.0], [1.1, 4.0]];
        let labels = [0, 0, 2, 2];
        let weights = [1.0; 4];
        let gini = Gini::new(&labels, &weights, 3);
        let mut samples: Vec<usize> = (0..4).collect();
        let mut rng = SmallRng::seed_from_u64(1);
        let tree = DecisionTree::fit(x.view(), &mut samples, &gini, TreeParams::with_depth(3), &mut rng);
        assert_eq!(tree.node_count(), 3);
        assert_eq!(tree.leaf_value(&[0.15, 0.0]), &[1.0, 0.0, 0.0]);
        assert_eq!(tree.leaf_value(&[1.0, 0.0]), &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn depth_zero_yields_weighted_leaf() {
        let x = array![[0.0], [1.0], [2.0]];
        let labels = [0, 1, 1];
        let weights = [2.0, 1.0, 1.0];
        let gini = Gini::new(&labels, &weights, 3);
        let mut samples = vec![0, 1, 2];
        let mut rng = SmallRng::seed_from_u64(1);
        let tree = DecisionTree::fit(x.view(), &mut samples, &gini, TreeParams::with_depth(0), &mut rng);
        assert_eq!(tree.leaf_value(&[5.0]), &[0.5, 0.5, 0.0]);
    }

    #[test]
    fn regression_tree_uses_supplied_leaf_value() {
        let x = array![[1.0], [2.0], [10.0], [11.0]];
        let targets = [1.0, 1.0, 5.0, 5.0];
        let criterion = SquaredError::new(&targets, |samples: &[usize]| {
            samples.iter().map(|&s| targets[s]).sum::<f64>() / samples.len() as f64
        });
        let mut samples: Vec<usize> = (0..4).collect();
        let mut rng = SmallRng::seed_from_u64(1);
        let tree = DecisionTree::fit(x.view(), &mut samples, &criterion, TreeParams::with_depth(2), &mut rng);
        assert_eq!(tree.leaf_value(&[0.0]), &[1.0]);
        assert_eq!(tree.leaf_value(&[12.0]), &[5.0]);
    }
}
