use rand::{rngs::SmallRng, seq::SliceRandom, SeedableRng};

/// Row indices of the two partitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    /// Training rows.
    pub train: Vec<usize>,
    /// Held-out rows; may be empty for tiny datasets.
    pub test: Vec<usize>,
}

/// Splits rows so each class keeps roughly `test_ratio` of its members in the
/// held-out partition. Classes with fewer than two members stay in training.
#[must_use]
pub fn stratified_split(labels: &[usize], test_ratio: f64, seed: u64) -> Split {
    let mut rng = SmallRng::seed_from_u64(seed);
    let classes = labels.iter().copied().max().map_or(0, |m| m + 1);
    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();
    for class in 0..classes {
        let mut members: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] == class).collect();
        if members.is_empty() {
            continue;
        }
        members.shuffle(&mut rng);
        let held = if members.len() < 2 {
            0
        } else {
            ((members.len() as f64 * test_ratio).round() as usize).clamp(1, members.len() - 1)
        };
        test.extend_from_slice(&members[..held]);
        train.extend_from_slice(&members[held..]);
    }
    train.shuffle(&mut rng);
    test.sort_unstable();
    Split { train, test }
}

/// Fraction of matching entries; `None` when there is nothing to score.
#[must_use]
pub fn accuracy<T: PartialEq>(predicted: &[T], truth: &[T]) -> Option<f64> {
    if predicted.is_empty() || predicted.len() != truth.len() {
        return None;
    }
    let hits = predicted.iter().zip(truth).filter(|(p, t)| p == t).count();
    Some(hits as f64 / truth.len() as f64)
}
