use crate::error::InferenceError;

use super::types::RiskLevel;

/// A fitted classifier producing `[Low, Medium, High]` probabilities.
pub trait RiskModel: Send + Sync {
    /// Stable model name used in logs and model info.
    fn name(&self) -> &'static str;

    /// Class probabilities for one scaled feature row.
    fn predict_proba(&self, features: &[f64]) -> [f64; 3];

    /// Most probable class.
    fn predict(&self, features: &[f64]) -> RiskLevel {
        argmax(&self.predict_proba(features)).0
    }
}

/// Index and value of the largest entry; ties resolve to the lower level.
#[must_use]
pub fn argmax(proba: &[f64; 3]) -> (RiskLevel, f64) {
    let mut best = 0;
    for idx in 1..proba.len() {
        if proba[idx] > proba[best] {
            best = idx;
        }
    }
    (RiskLevel::from_index(best), proba[best])
}

/// Blended probabilities with the level they select.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blend {
    /// Element-wise mean of the member vectors.
    pub proba: [f64; 3],
    /// Argmax level.
    pub level: RiskLevel,
    /// Averaged probability of `level`.
    pub probability: f64,
    /// Largest averaged probability.
    pub confidence: f64,
}

/// Two independently trained members averaged with equal weight.
pub struct Ensemble {
    members: [Box<dyn RiskModel>; 2],
}

impl std::fmt::Debug for Ensemble {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ensemble")
            .field("members", &self.names())
            .finish()
    }
}

impl Ensemble {
    /// Pairs two members.
    #[must_use]
    pub fn new(first: Box<dyn RiskModel>, second: Box<dyn RiskModel>) -> Self {
        Self {
            members: [first, second],
        }
    }

    /// Member names in blending order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.members.iter().map(|m| m.name()).collect()
    }

    /// Members for per-model evaluation.
    #[must_use]
    pub fn members(&self) -> &[Box<dyn RiskModel>] {
        &self.members
    }

    /// Unweighted mean of the members' probability vectors. Fails when a
    /// member returns something that is not a distribution.
    pub fn blend(&self, features: &[f64]) -> Result<Blend, InferenceError> {
        let mut proba = [0.0; 3];
        for member in &self.members {
            let part = member.predict_proba(features);
            validate(member.name(), &part)?;
            for (acc, value) in proba.iter_mut().zip(part) {
                *acc += value;
            }
        }
        let n = self.members.len() as f64;
        for value in &mut proba {
            *value /= n;
        }
        let (level, probability) = argmax(&proba);
        let confidence = proba.iter().copied().fold(0.0, f64::max);
        Ok(Blend {
            proba,
            level,
            probability,
            confidence,
        })
    }
}

fn validate(name: &str, proba: &[f64; 3]) -> Result<(), InferenceError> {
    let finite = proba.iter().all(|p| p.is_finite() && (0.0..=1.0 + 1e-9).contains(p));
    let total: f64 = proba.iter().sum();
    if finite && (total - 1.0).abs() < 1e-6 {
        Ok(())
    } else {
        Err(InferenceError::InvalidProbabilities(name.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str, [f64; 3]);

    impl RiskModel for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        fn predict_proba(&self, _features: &[f64]) -> [f64; 3] {
            self.1
        }
    }

    #[test]
    fn blend_is_the_arithmetic_mean() {
        let ensemble = Ensemble::new(
            Box::new(Fixed("a", [0.6, 0.3, 0.1])),
            Box::new(Fixed("b", [0.2, 0.1, 0.7])),
        );
        let blend = ensemble.blend(&[0.0]).unwrap();
        let expected = [0.4, 0.2, 0.4];
        for (got, want) in blend.proba.iter().zip(expected) {
            assert!((got - want).abs() < 1e-12);
        }
        assert_eq!(blend.level, RiskLevel::Low);
        assert_eq!(blend.probability, blend.confidence);
        assert_eq!(ensemble.names(), vec!["a", "b"]);
    }

    #[test]
    fn argmax_picks_high_when_dominant() {
        let ensemble = Ensemble::new(
            Box::new(Fixed("a", [0.1, 0.2, 0.7])),
            Box::new(Fixed("b", [0.1, 0.3, 0.6])),
        );
        let blend = ensemble.blend(&[]).unwrap();
        assert_eq!(blend.level, RiskLevel::High);
        assert!((blend.probability - 0.65).abs() < 1e-12);
    }

    #[test]
    fn rejects_non_distributions() {
        let ensemble = Ensemble::new(
            Box::new(Fixed("ok", [1.0, 0.0, 0.0])),
            Box::new(Fixed("broken", [f64::NAN, 0.0, 0.0])),
        );
        assert_eq!(
            ensemble.blend(&[]).unwrap_err(),
            InferenceError::InvalidProbabilities("broken".into())
        );
    }
}
