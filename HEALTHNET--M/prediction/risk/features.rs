use crate::data::{HealthRecord, NumericField};

use super::types::RiskLevel;

/// Classifier inputs in fixed vector order.
pub const FEATURES: [NumericField; 6] = [
    NumericField::Temperature,
    NumericField::Humidity,
    NumericField::Rainfall,
    NumericField::WaterQuality,
    NumericField::PopulationDensity,
    NumericField::VaccinationRate,
];

/// Substitutes for absent inputs, aligned with [`FEATURES`].
pub const FEATURE_DEFAULTS: [f64; 6] = [25.0, 60.0, 100.0, 5.0, 100.0, 0.6];

/// Six-feature vector of a record, defaults filling gaps.
#[must_use]
pub fn feature_vector(record: &HealthRecord) -> [f64; 6] {
    let mut out = FEATURE_DEFAULTS;
    for (slot, field) in out.iter_mut().zip(FEATURES) {
        if let Some(value) = record.value(field).filter(|v| v.is_finite()) {
            *slot = value;
        }
    }
    out
}

/// Keeps only the columns a bundle was trained on.
#[must_use]
pub fn project(full: &[f64; 6], columns: &[usize]) -> Vec<f64> {
    columns.iter().map(|&idx| full[idx]).collect()
}

/// How training labels were derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Bucketed case counts.
    Cases,
    /// Bucketed environmental risk score.
    EnvironmentalScore,
}

/// Case thresholds: at most 10 is Low, at most 25 is Medium.
#[must_use]
pub fn bucket_cases(cases: f64) -> RiskLevel {
    if cases <= 10.0 {
        RiskLevel::Low
    } else if cases <= 25.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    }
}

/// Weighted environmental score used when no case counts exist.
#[must_use]
pub fn environmental_score(features: &[f64; 6]) -> f64 {
    let [temperature, humidity, rainfall, water_quality, _, _] = *features;
    0.2 * temperature + 0.3 * humidity + 0.2 * rainfall + 0.3 * (10.0 - water_quality)
}

/// Score thresholds: at most 20 is Low, at most 40 is Medium.
#[must_use]
pub fn bucket_score(score: f64) -> RiskLevel {
    if score <= 20.0 {
        RiskLevel::Low
    } else if score <= 40.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let record = HealthRecord::new("Bishnupur", "Dengue", "t")
            .with(NumericField::Humidity, 88.0)
            .with(NumericField::VaccinationRate, 0.35);
        assert_eq!(feature_vector(&record), [25.0, 88.0, 100.0, 5.0, 100.0, 0.35]);
        assert_eq!(project(&feature_vector(&record), &[1, 5]), vec![88.0, 0.35]);
    }

    #[test]
    fn thresholds_are_inclusive_upper_bounds() {
        assert_eq!(bucket_cases(0.0), RiskLevel::Low);
        assert_eq!(bucket_cases(10.0), RiskLevel::Low);
        assert_eq!(bucket_cases(25.0), RiskLevel::Medium);
        assert_eq!(bucket_cases(25.5), RiskLevel::High);
        assert_eq!(bucket_score(40.0), RiskLevel::Medium);
        assert_eq!(bucket_score(40.1), RiskLevel::High);
    }

    #[test]
    fn environmental_score_uses_documented_weights() {
        let features = [30.0, 80.0, 50.0, 4.0, 0.0, 0.0];
        let expected = 6.0 + 24.0 + 10.0 + 1.8;
        assert!((environmental_score(&features) - expected).abs() < 1e-9);
    }
}
