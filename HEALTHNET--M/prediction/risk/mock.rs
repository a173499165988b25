use chrono::{NaiveDate, Utc};
use rand::{
    distributions::{Distribution, WeightedIndex},
    rngs::SmallRng,
    Rng,
};

use super::{
    advisor,
    types::{
        EnvironmentalSnapshot, PopulationSnapshot, Prediction, PredictionRequest, PredictionSource,
        RiskLevel, MODEL_VERSION,
    },
};

/// Diseases covered when a fallback request names none.
pub const DEFAULT_DISEASES: [&str; 4] = ["Cholera", "Dengue", "Malaria", "Typhoid"];

/// Prior over Low, Medium, High.
const LEVEL_PRIOR: [f64; 3] = [0.4, 0.4, 0.2];

/// Uniform mobility index attached to population snapshots.
pub fn mobility(rng: &mut SmallRng) -> f64 {
    rng.gen_range(0.4..0.8)
}

/// Well-formed synthetic predictions for the requested disease set.
pub fn mock_predictions(
    request: &PredictionRequest,
    district: &str,
    diseases: &[String],
    rng: &mut SmallRng,
    today: NaiveDate,
) -> Vec<Prediction> {
    let created_at = Utc::now();
    let stamp = created_at.format("%Y%m%d%H%M%S");
    let fallback: Vec<String> = DEFAULT_DISEASES.iter().map(|d| (*d).to_owned()).collect();
    let diseases = if diseases.is_empty() { &fallback[..] } else { diseases };
    let levels = WeightedIndex::new(LEVEL_PRIOR).ok();
    diseases
        .iter()
        .enumerate()
        .map(|(idx, disease)| {
            let risk_level = levels
                .as_ref()
                .map_or(RiskLevel::Low, |dist| RiskLevel::from_index(dist.sample(rng)));
            let probability = rng.gen_range(0.3..0.9);
            let confidence = rng.gen_range(0.6..0.9);
            let environmental = EnvironmentalSnapshot {
                temperature: rng.gen_range(20.0..35.0),
                humidity: rng.gen_range(40.0..90.0),
                rainfall: rng.gen_range(0.0..500.0),
                water_quality: rng.gen_range(1.0..10.0),
            };
            let population = PopulationSnapshot {
                density: rng.gen_range(50.0..200.0),
                vaccination_rate: rng.gen_range(0.3..0.9),
                mobility: mobility(rng),
            };
            Prediction {
                id: format!("pred-{stamp}-{idx}"),
                district: district.to_owned(),
                disease: disease.clone(),
                risk_level,
                probability,
                confidence,
                timeframe_days: request.timeframe_days,
                factors: vec![
                    "Environmental conditions".into(),
                    "Seasonal patterns".into(),
                    "Population density".into(),
                ],
                environmental: request.include_environmental.then_some(environmental),
                population: request.include_population.then_some(population),
                historical_trend: advisor::synthetic_trend(today),
                recommendations: vec![
                    format!("Monitor {disease} cases closely"),
                    "Maintain prevention measures".into(),
                    "Prepare response resources".into(),
                ],
                source: PredictionSource::Fallback,
                model_version: MODEL_VERSION.to_owned(),
                created_at,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()
    }

    #[test]
    fn defaults_to_four_diseases() {
        let mut rng = SmallRng::seed_from_u64(3);
        let request = PredictionRequest::new("Ukhrul");
        let preds = mock_predictions(&request, "Ukhrul", &[], &mut rng, today());
        let names: Vec<&str> = preds.iter().map(|p| p.disease.as_str()).collect();
        assert_eq!(names, DEFAULT_DISEASES);
        for pred in &preds {
            assert!((0.0..=1.0).contains(&pred.probability));
            assert!((0.0..=1.0).contains(&pred.confidence));
            assert!(pred.factors.len() <= 5 && pred.recommendations.len() <= 4);
            assert_eq!(pred.source, PredictionSource::Fallback);
            let mobility = pred.population.unwrap().mobility;
            assert!((0.4..0.8).contains(&mobility));
        }
    }

    #[test]
    fn honours_snapshot_flags_and_disease() {
        let mut rng = SmallRng::seed_from_u64(3);
        let request = PredictionRequest::new("Bishnupur").snapshots(false, false);
        let preds = mock_predictions(&request, "Bishnupur", &["Dengue".to_owned()], &mut rng, today());
        assert_eq!(preds.len(), 1);
        assert!(preds[0].environmental.is_none() && preds[0].population.is_none());
        assert_eq!(preds[0].recommendations[0], "Monitor Dengue cases closely");
    }

    #[test]
    fn level_prior_is_roughly_respected() {
        let mut rng = SmallRng::seed_from_u64(11);
        let request = PredictionRequest::new("X");
        let diseases: Vec<String> = (0..2000).map(|i| format!("D{i}")).collect();
        let preds = mock_predictions(&request, "X", &diseases, &mut rng, today());
        let high = preds.iter().filter(|p| p.risk_level == RiskLevel::High).count();
        assert!((300..500).contains(&high));
    }
}
