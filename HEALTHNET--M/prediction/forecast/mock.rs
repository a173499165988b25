use chrono::NaiveDate;
use indexmap::IndexMap;
use rand::{rngs::SmallRng, seq::SliceRandom, Rng};
use rand_distr::StandardNormal;

use crate::risk::{mock::DEFAULT_DISEASES, PredictionSource};

use super::types::{horizon_dates, DiseaseForecast, Forecast, ModelPerformance, Trend};

const TREND_FACTORS: [f64; 3] = [0.8, 1.0, 1.2];
const NOISE_SCALE: f64 = 0.1;

/// Synthetic forecast over the default disease set: a random base rate per
/// disease scaled by a random factor and multiplicative noise, truncated to
/// whole non-negative cases.
pub fn mock_forecast(district: &str, days: u32, start: NaiveDate, rng: &mut SmallRng) -> Forecast {
    let dates = horizon_dates(start, days);
    let mut forecasts = IndexMap::new();
    for disease in DEFAULT_DISEASES {
        let base = f64::from(rng.gen_range(5_u32..25));
        let factor = TREND_FACTORS.choose(rng).copied().unwrap_or(1.0);
        let predicted_cases = dates
            .iter()
            .map(|_| {
                let noise: f64 = rng.sample(StandardNormal);
                (base * factor * NOISE_SCALE.mul_add(noise, 1.0)).trunc().max(0.0)
            })
            .collect();
        forecasts.insert(
            disease.to_owned(),
            DiseaseForecast {
                disease: disease.to_owned(),
                dates: dates.clone(),
                predicted_cases,
                trend: Trend::Stable,
                confidence: rng.gen_range(0.6..0.8),
                model_performance: ModelPerformance::default(),
            },
        );
    }
    Forecast::new(district, days, forecasts, PredictionSource::Fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn covers_default_diseases_for_every_day() {
        let mut rng = SmallRng::seed_from_u64(9);
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let forecast = mock_forecast("Ukhrul", 14, start, &mut rng);
        assert_eq!(forecast.source, PredictionSource::Fallback);
        assert_eq!(
            forecast.disease_forecasts.keys().collect::<Vec<_>>(),
            DEFAULT_DISEASES.iter().collect::<Vec<_>>()
        );
        for series in forecast.disease_forecasts.values() {
            assert_eq!(series.dates.len(), 14);
            assert_eq!(series.predicted_cases.len(), 14);
            assert!(series.predicted_cases.iter().all(|c| *c >= 0.0 && c.fract() == 0.0));
            assert!((0.6..0.8).contains(&series.confidence));
        }
        assert_eq!(forecast.summary.diseases_forecasted, 4);
    }

    #[test]
    fn zero_day_horizon_is_empty_but_well_formed() {
        let mut rng = SmallRng::seed_from_u64(1);
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let forecast = mock_forecast("X", 0, start, &mut rng);
        assert!(forecast.disease_forecasts.values().all(|s| s.dates.is_empty()));
        assert_eq!(forecast.summary.total_predicted_cases, 0);
    }
}
