use chrono::{Duration, NaiveDate};
use rand::{rngs::SmallRng, Rng, SeedableRng};

use super::record::{CanonicalDataset, HealthRecord, NumericField};

/// Provenance tag of generated rows.
pub const SYNTHETIC_SOURCE: &str = "sample_data";

/// Districts covered by the generated dataset.
pub const SAMPLE_DISTRICTS: [&str; 5] = [
    "Imphal East",
    "Imphal West",
    "Bishnupur",
    "Senapati",
    "Churachandpur",
];

/// Diseases covered by the generated dataset.
pub const SAMPLE_DISEASES: [&str; 5] = ["Cholera", "Dengue", "Malaria", "Typhoid", "Diarrhea"];

/// Seeded generator for the canonical-schema dataset used when no source
/// yields rows.
#[derive(Debug, Clone)]
pub struct SyntheticDataset {
    rows: usize,
    seed: u64,
    anchor: NaiveDate,
}

impl SyntheticDataset {
    /// Creates a generator; dates fall within the year before `anchor`.
    #[must_use]
    pub const fn new(rows: usize, seed: u64, anchor: NaiveDate) -> Self {
        Self { rows, seed, anchor }
    }

    /// Generates the dataset. Same seed and anchor, same rows.
    #[must_use]
    pub fn generate(&self) -> CanonicalDataset {
        let mut rng = SmallRng::seed_from_u64(self.seed);
        (0..self.rows.max(1))
            .map(|_| {
                let district = SAMPLE_DISTRICTS[rng.gen_range(0..SAMPLE_DISTRICTS.len())];
                let disease = SAMPLE_DISEASES[rng.gen_range(0..SAMPLE_DISEASES.len())];
                let back = rng.gen_range(0..365_i64);
                HealthRecord::new(district, disease, SYNTHETIC_SOURCE)
                    .with(NumericField::Cases, f64::from(rng.gen_range(1..100_u32)))
                    .with(NumericField::Temperature, rng.gen_range(20.0..35.0))
                    .with(NumericField::Humidity, rng.gen_range(40.0..90.0))
                    .with(NumericField::Rainfall, rng.gen_range(0.0..500.0))
                    .with(NumericField::WaterQuality, rng.gen_range(1.0..10.0))
                    .with(NumericField::PopulationDensity, rng.gen_range(50.0..200.0))
                    .with(NumericField::VaccinationRate, rng.gen_range(0.3..0.9))
                    .on(self.anchor - Duration::days(back))
            })
            .collect()
    }
}
