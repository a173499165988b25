use chrono::NaiveDate;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use super::source::RawTable;

/// Numeric columns of the canonical schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericField {
    /// Reported case count.
    Cases,
    /// Mean temperature (°C).
    Temperature,
    /// Relative humidity (%).
    Humidity,
    /// Rainfall (mm).
    Rainfall,
    /// Water quality index (0-10, higher is cleaner).
    WaterQuality,
    /// People per square kilometre.
    PopulationDensity,
    /// Vaccinated share of the population (0-1).
    VaccinationRate,
}

impl NumericField {
    /// Every numeric field in canonical column order.
    pub const ALL: [Self; 7] = [
        Self::Cases,
        Self::Temperature,
        Self::Humidity,
        Self::Rainfall,
        Self::WaterQuality,
        Self::PopulationDensity,
        Self::VaccinationRate,
    ];

    /// Canonical column name.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Cases => "cases",
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Rainfall => "rainfall",
            Self::WaterQuality => "water_quality",
            Self::PopulationDensity => "population_density",
            Self::VaccinationRate => "vaccination_rate",
        }
    }
}

/// One district/disease observation. Only the key fields are mandatory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    /// Administrative district.
    pub district: String,
    /// Disease name.
    pub disease: String,
    /// Reported cases.
    pub cases: Option<f64>,
    /// Temperature (°C).
    pub temperature: Option<f64>,
    /// Relative humidity (%).
    pub humidity: Option<f64>,
    /// Rainfall (mm).
    pub rainfall: Option<f64>,
    /// Water quality index.
    pub water_quality: Option<f64>,
    /// Population density.
    pub population_density: Option<f64>,
    /// Vaccination rate.
    pub vaccination_rate: Option<f64>,
    /// Observation date.
    pub date: Option<NaiveDate>,
    /// Provenance tag (source file or generator).
    pub source: String,
}

impl HealthRecord {
    /// Creates a record with only its key fields populated.
    #[must_use]
    pub fn new(
        district: impl Into<String>,
        disease: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            district: district.into(),
            disease: disease.into(),
            cases: None,
            temperature: None,
            humidity: None,
            rainfall: None,
            water_quality: None,
            population_density: None,
            vaccination_rate: None,
            date: None,
            source: source.into(),
        }
    }

    /// Builder-style setter for a numeric field.
    #[must_use]
    pub fn with(mut self, field: NumericField, value: f64) -> Self {
        *self.value_mut(field) = Some(value);
        self
    }

    /// Builder-style setter for the date.
    #[must_use]
    pub fn on(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Reads a numeric field.
    #[must_use]
    pub const fn value(&self, field: NumericField) -> Option<f64> {
        match field {
            NumericField::Cases => self.cases,
            NumericField::Temperature => self.temperature,
            NumericField::Humidity => self.humidity,
            NumericField::Rainfall => self.rainfall,
            NumericField::WaterQuality => self.water_quality,
            NumericField::PopulationDensity => self.population_density,
            NumericField::VaccinationRate => self.vaccination_rate,
        }
    }

    /// Mutable access to a numeric field.
    pub fn value_mut(&mut self, field: NumericField) -> &mut Option<f64> {
        match field {
            NumericField::Cases => &mut self.cases,
            NumericField::Temperature => &mut self.temperature,
            NumericField::Humidity => &mut self.humidity,
            NumericField::Rainfall => &mut self.rainfall,
            NumericField::WaterQuality => &mut self.water_quality,
            NumericField::PopulationDensity => &mut self.population_density,
            NumericField::VaccinationRate => &mut self.vaccination_rate,
        }
    }
}

/// Environmental view row; rows missing any of these fields are excluded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentalRow {
    /// District.
    pub district: String,
    /// Temperature (°C).
    pub temperature: f64,
    /// Relative humidity (%).
    pub humidity: f64,
    /// Rainfall (mm).
    pub rainfall: f64,
    /// Water quality index.
    pub water_quality: f64,
    /// Observation date.
    pub date: NaiveDate,
}

/// Population view row; rows missing any of these fields are excluded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationRow {
    /// District.
    pub district: String,
    /// Population density.
    pub population_density: f64,
    /// Vaccination rate.
    pub vaccination_rate: f64,
    /// Observation date.
    pub date: NaiveDate,
}

/// Inclusive date span covered by a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Earliest observation.
    pub start: NaiveDate,
    /// Latest observation.
    pub end: NaiveDate,
}

/// Summary statistics of a canonical dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    /// Number of records.
    pub total_records: usize,
    /// Distinct districts.
    pub districts: usize,
    /// Distinct diseases.
    pub diseases: usize,
    /// Covered dates, if any record is dated.
    pub date_range: Option<DateRange>,
    /// Records per provenance tag, in first-seen order.
    pub sources: IndexMap<String, usize>,
}

/// Ordered, cleaned collection of health records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalDataset {
    records: Vec<HealthRecord>,
}

impl CanonicalDataset {
    /// Wraps records without cleaning them.
    #[must_use]
    pub const fn from_records(records: Vec<HealthRecord>) -> Self {
        Self { records }
    }

    /// Records in load order.
    #[must_use]
    pub fn records(&self) -> &[HealthRecord] {
        &self.records
    }

    pub(crate) fn records_mut(&mut self) -> &mut [HealthRecord] {
        &mut self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the dataset holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// A column exists when at least one record carries a value for it.
    #[must_use]
    pub fn has_column(&self, field: NumericField) -> bool {
        self.records.iter().any(|record| record.value(field).is_some())
    }

    /// Whether any record is dated.
    #[must_use]
    pub fn has_dates(&self) -> bool {
        self.records.iter().any(|record| record.date.is_some())
    }

    /// Newest observation date.
    #[must_use]
    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.records.iter().filter_map(|record| record.date).max()
    }

    /// Records of one district.
    #[must_use]
    pub fn by_district(&self, district: &str) -> Self {
        self.filtered(|record| record.district == district)
    }

    /// Records of one disease.
    #[must_use]
    pub fn by_disease(&self, disease: &str) -> Self {
        self.filtered(|record| record.disease == disease)
    }

    fn filtered(&self, keep: impl Fn(&HealthRecord) -> bool) -> Self {
        Self {
            records: self.records.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    /// Distinct districts in first-seen order.
    #[must_use]
    pub fn districts(&self) -> IndexSet<String> {
        self.records.iter().map(|r| r.district.clone()).collect()
    }

    /// Distinct diseases in first-seen order.
    #[must_use]
    pub fn diseases(&self) -> IndexSet<String> {
        self.records.iter().map(|r| r.disease.clone()).collect()
    }

    /// Environmental projection, optionally restricted to a district.
    #[must_use]
    pub fn environmental_view(&self, district: Option<&str>) -> Vec<EnvironmentalRow> {
        self.records
            .iter()
            .filter(|record| district.map_or(true, |d| record.district == d))
            .filter_map(|record| {
                Some(EnvironmentalRow {
                    district: record.district.clone(),
                    temperature: record.temperature?,
                    humidity: record.humidity?,
                    rainfall: record.rainfall?,
                    water_quality: record.water_quality?,
                    date: record.date?,
                })
            })
            .collect()
    }

    /// Population projection, optionally restricted to a district.
    #[must_use]
    pub fn population_view(&self, district: Option<&str>) -> Vec<PopulationRow> {
        self.records
            .iter()
            .filter(|record| district.map_or(true, |d| record.district == d))
            .filter_map(|record| {
                Some(PopulationRow {
                    district: record.district.clone(),
                    population_density: record.population_density?,
                    vaccination_rate: record.vaccination_rate?,
                    date: record.date?,
                })
            })
            .collect()
    }

    /// Row count, distinct keys, date span and per-source counts.
    #[must_use]
    pub fn summary(&self) -> DatasetSummary {
        let mut sources: IndexMap<String, usize> = IndexMap::new();
        for record in &self.records {
            *sources.entry(record.source.clone()).or_default() += 1;
        }
        let dates = self.records.iter().filter_map(|record| record.date);
        let date_range = dates.clone().min().zip(dates.max()).map(|(start, end)| DateRange { start, end });
        DatasetSummary {
            total_records: self.records.len(),
            districts: self.districts().len(),
            diseases: self.diseases().len(),
            date_range,
            sources,
        }
    }

    /// Exports the dataset as a raw table with canonical headers. Absent
    /// values become empty cells.
    #[must_use]
    pub fn to_table(&self, name: impl Into<String>) -> RawTable {
        let mut headers = vec!["district".to_owned(), "disease".to_owned()];
        headers.extend(NumericField::ALL.iter().map(|field| field.column().to_owned()));
        headers.push("date".to_owned());
        headers.push("source_file".to_owned());

        let rows = self
            .records
            .iter()
            .map(|record| {
                let mut row = vec![record.district.clone(), record.disease.clone()];
                row.extend(
                    NumericField::ALL
                        .iter()
                        .map(|field| record.value(*field).map(|v| v.to_string()).unwrap_or_default()),
                );
                row.push(
                    record
                        .date
                        .map(|d| d.format("%Y-%m-%d").to_string())
                        .unwrap_or_default(),
                );
                row.push(record.source.clone());
                row
            })
            .collect();
        RawTable::new(name, headers, rows)
    }
}

impl FromIterator<HealthRecord> for CanonicalDataset {
    fn from_iter<T: IntoIterator<Item = HealthRecord>>(iter: T) -> Self {
        Self::from_records(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn sample() -> CanonicalDataset {
        CanonicalDataset::from_records(vec![
            HealthRecord::new("Bishnupur", "Cholera", "a.csv")
                .with(NumericField::Temperature, 28.0)
                .with(NumericField::Humidity, 70.0)
                .with(NumericField::Rainfall, 120.0)
                .with(NumericField::WaterQuality, 4.5)
                .on(day(2)),
            HealthRecord::new("Bishnupur", "Dengue", "a.csv")
                .with(NumericField::PopulationDensity, 140.0)
                .with(NumericField::VaccinationRate, 0.55)
                .on(day(9)),
            HealthRecord::new("Senapati", "Cholera", "b.csv")
                .with(NumericField::Temperature, 22.0),
        ])
    }

    #[test]
    fn filters_by_key_fields() {
        let dataset = sample();
        assert_eq!(dataset.by_district("Bishnupur").len(), 2);
        assert_eq!(dataset.by_disease("Cholera").len(), 2);
        assert!(dataset.by_district("Ukhrul").is_empty());
    }

    #[test]
    fn views_drop_incomplete_rows() {
        let dataset = sample();
        let env = dataset.environmental_view(None);
        assert_eq!(env.len(), 1);
        assert_eq!(env[0].water_quality, 4.5);
        let pop = dataset.population_view(Some("Bishnupur"));
        assert_eq!(pop.len(), 1);
        assert!(dataset.population_view(Some("Senapati")).is_empty());
    }

    #[test]
    fn summary_counts_keys_dates_and_sources() {
        let summary = sample().summary();
        assert_eq!(summary.total_records, 3);
        assert_eq!(summary.districts, 2);
        assert_eq!(summary.diseases, 2);
        assert_eq!(
            summary.date_range,
            Some(DateRange { start: day(2), end: day(9) })
        );
        assert_eq!(summary.sources.get("a.csv"), Some(&2));
        assert_eq!(summary.sources.get("b.csv"), Some(&1));
    }

    #[test]
    fn export_uses_canonical_headers() {
        let table = sample().to_table("export");
        assert_eq!(table.headers[0], "district");
        assert_eq!(table.headers.len(), 11);
        assert_eq!(table.rows[2][3], "22");
        assert_eq!(table.rows[2][9], "");
        assert_eq!(table.rows[0][9], "2024-03-02");
    }

    #[test]
    fn column_presence_requires_a_value() {
        let dataset = sample();
        assert!(dataset.has_column(NumericField::Temperature));
        assert!(!dataset.has_column(NumericField::Cases));
        assert_eq!(dataset.latest_date(), Some(day(9)));
    }
}
