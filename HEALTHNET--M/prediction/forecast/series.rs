//! Monthly resampling of case histories.

use std::collections::BTreeMap;

use chrono::{Datelike, Days, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::data::{CanonicalDataset, HealthRecord};

use super::types::SeriesKey;

/// One calendar month of a (district, disease) series. Averages over months
/// with no observations are zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthlyPoint {
    /// Last day of the month.
    pub month_end: NaiveDate,
    /// Summed cases.
    pub cases: f64,
    /// Mean temperature.
    pub temperature: f64,
    /// Mean humidity.
    pub humidity: f64,
    /// Summed rainfall.
    pub rainfall: f64,
    /// Mean water quality.
    pub water_quality: f64,
}

impl MonthlyPoint {
    /// Regression inputs: month number then the four environmental aggregates.
    #[must_use]
    pub fn features(&self) -> [f64; 5] {
        [
            f64::from(self.month_end.month()),
            self.temperature,
            self.humidity,
            self.rainfall,
            self.water_quality,
        ]
    }
}

#[derive(Default)]
struct Bucket {
    cases: f64,
    rainfall: f64,
    temperature: Mean,
    humidity: Mean,
    water_quality: Mean,
}

#[derive(Default)]
struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    fn push(&mut self, value: Option<f64>) {
        if let Some(v) = value.filter(|v| v.is_finite()) {
            self.sum += v;
            self.count += 1;
        }
    }

    fn value(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

impl Bucket {
    fn push(&mut self, record: &HealthRecord) {
        self.cases += record.cases.filter(|v| v.is_finite()).unwrap_or(0.0);
        self.rainfall += record.rainfall.filter(|v| v.is_finite()).unwrap_or(0.0);
        self.temperature.push(record.temperature);
        self.humidity.push(record.humidity);
        self.water_quality.push(record.water_quality);
    }
}

/// Last calendar day of the month containing `date`.
#[must_use]
pub fn month_end(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).map_or(date, |next| next - Duration::days(1))
}

impl Bucket {
    fn point(&self, month_end: NaiveDate) -> MonthlyPoint {
        MonthlyPoint {
            month_end,
            cases: self.cases,
            temperature: self.temperature.value(),
            humidity: self.humidity.value(),
            rainfall: self.rainfall,
            water_quality: self.water_quality.value(),
        }
    }
}

/// Groups records by (district, disease) and resamples each group to one
/// point per calendar month from its first to its last observed month,
/// oldest first. Months without observations are zero-filled.
///
/// When no record carries a date, row `i` is dated `epoch + i` days. When
/// only some records are dated, the undated ones are left out.
#[must_use]
pub fn monthly_series(
    dataset: &CanonicalDataset,
    epoch: NaiveDate,
) -> BTreeMap<SeriesKey, Vec<MonthlyPoint>> {
    let synthesize = !dataset.has_dates();
    let mut buckets: BTreeMap<SeriesKey, BTreeMap<NaiveDate, Bucket>> = BTreeMap::new();
    for (idx, record) in dataset.records().iter().enumerate() {
        let date = if synthesize {
            epoch.checked_add_days(Days::new(idx as u64))
        } else {
            record.date
        };
        let Some(date) = date else {
            continue;
        };
        buckets
            .entry(SeriesKey::new(record.district.clone(), record.disease.clone()))
            .or_default()
            .entry(month_end(date))
            .or_default()
            .push(record);
    }
    buckets
        .into_iter()
        .map(|(key, months)| (key, fill_months(&months)))
        .collect()
}

fn fill_months(months: &BTreeMap<NaiveDate, Bucket>) -> Vec<MonthlyPoint> {
    let (Some(&first), Some(&last)) = (months.keys().next(), months.keys().next_back()) else {
        return Vec::new();
    };
    let empty = Bucket::default();
    let mut points = Vec::new();
    let mut cursor = first;
    while cursor <= last {
        points.push(months.get(&cursor).unwrap_or(&empty).point(cursor));
        match cursor.succ_opt() {
            Some(next) => cursor = month_end(next),
            None => break,
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::NumericField;
    use crate::forecast::types::Trend;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn month_end_handles_december_and_leap_years() {
        assert_eq!(month_end(date(2024, 2, 10)), date(2024, 2, 29));
        assert_eq!(month_end(date(2023, 12, 1)), date(2023, 12, 31));
    }

    #[test]
    fn sums_cases_and_rainfall_and_averages_the_rest() {
        let data: CanonicalDataset = vec![
            HealthRecord::new("Senapati", "Cholera", "t")
                .with(NumericField::Cases, 4.0)
                .with(NumericField::Rainfall, 10.0)
                .with(NumericField::Temperature, 20.0)
                .on(date(2024, 3, 2)),
            HealthRecord::new("Senapati", "Cholera", "t")
                .with(NumericField::Cases, 6.0)
                .with(NumericField::Rainfall, 5.0)
                .with(NumericField::Temperature, 30.0)
                .on(date(2024, 3, 20)),
            HealthRecord::new("Senapati", "Cholera", "t")
                .with(NumericField::Cases, 1.0)
                .on(date(2024, 1, 5)),
        ]
        .into_iter()
        .collect();
        let series = monthly_series(&data, date(2024, 1, 1));
        let points = &series[&SeriesKey::new("Senapati", "Cholera")];
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].month_end, date(2024, 1, 31));
        assert_eq!(points[2].cases, 10.0);
        assert_eq!(points[2].rainfall, 15.0);
        assert_eq!(points[2].temperature, 25.0);
        assert_eq!(points[2].humidity, 0.0);
        assert_eq!(points[2].features()[0], 3.0);
    }

    #[test]
    fn gap_months_are_zero_filled_between_observations() {
        let data: CanonicalDataset = [(1, 40.0), (3, 10.0), (4, 10.0)]
            .into_iter()
            .map(|(m, temp)| {
                HealthRecord::new("A", "Cholera", "t")
                    .with(NumericField::Cases, 10.0)
                    .with(NumericField::Temperature, temp)
                    .on(date(2024, m, 9))
            })
            .collect();
        let series = monthly_series(&data, date(2024, 1, 1));
        let points = &series[&SeriesKey::new("A", "Cholera")];
        let cases: Vec<f64> = points.iter().map(|p| p.cases).collect();
        assert_eq!(cases, vec![10.0, 0.0, 10.0, 10.0]);
        assert_eq!(points[1].month_end, date(2024, 2, 29));
        assert_eq!(points[1].temperature, 0.0);
        assert_eq!(Trend::from_series(&cases), Trend::Increasing);

        let sparse: CanonicalDataset = [1, 3]
            .into_iter()
            .map(|m| HealthRecord::new("B", "Dengue", "t").with(NumericField::Cases, 2.0).on(date(2023, m, 1)))
            .collect();
        let series = monthly_series(&sparse, date(2024, 1, 1));
        assert_eq!(series[&SeriesKey::new("B", "Dengue")].len(), 3);
    }

    #[test]
    fn gaps_across_year_end_are_filled() {
        let data: CanonicalDataset = [date(2023, 11, 20), date(2024, 2, 3)]
            .into_iter()
            .map(|d| HealthRecord::new("A", "Typhoid", "t").with(NumericField::Cases, 1.0).on(d))
            .collect();
        let series = monthly_series(&data, date(2024, 1, 1));
        let ends: Vec<NaiveDate> = series[&SeriesKey::new("A", "Typhoid")]
            .iter()
            .map(|p| p.month_end)
            .collect();
        assert_eq!(
            ends,
            vec![date(2023, 11, 30), date(2023, 12, 31), date(2024, 1, 31), date(2024, 2, 29)]
        );
    }

    #[test]
    fn undated_datasets_use_daily_sequence_from_epoch() {
        let data: CanonicalDataset = (0..40)
            .map(|_| HealthRecord::new("A", "Dengue", "t").with(NumericField::Cases, 1.0))
            .collect();
        let series = monthly_series(&data, date(2024, 1, 1));
        let points = &series[&SeriesKey::new("A", "Dengue")];
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].cases, 31.0);
        assert_eq!(points[1].cases, 9.0);
    }
}
