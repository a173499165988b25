//! Header renaming, type coercion, median imputation and key normalisation.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use super::record::{CanonicalDataset, HealthRecord, NumericField};
use super::source::RawTable;

const DATE_FORMATS: [&str; 8] = [
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%m-%d-%Y",
    "%d-%m-%Y",
    "%Y/%m/%d",
    "%d %b %Y",
    "%b %d, %Y",
];

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    District,
    Disease,
    Numeric(NumericField),
    Date,
    Source,
}

/// Maps a source header onto the canonical schema. Unknown headers map to `None`.
fn map_header(header: &str) -> Option<Column> {
    let column = match header.trim() {
        "District" | "district" => Column::District,
        "Disease" | "disease" => Column::Disease,
        "Cases" | "cases" => Column::Numeric(NumericField::Cases),
        "Temperature" | "temperature" => Column::Numeric(NumericField::Temperature),
        "Humidity" | "humidity" => Column::Numeric(NumericField::Humidity),
        "Rainfall" | "rainfall" => Column::Numeric(NumericField::Rainfall),
        "Water Quality" | "water_quality" => Column::Numeric(NumericField::WaterQuality),
        "Population Density" | "population_density" => {
            Column::Numeric(NumericField::PopulationDensity)
        }
        "Vaccination Rate" | "vaccination_rate" => Column::Numeric(NumericField::VaccinationRate),
        "Date" | "date" | "created_at" | "timestamp" => Column::Date,
        "source_file" => Column::Source,
        _ => return None,
    };
    Some(column)
}

/// Parses a numeric cell; blanks, garbage and non-finite values become `None`.
#[must_use]
pub fn coerce_number(cell: &str) -> Option<f64> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Parses a date cell in any of the accepted layouts; failures become `None`.
#[must_use]
pub fn coerce_date(cell: &str) -> Option<NaiveDate> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(stamp) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(stamp.date_naive());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map(|stamp| stamp.date())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        })
}

/// Trims and title-cases: a letter is upper-cased when it follows a
/// non-letter and lower-cased otherwise. Applying it twice changes nothing.
#[must_use]
pub fn title_case(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut previous_is_letter = false;
    for ch in raw.trim().chars() {
        if ch.is_alphabetic() {
            if previous_is_letter {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            previous_is_letter = true;
        } else {
            out.push(ch);
            previous_is_letter = false;
        }
    }
    out
}

/// Result of converting raw tables into typed records.
#[derive(Debug, Clone, Default)]
pub struct IngestOutcome {
    /// Typed records in table order.
    pub records: Vec<HealthRecord>,
    /// Rows dropped because they had no district or no disease.
    pub dropped_rows: usize,
}

/// Renames headers and coerces every cell. When several headers map to the
/// same field, the first non-null value wins.
#[must_use]
pub fn ingest(tables: &[RawTable]) -> IngestOutcome {
    let mut outcome = IngestOutcome::default();
    for table in tables {
        let columns: Vec<(usize, Column)> = table
            .headers
            .iter()
            .enumerate()
            .filter_map(|(idx, header)| map_header(header).map(|column| (idx, column)))
            .collect();
        for row in &table.rows {
            match ingest_row(&table.name, &columns, row) {
                Some(record) => outcome.records.push(record),
                None => outcome.dropped_rows += 1,
            }
        }
    }
    outcome
}

fn ingest_row(table: &str, columns: &[(usize, Column)], row: &[String]) -> Option<HealthRecord> {
    let mut record = HealthRecord::new(String::new(), String::new(), table);
    let mut tagged = false;
    for &(idx, column) in columns {
        let cell = row.get(idx).map_or("", |cell| cell.as_str()).trim();
        match column {
            Column::District if record.district.is_empty() => record.district = cell.to_owned(),
            Column::Disease if record.disease.is_empty() => record.disease = cell.to_owned(),
            Column::Numeric(field) => {
                let slot = record.value_mut(field);
                if slot.is_none() {
                    *slot = coerce_number(cell);
                }
            }
            Column::Date if record.date.is_none() => record.date = coerce_date(cell),
            Column::Source if !tagged && !cell.is_empty() => {
                record.source = cell.to_owned();
                tagged = true;
            }
            _ => {}
        }
    }
    if record.district.is_empty() || record.disease.is_empty() {
        return None;
    }
    Some(record)
}

/// Median of the values, averaging the middle pair for even counts.
#[must_use]
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// The idempotent cleaning stage: drops non-finite values, imputes every
/// present numeric column with its dataset-wide median, and normalises keys.
pub fn normalize(dataset: &mut CanonicalDataset) {
    let records = dataset.records_mut();
    for field in NumericField::ALL {
        let mut present = Vec::with_capacity(records.len());
        for record in records.iter_mut() {
            let slot = record.value_mut(field);
            match *slot {
                Some(value) if value.is_finite() => present.push(value),
                Some(_) => *slot = None,
                None => {}
            }
        }
        let Some(fill) = median(&mut present) else {
            continue;
        };
        for record in records.iter_mut() {
            record.value_mut(field).get_or_insert(fill);
        }
    }
    for record in records.iter_mut() {
        record.district = title_case(&record.district);
        record.disease = title_case(&record.disease);
    }
}

/// Full cleaning pass over raw tables.
#[must_use]
pub fn clean(tables: &[RawTable]) -> (CanonicalDataset, usize) {
    let IngestOutcome {
        records,
        dropped_rows,
    } = ingest(tables);
    let mut dataset = CanonicalDataset::from_records(records);
    normalize(&mut dataset);
    (dataset, dropped_rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable::new(
            "monsoon_jun-jul2024.csv",
            headers.iter().map(|h| (*h).to_owned()).collect(),
            rows.iter()
                .map(|row| row.iter().map(|c| (*c).to_owned()).collect())
                .collect(),
        )
    }

    #[test]
    fn renames_and_coerces_source_headers() {
        let raw = table(
            &["District", "Disease", "Cases", "Water Quality", "Date", "Risk Level"],
            &[&["  imphal EAST ", "cholera", "14", "3.5", "2024-06-03", "High"]],
        );
        let (dataset, dropped) = clean(&[raw]);
        assert_eq!(dropped, 0);
        let record = &dataset.records()[0];
        assert_eq!(record.district, "Imphal East");
        assert_eq!(record.disease, "Cholera");
        assert_eq!(record.cases, Some(14.0));
        assert_eq!(record.water_quality, Some(3.5));
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2024, 6, 3));
        assert_eq!(record.source, "monsoon_jun-jul2024.csv");
    }

    #[test]
    fn unparseable_numbers_are_median_imputed() {
        let raw = table(
            &["district", "disease", "temperature"],
            &[
                &["A", "Dengue", "20"],
                &["A", "Dengue", "n/a"],
                &["B", "Dengue", "30"],
                &["B", "Dengue", "inf"],
                &["C", "Dengue", "26"],
            ],
        );
        let (dataset, _) = clean(&[raw]);
        let temps: Vec<f64> = dataset.records().iter().filter_map(|r| r.temperature).collect();
        assert_eq!(temps, vec![20.0, 26.0, 30.0, 26.0, 26.0]);
    }

    #[test]
    fn unparseable_dates_become_null_without_failing() {
        let raw = table(
            &["district", "disease", "date"],
            &[&["A", "Malaria", "not a date"], &["A", "Malaria", "15-06-2024"]],
        );
        let (dataset, _) = clean(&[raw]);
        assert_eq!(dataset.records()[0].date, None);
        assert_eq!(dataset.records()[1].date, NaiveDate::from_ymd_opt(2024, 6, 15));
    }

    #[test]
    fn drops_rows_without_keys() {
        let raw = table(&["district", "disease"], &[&["", "Malaria"], &["A", "Malaria"]]);
        let (dataset, dropped) = clean(&[raw]);
        assert_eq!(dropped, 1);
        assert_eq!(dataset.len(), 1);
    }

    #[test]
    fn recleaning_a_cleaned_dataset_is_a_no_op() {
        let raw = table(
            &["District", "Disease", "Cases", "Rainfall", "Date"],
            &[
                &["senapati", "typhoid", "7", "", "2024-01-05"],
                &["Senapati", "TYPHOID", "x", "210.5", "bad"],
                &["churachandpur", "dengue", "31", "98.25", "2024-02-11T08:00:00Z"],
            ],
        );
        let (mut once, _) = clean(&[raw]);
        let snapshot = once.clone();
        normalize(&mut once);
        assert_eq!(once, snapshot);

        let (twice, dropped) = clean(&[snapshot.to_table("export")]);
        assert_eq!(dropped, 0);
        assert_eq!(twice, snapshot);
    }

    #[test]
    fn title_case_matches_word_boundaries() {
        assert_eq!(title_case("imphal west"), "Imphal West");
        assert_eq!(title_case("ACUTE-diarrhea"), "Acute-Diarrhea");
        assert_eq!(title_case(&title_case(" mixed CASE ")), "Mixed Case");
    }

    #[test]
    fn median_handles_even_counts() {
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&mut []), None);
    }
}
