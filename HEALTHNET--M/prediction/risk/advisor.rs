//! Rule-based explanations attached to every prediction.

use chrono::{Duration, NaiveDate};

use crate::data::HealthRecord;

use super::types::{HistoricalTrend, RiskLevel};

const MAX_FACTORS: usize = 5;
const MAX_RECOMMENDATIONS: usize = 4;
const TREND_POINTS: usize = 6;
const SYNTHETIC_TREND: [f64; TREND_POINTS] = [5.0, 8.0, 12.0, 15.0, 18.0, 20.0];

/// Threshold rules over the six-feature vector, at most five.
#[must_use]
pub fn factors(features: &[f64; 6]) -> Vec<String> {
    let [temperature, humidity, rainfall, water_quality, density, vaccination] = *features;
    let rules = [
        (temperature > 30.0, "High temperature"),
        (humidity > 80.0, "High humidity"),
        (rainfall > 300.0, "Heavy rainfall"),
        (water_quality < 4.0, "Poor water quality"),
        (vaccination < 0.5, "Low vaccination rate"),
        (density > 150.0, "High population density"),
    ];
    let mut out: Vec<String> = rules
        .iter()
        .filter(|(hit, _)| *hit)
        .map(|(_, label)| (*label).to_owned())
        .take(MAX_FACTORS)
        .collect();
    if out.is_empty() {
        out = vec!["Seasonal patterns".into(), "Environmental conditions".into()];
    }
    out
}

/// Tier actions plus one disease-specific action where one is known.
#[must_use]
pub fn recommendations(disease: &str, level: RiskLevel) -> Vec<String> {
    let mut out: Vec<String> = match level {
        RiskLevel::High => vec![
            format!("Deploy emergency response team for {disease}"),
            "Increase surveillance and monitoring".into(),
            "Implement immediate containment measures".into(),
        ],
        RiskLevel::Medium => vec![
            format!("Increase {disease} awareness campaigns"),
            "Monitor environmental conditions closely".into(),
            "Prepare response resources".into(),
        ],
        RiskLevel::Low => vec![
            "Maintain current prevention measures".into(),
            "Continue regular monitoring".into(),
            "Prepare for seasonal variations".into(),
        ],
    };
    let specific = match disease {
        "Cholera" => Some("Improve water treatment and sanitation"),
        "Dengue" => Some("Conduct vector control activities"),
        "Malaria" => Some("Distribute mosquito nets and repellents"),
        "Typhoid" => Some("Ensure food safety and hygiene"),
        _ => None,
    };
    out.extend(specific.map(str::to_owned));
    out.truncate(MAX_RECOMMENDATIONS);
    out
}

/// Rising placeholder series ending at `anchor`, one point per 30 days.
#[must_use]
pub fn synthetic_trend(anchor: NaiveDate) -> HistoricalTrend {
    let dates = (0..TREND_POINTS)
        .map(|i| anchor - Duration::days(30 * (TREND_POINTS - 1 - i) as i64))
        .collect();
    HistoricalTrend {
        cases: SYNTHETIC_TREND.to_vec(),
        dates,
    }
}

/// Last six dated case counts, oldest first; the placeholder series when
/// fewer than two exist.
#[must_use]
pub fn historical_trend<'a>(
    records: impl IntoIterator<Item = &'a HealthRecord>,
    anchor: NaiveDate,
) -> HistoricalTrend {
    let mut points: Vec<(NaiveDate, f64)> = records
        .into_iter()
        .filter_map(|record| Some((record.date?, record.cases?)))
        .collect();
    if points.len() < 2 {
        return synthetic_trend(anchor);
    }
    points.sort_by_key(|(date, _)| *date);
    let tail = &points[points.len().saturating_sub(TREND_POINTS)..];
    HistoricalTrend {
        cases: tail.iter().map(|(_, cases)| *cases).collect(),
        dates: tail.iter().map(|(date, _)| *date).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::NumericField;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[test]
    fn factors_fire_on_thresholds_and_cap_at_five() {
        let all = factors(&[31.0, 81.0, 301.0, 3.0, 151.0, 0.4]);
        assert_eq!(all.len(), 5);
        assert_eq!(all[0], "High temperature");
        assert!(!all.contains(&"High population density".to_owned()));

        let calm = factors(&[25.0, 60.0, 100.0, 5.0, 100.0, 0.6]);
        assert_eq!(calm, vec!["Seasonal patterns", "Environmental conditions"]);
    }

    #[test]
    fn recommendations_add_one_disease_action() {
        let recs = recommendations("Cholera", RiskLevel::High);
        assert_eq!(recs.len(), 4);
        assert_eq!(recs[0], "Deploy emergency response team for Cholera");
        assert_eq!(recs[3], "Improve water treatment and sanitation");
        assert_eq!(recommendations("Diarrhea", RiskLevel::Low).len(), 3);
    }

    #[test]
    fn trend_uses_latest_six_points() {
        let records: Vec<HealthRecord> = (1..=8)
            .rev()
            .map(|d| {
                HealthRecord::new("Senapati", "Malaria", "t")
                    .with(NumericField::Cases, f64::from(d))
                    .on(day(d))
            })
            .collect();
        let trend = historical_trend(&records, day(30));
        assert_eq!(trend.cases, vec![3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        assert_eq!(trend.dates.first(), Some(&day(3)));
    }

    #[test]
    fn sparse_history_uses_placeholder() {
        let one = [HealthRecord::new("A", "B", "t").with(NumericField::Cases, 4.0).on(day(1))];
        let trend = historical_trend(&one, day(31));
        assert_eq!(trend.cases, SYNTHETIC_TREND.to_vec());
        assert_eq!(trend.dates.last(), Some(&day(31)));
        assert_eq!(trend.dates[0], day(31) - Duration::days(150));
    }
}
