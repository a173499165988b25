use std::fmt;

use chrono::{DateTime, Days, NaiveDate, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::risk::{PredictionSource, RiskLevel};

/// Longest forecast horizon served; longer requests are cut to it.
pub const MAX_HORIZON_DAYS: u32 = 3650;

/// `days` consecutive dates from `start`. Stops early at the end of the
/// representable calendar.
#[must_use]
pub fn horizon_dates(start: NaiveDate, days: u32) -> Vec<NaiveDate> {
    (0..u64::from(days))
        .map_while(|offset| start.checked_add_days(Days::new(offset)))
        .collect()
}

/// Composite registry key for one (district, disease) series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    /// District name.
    pub district: String,
    /// Disease name.
    pub disease: String,
}

impl SeriesKey {
    /// Builds a key.
    #[must_use]
    pub fn new(district: impl Into<String>, disease: impl Into<String>) -> Self {
        Self {
            district: district.into(),
            disease: disease.into(),
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.district, self.disease)
    }
}

/// Coarse direction of a case series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    /// Second half mean more than 10% above the first.
    Increasing,
    /// Second half mean more than 10% below the first.
    Decreasing,
    /// Within the deadband.
    Stable,
}

impl Trend {
    /// Compares the mean of the first half (rounded down) with the rest.
    #[must_use]
    pub fn from_series(values: &[f64]) -> Self {
        if values.len() < 2 {
            return Self::Stable;
        }
        let (first, second) = values.split_at(values.len() / 2);
        let mean = |xs: &[f64]| xs.iter().sum::<f64>() / xs.len() as f64;
        let (first, second) = (mean(first), mean(second));
        if second > first * 1.1 {
            Self::Increasing
        } else if second < first * 0.9 {
            Self::Decreasing
        } else {
            Self::Stable
        }
    }

    /// End value of the horizon ramp.
    #[must_use]
    pub const fn ramp_end(self) -> f64 {
        match self {
            Self::Increasing => 1.2,
            Self::Decreasing => 0.8,
            Self::Stable => 1.0,
        }
    }

    /// Lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Increasing => "increasing",
            Self::Decreasing => "decreasing",
            Self::Stable => "stable",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-sample fit quality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPerformance {
    /// Mean squared error.
    pub mse: f64,
    /// Coefficient of determination.
    pub r2: f64,
}

/// Daily projection for one disease.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiseaseForecast {
    /// Disease name.
    pub disease: String,
    /// Consecutive days starting at the forecast start.
    pub dates: Vec<NaiveDate>,
    /// Non-negative, one per date.
    pub predicted_cases: Vec<f64>,
    /// Trend of the training series.
    pub trend: Trend,
    /// `min(0.9, r2 + 0.3)` for fitted series.
    pub confidence: f64,
    /// In-sample fit of the series model.
    pub model_performance: ModelPerformance,
}

impl DiseaseForecast {
    /// Sum over the horizon.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.predicted_cases.iter().sum()
    }
}

/// Aggregate view over all disease forecasts of a district.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSummary {
    /// Sum of every series, truncated.
    pub total_predicted_cases: u64,
    /// Disease with the largest sum; first one wins ties.
    pub highest_risk_disease: Option<String>,
    /// Mean of the per-disease confidences.
    pub average_confidence: f64,
    /// Number of series.
    pub diseases_forecasted: usize,
    /// Overall label from the average cases per disease.
    pub risk_assessment: RiskLevel,
}

impl ForecastSummary {
    /// Summarizes `forecasts`.
    #[must_use]
    pub fn from_forecasts(forecasts: &IndexMap<String, DiseaseForecast>) -> Self {
        let total: f64 = forecasts.values().map(DiseaseForecast::total).sum();
        let mut highest: Option<(&str, f64)> = None;
        for (disease, forecast) in forecasts {
            let sum = forecast.total();
            match highest {
                Some((_, best)) if sum <= best => {}
                _ => highest = Some((disease, sum)),
            }
        }
        let average_confidence = if forecasts.is_empty() {
            0.0
        } else {
            forecasts.values().map(|f| f.confidence).sum::<f64>() / forecasts.len() as f64
        };
        Self {
            total_predicted_cases: total.max(0.0) as u64,
            highest_risk_disease: highest.map(|(disease, _)| disease.to_owned()),
            average_confidence,
            diseases_forecasted: forecasts.len(),
            risk_assessment: overall_risk(total, forecasts.len()),
        }
    }
}

/// Average cases per disease above 50 is High, above 20 Medium.
#[must_use]
pub fn overall_risk(total_cases: f64, diseases: usize) -> RiskLevel {
    let average = total_cases / diseases.max(1) as f64;
    if average > 50.0 {
        RiskLevel::High
    } else if average > 20.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Forecast for every disease registered under a district.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    /// District name.
    pub district: String,
    /// Days projected per series.
    pub horizon_days: u32,
    /// Creation time.
    pub generated_at: DateTime<Utc>,
    /// Series keyed by disease.
    pub disease_forecasts: IndexMap<String, DiseaseForecast>,
    /// Aggregate view.
    pub summary: ForecastSummary,
    /// Whether the series came from fitted models or the fallback generator.
    pub source: PredictionSource,
}

impl Forecast {
    /// Assembles a forecast and its summary.
    #[must_use]
    pub fn new(
        district: impl Into<String>,
        horizon_days: u32,
        disease_forecasts: IndexMap<String, DiseaseForecast>,
        source: PredictionSource,
    ) -> Self {
        let summary = ForecastSummary::from_forecasts(&disease_forecasts);
        Self {
            district: district.into(),
            horizon_days,
            generated_at: Utc::now(),
            disease_forecasts,
            summary,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(disease: &str, cases: &[f64], confidence: f64) -> DiseaseForecast {
        DiseaseForecast {
            disease: disease.into(),
            dates: Vec::new(),
            predicted_cases: cases.to_vec(),
            trend: Trend::Stable,
            confidence,
            model_performance: ModelPerformance::default(),
        }
    }

    #[test]
    fn trend_uses_ten_percent_deadband() {
        assert_eq!(Trend::from_series(&[1.0, 2.0, 3.0, 4.0]), Trend::Increasing);
        assert_eq!(Trend::from_series(&[4.0, 3.0, 2.0, 1.0]), Trend::Decreasing);
        assert_eq!(Trend::from_series(&[10.0, 10.5, 10.0, 10.9]), Trend::Stable);
        assert_eq!(Trend::from_series(&[7.0]), Trend::Stable);
        // odd length: the middle point belongs to the second half
        assert_eq!(Trend::from_series(&[10.0, 10.0, 13.0]), Trend::Increasing);
    }

    #[test]
    fn summary_picks_largest_series() {
        let mut forecasts = IndexMap::new();
        forecasts.insert("Cholera".to_owned(), series("Cholera", &[10.0, 20.0], 0.6));
        forecasts.insert("Dengue".to_owned(), series("Dengue", &[40.0, 50.5], 0.8));
        let summary = ForecastSummary::from_forecasts(&forecasts);
        assert_eq!(summary.total_predicted_cases, 120);
        assert_eq!(summary.highest_risk_disease.as_deref(), Some("Dengue"));
        assert!((summary.average_confidence - 0.7).abs() < 1e-12);
        assert_eq!(summary.risk_assessment, RiskLevel::High);
    }

    #[test]
    fn overall_risk_thresholds() {
        assert_eq!(overall_risk(101.0, 2), RiskLevel::High);
        assert_eq!(overall_risk(100.0, 2), RiskLevel::Medium);
        assert_eq!(overall_risk(84.0, 4), RiskLevel::Medium);
        assert_eq!(overall_risk(80.0, 4), RiskLevel::Low);
        assert_eq!(overall_risk(0.0, 0), RiskLevel::Low);
    }

    #[test]
    fn horizon_dates_stop_at_the_calendar_edge() {
        let start = NaiveDate::from_ymd_opt(2024, 2, 27).unwrap();
        let dates = horizon_dates(start, 4);
        assert_eq!(dates.len(), 4);
        assert_eq!(dates[2], NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert!(horizon_dates(start, 0).is_empty());

        let near_end = NaiveDate::MAX.pred_opt().unwrap();
        assert_eq!(horizon_dates(near_end, 10), vec![near_end, NaiveDate::MAX]);
    }
}
