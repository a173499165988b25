use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Version tag stamped on every prediction.
pub const MODEL_VERSION: &str = "v2.1";

/// Ordinal outbreak-likelihood classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    /// Low likelihood.
    Low,
    /// Medium likelihood.
    Medium,
    /// High likelihood.
    High,
}

impl RiskLevel {
    /// Levels in probability-vector order.
    pub const ALL: [Self; 3] = [Self::Low, Self::Medium, Self::High];

    /// Position in a probability vector.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
        }
    }

    /// Inverse of [`RiskLevel::index`]; out-of-range indices saturate to `High`.
    #[must_use]
    pub const fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Low,
            1 => Self::Medium,
            _ => Self::High,
        }
    }

    /// Label used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a result came from the trained models or the fallback generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionSource {
    /// Trained model output.
    Model,
    /// Synthetic fallback output.
    Fallback,
}

/// Environmental readings behind a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentalSnapshot {
    /// Temperature (°C).
    pub temperature: f64,
    /// Relative humidity (%).
    pub humidity: f64,
    /// Rainfall (mm).
    pub rainfall: f64,
    /// Water quality index.
    pub water_quality: f64,
}

/// Population readings behind a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PopulationSnapshot {
    /// Population density.
    pub density: f64,
    /// Vaccination rate.
    pub vaccination_rate: f64,
    /// Synthetic mobility index in `[0.4, 0.8)`.
    pub mobility: f64,
}

/// Up to six recent case counts, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalTrend {
    /// Case counts.
    pub cases: Vec<f64>,
    /// Matching observation dates.
    pub dates: Vec<NaiveDate>,
}

/// Risk assessment for one district/disease pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Request-scoped identifier.
    pub id: String,
    /// District.
    pub district: String,
    /// Disease.
    pub disease: String,
    /// Predicted level.
    pub risk_level: RiskLevel,
    /// Probability of the predicted level.
    pub probability: f64,
    /// Largest class probability.
    pub confidence: f64,
    /// Horizon the prediction refers to.
    pub timeframe_days: u32,
    /// Contributing factors (at most five).
    pub factors: Vec<String>,
    /// Present when requested.
    pub environmental: Option<EnvironmentalSnapshot>,
    /// Present when requested.
    pub population: Option<PopulationSnapshot>,
    /// Recent case history.
    pub historical_trend: HistoricalTrend,
    /// Suggested actions (at most four).
    pub recommendations: Vec<String>,
    /// Model or fallback.
    pub source: PredictionSource,
    /// Model version tag.
    pub model_version: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Parameters of a prediction call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionRequest {
    /// District to assess.
    pub district: String,
    /// Single disease, or every recently observed disease when absent.
    pub disease: Option<String>,
    /// Horizon in days.
    pub timeframe_days: u32,
    /// Attach the environmental snapshot.
    pub include_environmental: bool,
    /// Attach the population snapshot.
    pub include_population: bool,
}

impl PredictionRequest {
    /// Request for every disease over 30 days with both snapshots.
    #[must_use]
    pub fn new(district: impl Into<String>) -> Self {
        Self {
            district: district.into(),
            disease: None,
            timeframe_days: 30,
            include_environmental: true,
            include_population: true,
        }
    }

    /// Restricts the request to one disease.
    #[must_use]
    pub fn disease(mut self, disease: impl Into<String>) -> Self {
        self.disease = Some(disease.into());
        self
    }

    /// Sets the horizon.
    #[must_use]
    pub fn timeframe_days(mut self, days: u32) -> Self {
        self.timeframe_days = days;
        self
    }

    /// Toggles the snapshots.
    #[must_use]
    pub fn snapshots(mut self, environmental: bool, population: bool) -> Self {
        self.include_environmental = environmental;
        self.include_population = population;
        self
    }
}
