#![deny(clippy::all, clippy::pedantic, clippy::nursery, rust_2018_idioms)]
#![warn(missing_docs)]
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]

//! HealthNet prediction core: data preparation, ensemble risk classification,
//! and seasonal case forecasting for administrative districts.

/// Runtime configuration loaded from TOML.
#[path = "../config.rs"]
pub mod config;

/// Error types shared by the pipeline stages.
#[path = "../error.rs"]
pub mod error;

/// Telemetry helpers for logging/event emission.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// Loading, merging and cleaning of tabular health records.
#[path = "../data/main.rs"]
pub mod data;

/// Two-model ensemble classifier for district risk levels.
#[path = "../risk/main.rs"]
pub mod risk;

/// Per-series polynomial regression forecasts.
#[path = "../forecast/main.rs"]
pub mod forecast;

/// Service facade consumed by the serving layer.
#[path = "../main.rs"]
pub mod service;

pub use config::PredictionConfig;
pub use data::{
    CanonicalDataset, CsvDirectorySource, DataPreparation, DataSource, DatasetSummary,
    HealthRecord, InMemorySource, NumericField, PreparedData, RawTable,
};
pub use error::{DataError, InferenceError, TrainingError};
pub use forecast::{
    DiseaseForecast, Forecast, ForecastEngine, ForecastInfo, ForecastSummary, SeriesKey, Trend,
    MAX_HORIZON_DAYS,
};
pub use risk::{
    ClassifierInfo, Prediction, PredictionRequest, PredictionSource, RiskClassifier, RiskLevel,
};
pub use service::{HealthStatus, ModelInfo, PredictionService, RefreshReport, StageOutcome};
pub use telemetry::{PredictionTelemetry, PredictionTelemetryBuilder, TelemetryEvent};
