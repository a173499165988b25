//! Service facade over data preparation and both engines, standing where the
//! serving layer's startup and refresh hooks call in.

use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use rand::{rngs::SmallRng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    config::PredictionConfig,
    data::{synthetic::SAMPLE_DISTRICTS, DataPreparation, DatasetSummary},
    error::TrainingError,
    forecast::{Forecast, ForecastEngine, ForecastInfo},
    risk::{ClassifierInfo, Prediction, PredictionRequest, RiskClassifier},
    telemetry::{self, PredictionTelemetry},
};

/// Result of one training stage during a refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome {
    /// New state installed.
    Trained,
    /// Not enough data; the previous state was kept.
    Skipped {
        /// Why training did not run to completion.
        reason: String,
    },
    /// Computational failure; the previous state was kept.
    Failed {
        /// Underlying error.
        reason: String,
    },
}

impl StageOutcome {
    fn from_result<T>(result: Result<T, TrainingError>) -> Self {
        match result {
            Ok(_) => Self::Trained,
            Err(err) if err.is_insufficiency() => Self::Skipped {
                reason: err.to_string(),
            },
            Err(err) => Self::Failed {
                reason: err.to_string(),
            },
        }
    }

    /// True for computational failures.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Outcome of a load + train cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshReport {
    /// Summary of the dataset both engines were trained on.
    pub dataset: DatasetSummary,
    /// Whether the synthetic generator supplied the data.
    pub synthetic: bool,
    /// Rows dropped for missing district or disease.
    pub dropped_rows: usize,
    /// Tables that could not be read.
    pub unreadable_tables: usize,
    /// Classifier stage.
    pub classifier: StageOutcome,
    /// Forecast stage.
    pub forecast: StageOutcome,
}

/// Combined model description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Classifier state.
    pub classifier: ClassifierInfo,
    /// Forecast registry state.
    pub forecast: ForecastInfo,
    /// Dataset used by the last refresh.
    pub dataset: Option<DatasetSummary>,
}

/// Liveness view for health endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// `healthy` when both engines are trained, `degraded` otherwise.
    pub status: String,
    /// Classifier state.
    pub classifier_trained: bool,
    /// Forecast state.
    pub forecast_trained: bool,
    /// Check time.
    pub checked_at: DateTime<Utc>,
}

/// Owns configuration, telemetry, the data pipeline and both engines.
#[derive(Debug)]
pub struct PredictionService {
    config: PredictionConfig,
    telemetry: Option<PredictionTelemetry>,
    preparation: DataPreparation,
    classifier: RiskClassifier,
    forecaster: ForecastEngine,
    summary: RwLock<Option<DatasetSummary>>,
}

impl PredictionService {
    /// Builds an untrained service. Logs go to the configured file, or
    /// stderr when none is set.
    pub fn new(config: PredictionConfig) -> Result<Self> {
        config.validate()?;
        let builder = PredictionTelemetry::builder("prediction").min_level(config.logging.level);
        let builder = match &config.logging.path {
            Some(path) => builder.log_path(path),
            None => builder.stderr(true),
        };
        Ok(Self::with_telemetry(config, Some(builder.build()?)))
    }

    /// Builds an untrained service around an explicit telemetry handle.
    #[must_use]
    pub fn with_telemetry(config: PredictionConfig, telemetry: Option<PredictionTelemetry>) -> Self {
        let (classifier_rng, forecast_rng) = match config.rng_seed {
            Some(seed) => (
                SmallRng::seed_from_u64(seed),
                SmallRng::seed_from_u64(seed.wrapping_add(1)),
            ),
            None => (SmallRng::from_entropy(), SmallRng::from_entropy()),
        };
        let preparation =
            DataPreparation::from_settings(&config.data).with_telemetry(telemetry.clone());
        let classifier = RiskClassifier::new(config.classifier.clone(), classifier_rng)
            .with_telemetry(telemetry.clone());
        let forecaster = ForecastEngine::new(config.forecast.clone(), forecast_rng)
            .with_telemetry(telemetry.clone());
        Self {
            config,
            telemetry,
            preparation,
            classifier,
            forecaster,
            summary: RwLock::new(None),
        }
    }

    /// Replaces the data pipeline, e.g. with in-memory sources.
    #[must_use]
    pub fn with_preparation(mut self, preparation: DataPreparation) -> Self {
        self.preparation = preparation.with_telemetry(self.telemetry.clone());
        self
    }

    /// Startup load and train. A computational training failure aborts
    /// initialization; insufficient data only leaves an engine untrained.
    pub fn bootstrap(&self) -> Result<RefreshReport> {
        self.bootstrap_at(Utc::now().date_naive())
    }

    /// [`Self::bootstrap`] with the synthetic fallback anchored at `anchor`.
    pub fn bootstrap_at(&self, anchor: NaiveDate) -> Result<RefreshReport> {
        let report = self.refresh_at(anchor);
        if report.classifier.is_failure() || report.forecast.is_failure() {
            telemetry::log(
                self.telemetry.as_ref(),
                LogLevel::Error,
                "service.bootstrap_failed",
                json!({ "classifier": report.classifier, "forecast": report.forecast }),
            );
            bail!(
                "initial training failed (classifier: {:?}, forecast: {:?})",
                report.classifier,
                report.forecast
            );
        }
        Ok(report)
    }

    /// Reloads every source and retrains both engines. Failures never
    /// replace a previously trained state.
    pub fn refresh(&self) -> RefreshReport {
        self.refresh_at(Utc::now().date_naive())
    }

    /// [`Self::refresh`] with the synthetic fallback anchored at `anchor`.
    pub fn refresh_at(&self, anchor: NaiveDate) -> RefreshReport {
        let prepared = self.preparation.prepare_at(anchor);
        let classifier = StageOutcome::from_result(self.classifier.train(&prepared.dataset));
        let forecast = StageOutcome::from_result(self.forecaster.train(&prepared.dataset));
        let dataset = prepared.dataset.summary();
        *self.summary.write() = Some(dataset.clone());
        let report = RefreshReport {
            dataset,
            synthetic: prepared.synthetic,
            dropped_rows: prepared.dropped_rows,
            unreadable_tables: prepared.failures.len(),
            classifier,
            forecast,
        };
        telemetry::log(
            self.telemetry.as_ref(),
            LogLevel::Info,
            "service.refreshed",
            json!({
                "records": report.dataset.total_records,
                "classifier": report.classifier,
                "forecast": report.forecast,
            }),
        );
        report
    }

    /// Risk predictions for one request.
    pub fn predict(&self, request: &PredictionRequest) -> Vec<Prediction> {
        self.classifier.predict(request)
    }

    /// Risk predictions for several districts; the sample districts when
    /// none are given.
    pub fn predict_all(&self, districts: &[String], timeframe_days: u32) -> Vec<Prediction> {
        if districts.is_empty() {
            let defaults: Vec<String> = SAMPLE_DISTRICTS.iter().map(|d| (*d).to_owned()).collect();
            self.classifier.predict_all(&defaults, timeframe_days)
        } else {
            self.classifier.predict_all(districts, timeframe_days)
        }
    }

    /// Case forecast for a district starting today.
    pub fn forecast(&self, district: &str, days: u32) -> Forecast {
        self.forecaster.forecast(district, days)
    }

    /// Case forecast starting at `start`.
    pub fn forecast_from(&self, district: &str, days: u32, start: NaiveDate) -> Forecast {
        self.forecaster.forecast_from(district, days, start)
    }

    /// Classifier state.
    #[must_use]
    pub fn is_classifier_trained(&self) -> bool {
        self.classifier.is_trained()
    }

    /// Forecast registry state.
    #[must_use]
    pub fn is_forecast_trained(&self) -> bool {
        self.forecaster.is_trained()
    }

    /// Combined model description.
    #[must_use]
    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            classifier: self.classifier.info(),
            forecast: self.forecaster.info(),
            dataset: self.dataset_summary(),
        }
    }

    /// Liveness view.
    #[must_use]
    pub fn health(&self) -> HealthStatus {
        let classifier_trained = self.is_classifier_trained();
        let forecast_trained = self.is_forecast_trained();
        HealthStatus {
            status: if classifier_trained && forecast_trained {
                "healthy".into()
            } else {
                "degraded".into()
            },
            classifier_trained,
            forecast_trained,
            checked_at: Utc::now(),
        }
    }

    /// Summary of the dataset from the last refresh.
    #[must_use]
    pub fn dataset_summary(&self) -> Option<DatasetSummary> {
        self.summary.read().clone()
    }

    /// Loads and cleans the configured sources without training.
    #[must_use]
    pub fn prepared_dataset(&self) -> crate::data::PreparedData {
        self.preparation.prepare()
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &PredictionConfig {
        &self.config
    }

    /// Telemetry handle, when attached.
    #[must_use]
    pub const fn telemetry(&self) -> Option<&PredictionTelemetry> {
        self.telemetry.as_ref()
    }
}
