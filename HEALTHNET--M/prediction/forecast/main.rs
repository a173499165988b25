//! Per-series polynomial regression forecasts with seasonal projection.

/// Fallback forecast generator.
pub mod mock;
/// Per-series fit and daily projection.
pub mod projection;
/// Polynomial features, least squares and fit metrics.
pub mod regression;
/// Monthly resampling.
pub mod series;
/// Public forecast types.
pub mod types;

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;
use uuid::Uuid;

pub use projection::SeriesModel;
pub use series::MonthlyPoint;
pub use types::{
    DiseaseForecast, Forecast, ForecastSummary, ModelPerformance, SeriesKey, Trend,
    MAX_HORIZON_DAYS,
};

use crate::{
    config::ForecastSettings,
    data::{cleaner::title_case, CanonicalDataset},
    error::{InferenceError, TrainingError},
    risk::PredictionSource,
    telemetry::{self, PredictionTelemetry},
};

struct ForecastRegistry {
    id: Uuid,
    trained_at: DateTime<Utc>,
    models: BTreeMap<SeriesKey, SeriesModel>,
    skipped: usize,
}

/// Summary of one registered series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesInfo {
    /// Registry key.
    pub key: SeriesKey,
    /// Monthly points used in the fit.
    pub points: usize,
    /// Fitted trend.
    pub trend: Trend,
    /// In-sample fit.
    pub performance: ModelPerformance,
}

/// Snapshot of the forecast registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastInfo {
    /// Whether a registry is installed.
    pub trained: bool,
    /// Installed registry.
    pub registry_id: Option<Uuid>,
    /// When the registry was built.
    pub trained_at: Option<DateTime<Utc>>,
    /// Model family label.
    pub model_type: String,
    /// Degree of the feature expansion.
    pub polynomial_degree: usize,
    /// Series below the monthly minimum or whose fit failed.
    pub skipped_series: usize,
    /// Registered series in key order.
    pub series: Vec<SeriesInfo>,
}

/// Forecast engine holding one regression per (district, disease).
///
/// Training fits every eligible series into a fresh registry and swaps it in
/// only when at least one series succeeded.
pub struct ForecastEngine {
    settings: ForecastSettings,
    state: RwLock<Option<Arc<ForecastRegistry>>>,
    rng: Mutex<SmallRng>,
    telemetry: Option<PredictionTelemetry>,
}

impl std::fmt::Debug for ForecastEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForecastEngine")
            .field("trained", &self.is_trained())
            .finish_non_exhaustive()
    }
}

impl ForecastEngine {
    /// Creates an untrained engine.
    #[must_use]
    pub fn new(settings: ForecastSettings, rng: SmallRng) -> Self {
        Self {
            settings,
            state: RwLock::new(None),
            rng: Mutex::new(rng),
            telemetry: None,
        }
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Option<PredictionTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Whether a registry is installed.
    #[must_use]
    pub fn is_trained(&self) -> bool {
        self.state.read().is_some()
    }

    fn registry(&self) -> Option<Arc<ForecastRegistry>> {
        self.state.read().clone()
    }

    /// Registry description.
    #[must_use]
    pub fn info(&self) -> ForecastInfo {
        let registry = self.registry();
        ForecastInfo {
            trained: registry.is_some(),
            registry_id: registry.as_ref().map(|r| r.id),
            trained_at: registry.as_ref().map(|r| r.trained_at),
            model_type: "polynomial_regression".into(),
            polynomial_degree: self.settings.polynomial_degree,
            skipped_series: registry.as_ref().map_or(0, |r| r.skipped),
            series: registry
                .iter()
                .flat_map(|r| r.models.values())
                .map(|model| SeriesInfo {
                    key: model.key.clone(),
                    points: model.points,
                    trend: model.trend,
                    performance: model.performance,
                })
                .collect(),
        }
    }

    /// Fits every series with enough monthly history.
    pub fn train(&self, dataset: &CanonicalDataset) -> Result<ForecastInfo, TrainingError> {
        match self.build_registry(dataset) {
            Ok(registry) => {
                let models = registry.models.len();
                let skipped = registry.skipped;
                *self.state.write() = Some(Arc::new(registry));
                telemetry::log(
                    self.telemetry.as_ref(),
                    LogLevel::Info,
                    "forecast.training_complete",
                    json!({ "series": models, "skipped": skipped }),
                );
                telemetry::event(
                    self.telemetry.as_ref(),
                    "healthnet.forecast.trained",
                    json!({ "series": models, "skipped": skipped }),
                );
                Ok(self.info())
            }
            Err(err) => {
                let level = if err.is_insufficiency() {
                    LogLevel::Warn
                } else {
                    LogLevel::Error
                };
                telemetry::log(
                    self.telemetry.as_ref(),
                    level,
                    "forecast.training_skipped",
                    json!({ "reason": err.to_string(), "kept_previous": self.is_trained() }),
                );
                telemetry::event(
                    self.telemetry.as_ref(),
                    "healthnet.forecast.training_skipped",
                    json!({ "reason": err.to_string(), "insufficiency": err.is_insufficiency() }),
                );
                Err(err)
            }
        }
    }

    fn build_registry(&self, dataset: &CanonicalDataset) -> Result<ForecastRegistry, TrainingError> {
        let minimum = self.settings.min_monthly_points.max(1);
        let series = series::monthly_series(dataset, self.settings.fallback_epoch);
        let total = series.len();
        let mut models = BTreeMap::new();
        let mut failures = 0_usize;
        for (key, points) in series {
            if points.len() < minimum {
                continue;
            }
            match SeriesModel::fit(key.clone(), &points, self.settings.polynomial_degree) {
                Ok(model) => {
                    models.insert(key, model);
                }
                Err(err) => {
                    failures += 1;
                    telemetry::log(
                        self.telemetry.as_ref(),
                        LogLevel::Warn,
                        "forecast.series_failed",
                        json!({ "series": key.to_string(), "reason": err.to_string() }),
                    );
                }
            }
        }
        if models.is_empty() {
            return Err(if failures == 0 {
                TrainingError::NoEligibleSeries(minimum)
            } else {
                TrainingError::Numerical(format!("all {failures} eligible series failed to fit"))
            });
        }
        Ok(ForecastRegistry {
            id: Uuid::new_v4(),
            trained_at: Utc::now(),
            skipped: total - models.len(),
            models,
        })
    }

    /// Forecast starting today.
    pub fn forecast(&self, district: &str, days: u32) -> Forecast {
        self.forecast_from(district, days, Utc::now().date_naive())
    }

    /// Forecast for every disease registered under `district`, starting at
    /// `start`. Any failure yields a complete fallback forecast instead.
    /// Horizons beyond [`MAX_HORIZON_DAYS`] are cut to it.
    pub fn forecast_from(&self, district: &str, days: u32, start: NaiveDate) -> Forecast {
        let district = title_case(district);
        if days > MAX_HORIZON_DAYS {
            telemetry::log(
                self.telemetry.as_ref(),
                LogLevel::Warn,
                "forecast.horizon_clamped",
                json!({ "district": district, "requested": days, "served": MAX_HORIZON_DAYS }),
            );
        }
        let days = days.min(MAX_HORIZON_DAYS);
        let outcome = match self.registry() {
            Some(registry) => project_district(&registry, &district, days, start),
            None => Err(InferenceError::Untrained),
        };
        match outcome {
            Ok(forecasts) => Forecast::new(district, days, forecasts, PredictionSource::Model),
            Err(err) => {
                telemetry::log(
                    self.telemetry.as_ref(),
                    LogLevel::Warn,
                    "forecast.fallback",
                    json!({ "district": district, "reason": err.to_string() }),
                );
                telemetry::event(
                    self.telemetry.as_ref(),
                    "healthnet.forecast.fallback",
                    json!({ "district": district, "reason": err.to_string() }),
                );
                mock::mock_forecast(&district, days, start, &mut self.rng.lock())
            }
        }
    }
}

fn project_district(
    registry: &ForecastRegistry,
    district: &str,
    days: u32,
    start: NaiveDate,
) -> Result<IndexMap<String, DiseaseForecast>, InferenceError> {
    let mut forecasts = IndexMap::new();
    for model in registry
        .models
        .values()
        .filter(|model| model.key.district == district)
    {
        forecasts.insert(model.key.disease.clone(), model.project(start, days)?);
    }
    if forecasts.is_empty() {
        return Err(InferenceError::NoRecentRecords(district.to_owned()));
    }
    Ok(forecasts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{HealthRecord, NumericField};
    use chrono::Datelike;
    use rand::SeedableRng;

    fn engine() -> ForecastEngine {
        ForecastEngine::new(ForecastSettings::default(), SmallRng::seed_from_u64(2))
    }

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    }

    fn growing_dataset() -> CanonicalDataset {
        let mut records = Vec::new();
        for district in ["Imphal East", "Imphal West", "Senapati"] {
            for disease in ["Cholera", "Malaria"] {
                for month in 1..=12_u32 {
                    let date = NaiveDate::from_ymd_opt(2024, month, 15).unwrap();
                    records.push(
                        HealthRecord::new(district, disease, "fixture")
                            .with(NumericField::Cases, f64::from(month) * 5.0)
                            .with(NumericField::Temperature, 20.0 + f64::from(month % 6))
                            .with(NumericField::Humidity, 60.0 + f64::from(month % 4))
                            .with(NumericField::Rainfall, 100.0 + 10.0 * f64::from(month % 5))
                            .with(NumericField::WaterQuality, 6.0)
                            .on(date),
                    );
                }
            }
        }
        CanonicalDataset::from_records(records)
    }

    #[test]
    fn monotone_history_trains_increasing_trends() {
        let engine = engine();
        let info = engine.train(&growing_dataset()).unwrap();
        assert!(info.trained);
        assert_eq!(info.series.len(), 6);
        assert!(info.series.iter().all(|s| s.trend == Trend::Increasing));
        assert!(info.series.iter().all(|s| s.points == 12));
    }

    #[test]
    fn trained_district_projects_each_disease() {
        let engine = engine();
        engine.train(&growing_dataset()).unwrap();
        let forecast = engine.forecast_from("senapati", 30, start());
        assert_eq!(forecast.source, PredictionSource::Model);
        assert_eq!(forecast.district, "Senapati");
        assert_eq!(
            forecast.disease_forecasts.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["Cholera", "Malaria"]
        );
        for series in forecast.disease_forecasts.values() {
            assert_eq!(series.dates.len(), 30);
            assert_eq!(series.dates[0].day(), 1);
            assert!(series.predicted_cases.iter().all(|c| *c >= 0.0));
            assert!(series.confidence <= 0.9);
        }
    }

    #[test]
    fn unregistered_district_gets_mock_forecast() {
        let engine = engine();
        engine.train(&growing_dataset()).unwrap();
        let forecast = engine.forecast_from("Tamenglong", 7, start());
        assert_eq!(forecast.source, PredictionSource::Fallback);
        assert_eq!(forecast.disease_forecasts.len(), 4);
        assert!(forecast.disease_forecasts.values().all(|s| s.dates.len() == 7));
    }

    #[test]
    fn short_histories_leave_engine_untrained() {
        let records: CanonicalDataset = (1..=2_u32)
            .map(|m| {
                HealthRecord::new("A", "Dengue", "t")
                    .with(NumericField::Cases, 3.0)
                    .on(NaiveDate::from_ymd_opt(2024, m, 1).unwrap())
            })
            .collect();
        let engine = engine();
        assert_eq!(engine.train(&records).unwrap_err(), TrainingError::NoEligibleSeries(3));
        assert!(!engine.is_trained());
        assert_eq!(engine.forecast_from("A", 5, start()).source, PredictionSource::Fallback);
    }

    #[test]
    fn failed_retrain_keeps_registry() {
        let engine = engine();
        let first = engine.train(&growing_dataset()).unwrap();
        assert!(engine.train(&CanonicalDataset::default()).is_err());
        assert_eq!(engine.info().registry_id, first.registry_id);
    }

    #[test]
    fn oversized_horizons_are_cut_instead_of_overflowing() {
        let untrained = engine();
        let fallback = untrained.forecast_from("A", u32::MAX, start());
        assert_eq!(fallback.source, PredictionSource::Fallback);
        assert_eq!(fallback.horizon_days, MAX_HORIZON_DAYS);
        assert!(fallback
            .disease_forecasts
            .values()
            .all(|s| s.dates.len() == MAX_HORIZON_DAYS as usize));

        let trained = engine();
        trained.train(&growing_dataset()).unwrap();
        let late = NaiveDate::MAX - chrono::Duration::days(5);
        let forecast = trained.forecast_from("Imphal West", 100_000_000, late);
        assert_eq!(forecast.source, PredictionSource::Model);
        assert!(forecast
            .disease_forecasts
            .values()
            .all(|s| s.dates.len() == 6 && s.predicted_cases.len() == 6));
    }

    #[test]
    fn concurrent_forecasts_see_whole_registries_during_retraining() {
        let engine = engine();
        let first = engine.train(&growing_dataset()).unwrap();
        let installed = Mutex::new(vec![first.registry_id]);
        let observed = Mutex::new(Vec::new());
        std::thread::scope(|scope| {
            scope.spawn(|| {
                for round in 0..6 {
                    let data = if round % 2 == 0 {
                        growing_dataset()
                    } else {
                        CanonicalDataset::default()
                    };
                    if let Ok(info) = engine.train(&data) {
                        installed.lock().push(info.registry_id);
                    }
                }
            });
            for _ in 0..3 {
                scope.spawn(|| {
                    for _ in 0..20 {
                        let forecast = engine.forecast_from("Senapati", 14, start());
                        assert_eq!(forecast.source, PredictionSource::Model);
                        assert_eq!(forecast.disease_forecasts.len(), 2);
                        assert!(forecast.disease_forecasts.values().all(|s| {
                            s.dates.len() == 14 && s.predicted_cases.iter().all(|c| *c >= 0.0)
                        }));
                        let info = engine.info();
                        assert_eq!(info.series.len(), 6);
                        observed.lock().push(info.registry_id);
                    }
                });
            }
        });
        let installed = installed.into_inner();
        assert_eq!(installed.len(), 4);
        assert!(observed.into_inner().iter().all(|id| installed.contains(id)));
    }
}
