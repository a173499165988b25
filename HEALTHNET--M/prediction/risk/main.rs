//! Risk classification: a bagging forest and a boosting model trained on the
//! same standardized features, blended with equal weight.

/// Factor, recommendation and trend rules.
pub mod advisor;
/// Softmax gradient boosting.
pub mod boosting;
/// Model trait and probability blending.
pub mod ensemble;
/// Feature vector construction and target buckets.
pub mod features;
/// Bagged decision trees.
pub mod forest;
/// Fallback prediction generator.
pub mod mock;
/// Feature standardization.
pub mod scaler;
/// Stratified train/test split.
pub mod split;
/// CART trees.
pub mod tree;
/// Public prediction types.
pub mod types;

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use indexmap::{IndexMap, IndexSet};
use ndarray::{Array2, Axis};
use parking_lot::{Mutex, RwLock};
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;
use uuid::Uuid;

pub use ensemble::{Blend, Ensemble, RiskModel};
pub use features::TargetKind;
pub use types::{
    EnvironmentalSnapshot, HistoricalTrend, PopulationSnapshot, Prediction, PredictionRequest,
    PredictionSource, RiskLevel, MODEL_VERSION,
};

use crate::{
    config::ClassifierSettings,
    data::{cleaner::title_case, CanonicalDataset, HealthRecord, NumericField},
    error::{InferenceError, TrainingError},
    telemetry::{self, PredictionTelemetry},
};
use boosting::{BoostingParams, GradientBoosting};
use features::{
    bucket_cases, bucket_score, environmental_score, feature_vector, project, FEATURES,
};
use forest::{ForestParams, RandomForest};
use scaler::StandardScaler;
use split::{accuracy, stratified_split};

/// Everything one successful training produced. Replaced wholesale.
struct ClassifierBundle {
    id: Uuid,
    trained_at: DateTime<Utc>,
    columns: Vec<usize>,
    scaler: StandardScaler,
    ensemble: Ensemble,
    target: TargetKind,
    districts: IndexSet<String>,
    diseases: IndexSet<String>,
    recent: IndexMap<String, Vec<HealthRecord>>,
    training_rows: usize,
    test_rows: usize,
    accuracy: IndexMap<String, f64>,
}

/// Snapshot of the classifier state for model-info endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierInfo {
    /// Whether a bundle is installed.
    pub trained: bool,
    /// Installed bundle.
    pub bundle_id: Option<Uuid>,
    /// When the bundle was trained.
    pub trained_at: Option<DateTime<Utc>>,
    /// Ensemble members.
    pub models: Vec<String>,
    /// Columns the scaler was fitted on.
    pub feature_columns: Vec<String>,
    /// Label source.
    pub target: Option<TargetKind>,
    /// Rows in the training split.
    pub training_rows: usize,
    /// Rows in the held-out split.
    pub test_rows: usize,
    /// Held-out accuracy per member; empty when nothing was held out.
    pub accuracy: IndexMap<String, f64>,
    /// Districts seen in training.
    pub districts: usize,
    /// Diseases seen in training.
    pub diseases: usize,
}

impl ClassifierInfo {
    fn untrained() -> Self {
        Self {
            trained: false,
            bundle_id: None,
            trained_at: None,
            models: Vec::new(),
            feature_columns: FEATURES.iter().map(|f| f.column().to_owned()).collect(),
            target: None,
            training_rows: 0,
            test_rows: 0,
            accuracy: IndexMap::new(),
            districts: 0,
            diseases: 0,
        }
    }

    fn from_bundle(bundle: &ClassifierBundle) -> Self {
        Self {
            trained: true,
            bundle_id: Some(bundle.id),
            trained_at: Some(bundle.trained_at),
            models: bundle.ensemble.names().into_iter().map(str::to_owned).collect(),
            feature_columns: bundle
                .columns
                .iter()
                .map(|&idx| FEATURES[idx].column().to_owned())
                .collect(),
            target: Some(bundle.target),
            training_rows: bundle.training_rows,
            test_rows: bundle.test_rows,
            accuracy: bundle.accuracy.clone(),
            districts: bundle.districts.len(),
            diseases: bundle.diseases.len(),
        }
    }
}

/// Two-state risk classifier. Training builds a complete bundle off to the
/// side and installs it only on success; readers clone the `Arc` and never
/// observe a partial state.
pub struct RiskClassifier {
    settings: ClassifierSettings,
    state: RwLock<Option<Arc<ClassifierBundle>>>,
    rng: Mutex<SmallRng>,
    telemetry: Option<PredictionTelemetry>,
}

impl std::fmt::Debug for RiskClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskClassifier")
            .field("trained", &self.is_trained())
            .finish_non_exhaustive()
    }
}

impl RiskClassifier {
    /// Creates an untrained classifier. `rng` drives the fallback generator
    /// and the synthetic mobility index.
    #[must_use]
    pub fn new(settings: ClassifierSettings, rng: SmallRng) -> Self {
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

    /// Whether a bundle is installed.
    #[must_use]
    pub fn is_trained(&self) -> bool {
        self.state.read().is_some()
    }

    /// Current model description.
    #[must_use]
    pub fn info(&self) -> ClassifierInfo {
        self.bundle()
            .map_or_else(ClassifierInfo::untrained, |bundle| ClassifierInfo::from_bundle(&bundle))
    }

    fn bundle(&self) -> Option<Arc<ClassifierBundle>> {
        self.state.read().clone()
    }

    /// Trains both members and swaps the new bundle in. On error the
    /// previous state, trained or not, is left untouched.
    pub fn train(&self, dataset: &CanonicalDataset) -> Result<ClassifierInfo, TrainingError> {
        telemetry::log(
            self.telemetry.as_ref(),
            LogLevel::Info,
            "classifier.training_start",
            json!({ "records": dataset.len() }),
        );
        match self.build_bundle(dataset) {
            Ok(bundle) => {
                let info = ClassifierInfo::from_bundle(&bundle);
                *self.state.write() = Some(Arc::new(bundle));
                telemetry::log(
                    self.telemetry.as_ref(),
                    LogLevel::Info,
                    "classifier.training_complete",
                    json!({ "training_rows": info.training_rows, "accuracy": info.accuracy }),
                );
                telemetry::event(
                    self.telemetry.as_ref(),
                    "healthnet.classifier.trained",
                    json!({
                        "bundle_id": info.bundle_id,
                        "training_rows": info.training_rows,
                        "test_rows": info.test_rows,
                        "accuracy": info.accuracy,
                    }),
                );
                Ok(info)
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
                    "classifier.training_skipped",
                    json!({ "reason": err.to_string(), "kept_previous": self.is_trained() }),
                );
                telemetry::event(
                    self.telemetry.as_ref(),
                    "healthnet.classifier.training_skipped",
                    json!({ "reason": err.to_string(), "insufficiency": err.is_insufficiency() }),
                );
                Err(err)
            }
        }
    }

    fn build_bundle(&self, dataset: &CanonicalDataset) -> Result<ClassifierBundle, TrainingError> {
        let columns: Vec<usize> = FEATURES
            .iter()
            .enumerate()
            .filter(|(_, field)| dataset.has_column(**field))
            .map(|(idx, _)| idx)
            .collect();
        if columns.is_empty() {
            return Err(TrainingError::InsufficientColumns(
                "district, disease and at least one feature column are required".into(),
            ));
        }
        let target = if dataset.has_column(NumericField::Cases) {
            TargetKind::Cases
        } else {
            TargetKind::EnvironmentalScore
        };

        let mut values = Vec::with_capacity(dataset.len() * columns.len());
        let mut labels = Vec::with_capacity(dataset.len());
        for record in dataset.records() {
            let complete = columns
                .iter()
                .all(|&idx| record.value(FEATURES[idx]).is_some_and(f64::is_finite));
            if !complete {
                continue;
            }
            let full = feature_vector(record);
            let label = match target {
                TargetKind::Cases => match record.cases.filter(|c| c.is_finite()) {
                    Some(cases) => bucket_cases(cases),
                    None => continue,
                },
                TargetKind::EnvironmentalScore => bucket_score(environmental_score(&full)),
            };
            values.extend(project(&full, &columns));
            labels.push(label.index());
        }
        let required = self.settings.min_rows.max(1);
        if labels.len() < required {
            return Err(TrainingError::InsufficientRows {
                found: labels.len(),
                required,
            });
        }

        let x = Array2::from_shape_vec((labels.len(), columns.len()), values)
            .map_err(|err| TrainingError::Numerical(err.to_string()))?;
        let split = stratified_split(&labels, self.settings.test_ratio, self.settings.seed);
        let x_train = x.select(Axis(0), &split.train);
        let y_train: Vec<usize> = split.train.iter().map(|&i| labels[i]).collect();
        let scaler = StandardScaler::fit(x_train.view());
        let train_scaled = scaler.transform(x_train.view());
        if !train_scaled.iter().all(|v| v.is_finite()) {
            return Err(TrainingError::Numerical("non-finite scaled features".into()));
        }

        let forest = RandomForest::fit(
            train_scaled.view(),
            &y_train,
            ForestParams {
                trees: self.settings.forest_trees,
                max_depth: self.settings.forest_max_depth,
                seed: self.settings.seed,
            },
        );
        let boosting = GradientBoosting::fit(
            train_scaled.view(),
            &y_train,
            BoostingParams {
                rounds: self.settings.boosting_rounds,
                learning_rate: self.settings.boosting_learning_rate,
                max_depth: self.settings.boosting_max_depth,
                seed: self.settings.seed,
            },
        );
        let ensemble = Ensemble::new(Box::new(forest), Box::new(boosting));
        let probe = train_scaled.row(0).to_vec();
        ensemble
            .blend(&probe)
            .map_err(|err| TrainingError::Numerical(err.to_string()))?;

        let mut scores = IndexMap::new();
        if !split.test.is_empty() {
            let test_scaled = scaler.transform(x.select(Axis(0), &split.test).view());
            let truth: Vec<RiskLevel> =
                split.test.iter().map(|&i| RiskLevel::from_index(labels[i])).collect();
            for member in ensemble.members() {
                let predicted: Vec<RiskLevel> = test_scaled
                    .outer_iter()
                    .map(|row| member.predict(&row.to_vec()))
                    .collect();
                if let Some(score) = accuracy(&predicted, &truth) {
                    scores.insert(member.name().to_owned(), score);
                }
            }
        }

        Ok(ClassifierBundle {
            id: Uuid::new_v4(),
            trained_at: Utc::now(),
            columns,
            scaler,
            ensemble,
            target,
            districts: dataset.districts(),
            diseases: dataset.diseases(),
            recent: recent_index(dataset, self.settings.recent_window_days),
            training_rows: split.train.len(),
            test_rows: split.test.len(),
            accuracy: scores,
        })
    }

    /// Predicts for one request, dated today.
    pub fn predict(&self, request: &PredictionRequest) -> Vec<Prediction> {
        self.predict_on(request, Utc::now().date_naive())
    }

    /// Predicts for one request. Falls back to synthetic predictions when
    /// untrained, when the district has no recent records, or when inference
    /// fails; never returns a partial result.
    pub fn predict_on(&self, request: &PredictionRequest, today: NaiveDate) -> Vec<Prediction> {
        let district = title_case(&request.district);
        let disease = request.disease.as_deref().map(title_case);
        let outcome = match self.bundle() {
            Some(bundle) => self.infer(&bundle, request, &district, disease.as_deref(), today),
            None => Err(InferenceError::Untrained),
        };
        match outcome {
            Ok(predictions) => predictions,
            Err(err) => {
                telemetry::log(
                    self.telemetry.as_ref(),
                    LogLevel::Warn,
                    "prediction.fallback",
                    json!({ "district": district, "reason": err.to_string() }),
                );
                telemetry::event(
                    self.telemetry.as_ref(),
                    "healthnet.prediction.fallback",
                    json!({ "district": district, "disease": disease, "reason": err.to_string() }),
                );
                let requested: Vec<String> = disease.into_iter().collect();
                mock::mock_predictions(request, &district, &requested, &mut self.rng.lock(), today)
            }
        }
    }

    /// Predictions for several districts over `timeframe_days`.
    pub fn predict_all(&self, districts: &[String], timeframe_days: u32) -> Vec<Prediction> {
        districts
            .iter()
            .flat_map(|district| {
                self.predict(&PredictionRequest::new(district.clone()).timeframe_days(timeframe_days))
            })
            .collect()
    }

    fn infer(
        &self,
        bundle: &ClassifierBundle,
        request: &PredictionRequest,
        district: &str,
        disease: Option<&str>,
        today: NaiveDate,
    ) -> Result<Vec<Prediction>, InferenceError> {
        let records = bundle
            .recent
            .get(district)
            .filter(|records| !records.is_empty())
            .ok_or_else(|| InferenceError::NoRecentRecords(district.to_owned()))?;
        let diseases: Vec<String> = match disease {
            Some(disease) => vec![disease.to_owned()],
            None => records
                .iter()
                .map(|r| r.disease.clone())
                .collect::<IndexSet<_>>()
                .into_iter()
                .collect(),
        };

        let created_at = Utc::now();
        let stamp = created_at.format("%Y%m%d%H%M%S");
        let mut rng = self.rng.lock();
        let mut predictions = Vec::with_capacity(diseases.len());
        for disease in diseases {
            let matching: Vec<&HealthRecord> =
                records.iter().filter(|r| r.disease == disease).collect();
            let Some(latest) = matching
                .iter()
                .enumerate()
                .max_by_key(|(idx, record)| (record.date, *idx))
                .map(|(_, record)| *record)
            else {
                continue;
            };
            let full = feature_vector(latest);
            let scaled = bundle.scaler.transform_row(&project(&full, &bundle.columns));
            let blend = bundle.ensemble.blend(&scaled)?;
            let [temperature, humidity, rainfall, water_quality, density, vaccination_rate] = full;
            let population = PopulationSnapshot {
                density,
                vaccination_rate,
                mobility: mock::mobility(&mut rng),
            };
            predictions.push(Prediction {
                id: format!("pred-{stamp}-{}", predictions.len()),
                district: district.to_owned(),
                disease: disease.clone(),
                risk_level: blend.level,
                probability: blend.probability.clamp(0.0, 1.0),
                confidence: blend.confidence.clamp(0.0, 1.0),
                timeframe_days: request.timeframe_days,
                factors: advisor::factors(&full),
                environmental: request.include_environmental.then_some(EnvironmentalSnapshot {
                    temperature,
                    humidity,
                    rainfall,
                    water_quality,
                }),
                population: request.include_population.then_some(population),
                historical_trend: advisor::historical_trend(matching.iter().copied(), today),
                recommendations: advisor::recommendations(&disease, blend.level),
                source: PredictionSource::Model,
                model_version: MODEL_VERSION.to_owned(),
                created_at,
            });
        }
        if predictions.is_empty() {
            let label = disease.map_or_else(|| district.to_owned(), |d| format!("{district}/{d}"));
            return Err(InferenceError::NoRecentRecords(label));
        }
        Ok(predictions)
    }
}

/// Records within `window_days` of the newest dated record, grouped by
/// district. Undated records always count as recent.
fn recent_index(dataset: &CanonicalDataset, window_days: i64) -> IndexMap<String, Vec<HealthRecord>> {
    let cutoff = dataset
        .latest_date()
        .map(|latest| latest - Duration::days(window_days));
    let mut index: IndexMap<String, Vec<HealthRecord>> = IndexMap::new();
    for record in dataset.records() {
        let recent = match (cutoff, record.date) {
            (Some(cutoff), Some(date)) => date >= cutoff,
            _ => true,
        };
        if recent {
            index
                .entry(record.district.clone())
                .or_default()
                .push(record.clone());
        }
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{HealthRecord, NumericField};
    use rand::SeedableRng;

    fn settings() -> ClassifierSettings {
        ClassifierSettings {
            forest_trees: 10,
            boosting_rounds: 10,
            ..ClassifierSettings::default()
        }
    }

    fn classifier() -> RiskClassifier {
        RiskClassifier::new(settings(), SmallRng::seed_from_u64(5))
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()
    }

    fn dataset(rows: usize) -> CanonicalDataset {
        let districts = ["Imphal East", "Bishnupur"];
        let diseases = ["Cholera", "Dengue", "Malaria"];
        (0..rows)
            .map(|i| {
                let cases = (i * 7 % 40) as f64;
                let date = today() - Duration::days((i % 90) as i64);
                HealthRecord::new(districts[i % 2], diseases[i % 3], "fixture.csv")
                    .with(NumericField::Cases, cases)
                    .with(NumericField::Temperature, 20.0 + cases * 0.3)
                    .with(NumericField::Humidity, 50.0 + cases)
                    .with(NumericField::Rainfall, 10.0 * cases)
                    .with(NumericField::WaterQuality, 9.0 - cases * 0.15)
                    .with(NumericField::PopulationDensity, 120.0)
                    .with(NumericField::VaccinationRate, 0.6)
                    .on(date)
            })
            .collect()
    }

    #[test]
    fn too_few_rows_leaves_classifier_untrained() {
        let clf = classifier();
        let err = clf.train(&dataset(9)).unwrap_err();
        assert_eq!(err, TrainingError::InsufficientRows { found: 9, required: 10 });
        assert!(!clf.is_trained());
        let preds = clf.predict_on(&PredictionRequest::new("Imphal East"), today());
        assert_eq!(preds.len(), 4);
        assert!(preds.iter().all(|p| p.source == PredictionSource::Fallback));
    }

    #[test]
    fn trained_predictions_are_well_formed() {
        let clf = classifier();
        let info = clf.train(&dataset(120)).unwrap();
        assert!(info.trained);
        assert_eq!(info.models, vec!["random_forest", "gradient_boosting"]);
        assert_eq!(info.target, Some(TargetKind::Cases));
        assert_eq!(info.training_rows + info.test_rows, 120);

        let preds = clf.predict_on(&PredictionRequest::new(" imphal east "), today());
        assert_eq!(preds.len(), 3);
        for pred in &preds {
            assert_eq!(pred.source, PredictionSource::Model);
            assert_eq!(pred.district, "Imphal East");
            assert!((0.0..=1.0).contains(&pred.probability));
            assert_eq!(pred.probability, pred.confidence);
            assert!(pred.factors.len() <= 5);
            assert!(pred.recommendations.len() <= 4);
            assert!(pred.historical_trend.cases.len() <= 6);
        }
    }

    #[test]
    fn unknown_district_falls_back() {
        let clf = classifier();
        clf.train(&dataset(60)).unwrap();
        let request = PredictionRequest::new("Ukhrul").disease("dengue");
        let preds = clf.predict_on(&request, today());
        assert_eq!(preds.len(), 1);
        assert_eq!(preds[0].disease, "Dengue");
        assert_eq!(preds[0].source, PredictionSource::Fallback);
    }

    #[test]
    fn failed_retrain_keeps_previous_bundle() {
        let clf = classifier();
        let first = clf.train(&dataset(60)).unwrap();
        assert!(clf.train(&dataset(3)).is_err());
        assert!(clf.is_trained());
        assert_eq!(clf.info().bundle_id, first.bundle_id);
    }

    #[test]
    fn environmental_score_target_without_cases() {
        let records: CanonicalDataset = dataset(40)
            .records()
            .iter()
            .map(|r| {
                let mut r = r.clone();
                r.cases = None;
                r
            })
            .collect();
        let clf = classifier();
        let info = clf.train(&records).unwrap();
        assert_eq!(info.target, Some(TargetKind::EnvironmentalScore));
        let preds = clf.predict_on(&PredictionRequest::new("Bishnupur").disease("Malaria"), today());
        assert_eq!(preds.len(), 1);
        assert_eq!(preds[0].source, PredictionSource::Model);
        assert_eq!(preds[0].historical_trend.cases, vec![5.0, 8.0, 12.0, 15.0, 18.0, 20.0]);
    }

    #[test]
    fn recent_window_is_anchored_at_newest_record() {
        let newest = today();
        let data: CanonicalDataset = vec![
            HealthRecord::new("A", "Cholera", "t").on(newest),
            HealthRecord::new("A", "Dengue", "t").on(newest - Duration::days(400)),
            HealthRecord::new("B", "Dengue", "t"),
        ]
        .into_iter()
        .collect();
        let index = recent_index(&data, 180);
        assert_eq!(index["A"].len(), 1);
        assert_eq!(index["B"].len(), 1);
    }

    #[test]
    fn missing_feature_columns_abort_training() {
        let data: CanonicalDataset = (0..20)
            .map(|_| HealthRecord::new("A", "Cholera", "t").with(NumericField::Cases, 3.0))
            .collect();
        let clf = classifier();
        assert!(matches!(clf.train(&data), Err(TrainingError::InsufficientColumns(_))));
    }

    #[test]
    fn concurrent_predictions_see_whole_bundles_during_retraining() {
        let clf = classifier();
        let first = clf.train(&dataset(60)).unwrap();
        let installed = Mutex::new(vec![first.bundle_id]);
        let observed = Mutex::new(Vec::new());
        std::thread::scope(|scope| {
            scope.spawn(|| {
                for rows in [90, 4, 120, 0, 75] {
                    if let Ok(info) = clf.train(&dataset(rows)) {
                        installed.lock().push(info.bundle_id);
                    }
                }
            });
            for _ in 0..3 {
                scope.spawn(|| {
                    for _ in 0..15 {
                        let preds = clf.predict_on(&PredictionRequest::new("Bishnupur"), today());
                        assert_eq!(preds.len(), 3);
                        for pred in &preds {
                            assert_eq!(pred.source, PredictionSource::Model);
                            assert!((0.0..=1.0).contains(&pred.probability));
                            assert_eq!(pred.probability, pred.confidence);
                            assert!(pred.environmental.is_some() && pred.population.is_some());
                        }
                        let info = clf.info();
                        assert!(info.trained);
                        observed.lock().push(info.bundle_id);
                    }
                });
            }
        });
        let installed = installed.into_inner();
        assert_eq!(installed.len(), 4);
        assert!(observed.into_inner().iter().all(|id| installed.contains(id)));
        assert_eq!(clf.info().bundle_id, *installed.last().unwrap());
    }
}
