use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use shared_logging::LogLevel;

/// Top-level configuration for the prediction core.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Data source settings.
    pub data: DataSettings,
    /// Risk classifier hyper-parameters.
    pub classifier: ClassifierSettings,
    /// Forecast engine settings.
    pub forecast: ForecastSettings,
    /// Logging sink settings.
    pub logging: LoggingSettings,
    /// Seed for the fallback generators; entropy when absent.
    pub rng_seed: Option<u64>,
}

impl PredictionConfig {
    /// Loads configuration from a TOML file. Relative paths resolve against
    /// the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading prediction config {}", path.display()))?;
        let mut config = Self::from_toml_str(&raw)
            .with_context(|| format!("parsing {}", path.display()))?;
        let base = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        if config.data.source_dir.is_relative() {
            config.data.source_dir = base.join(&config.data.source_dir);
        }
        if let Some(log_path) = config.logging.path.as_mut() {
            if log_path.is_relative() {
                *log_path = base.join(&*log_path);
            }
        }
        Ok(config)
    }

    /// Parses and validates configuration text without touching the filesystem.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks ranges that would otherwise surface as training failures.
    pub fn validate(&self) -> Result<()> {
        let classifier = &self.classifier;
        if !(classifier.test_ratio > 0.0 && classifier.test_ratio < 1.0) {
            bail!("classifier.test_ratio must lie in (0, 1)");
        }
        if classifier.min_rows == 0 {
            bail!("classifier.min_rows must be positive");
        }
        if classifier.forest_trees == 0 || classifier.boosting_rounds == 0 {
            bail!("ensemble members need at least one tree");
        }
        if classifier.forest_max_depth == 0 || classifier.boosting_max_depth == 0 {
            bail!("tree depth must be positive");
        }
        if !(classifier.boosting_learning_rate > 0.0 && classifier.boosting_learning_rate <= 1.0) {
            bail!("classifier.boosting_learning_rate must lie in (0, 1]");
        }
        if self.forecast.min_monthly_points == 0 {
            bail!("forecast.min_monthly_points must be positive");
        }
        if self.forecast.polynomial_degree == 0 {
            bail!("forecast.polynomial_degree must be positive");
        }
        Ok(())
    }
}

/// Where raw tables come from and how the synthetic fallback is shaped.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    /// Directory holding the CSV exports.
    pub source_dir: PathBuf,
    /// File names read from `source_dir`, in order.
    pub files: Vec<String>,
    /// Rows in the synthetic dataset used when no source yields data.
    pub synthetic_rows: usize,
    /// Seed for the synthetic dataset.
    pub synthetic_seed: u64,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("data"),
            files: default_files(),
            synthetic_rows: 1000,
            synthetic_seed: 42,
        }
    }
}

fn default_files() -> Vec<String> {
    [
        "hyper_realistic_health_data.csv",
        "monsoon_jun-jul2024.csv",
        "postmonsoon_aug-oct2024.csv",
        "pre_monsoon_health_data_1000.csv",
        "winter_health_data_1000.csv",
        "winter_health_data_Nov-Jan.csv",
        "rainfall_health_data_2024-2025.csv",
        "water_quality_report_2024-2025.csv",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Risk classifier hyper-parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    /// Minimum complete rows required to train.
    pub min_rows: usize,
    /// Held-out fraction for the stratified split.
    pub test_ratio: f64,
    /// Seed shared by the split and both ensemble members.
    pub seed: u64,
    /// Trees in the bagging model.
    pub forest_trees: usize,
    /// Maximum depth of each bagged tree.
    pub forest_max_depth: usize,
    /// Boosting rounds.
    pub boosting_rounds: usize,
    /// Shrinkage applied to each boosting round.
    pub boosting_learning_rate: f64,
    /// Maximum depth of each boosting tree.
    pub boosting_max_depth: usize,
    /// Records within this many days of the newest record count as recent.
    pub recent_window_days: i64,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            min_rows: 10,
            test_ratio: 0.2,
            seed: 42,
            forest_trees: 100,
            forest_max_depth: 10,
            boosting_rounds: 100,
            boosting_learning_rate: 0.1,
            boosting_max_depth: 6,
            recent_window_days: 180,
        }
    }
}

/// Forecast engine settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForecastSettings {
    /// Monthly buckets a series needs before a model is fitted.
    pub min_monthly_points: usize,
    /// Degree of the polynomial feature expansion.
    pub polynomial_degree: usize,
    /// First day of the synthetic daily sequence used when records carry no dates.
    pub fallback_epoch: NaiveDate,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            min_monthly_points: 3,
            polynomial_degree: 2,
            fallback_epoch: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
        }
    }
}

/// Logging sink settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// JSON-lines log file; stderr when absent.
    pub path: Option<PathBuf>,
    /// Minimum level written.
    pub level: LogLevel,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            path: None,
            level: LogLevel::Info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_document_uses_defaults() {
        let config = PredictionConfig::from_toml_str("").unwrap();
        assert_eq!(config.classifier.min_rows, 10);
        assert_eq!(config.data.files.len(), 8);
        assert_eq!(config.forecast.min_monthly_points, 3);
        assert_eq!(config.logging.level, LogLevel::Info);
        assert!(config.rng_seed.is_none());
    }

    #[test]
    fn rejects_invalid_ratio() {
        let err = PredictionConfig::from_toml_str("[classifier]\ntest_ratio = 1.5\n").unwrap_err();
        assert!(err.to_string().contains("test_ratio"));
    }

    #[test]
    fn resolves_relative_paths_against_config_dir() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("healthnet.toml");
        fs::write(
            &path,
            "rng_seed = 7\n[data]\nsource_dir = \"csv\"\nfiles = [\"a.csv\"]\n\
             [logging]\npath = \"logs/hn.log\"\nlevel = \"DEBUG\"\n\
             [forecast]\nfallback_epoch = \"2023-06-01\"\n",
        )
        .unwrap();
        let config = PredictionConfig::load(&path).unwrap();
        assert_eq!(config.data.source_dir, dir.path().join("csv"));
        assert_eq!(config.logging.path, Some(dir.path().join("logs/hn.log")));
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.rng_seed, Some(7));
        assert_eq!(
            config.forecast.fallback_epoch,
            NaiveDate::from_ymd_opt(2023, 6, 1).unwrap()
        );
    }
}
