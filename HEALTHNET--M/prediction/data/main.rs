//! Data preparation: raw tables in, one canonical dataset out.

/// Header mapping, coercion and imputation.
pub mod cleaner;
/// Canonical record types and dataset accessors.
pub mod record;
/// Raw table sources.
pub mod source;
/// Seeded fallback dataset.
pub mod synthetic;

use chrono::{NaiveDate, Utc};
use serde_json::json;
use shared_logging::LogLevel;

pub use record::{
    CanonicalDataset, DateRange, DatasetSummary, EnvironmentalRow, HealthRecord, NumericField,
    PopulationRow,
};
pub use source::{CsvDirectorySource, DataSource, InMemorySource, RawTable, SourceBatch, SourceFailure};
pub use synthetic::SyntheticDataset;

use crate::{
    config::DataSettings,
    telemetry::{self, PredictionTelemetry},
};

/// Output of one preparation run.
#[derive(Debug, Clone)]
pub struct PreparedData {
    /// Cleaned dataset; never empty.
    pub dataset: CanonicalDataset,
    /// True when no source yielded rows and the generator filled in.
    pub synthetic: bool,
    /// Rows dropped for missing keys.
    pub dropped_rows: usize,
    /// Tables that could not be read.
    pub failures: Vec<SourceFailure>,
}

/// Loads, merges and cleans every configured source.
pub struct DataPreparation {
    sources: Vec<Box<dyn DataSource>>,
    synthetic_rows: usize,
    synthetic_seed: u64,
    telemetry: Option<PredictionTelemetry>,
}

impl std::fmt::Debug for DataPreparation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sources: Vec<String> = self.sources.iter().map(|s| s.describe()).collect();
        f.debug_struct("DataPreparation")
            .field("sources", &sources)
            .field("synthetic_rows", &self.synthetic_rows)
            .finish_non_exhaustive()
    }
}

impl DataPreparation {
    /// Reads the configured CSV directory.
    #[must_use]
    pub fn from_settings(settings: &DataSettings) -> Self {
        let source = CsvDirectorySource::new(&settings.source_dir, settings.files.clone());
        Self::with_sources(vec![Box::new(source)], settings)
    }

    /// Uses explicit sources with the configured synthetic fallback.
    #[must_use]
    pub fn with_sources(sources: Vec<Box<dyn DataSource>>, settings: &DataSettings) -> Self {
        Self {
            sources,
            synthetic_rows: settings.synthetic_rows,
            synthetic_seed: settings.synthetic_seed,
            telemetry: None,
        }
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Option<PredictionTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Fetches every source and concatenates the tables in source order.
    #[must_use]
    pub fn load(&self) -> SourceBatch {
        let mut batch = SourceBatch::default();
        for source in &self.sources {
            let fetched = source.fetch();
            for failure in &fetched.failures {
                telemetry::log(
                    self.telemetry.as_ref(),
                    LogLevel::Warn,
                    "data.table_unreadable",
                    json!({ "source": source.describe(), "table": failure.table, "reason": failure.reason }),
                );
            }
            batch.tables.extend(fetched.tables);
            batch.failures.extend(fetched.failures);
        }
        batch
    }

    /// Cleans raw tables into the canonical dataset.
    #[must_use]
    pub fn clean(&self, tables: &[RawTable]) -> (CanonicalDataset, usize) {
        cleaner::clean(tables)
    }

    /// Load and clean, falling back to the synthetic dataset anchored today.
    #[must_use]
    pub fn prepare(&self) -> PreparedData {
        self.prepare_at(Utc::now().date_naive())
    }

    /// Load and clean; the synthetic fallback is anchored at `anchor`.
    #[must_use]
    pub fn prepare_at(&self, anchor: NaiveDate) -> PreparedData {
        let batch = self.load();
        let (mut dataset, dropped_rows) = self.clean(&batch.tables);
        if dropped_rows > 0 {
            telemetry::log(
                self.telemetry.as_ref(),
                LogLevel::Warn,
                "data.rows_dropped",
                json!({ "rows": dropped_rows, "reason": "missing district or disease" }),
            );
        }
        let synthetic = dataset.is_empty();
        if synthetic {
            telemetry::log(
                self.telemetry.as_ref(),
                LogLevel::Warn,
                "data.synthetic_fallback",
                json!({ "rows": self.synthetic_rows, "seed": self.synthetic_seed }),
            );
            dataset = SyntheticDataset::new(self.synthetic_rows, self.synthetic_seed, anchor).generate();
            cleaner::normalize(&mut dataset);
        }
        let summary = dataset.summary();
        telemetry::log(
            self.telemetry.as_ref(),
            LogLevel::Info,
            "data.prepared",
            json!({
                "records": summary.total_records,
                "districts": summary.districts,
                "diseases": summary.diseases,
                "synthetic": synthetic,
            }),
        );
        telemetry::event(
            self.telemetry.as_ref(),
            "healthnet.data.loaded",
            json!({ "records": summary.total_records, "sources": summary.sources, "synthetic": synthetic }),
        );
        PreparedData {
            dataset,
            synthetic,
            dropped_rows,
            failures: batch.failures,
        }
    }
}
