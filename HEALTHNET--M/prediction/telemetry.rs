use std::{collections::VecDeque, fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_logging::{JsonLogger, LogLevel, LogRecord};
use uuid::Uuid;

const DEFAULT_JOURNAL_CAPACITY: usize = 256;

/// Builder for prediction telemetry sinks.
pub struct PredictionTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    stderr: bool,
    min_level: LogLevel,
    journal_capacity: usize,
}

impl PredictionTelemetryBuilder {
    /// Creates the builder.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            stderr: false,
            min_level: LogLevel::Debug,
            journal_capacity: DEFAULT_JOURNAL_CAPACITY,
        }
    }

    /// Sets the log path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Writes logs to stderr when no path is set.
    #[must_use]
    pub fn stderr(mut self, enabled: bool) -> Self {
        self.stderr = enabled;
        self
    }

    /// Sets the minimum log level.
    #[must_use]
    pub fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Sets how many events the journal retains.
    #[must_use]
    pub fn journal_capacity(mut self, capacity: usize) -> Self {
        self.journal_capacity = capacity.max(1);
        self
    }

    /// Builds the telemetry handle.
    pub fn build(self) -> Result<PredictionTelemetry> {
        let logger = match (self.log_path, self.stderr) {
            (Some(path), _) => Some(JsonLogger::open(path)?.with_min_level(self.min_level)),
            (None, true) => Some(JsonLogger::stderr().with_min_level(self.min_level)),
            (None, false) => None,
        };
        Ok(PredictionTelemetry {
            inner: Arc::new(TelemetryInner {
                module: self.module,
                logger,
                journal: Mutex::new(VecDeque::with_capacity(self.journal_capacity)),
                capacity: self.journal_capacity,
            }),
        })
    }
}

/// Event retained in the telemetry journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    /// Unique identifier.
    pub id: String,
    /// Module producing the event.
    pub source: String,
    /// Event type (e.g. `healthnet.classifier.trained`).
    pub event_type: String,
    /// RFC3339 timestamp.
    pub timestamp: String,
    /// Arbitrary JSON payload.
    #[serde(default)]
    pub payload: Value,
}

/// Telemetry handle shared across prediction components.
#[derive(Clone)]
pub struct PredictionTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for PredictionTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredictionTelemetry")
            .field("module", &self.inner.module)
            .finish()
    }
}

struct TelemetryInner {
    module: String,
    logger: Option<JsonLogger>,
    journal: Mutex<VecDeque<TelemetryEvent>>,
    capacity: usize,
}

impl PredictionTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> PredictionTelemetryBuilder {
        PredictionTelemetryBuilder::new(module)
    }

    /// Logs structured metadata.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        if let Some(logger) = &self.inner.logger {
            let record = LogRecord::new(&self.inner.module, level, message).with_metadata(&metadata);
            logger.log(&record)?;
        }
        Ok(())
    }

    /// Records an event in the journal, evicting the oldest entry when full.
    pub fn event(&self, event_type: &str, payload: Value) -> Result<()> {
        let record = TelemetryEvent {
            id: format!("evt-{}", Uuid::new_v4()),
            source: self.inner.module.clone(),
            event_type: event_type.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            payload,
        };
        let mut journal = self.inner.journal.lock();
        if journal.len() >= self.inner.capacity {
            journal.pop_front();
        }
        journal.push_back(record);
        Ok(())
    }

    /// Copy of the retained events, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<TelemetryEvent> {
        self.inner.journal.lock().iter().cloned().collect()
    }

    /// Removes and returns every retained event.
    #[must_use]
    pub fn drain(&self) -> Vec<TelemetryEvent> {
        self.inner.journal.lock().drain(..).collect()
    }
}

/// Logs through optional telemetry; sink failures are dropped.
pub(crate) fn log(
    telemetry: Option<&PredictionTelemetry>,
    level: LogLevel,
    message: &str,
    metadata: Value,
) {
    if let Some(tel) = telemetry {
        let _ = tel.log(level, message, metadata);
    }
}

/// Emits an event through optional telemetry.
pub(crate) fn event(telemetry: Option<&PredictionTelemetry>, event_type: &str, payload: Value) {
    if let Some(tel) = telemetry {
        let _ = tel.event(event_type, payload);
    }
}
