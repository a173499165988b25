use thiserror::Error;

/// Errors raised while reading raw tables.
#[derive(Debug, Error)]
pub enum DataError {
    /// I/O error (filesystem).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// CSV decoding failure.
    #[error("csv error in {file}: {source}")]
    Csv {
        /// File being decoded.
        file: String,
        /// Underlying decoder error.
        #[source]
        source: csv::Error,
    },
    /// A table had no header row.
    #[error("table {0} has no header row")]
    MissingHeader(String),
}

/// Reasons a training call left the engine state untouched.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrainingError {
    /// The dataset lacks the key columns or every feature column.
    #[error("insufficient columns: {0}")]
    InsufficientColumns(String),
    /// Too few complete rows survived filtering.
    #[error("insufficient data: {found} usable rows, {required} required")]
    InsufficientRows {
        /// Rows that survived filtering.
        found: usize,
        /// Configured minimum.
        required: usize,
    },
    /// No (district, disease) series reached the minimum monthly history.
    #[error("no series with at least {0} monthly points")]
    NoEligibleSeries(usize),
    /// A numerical routine produced non-finite output.
    #[error("numerical failure: {0}")]
    Numerical(String),
}

impl TrainingError {
    /// True for data insufficiency, which is never fatal.
    #[must_use]
    pub const fn is_insufficiency(&self) -> bool {
        !matches!(self, Self::Numerical(_))
    }
}

/// Faults on the real inference path; callers convert these into fallbacks.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InferenceError {
    /// No successful training has happened yet.
    #[error("models are not trained")]
    Untrained,
    /// The model produced a probability vector that is not a distribution.
    #[error("invalid probability vector from {0}")]
    InvalidProbabilities(String),
    /// Regression output was not finite.
    #[error("non-finite projection for {0}")]
    NonFiniteProjection(String),
    /// No usable records for the requested selection.
    #[error("no recent records for {0}")]
    NoRecentRecords(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_failure_classes() {
        assert!(TrainingError::InsufficientRows { found: 3, required: 10 }.is_insufficiency());
        assert!(TrainingError::NoEligibleSeries(3).is_insufficiency());
        assert!(!TrainingError::Numerical("nan weights".into()).is_insufficiency());
    }

    #[test]
    fn messages_carry_counts() {
        let err = TrainingError::InsufficientRows { found: 4, required: 10 };
        assert_eq!(err.to_string(), "insufficient data: 4 usable rows, 10 required");
    }
}
