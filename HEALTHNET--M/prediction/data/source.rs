use std::{
    io::Read,
    path::{Path, PathBuf},
};

use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// Untyped table as supplied by a data source: header row plus string cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTable {
    /// Provenance tag applied to every row that carries none of its own.
    pub name: String,
    /// Header row as found in the source.
    pub headers: Vec<String>,
    /// Data rows; short rows are padded with empty cells on read.
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Creates a table from parts.
    #[must_use]
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            name: name.into(),
            headers,
            rows,
        }
    }

    /// Decodes CSV with a header row.
    pub fn from_csv_reader<R: Read>(name: impl Into<String>, reader: R) -> Result<Self, DataError> {
        let name = name.into();
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader);
        let headers: Vec<String> = reader
            .headers()
            .map_err(|source| DataError::Csv {
                file: name.clone(),
                source,
            })?
            .iter()
            .map(str::to_owned)
            .collect();
        if headers.iter().all(String::is_empty) {
            return Err(DataError::MissingHeader(name));
        }
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|source| DataError::Csv {
                file: name.clone(),
                source,
            })?;
            rows.push(record.iter().map(str::to_owned).collect());
        }
        Ok(Self::new(name, headers, rows))
    }

    /// Number of data rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no data rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A table that could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    /// Table or file name.
    pub table: String,
    /// Rendered error.
    pub reason: String,
}

/// Tables produced by one fetch; unreadable tables are reported, not fatal.
#[derive(Debug, Clone, Default)]
pub struct SourceBatch {
    /// Successfully decoded tables.
    pub tables: Vec<RawTable>,
    /// Tables that failed to decode.
    pub failures: Vec<SourceFailure>,
}

/// Supplier of raw tables.
pub trait DataSource: Send + Sync {
    /// Human-readable description used in logs.
    fn describe(&self) -> String;

    /// Fetches every table this source knows about.
    fn fetch(&self) -> SourceBatch;
}

/// Reads a fixed list of CSV files from a directory. Missing files are skipped.
#[derive(Debug, Clone)]
pub struct CsvDirectorySource {
    dir: PathBuf,
    files: Vec<String>,
}

impl CsvDirectorySource {
    /// Creates a source over `files` inside `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, files: Vec<String>) -> Self {
        Self {
            dir: dir.into(),
            files,
        }
    }

    /// Directory being read.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read_file(&self, file: &str) -> Result<Option<RawTable>, DataError> {
        let path = self.dir.join(file);
        if !path.is_file() {
            return Ok(None);
        }
        let handle = std::fs::File::open(&path)?;
        RawTable::from_csv_reader(file, handle).map(Some)
    }
}

impl DataSource for CsvDirectorySource {
    fn describe(&self) -> String {
        format!("csv:{}", self.dir.display())
    }

    fn fetch(&self) -> SourceBatch {
        let mut batch = SourceBatch::default();
        if !self.dir.is_dir() {
            return batch;
        }
        for file in &self.files {
            match self.read_file(file) {
                Ok(Some(table)) => batch.tables.push(table),
                Ok(None) => {}
                Err(err) => batch.failures.push(SourceFailure {
                    table: file.clone(),
                    reason: err.to_string(),
                }),
            }
        }
        batch
    }
}

/// Serves tables held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    tables: Vec<RawTable>,
}

impl InMemorySource {
    /// Creates a source over the given tables.
    #[must_use]
    pub fn new(tables: Vec<RawTable>) -> Self {
        Self { tables }
    }
}

impl DataSource for InMemorySource {
    fn describe(&self) -> String {
        format!("memory:{} tables", self.tables.len())
    }

    fn fetch(&self) -> SourceBatch {
        SourceBatch {
            tables: self.tables.clone(),
            failures: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn decodes_csv_with_padding_tolerance() {
        let csv = "District,Disease,Cases\n Bishnupur ,cholera,12\nSenapati,Dengue\n";
        let table = RawTable::from_csv_reader("winter.csv", csv.as_bytes()).unwrap();
        assert_eq!(table.headers, vec!["District", "Disease", "Cases"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0][0], "Bishnupur");
        assert_eq!(table.rows[1].len(), 2);
    }

    #[test]
    fn directory_source_skips_missing_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("present.csv"), "District,Disease\nA,B\n").unwrap();
        let source = CsvDirectorySource::new(
            dir.path(),
            vec!["present.csv".into(), "absent.csv".into()],
        );
        let batch = source.fetch();
        assert_eq!(batch.tables.len(), 1);
        assert_eq!(batch.tables[0].name, "present.csv");
        assert!(batch.failures.is_empty());
    }

    #[test]
    fn missing_directory_yields_nothing() {
        let source = CsvDirectorySource::new("/definitely/not/here", vec!["a.csv".into()]);
        let batch = source.fetch();
        assert!(batch.tables.is_empty());
        assert!(source.describe().starts_with("csv:"));
    }
}
