//! Source adapters: where raw tables come from.
//!
//! A [`SourceAdapter`] hands out whole tables by name. Reads are blocking;
//! [`extract_all`] runs several of them on the blocking pool at once.

use futures::future::join_all;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult, SourceError, SourceResult};
use crate::models::Table;
use crate::parser::{parse_bytes, CsvOptions};
use crate::sink::{LogRecord, LogSink, Stage};

/// Log component for fetches.
pub const EXTRACTION_COMPONENT: &str = "extraction";

/// A store that can return a full table by name.
pub trait SourceAdapter: Send + Sync {
    fn fetch(&self, table: &str) -> SourceResult<Table>;
}

// =============================================================================
// CSV directory
// =============================================================================

/// Reads `{dir}/{table}.csv`.
#[derive(Debug, Clone)]
pub struct CsvDirectorySource {
    dir: PathBuf,
    options: CsvOptions,
}

impl CsvDirectorySource {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self::with_options(dir, CsvOptions::default())
    }

    pub fn with_options(dir: impl AsRef<Path>, options: CsvOptions) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            options,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `table`.
    pub fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.csv"))
    }
}

impl SourceAdapter for CsvDirectorySource {
    fn fetch(&self, table: &str) -> SourceResult<Table> {
        let path = self.table_path(table);
        if !path.is_file() {
            return Err(SourceError::TableNotFound(table.to_string()));
        }

        let bytes = fs::read(&path)?;
        let parsed = parse_bytes(&bytes, &self.options)?;
        tracing::debug!(
            table,
            encoding = %parsed.encoding,
            delimiter = ?parsed.delimiter,
            rows = parsed.table.row_count(),
            "fetched table"
        );
        Ok(parsed.table)
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// Tables held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    tables: HashMap<String, Table>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: impl Into<String>, table: Table) -> Self {
        self.insert(name, table);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, table: Table) {
        self.tables.insert(name.into(), table);
    }
}

impl SourceAdapter for MemorySource {
    fn fetch(&self, table: &str) -> SourceResult<Table> {
        self.tables
            .get(table)
            .cloned()
            .ok_or_else(|| SourceError::TableNotFound(table.to_string()))
    }
}

// =============================================================================
// Logged extraction
// =============================================================================

/// Fetch one table and record the outcome.
pub fn extract(
    source: &dyn SourceAdapter,
    table: &str,
    sink: &dyn LogSink,
    run_id: Uuid,
    stage: Stage,
) -> SourceResult<Table> {
    let result = source.fetch(table);
    sink.record(&LogRecord::from_result(
        run_id,
        stage,
        EXTRACTION_COMPONENT,
        table,
        &result,
    ));
    result
}

/// Fetch several tables concurrently on the blocking pool.
///
/// Results come back in request order, one log record per table. A failed
/// fetch is returned in its slot; only a panicked task is an `Err` here.
pub async fn extract_all(
    source: Arc<dyn SourceAdapter>,
    tables: &[String],
    sink: &dyn LogSink,
    run_id: Uuid,
    stage: Stage,
) -> PipelineResult<Vec<SourceResult<Table>>> {
    let tasks = tables.iter().map(|table| {
        let source = Arc::clone(&source);
        let table = table.clone();
        tokio::task::spawn_blocking(move || source.fetch(&table))
    });

    let joined = join_all(tasks).await;

    let mut results = Vec::with_capacity(tables.len());
    for (table, outcome) in tables.iter().zip(joined) {
        let result = outcome.map_err(|e| PipelineError::Task(e.to_string()))?;
        sink.record(&LogRecord::from_result(
            run_id,
            stage,
            EXTRACTION_COMPONENT,
            table.as_str(),
            &result,
        ));
        results.push(result);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Column, Value};
    use crate::sink::{LogStatus, MemoryLogSink};
    use tempfile::tempdir;

    fn brands() -> Table {
        Table::new(vec![
            Column::from_values("brand_car_id", vec!["1", "2"]),
            Column::from_values("brand_name", vec!["BMW", "Kia"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_csv_directory_fetch() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("us_state.csv"),
            "id_state;code;name\n1;CA;California\n2;NY;NULL\n",
        )
        .unwrap();

        let source = CsvDirectorySource::new(dir.path());
        let table = source.fetch("us_state").unwrap();

        assert_eq!(table.column_names(), vec!["id_state", "code", "name"]);
        assert_eq!(table.column("name").unwrap().values[1], Value::Null);
    }

    #[test]
    fn test_csv_directory_missing_table() {
        let dir = tempdir().unwrap();
        let source = CsvDirectorySource::new(dir.path());

        let result = source.fetch("car_sales");
        assert!(matches!(result, Err(SourceError::TableNotFound(t)) if t == "car_sales"));
    }

    #[test]
    fn test_extract_logs_both_outcomes() {
        let source = MemorySource::new().with_table("car_brand", brands());
        let sink = MemoryLogSink::new();
        let run_id = Uuid::new_v4();

        assert!(extract(&source, "car_brand", &sink, run_id, Stage::Warehouse).is_ok());
        assert!(extract(&source, "nope", &sink, run_id, Stage::Warehouse).is_err());

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].component, EXTRACTION_COMPONENT);
        assert_eq!(records[0].status, LogStatus::Success);
        assert_eq!(records[1].status, LogStatus::Failed);
        assert_eq!(records[1].table_name, "nope");
    }

    #[tokio::test]
    async fn test_extract_all_keeps_request_order() {
        let source: Arc<dyn SourceAdapter> = Arc::new(
            MemorySource::new()
                .with_table("car_brand", brands())
                .with_table("us_state", Table::empty()),
        );
        let sink = MemoryLogSink::new();
        let names = vec![
            "us_state".to_string(),
            "missing".to_string(),
            "car_brand".to_string(),
        ];

        let results = extract_all(source, &names, &sink, Uuid::new_v4(), Stage::Warehouse)
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap().row_count(), 2);
        assert_eq!(sink.len(), 3);
    }
}
