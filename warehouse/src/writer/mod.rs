//! Warehouse writers: where finished tables go.
//!
//! Two modes. [`WriteMode::Append`] is used for the warehouse fact table:
//! running the same load twice stores the rows twice, with no upsert and no
//! deduplication. [`WriteMode::Replace`] is used for staging, which mirrors
//! its source: the previous content and column layout are discarded.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::{WriterError, WriterResult};
use crate::models::Table;
use crate::sink::{LogRecord, LogSink, Stage};

/// Log component for loads.
pub const LOAD_COMPONENT: &str = "load";

/// How a missing cell is written to CSV.
pub const CSV_NULL: &str = "\\N";

/// How a table reaches its target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Add rows after the existing ones; the column layout must match.
    #[default]
    Append,
    /// Drop whatever the target held and write the table in its place.
    Replace,
}

/// A store that accepts whole tables.
pub trait WarehouseWriter: Send + Sync {
    fn append(&self, table: &Table, table_name: &str) -> WriterResult<()>;

    fn replace(&self, table: &Table, table_name: &str) -> WriterResult<()>;

    fn write(&self, table: &Table, table_name: &str, mode: WriteMode) -> WriterResult<()> {
        match mode {
            WriteMode::Append => self.append(table, table_name),
            WriteMode::Replace => self.replace(table, table_name),
        }
    }
}

// =============================================================================
// CSV directory
// =============================================================================

/// Writes `{dir}/{table}.csv`. Appends add a header only when the file is new;
/// replaces truncate the file and always write one.
#[derive(Debug, Clone)]
pub struct CsvWarehouseWriter {
    dir: PathBuf,
}

impl CsvWarehouseWriter {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn table_path(&self, table_name: &str) -> PathBuf {
        self.dir.join(format!("{table_name}.csv"))
    }

    /// Header of an existing, non-empty target file.
    fn existing_header(path: &Path) -> WriterResult<Option<Vec<String>>> {
        if !path.is_file() || fs::metadata(path)?.len() == 0 {
            return Ok(None);
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)?;
        let mut record = csv::StringRecord::new();
        if !reader.read_record(&mut record)? {
            return Ok(None);
        }
        Ok(Some(record.iter().map(str::to_string).collect()))
    }

    /// Write the data rows of `table`, nulls as [`CSV_NULL`].
    fn write_rows(writer: &mut csv::Writer<File>, table: &Table) -> WriterResult<()> {
        for row in 0..table.row_count() {
            let record = table.columns().iter().map(|c| {
                c.values[row]
                    .to_text()
                    .unwrap_or_else(|| CSV_NULL.to_string())
            });
            writer.write_record(record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl WarehouseWriter for CsvWarehouseWriter {
    fn append(&self, table: &Table, table_name: &str) -> WriterResult<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.table_path(table_name);
        let columns: Vec<String> = table.column_names().iter().map(|c| c.to_string()).collect();

        let existing = Self::existing_header(&path)?;
        if let Some(existing) = &existing {
            if *existing != columns {
                return Err(WriterError::SchemaMismatch {
                    table: table_name.to_string(),
                    existing: existing.clone(),
                    incoming: columns,
                });
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if existing.is_none() {
            writer.write_record(&columns)?;
        }
        Self::write_rows(&mut writer, table)?;

        tracing::debug!(
            table = table_name,
            rows = table.row_count(),
            path = %path.display(),
            "appended rows"
        );
        Ok(())
    }

    fn replace(&self, table: &Table, table_name: &str) -> WriterResult<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.table_path(table_name);

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(File::create(&path)?);
        writer.write_record(table.column_names())?;
        Self::write_rows(&mut writer, table)?;

        tracing::debug!(
            table = table_name,
            rows = table.row_count(),
            path = %path.display(),
            "replaced table"
        );
        Ok(())
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// Keeps every written batch in memory. A replace leaves a single batch.
#[derive(Default)]
pub struct MemoryWarehouse {
    batches: Mutex<HashMap<String, Vec<Table>>>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Batches appended to `table_name`, oldest first.
    pub fn batches(&self, table_name: &str) -> Vec<Table> {
        let guard = match self.batches.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.get(table_name).cloned().unwrap_or_default()
    }

    /// Total rows appended to `table_name`.
    pub fn row_count(&self, table_name: &str) -> usize {
        self.batches(table_name).iter().map(Table::row_count).sum()
    }
}

impl WarehouseWriter for MemoryWarehouse {
    fn append(&self, table: &Table, table_name: &str) -> WriterResult<()> {
        let mut guard = match self.batches.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard
            .entry(table_name.to_string())
            .or_default()
            .push(table.clone());
        Ok(())
    }

    fn replace(&self, table: &Table, table_name: &str) -> WriterResult<()> {
        let mut guard = match self.batches.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.insert(table_name.to_string(), vec![table.clone()]);
        Ok(())
    }
}

/// Write a table in `mode` and record the outcome.
pub fn load(
    writer: &dyn WarehouseWriter,
    table: &Table,
    table_name: &str,
    mode: WriteMode,
    sink: &dyn LogSink,
    run_id: Uuid,
    stage: Stage,
) -> WriterResult<()> {
    let result = writer.write(table, table_name, mode);
    sink.record(&LogRecord::from_result(
        run_id,
        stage,
        LOAD_COMPONENT,
        table_name,
        &result,
    ));
    result
}
