//! Outcome records and the sinks that persist them.
//!
//! Every extraction, transform step, profiling run and load emits exactly
//! one [`LogRecord`], whether it succeeded or not. Sinks are best-effort:
//! [`LogSink::record`] has no error in its signature, and a sink that cannot
//! persist a record reports the problem and carries on.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::SinkError;

/// Timestamp layout used in `etl_date`.
pub const ETL_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Pipeline stage a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Staging,
    Warehouse,
    Modelling,
}

/// Outcome of one operation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Success,
    Failed,
}

/// A single outcome record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Pipeline stage
    pub step: Stage,
    /// Component that ran (e.g. `extraction`, `Transformation (Cast Columns)`)
    pub component: String,
    /// Success or failure
    pub status: LogStatus,
    /// Table the operation worked on
    pub table_name: String,
    /// Local time the operation finished
    pub etl_date: String,
    /// Error text for failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    /// Groups the records of one pipeline run
    pub run_id: Uuid,
}

impl LogRecord {
    pub fn success(
        run_id: Uuid,
        step: Stage,
        component: impl Into<String>,
        table_name: impl Into<String>,
    ) -> Self {
        Self {
            step,
            component: component.into(),
            status: LogStatus::Success,
            table_name: table_name.into(),
            etl_date: Local::now().format(ETL_DATE_FORMAT).to_string(),
            error_msg: None,
            run_id,
        }
    }

    pub fn failure(
        run_id: Uuid,
        step: Stage,
        component: impl Into<String>,
        table_name: impl Into<String>,
        error: impl ToString,
    ) -> Self {
        Self {
            status: LogStatus::Failed,
            error_msg: Some(error.to_string()),
            ..Self::success(run_id, step, component, table_name)
        }
    }

    /// Record for the outcome of `result`.
    pub fn from_result<T, E: ToString>(
        run_id: Uuid,
        step: Stage,
        component: impl Into<String>,
        table_name: impl Into<String>,
        result: &Result<T, E>,
    ) -> Self {
        match result {
            Ok(_) => Self::success(run_id, step, component, table_name),
            Err(e) => Self::failure(run_id, step, component, table_name, e.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == LogStatus::Success
    }
}

/// Destination for outcome records. Must never fail the caller.
pub trait LogSink: Send + Sync {
    fn record(&self, record: &LogRecord);
}

/// Emit the matching `tracing` event for a record.
fn trace_record(record: &LogRecord) {
    match record.status {
        LogStatus::Success => tracing::info!(
            component = %record.component,
            table = %record.table_name,
            "success"
        ),
        LogStatus::Failed => tracing::warn!(
            component = %record.component,
            table = %record.table_name,
            error = record.error_msg.as_deref().unwrap_or(""),
            "failed"
        ),
    }
}

// =============================================================================
// JSON-lines file sink
// =============================================================================

/// Appends one JSON object per line to a log file (the `etl_log` table).
pub struct JsonlLogSink {
    path: PathBuf,
}

impl JsonlLogSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn try_append(&self, record: &LogRecord) -> Result<(), SinkError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Read back every record in the file, skipping lines that do not parse.
    pub fn read_all(&self) -> Result<Vec<LogRecord>, SinkError> {
        let content = fs::read_to_string(&self.path)?;
        Ok(content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

impl LogSink for JsonlLogSink {
    fn record(&self, record: &LogRecord) {
        trace_record(record);
        if let Err(e) = self.try_append(record) {
            eprintln!("Can't save your log message. Cause: {e}");
            tracing::error!(path = %self.path.display(), error = %e, "log sink write failed");
        }
    }
}

// =============================================================================
// In-memory sink
// =============================================================================

/// Keeps records in memory; used by tests and for end-of-run summaries.
#[derive(Default)]
pub struct MemoryLogSink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the records received so far.
    pub fn records(&self) -> Vec<LogRecord> {
        match self.records.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogSink for MemoryLogSink {
    fn record(&self, record: &LogRecord) {
        trace_record(record);
        match self.records.lock() {
            Ok(mut guard) => guard.push(record.clone()),
            Err(poisoned) => poisoned.into_inner().push(record.clone()),
        }
    }
}

/// Forwards every record to several sinks.
pub struct TeeSink<'a> {
    sinks: Vec<&'a dyn LogSink>,
}

impl<'a> TeeSink<'a> {
    pub fn new(sinks: Vec<&'a dyn LogSink>) -> Self {
        Self { sinks }
    }
}

impl LogSink for TeeSink<'_> {
    fn record(&self, record: &LogRecord) {
        for sink in &self.sinks {
            sink.record(record);
        }
    }
}
