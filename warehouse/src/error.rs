//! Error types for the car-sales warehouse engine.
//!
//! One enum per concern, from the table model up to the pipeline runner:
//!
//! - [`TableError`] - structural table violations
//! - [`SourceError`] - source adapter / CSV decoding failures
//! - [`TransformError`] - transform step failures
//! - [`ProfileError`] - profiling artifact I/O
//! - [`ValidationError`] - fact schema problems
//! - [`WriterError`] - warehouse append failures
//! - [`SinkError`] - log sink persistence (never escapes a sink)
//! - [`ConfigError`] - configuration loading
//! - [`PipelineError`] - top-level orchestration errors
//!
//! Conversions are automatic via `#[from]`, so `?` works across layers.

use thiserror::Error;

// =============================================================================
// Table Errors
// =============================================================================

/// Violations of the table invariants (equal lengths, unique names).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TableError {
    /// A column has a different length than the first column.
    #[error("Column '{column}' has {found} values, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },

    /// Two columns share a name.
    #[error("Duplicate column name: {0}")]
    DuplicateColumn(String),

    /// A record was not a JSON object.
    #[error("Record {0} is not a JSON object")]
    NotAnObject(usize),
}

// =============================================================================
// Source Errors
// =============================================================================

/// Errors raised while fetching a raw table.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Failed to read the underlying store.
    #[error("Failed to read source: {0}")]
    Io(#[from] std::io::Error),

    /// The requested table does not exist in the store.
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Malformed CSV.
    #[error("Line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Empty file.
    #[error("CSV file is empty")]
    EmptyFile,

    /// Parsed rows do not form a valid table.
    #[error("Invalid table: {0}")]
    Table(#[from] TableError),
}

impl From<csv::Error> for SourceError {
    fn from(err: csv::Error) -> Self {
        let line = err
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or_default();
        SourceError::Parse {
            line,
            message: err.to_string(),
        }
    }
}

// =============================================================================
// Transformation Errors
// =============================================================================

/// Errors raised by a transform step.
///
/// Coercion failures never show up here: a value that does not cast
/// becomes a null cell.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransformError {
    /// A step referenced a column the table does not have.
    #[error("Missing column: {0}")]
    MissingColumn(String),

    /// Case normalisation was asked to touch a non-text column.
    #[error("Column '{column}' is not textual (found {found} value)")]
    NotTextual { column: String, found: String },

    /// A step would leave two columns with the same name.
    #[error("Duplicate column name after {step}: {column}")]
    DuplicateColumn { step: String, column: String },

    /// A lookup key matched more than one lookup row.
    #[error(
        "Join on '{left_on}' = '{right_on}' is not many-to-one: key {key} matches {matches} lookup rows"
    )]
    JoinCardinality {
        left_on: String,
        right_on: String,
        key: String,
        matches: usize,
    },

    /// The lookup table a join step asked for was not supplied.
    #[error("Lookup table not supplied: {0}")]
    MissingLookup(String),

    /// The plan itself is malformed.
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    /// The step produced a structurally invalid table.
    #[error("Invalid table: {0}")]
    Table(#[from] TableError),
}

// =============================================================================
// Profiling Errors
// =============================================================================

/// Errors while persisting or loading profiling artifacts.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// IO error.
    #[error("Profiling artifact IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("Profiling artifact JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Problems with the fact schema itself. Rows that break the schema are
/// counted in a report, never raised.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The schema is not valid JSON.
    #[error("Schema is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The schema does not compile.
    #[error("Invalid schema: {0}")]
    Schema(String),
}

// =============================================================================
// Writer Errors
// =============================================================================

/// Errors from the warehouse writer.
#[derive(Debug, Error)]
pub enum WriterError {
    /// Failed to write the target.
    #[error("Warehouse IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV serialisation failed.
    #[error("Warehouse CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The existing target has a different column layout.
    #[error("Schema mismatch for '{table}': existing columns {existing:?}, new columns {incoming:?}")]
    SchemaMismatch {
        table: String,
        existing: Vec<String>,
        incoming: Vec<String>,
    },
}

// =============================================================================
// Sink Errors
// =============================================================================

/// Log persistence failures. Sinks report these and swallow them.
#[derive(Debug, Error)]
pub enum SinkError {
    /// IO error.
    #[error("Log sink IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("Log sink JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while building the runtime configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable holds an unsupported value.
    #[error("Invalid value for {var}: '{value}' ({expected})")]
    InvalidValue {
        var: String,
        value: String,
        expected: String,
    },

    /// Failed to read a plan file.
    #[error("Failed to read plan file: {0}")]
    Io(#[from] std::io::Error),

    /// Plan JSON is malformed.
    #[error("Invalid plan JSON: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline orchestration errors.
///
/// This is the error type returned by [`crate::pipeline::run_warehouse`]
/// and [`crate::pipeline::run_staging`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Source adapter error.
    #[error("Extraction error: {0}")]
    Source(#[from] SourceError),

    /// The plan failed its structural checks.
    #[error("Plan rejected: {0}")]
    Plan(#[source] TransformError),

    /// A transform step failed and the policy is to abort.
    #[error("Step '{step}' failed on '{table}': {source}")]
    StepFailed {
        table: String,
        step: String,
        #[source]
        source: TransformError,
    },

    /// Fact schema error.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Warehouse writer error.
    #[error("Load error: {0}")]
    Writer(#[from] WriterError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A blocking extraction task panicked or was cancelled.
    #[error("Extraction task failed: {0}")]
    Task(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for table construction.
pub type TableResult<T> = Result<T, TableError>;

/// Result type for source operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Result type for transform steps.
pub type TransformResult<T> = Result<T, TransformError>;

/// Result type for profiling artifacts.
pub type ProfileResult<T> = Result<T, ProfileError>;

/// Result type for warehouse writes.
pub type WriterResult<T> = Result<T, WriterError>;

/// Result type for configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for pipeline runs.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        // SourceError -> PipelineError
        let source_err = SourceError::TableNotFound("car_sales".into());
        let pipeline_err: PipelineError = source_err.into();
        assert!(pipeline_err.to_string().contains("car_sales"));

        // TableError -> TransformError
        let table_err = TableError::DuplicateColumn("state".into());
        let transform_err: TransformError = table_err.into();
        assert!(transform_err.to_string().contains("state"));
    }

    #[test]
    fn test_step_failed_format() {
        let err = PipelineError::StepFailed {
            table: "car_sales".into(),
            step: "Transformation (Drop Missing Value)".into(),
            source: TransformError::MissingColumn("odometer".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("car_sales"));
        assert!(msg.contains("odometer"));
    }

    #[test]
    fn test_join_cardinality_format() {
        let err = TransformError::JoinCardinality {
            left_on: "state".into(),
            right_on: "code".into(),
            key: "\"ca\"".into(),
            matches: 2,
        };
        assert!(err.to_string().contains("not many-to-one"));
    }
}
