//! # Carsales - staging, profiling and warehouse load for car-sales records
//!
//! Carsales copies raw car-sales tables into a staging store, profiles the
//! sales table, cleans and joins it against the brand and state lookups,
//! and appends the result to a warehouse fact table. Every operation leaves
//! one structured outcome record in the log sink.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Staging   │────▶│  Profiling  │────▶│  Transform  │────▶│  Warehouse  │
//! │ (CSV store) │     │ (JSON file) │     │ (step plan) │     │  (append)   │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//!                             │                  │                   │
//!                             └──────────────────┴───────────────────┴──▶ Log sink
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use carsales::{
//!     run_warehouse, Config, CsvDirectorySource, CsvWarehouseWriter, JsonlLogSink,
//!     PipelineContext, ReportStore,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let writer = CsvWarehouseWriter::new(&config.warehouse_dir);
//!     let sink = JsonlLogSink::new(&config.log_path);
//!     let ctx = PipelineContext::new(
//!         Arc::new(CsvDirectorySource::new(&config.staging_dir)),
//!         &writer,
//!         &sink,
//!         ReportStore::with_dir(&config.profile_dir),
//!     )
//!     .with_config(&config);
//!
//!     let report = run_warehouse(&ctx, &config.load_plan()?).await?;
//!     println!("Loaded {} rows", report.rows_loaded);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types per concern
//! - [`config`] - Environment configuration
//! - [`models`] - Table, column and cell types
//! - [`parser`] - CSV decoding with encoding and delimiter detection
//! - [`source`] - Table sources and logged extraction
//! - [`profiling`] - Column diagnostics and report artifacts
//! - [`transform`] - Cleaning, join, cast and rename steps; plans and runner
//! - [`validation`] - Fact-row JSON Schema checks
//! - [`sink`] - Outcome log records and sinks
//! - [`writer`] - Staging and warehouse write targets
//! - [`pipeline`] - Staging and warehouse runs

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Extraction
pub mod parser;
pub mod source;

// Profiling
pub mod profiling;

// Transformation
pub mod transform;

// Validation
pub mod validation;

// Outcome log
pub mod sink;

// Load
pub mod writer;

// Orchestration
pub mod pipeline;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, PipelineError, PipelineResult, ProfileError, SinkError, SourceError, TableError,
    TransformError, TransformResult, ValidationError, WriterError,
};

// =============================================================================
// Re-exports - Config & Models
// =============================================================================

pub use config::Config;

pub use models::{Column, ColumnSpec, SemanticType, Table, Value};

// =============================================================================
// Re-exports - Extraction
// =============================================================================

pub use parser::{
    decode_content, detect_delimiter, detect_encoding, parse_bytes, parse_str, CsvOptions,
    ParseResult,
};

pub use source::{extract, extract_all, CsvDirectorySource, MemorySource, SourceAdapter};

// =============================================================================
// Re-exports - Profiling
// =============================================================================

pub use profiling::{ColumnDiagnostics, ProfileSelection, Profiler, ProfilingReport, ReportStore};

// =============================================================================
// Re-exports - Transform
// =============================================================================

pub use transform::{
    cast, drop_invalid, drop_missing, join, left_join, normalize_case, project, rename,
    CastReport, JoinCardinality, JoinKeys, LookupJoin, OnError, Step, StepOutcome, StepRunner,
    TableRun, TransformPlan, WarehousePlan,
};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{is_valid, validate, FactValidator, ValidationReport};

// =============================================================================
// Re-exports - Sink & Writer
// =============================================================================

pub use sink::{JsonlLogSink, LogRecord, LogSink, LogStatus, MemoryLogSink, Stage, TeeSink};

pub use writer::{load, CsvWarehouseWriter, MemoryWarehouse, WarehouseWriter, WriteMode};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use pipeline::{run_staging, run_warehouse, PipelineContext, StagingReport, WarehouseReport};
