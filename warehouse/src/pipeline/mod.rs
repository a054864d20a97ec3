//! Staging and warehouse orchestration.
//!
//! ```text
//! staging:   source ──▶ extract ──▶ replace (staging store)
//!
//! warehouse: staging ──▶ extract x3 ──▶ profile sales ──▶ clean lookups
//!                                                  │
//!            append ◀── validate ◀── clean + join sales
//! ```
//!
//! Every operation emits one outcome record to the log sink. Extraction
//! and load failures end a warehouse run; step failures follow the
//! configured [`OnError`] policy; profiling artifact failures are logged
//! and the run goes on.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{PipelineError, PipelineResult};
use crate::models::Table;
use crate::profiling::{Profiler, ReportStore, PROFILING_COMPONENT};
use crate::sink::{LogRecord, LogSink, Stage};
use crate::source::{extract_all, SourceAdapter};
use crate::transform::{JoinCardinality, OnError, StepOutcome, StepRunner, WarehousePlan};
use crate::validation::{FactValidator, ValidationReport};
use crate::writer::{load, WarehouseWriter, WriteMode};

// =============================================================================
// Staging
// =============================================================================

/// Outcome of a staging copy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StagingReport {
    pub run_id: Uuid,
    /// Table -> rows copied
    pub loaded: BTreeMap<String, usize>,
    /// Table -> error text
    pub failed: BTreeMap<String, String>,
}

impl StagingReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Copy raw tables into the staging store.
///
/// Each staged table is replaced, so staging mirrors the source as of this
/// run and may pick up a new column layout. A table that fails to extract or load is reported and the others still
/// go through.
pub async fn run_staging(
    source: Arc<dyn SourceAdapter>,
    writer: &dyn WarehouseWriter,
    tables: &[String],
    sink: &dyn LogSink,
) -> PipelineResult<StagingReport> {
    let run_id = Uuid::new_v4();
    tracing::info!(%run_id, tables = tables.len(), "staging run started");

    let extracted = extract_all(source, tables, sink, run_id, Stage::Staging).await?;

    let mut report = StagingReport {
        run_id,
        ..StagingReport::default()
    };
    for (name, result) in tables.iter().zip(extracted) {
        let outcome = result
            .map_err(PipelineError::from)
            .and_then(|table| {
                load(writer, &table, name, WriteMode::Replace, sink, run_id, Stage::Staging)?;
                Ok(table.row_count())
            });
        match outcome {
            Ok(rows) => {
                report.loaded.insert(name.clone(), rows);
            }
            Err(e) => {
                tracing::error!(table = %name, error = %e, "staging failed");
                report.failed.insert(name.clone(), e.to_string());
            }
        }
    }

    tracing::info!(
        %run_id,
        loaded = report.loaded.len(),
        failed = report.failed.len(),
        "staging run finished"
    );
    Ok(report)
}

// =============================================================================
// Warehouse
// =============================================================================

/// Collaborators and policies for a warehouse run.
pub struct PipelineContext<'a> {
    pub source: Arc<dyn SourceAdapter>,
    pub writer: &'a dyn WarehouseWriter,
    pub sink: &'a dyn LogSink,
    pub reports: ReportStore,
    pub validator: Option<FactValidator>,
    pub join_cardinality: JoinCardinality,
    pub on_error: OnError,
}

impl<'a> PipelineContext<'a> {
    pub fn new(
        source: Arc<dyn SourceAdapter>,
        writer: &'a dyn WarehouseWriter,
        sink: &'a dyn LogSink,
        reports: ReportStore,
    ) -> Self {
        Self {
            source,
            writer,
            sink,
            reports,
            validator: None,
            join_cardinality: JoinCardinality::default(),
            on_error: OnError::default(),
        }
    }

    /// Apply the policies and profiling location from `config`.
    pub fn with_config(mut self, config: &Config) -> Self {
        self.reports = ReportStore::with_dir(&config.profile_dir);
        self.join_cardinality = config.join_cardinality;
        self.on_error = config.on_error;
        self
    }

    pub fn with_validator(mut self, validator: FactValidator) -> Self {
        self.validator = Some(validator);
        self
    }
}

/// Summary of a warehouse run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseReport {
    pub run_id: Uuid,
    /// Table -> rows extracted
    pub rows_extracted: BTreeMap<String, usize>,
    pub rows_loaded: usize,
    pub target_table: String,
    pub profile_path: Option<PathBuf>,
    /// Table -> its step outcomes, in order
    pub steps: BTreeMap<String, Vec<StepOutcome>>,
    pub validation: Option<ValidationReport>,
    pub warnings: Vec<String>,
    pub duration_ms: u64,
}

impl WarehouseReport {
    pub fn failed_steps(&self) -> usize {
        self.steps
            .values()
            .flatten()
            .filter(|o| !o.is_success())
            .count()
    }
}

/// Extract, profile, transform, validate and load the sales fact table.
pub async fn run_warehouse(
    ctx: &PipelineContext<'_>,
    plan: &WarehousePlan,
) -> PipelineResult<WarehouseReport> {
    plan.validate().map_err(PipelineError::Plan)?;

    let start = Instant::now();
    let run_id = Uuid::new_v4();
    let sink = ctx.sink;
    let mut warnings = Vec::new();
    tracing::info!(%run_id, target = %plan.target_table, "warehouse run started");

    // Extract
    let names = plan.source_tables();
    let extracted = extract_all(Arc::clone(&ctx.source), &names, sink, run_id, Stage::Warehouse)
        .await?;
    let mut tables: BTreeMap<String, Table> = BTreeMap::new();
    for (name, result) in names.iter().zip(extracted) {
        tables.insert(name.clone(), result?);
    }
    let rows_extracted = tables
        .iter()
        .map(|(name, table)| (name.clone(), table.row_count()))
        .collect();

    let mut take = |name: &str| {
        tables
            .remove(name)
            .ok_or_else(|| PipelineError::Task(format!("table '{name}' was not extracted")))
    };
    let sales = take(&plan.sales.table)?;

    // Profile
    let profile = Profiler::new(&sales, plan.sales.table.as_str())
        .with_selection(plan.profile.clone())
        .report();
    let persisted = ctx.reports.persist(&profile);
    sink.record(&LogRecord::from_result(
        run_id,
        Stage::Warehouse,
        PROFILING_COMPONENT,
        plan.sales.table.as_str(),
        &persisted,
    ));
    let profile_path = match persisted {
        Ok(path) => {
            tracing::info!(path = %path.display(), "profiling report saved");
            Some(path)
        }
        Err(e) => {
            tracing::error!(error = %e, "profiling report not saved");
            warnings.push(format!("profiling report not saved: {e}"));
            None
        }
    };

    // Transform
    let mut runner = StepRunner::new(sink, run_id)
        .with_stage(Stage::Warehouse)
        .with_on_error(ctx.on_error)
        .with_cardinality(ctx.join_cardinality);
    let mut steps = BTreeMap::new();

    for lookup_plan in &plan.lookups {
        let table = take(&lookup_plan.table)?;
        let run = runner.run_plan(table, lookup_plan)?;
        warnings.extend(run.warnings().map(|w| format!("{}: {w}", run.table_name)));
        steps.insert(run.table_name.clone(), run.outcomes);
        runner.add_lookup(run.table_name, run.table);
    }

    let sales_run = runner.run_plan(sales, &plan.sales)?;
    warnings.extend(
        sales_run
            .warnings()
            .map(|w| format!("{}: {w}", sales_run.table_name)),
    );
    steps.insert(sales_run.table_name.clone(), sales_run.outcomes);
    let facts = sales_run.table;

    // Validate
    let validation = ctx.validator.as_ref().map(|v| v.validate_table(&facts));
    if let Some(report) = validation.as_ref().filter(|r| !r.is_clean()) {
        warnings.push(format!(
            "{} of {} rows do not match the fact schema",
            report.invalid,
            report.invalid + report.valid
        ));
    }

    // Load
    load(
        ctx.writer,
        &facts,
        &plan.target_table,
        WriteMode::Append,
        sink,
        run_id,
        Stage::Warehouse,
    )?;

    let report = WarehouseReport {
        run_id,
        rows_extracted,
        rows_loaded: facts.row_count(),
        target_table: plan.target_table.clone(),
        profile_path,
        steps,
        validation,
        warnings,
        duration_ms: start.elapsed().as_millis() as u64,
    };
    tracing::info!(
        %run_id,
        rows = report.rows_loaded,
        failed_steps = report.failed_steps(),
        duration_ms = report.duration_ms,
        "warehouse run finished"
    );
    Ok(report)
}
