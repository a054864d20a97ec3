//! Sequential step execution with outcome logging.
//!
//! The runner owns the continuation policy. Each step attempt produces
//! exactly one [`LogRecord`]; a failed step leaves the table as it was
//! before the step, and [`OnError`] decides whether the next step runs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::join::JoinCardinality;
use super::plan::{Step, StepContext, TransformPlan};
use crate::error::{PipelineError, PipelineResult, TransformError};
use crate::models::Table;
use crate::sink::{LogRecord, LogSink, LogStatus, Stage};

/// What to do after a step fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    /// Keep the pre-step table and run the next step.
    #[default]
    Continue,
    /// Stop and return the error.
    Abort,
}

impl fmt::Display for OnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnError::Continue => f.write_str("continue"),
            OnError::Abort => f.write_str("abort"),
        }
    }
}

impl FromStr for OnError {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "continue" => Ok(OnError::Continue),
            "abort" => Ok(OnError::Abort),
            _ => Err("expected 'continue' or 'abort'".to_string()),
        }
    }
}

/// Result of one step attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub component: String,
    pub status: LogStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub rows_before: usize,
    pub rows_after: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        self.status == LogStatus::Success
    }
}

/// A table after its steps ran.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRun {
    pub table_name: String,
    pub table: Table,
    pub outcomes: Vec<StepOutcome>,
}

impl TableRun {
    pub fn failed_steps(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_success()).count()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .flat_map(|o| o.warnings.iter().map(String::as_str))
    }
}

/// Runs steps for named tables, logging every attempt.
pub struct StepRunner<'a> {
    sink: &'a dyn LogSink,
    run_id: Uuid,
    stage: Stage,
    on_error: OnError,
    cardinality: JoinCardinality,
    lookups: HashMap<String, Table>,
}

impl<'a> StepRunner<'a> {
    pub fn new(sink: &'a dyn LogSink, run_id: Uuid) -> Self {
        Self {
            sink,
            run_id,
            stage: Stage::Warehouse,
            on_error: OnError::default(),
            cardinality: JoinCardinality::default(),
            lookups: HashMap::new(),
        }
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }

    pub fn with_on_error(mut self, on_error: OnError) -> Self {
        self.on_error = on_error;
        self
    }

    pub fn with_cardinality(mut self, cardinality: JoinCardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    /// Make a table available to join steps.
    pub fn add_lookup(&mut self, name: impl Into<String>, table: Table) {
        self.lookups.insert(name.into(), table);
    }

    pub fn lookup(&self, name: &str) -> Option<&Table> {
        self.lookups.get(name)
    }

    /// Run one step. On failure the input table is returned unchanged.
    pub fn run_step(
        &self,
        table_name: &str,
        table: Table,
        step: &Step,
    ) -> (Table, StepOutcome, Option<TransformError>) {
        let ctx = StepContext {
            lookups: &self.lookups,
            cardinality: self.cardinality,
        };
        let rows_before = table.row_count();
        let result = step.apply(&table, ctx);

        self.sink.record(&LogRecord::from_result(
            self.run_id,
            self.stage,
            step.component(),
            table_name,
            &result,
        ));

        match result {
            Ok(applied) => {
                for warning in &applied.warnings {
                    tracing::warn!(table = table_name, step = step.component(), "{warning}");
                }
                let outcome = StepOutcome {
                    component: step.component().to_string(),
                    status: LogStatus::Success,
                    error: None,
                    rows_before,
                    rows_after: applied.table.row_count(),
                    warnings: applied.warnings,
                };
                (applied.table, outcome, None)
            }
            Err(e) => {
                let outcome = StepOutcome {
                    component: step.component().to_string(),
                    status: LogStatus::Failed,
                    error: Some(e.to_string()),
                    rows_before,
                    rows_after: rows_before,
                    warnings: Vec::new(),
                };
                (table, outcome, Some(e))
            }
        }
    }

    /// Run `steps` in order against `table`.
    pub fn run(&self, table_name: &str, table: Table, steps: &[Step]) -> PipelineResult<TableRun> {
        let mut current = table;
        let mut outcomes = Vec::with_capacity(steps.len());

        for step in steps {
            let (next, outcome, error) = self.run_step(table_name, current, step);
            current = next;
            outcomes.push(outcome);

            if let Some(source) = error {
                match self.on_error {
                    OnError::Continue => {
                        tracing::warn!(
                            table = table_name,
                            step = step.component(),
                            error = %source,
                            "step failed, continuing with previous table"
                        );
                    }
                    OnError::Abort => {
                        return Err(PipelineError::StepFailed {
                            table: table_name.to_string(),
                            step: step.component().to_string(),
                            source,
                        });
                    }
                }
            }
        }

        Ok(TableRun {
            table_name: table_name.to_string(),
            table: current,
            outcomes,
        })
    }

    /// Run a [`TransformPlan`].
    pub fn run_plan(&self, table: Table, plan: &TransformPlan) -> PipelineResult<TableRun> {
        self.run(&plan.table, table, &plan.steps)
    }
}
