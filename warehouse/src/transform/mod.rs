//! Transform pipeline.
//!
//! - Steps: row filters, case normalisation, projection, renaming
//! - Join: left joins against lookup tables
//! - Cast: null-on-failure type coercion
//! - Plan: serialisable step lists and the built-in car-sales plan
//! - Runner: ordered execution, outcome logging and the failure policy

pub mod cast;
pub mod join;
pub mod plan;
pub mod runner;
pub mod steps;

pub use cast::{cast, cast_column, Cast, CastReport};
pub use join::{join, left_join, JoinCardinality, JoinKeys};
pub use plan::{Applied, LookupJoin, Step, StepContext, TransformPlan, WarehousePlan};
pub use runner::{OnError, StepOutcome, StepRunner, TableRun};
pub use steps::{drop_invalid, drop_missing, normalize_case, project, rename, Projection};
