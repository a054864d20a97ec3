//! Declarative transform plans.
//!
//! A plan is plain JSON, so the warehouse run can be reconfigured without a
//! rebuild:
//!
//! ```json
//! {
//!   "target_table": "car_sales",
//!   "sales": { "table": "car_sales", "steps": [
//!     { "op": "drop_missing", "columns": ["odometer"] },
//!     { "op": "join", "lookups": [{ "table": "us_state", "left_on": "state", "right_on": "code" }] }
//!   ]},
//!   "lookups": [{ "table": "us_state", "steps": [] }]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use super::cast::cast;
use super::join::{left_join, JoinCardinality, JoinKeys};
use super::steps::{drop_invalid, drop_missing, normalize_case, project, rename};
use crate::error::{TransformError, TransformResult};
use crate::models::{Table, Value};
use crate::profiling::{ProfileSelection, ALL_COLUMNS};

pub const CAR_SALES: &str = "car_sales";
pub const CAR_BRAND: &str = "car_brand";
pub const US_STATE: &str = "us_state";

/// A lookup folded in by a join step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupJoin {
    /// Name of the (transformed) lookup table
    pub table: String,
    pub left_on: String,
    pub right_on: String,
}

impl LookupJoin {
    pub fn keys(&self) -> JoinKeys {
        JoinKeys::new(&self.left_on, &self.right_on)
    }
}

/// One transform operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Drop rows with a missing value in any listed column
    DropMissing { columns: Vec<String> },
    /// Drop rows holding one of `values` in a listed column
    DropInvalid {
        columns: Vec<String>,
        values: Vec<Value>,
    },
    /// Lower-case the listed text columns
    NormalizeCase { columns: Vec<String> },
    /// Left join lookups, in order
    Join { lookups: Vec<LookupJoin> },
    /// Keep only the listed columns that exist
    Project { columns: Vec<String> },
    /// Coerce columns to `integer`, `float` or `string`
    Cast { types: BTreeMap<String, String> },
    /// Rename columns
    Rename { columns: BTreeMap<String, String> },
}

/// What a step needs besides its input table.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub lookups: &'a HashMap<String, Table>,
    pub cardinality: JoinCardinality,
}

/// A step's output table and anything worth warning about.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub table: Table,
    pub warnings: Vec<String>,
}

impl From<Table> for Applied {
    fn from(table: Table) -> Self {
        Self {
            table,
            warnings: Vec::new(),
        }
    }
}

impl Step {
    /// Log component name.
    pub fn component(&self) -> &'static str {
        match self {
            Step::DropMissing { .. } => "Transformation (Drop Missing Value)",
            Step::DropInvalid { .. } => "Transformation (Drop Invalid Value)",
            Step::NormalizeCase { .. } => "Transformation (To Lower Case)",
            Step::Join { .. } => "Transformation (Join Data)",
            Step::Project { .. } => "Transformation (Select Merged Columns)",
            Step::Cast { .. } => "Transformation (Cast Columns)",
            Step::Rename { .. } => "Transformation (Rename Columns)",
        }
    }

    /// Run the step against `table`.
    pub fn apply(&self, table: &Table, ctx: StepContext<'_>) -> TransformResult<Applied> {
        match self {
            Step::DropMissing { columns } => Ok(drop_missing(table, columns)?.into()),
            Step::DropInvalid { columns, values } => {
                Ok(drop_invalid(table, columns, values)?.into())
            }
            Step::NormalizeCase { columns } => Ok(normalize_case(table, columns)?.into()),
            Step::Join { lookups } => {
                let mut current = table.clone();
                for lookup in lookups {
                    let right = ctx
                        .lookups
                        .get(&lookup.table)
                        .ok_or_else(|| TransformError::MissingLookup(lookup.table.clone()))?;
                    current = left_join(&current, right, &lookup.keys(), ctx.cardinality)?;
                }
                Ok(current.into())
            }
            Step::Project { columns } => {
                let projection = project(table, columns)?;
                Ok(Applied {
                    table: projection.table,
                    warnings: projection
                        .skipped
                        .into_iter()
                        .map(|c| format!("column '{c}' not found, skipped"))
                        .collect(),
                })
            }
            Step::Cast { types } => {
                let cast = cast(table, types)?;
                Ok(Applied {
                    warnings: cast.report.warnings(),
                    table: cast.table,
                })
            }
            Step::Rename { columns } => Ok(rename(table, columns)?.into()),
        }
    }
}

/// Steps for one named table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformPlan {
    pub table: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl TransformPlan {
    pub fn new(table: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            table: table.into(),
            steps,
        }
    }
}

/// Everything the warehouse run does between extraction and load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehousePlan {
    /// Warehouse table the result is appended to
    pub target_table: String,
    /// Diagnostics for the raw sales table; `"*"` means every column
    #[serde(default)]
    pub profile: ProfileSelection,
    /// Lookup tables and their own cleaning, run before the sales steps
    #[serde(default)]
    pub lookups: Vec<TransformPlan>,
    /// The fact table's steps
    pub sales: TransformPlan,
}

impl WarehousePlan {
    /// The car-sales warehouse schema.
    pub fn car_sales() -> Self {
        fn strings(cols: &[&str]) -> Vec<String> {
            cols.iter().map(|c| c.to_string()).collect()
        }
        fn pairs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        }

        let profile = ProfileSelection {
            data_type: strings(&[ALL_COLUMNS]),
            duplicate_value: strings(&["id_sales"]),
            unique_value: strings(&["brand_car", "body", "transmission", "state", "color", "interior"]),
            missing_value: strings(&[ALL_COLUMNS]),
            negative_value: strings(&["year", "condition", "odometer", "mmr", "sellingprice"]),
        };

        let sales = TransformPlan::new(
            CAR_SALES,
            vec![
                Step::DropMissing {
                    columns: strings(&["odometer", "mmr", "condition"]),
                },
                Step::DropInvalid {
                    columns: strings(&[
                        "brand_car", "model", "trim", "body", "transmission", "vin", "state",
                        "color", "interior", "seller",
                    ]),
                    values: ["", "—", "3vwd17aj5fm219943", "3vwd17aj5fm297123"]
                        .into_iter()
                        .map(Value::from)
                        .collect(),
                },
                Step::NormalizeCase {
                    columns: strings(&[
                        "brand_car", "model", "trim", "body", "transmission", "color", "interior",
                        "seller",
                    ]),
                },
                Step::Join {
                    lookups: vec![
                        LookupJoin {
                            table: CAR_BRAND.to_string(),
                            left_on: "brand_car".to_string(),
                            right_on: "brand_name".to_string(),
                        },
                        LookupJoin {
                            table: US_STATE.to_string(),
                            left_on: "state".to_string(),
                            right_on: "code".to_string(),
                        },
                    ],
                },
                Step::Project {
                    columns: strings(&[
                        "id_sales", "year", "brand_car_id", "transmission", "id_state", "odometer",
                        "condition", "color", "interior", "mmr", "sellingprice",
                    ]),
                },
                Step::Cast {
                    types: pairs(&[
                        ("id_sales", "integer"),
                        ("year", "integer"),
                        ("brand_car_id", "integer"),
                        ("transmission", "string"),
                        ("id_state", "integer"),
                        ("condition", "float"),
                        ("odometer", "float"),
                        ("color", "string"),
                        ("interior", "string"),
                        ("mmr", "float"),
                        ("sellingprice", "float"),
                    ]),
                },
                Step::Rename {
                    columns: pairs(&[
                        ("id_sales", "id_sales_nk"),
                        ("sellingprice", "selling_price"),
                    ]),
                },
            ],
        );

        let lookups = vec![
            TransformPlan::new(
                CAR_BRAND,
                vec![Step::NormalizeCase {
                    columns: strings(&["brand_name"]),
                }],
            ),
            TransformPlan::new(
                US_STATE,
                vec![Step::NormalizeCase {
                    columns: strings(&["name"]),
                }],
            ),
        ];

        Self {
            target_table: CAR_SALES.to_string(),
            profile,
            lookups,
            sales,
        }
    }

    /// Every table the run extracts: sales first, then lookups.
    pub fn source_tables(&self) -> Vec<String> {
        std::iter::once(self.sales.table.clone())
            .chain(self.lookups.iter().map(|l| l.table.clone()))
            .collect()
    }

    /// Structural checks that do not need data.
    pub fn validate(&self) -> TransformResult<()> {
        if self.target_table.trim().is_empty() {
            return Err(TransformError::InvalidPlan("empty target table".to_string()));
        }

        let lookup_names: Vec<&str> = self.lookups.iter().map(|l| l.table.as_str()).collect();
        let mut seen = HashSet::new();
        for name in std::iter::once(self.sales.table.as_str()).chain(lookup_names.iter().copied()) {
            if !seen.insert(name) {
                return Err(TransformError::InvalidPlan(format!(
                    "table '{name}' is listed more than once"
                )));
            }
        }

        for step in &self.sales.steps {
            if let Step::Join { lookups } = step {
                if let Some(unknown) = lookups
                    .iter()
                    .find(|j| !lookup_names.contains(&j.table.as_str()))
                {
                    return Err(TransformError::InvalidPlan(format!(
                        "join references unknown lookup '{}'",
                        unknown.table
                    )));
                }
            }
        }

        for lookup in &self.lookups {
            if lookup.steps.iter().any(|s| matches!(s, Step::Join { .. })) {
                return Err(TransformError::InvalidPlan(format!(
                    "lookup '{}' cannot join other tables",
                    lookup.table
                )));
            }
        }

        Ok(())
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_json_shape() {
        let step = Step::DropMissing {
            columns: vec!["odometer".into()],
        };
        assert_eq!(
            serde_json::to_value(&step).unwrap(),
            json!({ "op": "drop_missing", "columns": ["odometer"] })
        );

        let parsed: Step = serde_json::from_value(json!({
            "op": "cast",
            "types": { "price": "float" }
        }))
        .unwrap();
        assert_eq!(parsed.component(), "Transformation (Cast Columns)");
    }

    #[test]
    fn test_car_sales_plan_round_trips() {
        let plan = WarehousePlan::car_sales();
        let json = plan.to_json().unwrap();
        assert_eq!(WarehousePlan::from_json(&json).unwrap(), plan);
        assert!(plan.validate().is_ok());
        assert_eq!(
            plan.source_tables(),
            vec!["car_sales".to_string(), "car_brand".to_string(), "us_state".to_string()]
        );
    }

    #[test]
    fn test_validate_unknown_lookup() {
        let mut plan = WarehousePlan::car_sales();
        plan.lookups.pop();

        let result = plan.validate();
        assert!(matches!(result, Err(TransformError::InvalidPlan(msg)) if msg.contains("us_state")));
    }

    #[test]
    fn test_join_step_needs_lookup_table() {
        let step = Step::Join {
            lookups: vec![LookupJoin {
                table: "us_state".into(),
                left_on: "state".into(),
                right_on: "code".into(),
            }],
        };
        let table = Table::from_records(&[json!({ "state": "ca" })]).unwrap();
        let lookups = HashMap::new();
        let ctx = StepContext {
            lookups: &lookups,
            cardinality: JoinCardinality::Enforce,
        };

        let result = step.apply(&table, ctx);
        assert_eq!(result, Err(TransformError::MissingLookup("us_state".into())));
    }

    #[test]
    fn test_project_step_reports_skipped() {
        let table = Table::from_records(&[json!({ "a": 1 })]).unwrap();
        let lookups = HashMap::new();
        let ctx = StepContext {
            lookups: &lookups,
            cardinality: JoinCardinality::Enforce,
        };
        let step = Step::Project {
            columns: vec!["a".into(), "b".into()],
        };

        let applied = step.apply(&table, ctx).unwrap();
        assert_eq!(applied.table.column_names(), vec!["a"]);
        assert_eq!(applied.warnings.len(), 1);
    }
}
