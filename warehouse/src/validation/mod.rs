//! JSON Schema validation of warehouse fact rows.
//!
//! Rows are checked against a JSON Schema Draft 7 document before loading.
//! Invalid rows are counted and described, not removed: the report informs
//! the operator and the load goes ahead.
//!
//! # Embedded Schema
//!
//! `schemas/car-sales-fact.json` is embedded at compile time.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use carsales::validation::{validate, FactValidator};
//!
//! let schema = json!({ "type": "object", "required": ["id"] });
//! assert!(validate(&schema, &json!({ "id": 1 })).is_ok());
//!
//! let report = FactValidator::car_sales()?.validate_table(&fact_table);
//! println!("{} valid, {} invalid", report.valid, report.invalid);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;
use crate::models::Table;

/// Embedded car-sales fact schema.
pub const CAR_SALES_FACT_SCHEMA: &str = include_str!("../../schemas/car-sales-fact.json");

/// How many invalid rows keep their error messages.
pub const MAX_REPORTED_ROWS: usize = 5;

/// Validate one document against a schema.
///
/// Returns every violation message when the document is invalid.
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator =
        jsonschema::draft7::new(schema).map_err(|e| vec![format!("Invalid schema: {e}")])?;

    let errors: Vec<String> = validator.iter_errors(data).map(|e| e.to_string()).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Quick yes/no check.
pub fn is_valid(schema: &Value, data: &Value) -> bool {
    jsonschema::draft7::is_valid(schema, data)
}

/// Outcome of validating a table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: usize,
    pub invalid: usize,
    /// (row index, messages) for the first invalid rows
    pub errors: Vec<(usize, Vec<String>)>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.invalid == 0
    }
}

/// A compiled schema, reused across rows.
pub struct FactValidator {
    validator: jsonschema::Validator,
}

impl FactValidator {
    pub fn new(schema: &Value) -> Result<Self, ValidationError> {
        let validator =
            jsonschema::draft7::new(schema).map_err(|e| ValidationError::Schema(e.to_string()))?;
        Ok(Self { validator })
    }

    /// Validator for the embedded car-sales fact schema.
    pub fn car_sales() -> Result<Self, ValidationError> {
        let schema: Value = serde_json::from_str(CAR_SALES_FACT_SCHEMA)?;
        Self::new(&schema)
    }

    pub fn validate_record(&self, record: &Value) -> Result<(), Vec<String>> {
        let errors: Vec<String> = self
            .validator
            .iter_errors(record)
            .map(|e| e.to_string())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate every row of `table`.
    pub fn validate_table(&self, table: &Table) -> ValidationReport {
        let mut report = ValidationReport::default();

        for (row, record) in table.to_records().iter().enumerate() {
            match self.validate_record(record) {
                Ok(()) => report.valid += 1,
                Err(errors) => {
                    report.invalid += 1;
                    if report.errors.len() < MAX_REPORTED_ROWS {
                        report.errors.push((row, errors));
                    }
                }
            }
        }

        if report.invalid > 0 {
            tracing::warn!(
                valid = report.valid,
                invalid = report.invalid,
                "rows do not match the fact schema"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Column, SemanticType, Value as Cell};
    use serde_json::json;

    fn fact_row() -> Value {
        json!({
            "id_sales_nk": 1,
            "year": 2015,
            "brand_car_id": 3,
            "transmission": "automatic",
            "id_state": 5,
            "odometer": 16639.0,
            "condition": 5.0,
            "color": "white",
            "interior": "black",
            "mmr": 20500.0,
            "selling_price": 21500.0
        })
    }

    #[test]
    fn test_valid_fact_row() {
        let validator = FactValidator::car_sales().unwrap();
        assert!(validator.validate_record(&fact_row()).is_ok());
    }

    #[test]
    fn test_unmatched_lookup_is_still_valid() {
        let mut row = fact_row();
        row["brand_car_id"] = Value::Null;
        row["id_state"] = Value::Null;

        let validator = FactValidator::car_sales().unwrap();
        assert!(validator.validate_record(&row).is_ok());
    }

    #[test]
    fn test_invalid_fact_row() {
        let mut row = fact_row();
        row["odometer"] = json!("far");
        row["vin"] = json!("abc");

        let validator = FactValidator::car_sales().unwrap();
        let errors = validator.validate_record(&row).unwrap_err();
        assert!(errors.len() >= 2);
    }

    #[test]
    fn test_validate_table_counts_rows() {
        let table = Table::new(vec![
            Column::from_values("id_sales_nk", vec![Cell::Int(1), Cell::Int(2)])
                .with_declared(SemanticType::Integer),
            Column::from_values("odometer", vec![Cell::Float(10.0), Cell::Null]),
            Column::from_values("condition", vec![Cell::Float(4.0), Cell::Float(3.0)]),
            Column::from_values("mmr", vec![Cell::Float(100.0), Cell::Float(200.0)]),
        ])
        .unwrap();

        let report = FactValidator::car_sales().unwrap().validate_table(&table);

        assert_eq!(report.valid, 1);
        assert_eq!(report.invalid, 1);
        assert_eq!(report.errors[0].0, 1);
    }

    #[test]
    fn test_generic_validate() {
        let schema = json!({
            "type": "object",
            "required": ["name"],
            "properties": { "name": { "type": "string" } }
        });

        assert!(validate(&schema, &json!({ "name": "test" })).is_ok());
        assert!(validate(&schema, &json!({ "age": 42 })).is_err());
        assert!(!is_valid(&schema, &json!({ "name": 1 })));
    }
}
