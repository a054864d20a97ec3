//! Column type coercion.
//!
//! Coercion never fails a row: a value that does not convert becomes null.
//! A column whose target type name is not understood is left untouched and
//! reported, and the remaining columns are still cast.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::TransformResult;
use crate::models::{format_float, Column, SemanticType, Table, Value};

/// What a cast changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastReport {
    /// Column -> cells that were present before and null after
    pub nulls_introduced: BTreeMap<String, usize>,
    /// Column -> reason it was not cast
    pub failures: BTreeMap<String, String>,
}

impl CastReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.nulls_introduced.values().all(|n| *n == 0)
    }

    /// One line per noteworthy column.
    pub fn warnings(&self) -> Vec<String> {
        let coerced = self
            .nulls_introduced
            .iter()
            .filter(|(_, n)| **n > 0)
            .map(|(column, n)| format!("{column}: {n} value(s) could not be coerced"));
        let failed = self
            .failures
            .iter()
            .map(|(column, reason)| format!("{column}: {reason}"));
        coerced.chain(failed).collect()
    }
}

/// Cast output.
#[derive(Debug, Clone, PartialEq)]
pub struct Cast {
    pub table: Table,
    pub report: CastReport,
}

/// Coerce each column present in both `table` and `types` to its type.
///
/// `types` maps column names to type names (`integer`, `float`, `string`
/// and their aliases). Columns absent from the table are ignored.
pub fn cast(table: &Table, types: &BTreeMap<String, String>) -> TransformResult<Cast> {
    let mut report = CastReport::default();

    let columns: Vec<Column> = table
        .columns()
        .iter()
        .map(|column| {
            let Some(type_name) = types.get(column.name()) else {
                return column.clone();
            };

            let target = match type_name.parse::<SemanticType>() {
                Ok(target) => target,
                Err(reason) => {
                    tracing::warn!(column = column.name(), %reason, "error casting column");
                    report
                        .failures
                        .insert(column.name().to_string(), reason);
                    return column.clone();
                }
            };

            let (cast, nulls) = cast_column(column, target);
            if nulls > 0 {
                tracing::warn!(
                    column = column.name(),
                    target = %target,
                    nulls,
                    "values coerced to null"
                );
            }
            report.nulls_introduced.insert(column.name().to_string(), nulls);
            cast
        })
        .collect();

    Ok(Cast {
        table: Table::new(columns)?,
        report,
    })
}

/// Cast one column; also returns how many present cells became null.
pub fn cast_column(column: &Column, target: SemanticType) -> (Column, usize) {
    let coerce = match target {
        SemanticType::Integer => coerce_integer,
        SemanticType::Float => coerce_float,
        SemanticType::String => coerce_string,
    };

    let mut nulls = 0;
    let values = column
        .values
        .iter()
        .map(|value| {
            let cast = coerce(value);
            if cast.is_null() && !value.is_null() {
                nulls += 1;
            }
            cast
        })
        .collect();

    let cast = Column {
        spec: column.spec.clone(),
        values,
    }
    .with_declared(target);
    (cast, nulls)
}

/// Integer coercion; finite fractions truncate toward zero.
pub fn coerce_integer(value: &Value) -> Value {
    match value {
        Value::Int(i) => Value::Int(*i),
        Value::Text(s) => match s.trim().parse::<i64>() {
            Ok(i) => Value::Int(i),
            Err(_) => float_to_integer(value.to_number()),
        },
        other => float_to_integer(other.to_number()),
    }
}

fn float_to_integer(n: Option<f64>) -> Value {
    match n {
        // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive.
        Some(f) if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
            Value::Int(f.trunc() as i64)
        }
        _ => Value::Null,
    }
}

/// Float coercion.
pub fn coerce_float(value: &Value) -> Value {
    value.to_number().map(Value::Float).unwrap_or(Value::Null)
}

/// String coercion; always succeeds for present values.
pub fn coerce_string(value: &Value) -> Value {
    match value {
        Value::Text(s) => Value::Text(s.clone()),
        Value::Float(f) if !f.is_nan() => Value::Text(format_float(*f)),
        other => other.to_text().map(Value::Text).unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_price_scenario() {
        let table = Table::new(vec![Column::from_values("price", vec!["10", "abc", "20.5"])]).unwrap();

        let result = cast(&table, &types(&[("price", "float")])).unwrap();

        let price = result.table.column("price").unwrap();
        assert_eq!(
            price.values,
            vec![Value::Float(10.0), Value::Null, Value::Float(20.5)]
        );
        assert_eq!(price.declared(), Some(SemanticType::Float));
        assert_eq!(result.report.nulls_introduced["price"], 1);
        assert!(!result.report.is_clean());
    }

    #[test]
    fn test_cast_is_idempotent() {
        let table = Table::new(vec![
            Column::from_values("year", vec!["2015", " 2014 ", "x"]),
            Column::from_values("mmr", vec!["1.5", "2", "3"]),
            Column::from_values("color", vec![Value::Int(1), Value::Float(2.0), Value::Null]),
        ])
        .unwrap();
        let map = types(&[("year", "integer"), ("mmr", "float"), ("color", "string")]);

        let once = cast(&table, &map).unwrap().table;
        let twice = cast(&once, &map).unwrap().table;

        assert_eq!(once, twice);
        assert_eq!(
            once.column("year").unwrap().values,
            vec![Value::Int(2015), Value::Int(2014), Value::Null]
        );
        assert_eq!(
            once.column("color").unwrap().values,
            vec![Value::from("1"), Value::from("2.0"), Value::Null]
        );
        assert_eq!(once.row_count(), 3);
    }

    #[test]
    fn test_unknown_type_does_not_abort_other_columns() {
        let table = Table::new(vec![
            Column::from_values("a", vec!["1"]),
            Column::from_values("b", vec!["2"]),
        ])
        .unwrap();

        let result = cast(&table, &types(&[("a", "decimal"), ("b", "int")])).unwrap();

        assert_eq!(result.table.column("a").unwrap().values, vec![Value::from("1")]);
        assert_eq!(result.table.column("b").unwrap().values, vec![Value::Int(2)]);
        assert!(result.report.failures.contains_key("a"));
        assert_eq!(result.report.warnings().len(), 1);
    }

    #[test]
    fn test_columns_missing_from_table_are_ignored() {
        let table = Table::new(vec![Column::from_values("a", vec!["1"])]).unwrap();
        let result = cast(&table, &types(&[("zzz", "float")])).unwrap();

        assert_eq!(result.table, table);
        assert!(result.report.is_clean());
    }

    #[test]
    fn test_integer_coercion() {
        assert_eq!(coerce_integer(&Value::from("3.9")), Value::Int(3));
        assert_eq!(coerce_integer(&Value::Float(-2.7)), Value::Int(-2));
        assert_eq!(coerce_integer(&Value::Float(f64::INFINITY)), Value::Null);
        assert_eq!(coerce_integer(&Value::Bool(true)), Value::Int(1));
        assert_eq!(coerce_integer(&Value::Null), Value::Null);
    }

    #[test]
    fn test_float_round_trip() {
        for raw in ["0", "-1.25", "1e3", "99999.5"] {
            let expected: f64 = raw.parse().unwrap();
            assert_eq!(coerce_float(&Value::from(raw)), Value::Float(expected));
        }
    }
}
