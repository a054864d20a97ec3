//! Left joins against lookup tables.
//!
//! Primary rows are never dropped: a row without a lookup match keeps its
//! own columns and gets nulls for the lookup's. Null keys never match.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::error::{TransformError, TransformResult};
use crate::models::{Column, Table, Value};

/// Suffix for a primary column whose name the lookup also uses.
pub const LEFT_SUFFIX: &str = "_x";
/// Suffix for a lookup column whose name the primary also uses.
pub const RIGHT_SUFFIX: &str = "_y";

/// Key pair of a join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinKeys {
    pub left_on: String,
    pub right_on: String,
}

impl JoinKeys {
    pub fn new(left_on: impl Into<String>, right_on: impl Into<String>) -> Self {
        Self {
            left_on: left_on.into(),
            right_on: right_on.into(),
        }
    }
}

/// What to do when a primary row matches several lookup rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinCardinality {
    /// Fail the join; the primary row count must not change.
    #[default]
    Enforce,
    /// Emit one row per match and warn.
    Allow,
}

impl fmt::Display for JoinCardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinCardinality::Enforce => f.write_str("enforce"),
            JoinCardinality::Allow => f.write_str("allow"),
        }
    }
}

impl FromStr for JoinCardinality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "enforce" => Ok(JoinCardinality::Enforce),
            "allow" => Ok(JoinCardinality::Allow),
            _ => Err("expected 'enforce' or 'allow'".to_string()),
        }
    }
}

/// Left join `left` to `right` on `keys`.
pub fn left_join(
    left: &Table,
    right: &Table,
    keys: &JoinKeys,
    cardinality: JoinCardinality,
) -> TransformResult<Table> {
    let left_key = left
        .column(&keys.left_on)
        .ok_or_else(|| TransformError::MissingColumn(keys.left_on.clone()))?;
    let right_key = right
        .column(&keys.right_on)
        .ok_or_else(|| TransformError::MissingColumn(keys.right_on.clone()))?;

    let mut index: HashMap<&Value, Vec<usize>> = HashMap::new();
    for (row, value) in right_key.values.iter().enumerate() {
        if !value.is_null() {
            index.entry(value).or_default().push(row);
        }
    }

    let mut left_rows = Vec::with_capacity(left.row_count());
    let mut right_rows = Vec::with_capacity(left.row_count());

    for (row, value) in left_key.values.iter().enumerate() {
        let matches = if value.is_null() {
            None
        } else {
            index.get(value)
        };

        match matches {
            Some(found) if found.len() > 1 && cardinality == JoinCardinality::Enforce => {
                return Err(TransformError::JoinCardinality {
                    left_on: keys.left_on.clone(),
                    right_on: keys.right_on.clone(),
                    key: format!("'{value}'"),
                    matches: found.len(),
                });
            }
            Some(found) => {
                for r in found {
                    left_rows.push(Some(row));
                    right_rows.push(Some(*r));
                }
            }
            None => {
                left_rows.push(Some(row));
                right_rows.push(None);
            }
        }
    }

    if left_rows.len() != left.row_count() {
        tracing::warn!(
            left_on = %keys.left_on,
            right_on = %keys.right_on,
            before = left.row_count(),
            after = left_rows.len(),
            "join multiplied primary rows"
        );
    }

    let shared_key = keys.left_on == keys.right_on;
    let left_part = left.take_rows(&left_rows).into_columns();
    let right_part: Vec<Column> = right
        .take_rows(&right_rows)
        .into_columns()
        .into_iter()
        .filter(|c| !(shared_key && c.name() == keys.right_on))
        .collect();

    Ok(Table::new(merge_names(left_part, right_part))?)
}

/// Concatenate both sides, suffixing names that appear on both.
fn merge_names(mut left: Vec<Column>, mut right: Vec<Column>) -> Vec<Column> {
    let left_names: HashSet<String> = left.iter().map(|c| c.name().to_string()).collect();
    let right_names: HashSet<String> = right.iter().map(|c| c.name().to_string()).collect();
    let overlap: HashSet<&String> = left_names.intersection(&right_names).collect();

    let mut taken: HashSet<String> = left_names
        .iter()
        .chain(right_names.iter())
        .filter(|n| !overlap.contains(n))
        .cloned()
        .collect();

    for (columns, suffix) in [(&mut left, LEFT_SUFFIX), (&mut right, RIGHT_SUFFIX)] {
        for column in columns.iter_mut() {
            if overlap.contains(&column.spec.name) {
                let mut candidate = format!("{}{suffix}", column.spec.name);
                while taken.contains(&candidate) {
                    candidate.push_str(suffix);
                }
                taken.insert(candidate.clone());
                column.spec.name = candidate;
            }
        }
    }

    left.extend(right);
    left
}

/// Fold two lookups into the primary table, one left join after the other.
pub fn join(
    primary: &Table,
    lookup_a: &Table,
    keys_a: &JoinKeys,
    lookup_b: &Table,
    keys_b: &JoinKeys,
    cardinality: JoinCardinality,
) -> TransformResult<Table> {
    let merged = left_join(primary, lookup_a, keys_a, cardinality)?;
    left_join(&merged, lookup_b, keys_b, cardinality)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(records: serde_json::Value) -> Table {
        Table::from_records(records.as_array().unwrap()).unwrap()
    }

    #[test]
    fn test_state_lookup_scenario() {
        let sales = table(json!([{ "state": "CA" }, { "state": "zz" }]));
        let states = table(json!([{ "code": "CA", "name": "California" }]));

        let result = left_join(
            &sales,
            &states,
            &JoinKeys::new("state", "code"),
            JoinCardinality::Enforce,
        )
        .unwrap();

        assert_eq!(result.row_count(), 2);
        let name = &result.column("name").unwrap().values;
        assert_eq!(name[0], Value::from("California"));
        assert_eq!(name[1], Value::Null);
        assert_eq!(result.column("code").unwrap().values[1], Value::Null);
    }

    #[test]
    fn test_two_lookups_preserve_rows() {
        let sales = table(json!([
            { "id_sales": 1, "brand_car": "bmw", "state": "ca" },
            { "id_sales": 2, "brand_car": "kia", "state": "ny" },
            { "id_sales": 3, "brand_car": "audi", "state": null },
        ]));
        let brands = table(json!([
            { "brand_car_id": 10, "brand_name": "bmw" },
            { "brand_car_id": 20, "brand_name": "kia" },
        ]));
        let states = table(json!([
            { "id_state": 5, "code": "ca", "name": "california" },
            { "id_state": 6, "code": null, "name": "nowhere" },
        ]));

        let result = join(
            &sales,
            &brands,
            &JoinKeys::new("brand_car", "brand_name"),
            &states,
            &JoinKeys::new("state", "code"),
            JoinCardinality::Enforce,
        )
        .unwrap();

        assert_eq!(result.row_count(), sales.row_count());
        assert_eq!(
            result.column("brand_car_id").unwrap().values,
            vec![Value::Int(10), Value::Int(20), Value::Null]
        );
        assert_eq!(
            result.column("id_state").unwrap().values,
            vec![Value::Int(5), Value::Null, Value::Null]
        );
        // Unmatched rows get nulls in every lookup column, not only the key.
        assert_eq!(
            result.column("brand_name").unwrap().values,
            vec![Value::from("bmw"), Value::from("kia"), Value::Null]
        );
        for column in ["code", "name"] {
            let values = &result.column(column).unwrap().values;
            assert!(!values[0].is_null());
            assert_eq!(values[1..], [Value::Null, Value::Null]);
        }
    }

    #[test]
    fn test_overlapping_names_are_suffixed() {
        let left = table(json!([{ "k": 1, "name": "a", "name_x": "taken" }]));
        let right = table(json!([{ "k": 1, "name": "b" }]));

        let result = left_join(&left, &right, &JoinKeys::new("k", "k"), JoinCardinality::Enforce)
            .unwrap();

        assert_eq!(result.column_names(), vec!["k", "name_x_x", "name_x", "name_y"]);
        // "name_x" from the primary is itself not an overlap, so it keeps its name;
        // the suffixed primary "name" must avoid it.
        assert_eq!(result.column("name_x_x").unwrap().values[0], Value::from("a"));
        assert_eq!(result.column("name_y").unwrap().values[0], Value::from("b"));
    }

    #[test]
    fn test_many_to_many_enforced() {
        let left = table(json!([{ "k": "a" }]));
        let right = table(json!([{ "k2": "a", "v": 1 }, { "k2": "a", "v": 2 }]));

        let result = left_join(&left, &right, &JoinKeys::new("k", "k2"), JoinCardinality::Enforce);
        assert!(matches!(result, Err(TransformError::JoinCardinality { matches: 2, .. })));
    }

    #[test]
    fn test_many_to_many_allowed() {
        let left = table(json!([{ "k": "a" }, { "k": "b" }]));
        let right = table(json!([{ "k2": "a", "v": 1 }, { "k2": "a", "v": 2 }]));

        let result =
            left_join(&left, &right, &JoinKeys::new("k", "k2"), JoinCardinality::Allow).unwrap();
        assert_eq!(result.row_count(), 3);
    }

    #[test]
    fn test_missing_key_column() {
        let left = table(json!([{ "k": "a" }]));
        let right = table(json!([{ "code": "a" }]));

        let result = left_join(&left, &right, &JoinKeys::new("state", "code"), JoinCardinality::Enforce);
        assert_eq!(result, Err(TransformError::MissingColumn("state".into())));
    }

    #[test]
    fn test_cardinality_parsing() {
        assert_eq!("Allow".parse::<JoinCardinality>(), Ok(JoinCardinality::Allow));
        assert!("strict".parse::<JoinCardinality>().is_err());
    }
}
