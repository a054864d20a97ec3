//! Row filters and column reshaping steps.
//!
//! Every step borrows its input and returns a new table, so a failed step
//! leaves the caller holding the unmodified input.

use std::collections::{BTreeMap, HashSet};

use crate::error::{TransformError, TransformResult};
use crate::models::{Column, Table, Value};

/// Fail with `MissingColumn` for the first name the table lacks.
pub(crate) fn require_columns<S: AsRef<str>>(table: &Table, columns: &[S]) -> TransformResult<()> {
    match columns.iter().find(|c| !table.has_column(c.as_ref())) {
        Some(missing) => Err(TransformError::MissingColumn(missing.as_ref().to_string())),
        None => Ok(()),
    }
}

/// Remove rows with a missing value in any of `columns`.
pub fn drop_missing<S: AsRef<str>>(table: &Table, columns: &[S]) -> TransformResult<Table> {
    require_columns(table, columns)?;

    let checked: Vec<&Column> = columns
        .iter()
        .filter_map(|c| table.column(c.as_ref()))
        .collect();

    let keep: Vec<bool> = (0..table.row_count())
        .map(|row| checked.iter().all(|c| !c.values[row].is_null()))
        .collect();

    Ok(table.filter_rows(&keep))
}

/// Remove rows whose value in any of `columns` is one of `invalid`.
///
/// Columns are applied in order, each filtering what the previous left.
pub fn drop_invalid<S: AsRef<str>>(
    table: &Table,
    columns: &[S],
    invalid: &[Value],
) -> TransformResult<Table> {
    require_columns(table, columns)?;

    let invalid: HashSet<&Value> = invalid.iter().collect();
    let mut current = table.clone();

    for name in columns {
        let Some(column) = current.column(name.as_ref()) else {
            continue;
        };
        let keep: Vec<bool> = column.values.iter().map(|v| !invalid.contains(v)).collect();
        if keep.iter().all(|k| *k) {
            continue;
        }
        current = current.filter_rows(&keep);
    }

    Ok(current)
}

/// Lower-case every value in `columns`. Missing cells stay missing.
pub fn normalize_case<S: AsRef<str>>(table: &Table, columns: &[S]) -> TransformResult<Table> {
    require_columns(table, columns)?;

    for name in columns {
        if let Some(bad) = table.column(name.as_ref()).and_then(Column::first_non_text) {
            return Err(TransformError::NotTextual {
                column: name.as_ref().to_string(),
                found: bad.type_name().to_string(),
            });
        }
    }

    let targets: HashSet<&str> = columns.iter().map(|c| c.as_ref()).collect();
    let lowered = table
        .columns()
        .iter()
        .map(|column| {
            if !targets.contains(column.name()) {
                return column.clone();
            }
            let values = column
                .values
                .iter()
                .map(|v| match v {
                    Value::Text(s) => Value::Text(s.to_lowercase()),
                    other => other.clone(),
                })
                .collect();
            Column {
                spec: column.spec.clone(),
                values,
            }
        })
        .collect();

    Ok(Table::new(lowered)?)
}

/// Result of a projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub table: Table,
    /// Requested names the table did not have.
    pub skipped: Vec<String>,
}

/// Keep the requested columns that exist, in request order.
///
/// Absent names are skipped with a warning. Repeated names are kept once.
pub fn project<S: AsRef<str>>(table: &Table, columns: &[S]) -> TransformResult<Projection> {
    let mut seen = HashSet::new();
    let mut kept = Vec::new();
    let mut skipped = Vec::new();

    for name in columns.iter().map(|c| c.as_ref()) {
        if !seen.insert(name) {
            continue;
        }
        match table.column(name) {
            Some(column) => kept.push(column.clone()),
            None => {
                tracing::warn!(column = name, "column not found in table, skipping");
                skipped.push(name.to_string());
            }
        }
    }

    Ok(Projection {
        table: Table::new(kept)?,
        skipped,
    })
}

/// Rename the columns named in `mapping`; others pass through.
pub fn rename(table: &Table, mapping: &BTreeMap<String, String>) -> TransformResult<Table> {
    let renamed: Vec<Column> = table
        .columns()
        .iter()
        .map(|column| {
            let mut column = column.clone();
            if let Some(new_name) = mapping.get(column.name()) {
                column.spec.name = new_name.clone();
            }
            column
        })
        .collect();

    let mut seen = HashSet::new();
    if let Some(dup) = renamed.iter().find(|c| !seen.insert(c.name())) {
        return Err(TransformError::DuplicateColumn {
            step: "rename".to_string(),
            column: dup.name().to_string(),
        });
    }

    Ok(Table::new(renamed)?)
}
