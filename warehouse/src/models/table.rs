//! Column-oriented in-memory table.
//!
//! A [`Table`] is an ordered list of named [`Column`]s of equal length.
//! Rows correspond positionally across columns. Every constructor checks
//! the two invariants (equal lengths, unique names), so a `Table` that
//! exists is always well-formed.

use serde::{Deserialize, Serialize};
use serde_json::Map;
use std::collections::HashSet;

use super::value::{SemanticType, Value};
use crate::error::{TableError, TableResult};

/// Name and declared semantic type of a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    /// Set by the cast step; `None` until then.
    #[serde(default)]
    pub declared: Option<SemanticType>,
}

/// A named sequence of cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub spec: ColumnSpec,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            spec: ColumnSpec {
                name: name.into(),
                declared: None,
            },
            values,
        }
    }

    /// Build a column from anything convertible to [`Value`].
    pub fn from_values<V: Into<Value>>(name: impl Into<String>, values: Vec<V>) -> Self {
        Self::new(name, values.into_iter().map(Into::into).collect())
    }

    pub fn with_declared(mut self, declared: SemanticType) -> Self {
        self.spec.declared = Some(declared);
        self
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn declared(&self) -> Option<SemanticType> {
        self.spec.declared
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of missing cells.
    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }

    /// First present cell that is not text, if any.
    pub fn first_non_text(&self) -> Option<&Value> {
        self.values
            .iter()
            .find(|v| !v.is_null() && !matches!(v, Value::Text(_)))
    }
}

/// An ordered collection of equal-length, uniquely named columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    /// Build a table, checking lengths and name uniqueness.
    pub fn new(columns: Vec<Column>) -> TableResult<Self> {
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name()) {
                return Err(TableError::DuplicateColumn(column.name().to_string()));
            }
        }

        if let Some(first) = columns.first() {
            let expected = first.len();
            if let Some(bad) = columns.iter().find(|c| c.len() != expected) {
                return Err(TableError::LengthMismatch {
                    column: bad.name().to_string(),
                    expected,
                    found: bad.len(),
                });
            }
        }

        Ok(Self { columns })
    }

    /// Table with no columns and no rows.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a table from a header and row-major values.
    ///
    /// Short rows are padded with nulls; cells beyond the header are ignored.
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<Value>>) -> TableResult<Self> {
        let mut columns: Vec<Column> = headers
            .into_iter()
            .map(|h| Column::new(h, Vec::with_capacity(rows.len())))
            .collect();

        for row in rows {
            let mut cells = row.into_iter();
            for column in &mut columns {
                column.values.push(cells.next().unwrap_or(Value::Null));
            }
        }

        Self::new(columns)
    }

    /// Build a table from JSON objects, one per row.
    ///
    /// Columns appear in first-seen order; keys missing from a record are null.
    pub fn from_records(records: &[serde_json::Value]) -> TableResult<Self> {
        let mut headers: Vec<String> = Vec::new();
        let mut known = HashSet::new();

        for (idx, record) in records.iter().enumerate() {
            let obj = record.as_object().ok_or(TableError::NotAnObject(idx))?;
            for key in obj.keys() {
                if known.insert(key.clone()) {
                    headers.push(key.clone());
                }
            }
        }

        let columns = headers
            .into_iter()
            .map(|name| {
                let values = records
                    .iter()
                    .map(|r| r.get(&name).map(Value::from).unwrap_or(Value::Null))
                    .collect();
                Column::new(name, values)
            })
            .collect();

        Self::new(columns)
    }

    /// Rows as JSON objects.
    pub fn to_records(&self) -> Vec<serde_json::Value> {
        (0..self.row_count())
            .map(|row| {
                let obj: Map<String, serde_json::Value> = self
                    .columns
                    .iter()
                    .map(|c| (c.name().to_string(), c.values[row].to_json()))
                    .collect();
                serde_json::Value::Object(obj)
            })
            .collect()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Current column names, in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Keep the rows whose mask entry is `true`.
    pub fn filter_rows(&self, keep: &[bool]) -> Table {
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                spec: c.spec.clone(),
                values: c
                    .values
                    .iter()
                    .zip(keep)
                    .filter(|(_, k)| **k)
                    .map(|(v, _)| v.clone())
                    .collect(),
            })
            .collect();
        Table { columns }
    }

    /// Gather rows by index; `None` produces an all-null row.
    pub fn take_rows(&self, indices: &[Option<usize>]) -> Table {
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                spec: c.spec.clone(),
                values: indices
                    .iter()
                    .map(|idx| match idx {
                        Some(i) => c.values.get(*i).cloned().unwrap_or(Value::Null),
                        None => Value::Null,
                    })
                    .collect(),
            })
            .collect();
        Table { columns }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rejects_duplicate_names() {
        let result = Table::new(vec![
            Column::from_values("a", vec![1i64]),
            Column::from_values("a", vec![2i64]),
        ]);
        assert_eq!(result, Err(TableError::DuplicateColumn("a".into())));
    }

    #[test]
    fn test_rejects_ragged_columns() {
        let result = Table::new(vec![
            Column::from_values("a", vec![1i64, 2]),
            Column::from_values("b", vec![1i64]),
        ]);
        assert!(matches!(result, Err(TableError::LengthMismatch { .. })));
    }

    #[test]
    fn test_from_rows_pads_short_rows() {
        let table = Table::from_rows(
            vec!["a".into(), "b".into()],
            vec![vec![Value::from("1")], vec![Value::from("2"), Value::from("3"), Value::from("4")]],
        )
        .unwrap();

        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column("b").unwrap().values, vec![Value::Null, Value::from("3")]);
    }

    #[test]
    fn test_from_records_first_seen_order() {
        let records = vec![
            json!({"state": "CA"}),
            json!({"state": "zz", "price": 10}),
        ];
        let table = Table::from_records(&records).unwrap();

        assert_eq!(table.column_names(), vec!["state", "price"]);
        assert_eq!(table.column("price").unwrap().values, vec![Value::Null, Value::Int(10)]);
        assert_eq!(table.to_records()[1]["price"], 10);
    }

    #[test]
    fn test_from_records_rejects_non_objects() {
        let result = Table::from_records(&[json!([1, 2])]);
        assert_eq!(result, Err(TableError::NotAnObject(0)));
    }

    #[test]
    fn test_filter_and_take() {
        let table = Table::new(vec![Column::from_values("a", vec![1i64, 2, 3])]).unwrap();

        let filtered = table.filter_rows(&[true, false, true]);
        assert_eq!(filtered.column("a").unwrap().values, vec![Value::Int(1), Value::Int(3)]);

        let taken = table.take_rows(&[Some(2), None]);
        assert_eq!(taken.column("a").unwrap().values, vec![Value::Int(3), Value::Null]);
    }
}
