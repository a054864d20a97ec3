//! Per-column data-quality diagnostics, computed before cleaning.
//!
//! Diagnostics are opt-in per column: a [`ProfileSelection`] lists, for each
//! of the five diagnostics, which columns it should run on. Every table
//! column still gets an entry in the report, empty if it is enrolled in
//! nothing.
//!
//! ```rust,ignore
//! let mut profiler = Profiler::new(&sales, "car_sales");
//! profiler.select_columns(all, ["id_sales"], uniques, all, negatives);
//! let report = profiler.report();
//! let path = ReportStore::with_dir("reports").persist(&report)?;
//! ```

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ProfileResult;
use crate::models::{Column, Table, Value};

/// Date layout of `created_at` and of artifact file names.
pub const REPORT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Log component for profiling runs.
pub const PROFILING_COMPONENT: &str = "profiling";

/// Selection entry standing for every column of the table.
pub const ALL_COLUMNS: &str = "*";

// =============================================================================
// Selection
// =============================================================================

/// Columns enrolled in each diagnostic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileSelection {
    pub data_type: Vec<String>,
    pub duplicate_value: Vec<String>,
    pub unique_value: Vec<String>,
    pub missing_value: Vec<String>,
    pub negative_value: Vec<String>,
}

impl ProfileSelection {
    /// Enrol every listed column in every diagnostic.
    pub fn all<S: AsRef<str>>(columns: &[S]) -> Self {
        let names: Vec<String> = columns.iter().map(|c| c.as_ref().to_string()).collect();
        Self {
            data_type: names.clone(),
            duplicate_value: names.clone(),
            unique_value: names.clone(),
            missing_value: names.clone(),
            negative_value: names,
        }
    }

    /// Expand [`ALL_COLUMNS`] entries against the table's columns.
    pub fn resolve<S: AsRef<str>>(&self, columns: &[S]) -> Self {
        let expand = |list: &Vec<String>| -> Vec<String> {
            if list.iter().any(|c| c == ALL_COLUMNS) {
                columns.iter().map(|c| c.as_ref().to_string()).collect()
            } else {
                list.clone()
            }
        };
        Self {
            data_type: expand(&self.data_type),
            duplicate_value: expand(&self.duplicate_value),
            unique_value: expand(&self.unique_value),
            missing_value: expand(&self.missing_value),
            negative_value: expand(&self.negative_value),
        }
    }

    /// Every column named by any diagnostic, deduplicated.
    pub fn enrolled(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        [
            &self.data_type,
            &self.duplicate_value,
            &self.unique_value,
            &self.missing_value,
            &self.negative_value,
        ]
        .into_iter()
        .flatten()
        .map(String::as_str)
        .filter(|c| seen.insert(*c))
        .collect()
    }
}

// =============================================================================
// Report
// =============================================================================

/// Diagnostics for one column. Absent fields were not requested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnDiagnostics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_value: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_value: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_value: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_value: Option<usize>,
}

impl ColumnDiagnostics {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// An immutable profiling snapshot of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilingReport {
    /// Creation date, `YYYY-MM-DD`
    pub created_at: String,
    /// Profiled table; encoded in the artifact file name, not its body
    #[serde(skip)]
    pub table_name: String,
    /// Column name -> diagnostics, in table column order
    #[serde(with = "ordered_columns")]
    pub report: Vec<(String, ColumnDiagnostics)>,
}

impl ProfilingReport {
    pub fn column(&self, name: &str) -> Option<&ColumnDiagnostics> {
        self.report
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, diagnostics)| diagnostics)
    }
}

/// Serialises report entries as a JSON object without re-sorting the keys.
mod ordered_columns {
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};
    use std::fmt;

    use super::ColumnDiagnostics;

    pub fn serialize<S: Serializer>(
        entries: &[(String, ColumnDiagnostics)],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (column, diagnostics) in entries {
            map.serialize_entry(column, diagnostics)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<(String, ColumnDiagnostics)>, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = Vec<(String, ColumnDiagnostics)>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of column name to diagnostics")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(entry) = access.next_entry()? {
                    entries.push(entry);
                }
                Ok(entries)
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

// =============================================================================
// Profiler
// =============================================================================

/// Computes a [`ProfilingReport`] over a borrowed table.
pub struct Profiler<'a> {
    table: &'a Table,
    table_name: String,
    selection: ProfileSelection,
}

impl<'a> Profiler<'a> {
    pub fn new(table: &'a Table, table_name: impl Into<String>) -> Self {
        Self {
            table,
            table_name: table_name.into(),
            selection: ProfileSelection::default(),
        }
    }

    /// Column names of the profiled table.
    pub fn columns(&self) -> Vec<&str> {
        self.table.column_names()
    }

    /// Choose which columns each diagnostic runs on.
    pub fn select_columns<I, S>(
        &mut self,
        data_type: I,
        duplicate_value: I,
        unique_value: I,
        missing_value: I,
        negative_value: I,
    ) where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        fn collect<I: IntoIterator<Item = S>, S: Into<String>>(cols: I) -> Vec<String> {
            cols.into_iter().map(Into::into).collect()
        }
        self.selection = ProfileSelection {
            data_type: collect(data_type),
            duplicate_value: collect(duplicate_value),
            unique_value: collect(unique_value),
            missing_value: collect(missing_value),
            negative_value: collect(negative_value),
        };
    }

    pub fn with_selection(mut self, selection: ProfileSelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn selection(&self) -> &ProfileSelection {
        &self.selection
    }

    /// Run every requested diagnostic.
    pub fn report(&self) -> ProfilingReport {
        let sel = self.selection.resolve(&self.table.column_names());
        for name in sel.enrolled() {
            if !self.table.has_column(name) {
                tracing::warn!(
                    table = %self.table_name,
                    column = name,
                    "profiling column not found, skipping"
                );
            }
        }

        let enrolled = |list: &[String], name: &str| list.iter().any(|c| c == name);

        let report = self
            .table
            .columns()
            .iter()
            .map(|column| {
                let name = column.name();
                let diagnostics = ColumnDiagnostics {
                    data_type: enrolled(&sel.data_type, name).then(|| data_type(column)),
                    duplicate_value: enrolled(&sel.duplicate_value, name)
                        .then(|| duplicate_count(column)),
                    unique_value: enrolled(&sel.unique_value, name)
                        .then(|| unique_values(column)),
                    missing_value: enrolled(&sel.missing_value, name)
                        .then(|| column.null_count()),
                    negative_value: enrolled(&sel.negative_value, name)
                        .then(|| negative_count(column)),
                };
                (name.to_string(), diagnostics)
            })
            .collect();

        ProfilingReport {
            created_at: Local::now().format(REPORT_DATE_FORMAT).to_string(),
            table_name: self.table_name.clone(),
            report,
        }
    }
}

/// Missing cells collapse to a single null key.
fn cell_key(value: &Value) -> &Value {
    const NULL: &Value = &Value::Null;
    if value.is_null() {
        NULL
    } else {
        value
    }
}

/// Declared type if the column has one, else the type its values share.
fn data_type(column: &Column) -> String {
    if let Some(declared) = column.declared() {
        return declared.to_string();
    }

    let mut kinds = column
        .values
        .iter()
        .filter(|v| !v.is_null())
        .map(Value::type_name);

    let Some(first) = kinds.next() else {
        return "null".to_string();
    };

    let mut kind = first;
    for next in kinds {
        kind = match (kind, next) {
            (a, b) if a == b => a,
            ("integer", "float") | ("float", "integer") => "float",
            _ => return "mixed".to_string(),
        };
    }
    kind.to_string()
}

/// Rows repeating an earlier row's value; the first occurrence is not counted.
fn duplicate_count(column: &Column) -> usize {
    let mut seen = HashSet::new();
    column
        .values
        .iter()
        .filter(|v| !seen.insert(cell_key(*v)))
        .count()
}

/// Distinct values in first-appearance order.
fn unique_values(column: &Column) -> Vec<Value> {
    let mut seen = HashSet::new();
    column
        .values
        .iter()
        .map(cell_key)
        .filter(|v| seen.insert(*v))
        .cloned()
        .collect()
}

/// Values reading as a number below zero; non-numeric cells are ignored.
fn negative_count(column: &Column) -> usize {
    column
        .values
        .iter()
        .filter_map(Value::to_number)
        .filter(|n| *n < 0.0)
        .count()
}

// =============================================================================
// Artifact store
// =============================================================================

/// Directory of dated, table-named report artifacts.
#[derive(Debug, Clone)]
pub struct ReportStore {
    base: PathBuf,
}

impl ReportStore {
    pub fn with_dir(base: impl AsRef<Path>) -> Self {
        Self {
            base: base.as_ref().to_path_buf(),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// `{base}/{table}_{date}.json`
    pub fn path_for(&self, table_name: &str, date: &str) -> PathBuf {
        self.base.join(format!("{table_name}_{date}.json"))
    }

    /// Write the report as pretty JSON and return where it went.
    ///
    /// A second report for the same table on the same day replaces the first.
    pub fn persist(&self, report: &ProfilingReport) -> ProfileResult<PathBuf> {
        fs::create_dir_all(&self.base)?;
        let path = self.path_for(&report.table_name, &report.created_at);
        let json = serde_json::to_string_pretty(report)?;
        fs::write(&path, json)?;
        Ok(path)
    }

    /// Read back the artifact for a table and date.
    pub fn load(&self, table_name: &str, date: &str) -> ProfileResult<ProfilingReport> {
        let content = fs::read_to_string(self.path_for(table_name, date))?;
        let mut report: ProfilingReport = serde_json::from_str(&content)?;
        report.table_name = table_name.to_string();
        Ok(report)
    }

    /// Existing artifacts, sorted by file name.
    pub fn list(&self) -> ProfileResult<Vec<PathBuf>> {
        if !self.base.exists() {
            return Ok(Vec::new());
        }

        let mut paths: Vec<PathBuf> = fs::read_dir(&self.base)?
            .flatten()
            .map(|entry| entry.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == "json"))
            .collect();
        paths.sort();
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SemanticType;
    use tempfile::tempdir;

    fn sales() -> Table {
        Table::new(vec![
            Column::from_values("id_sales", vec![Value::Int(1), Value::Int(2), Value::Int(2), Value::Int(3)]),
            Column::from_values("state", vec!["ca", "ny", "ca", "ca"]),
            Column::from_values(
                "mmr",
                vec![Value::from("-5"), Value::from("abc"), Value::Null, Value::from("12.5")],
            ),
            Column::from_values("age", vec![Value::Int(30), Value::Null, Value::Null, Value::Int(-1)]),
        ])
        .unwrap()
    }

    #[test]
    fn test_only_enrolled_diagnostics_are_present() {
        let table = sales();
        let mut profiler = Profiler::new(&table, "people");
        profiler.select_columns(vec![], vec![], vec![], vec!["age"], vec![]);

        let report = profiler.report();
        let age = report.column("age").unwrap();

        assert_eq!(age.missing_value, Some(2));
        assert!(age.duplicate_value.is_none());

        let json = serde_json::to_value(age).unwrap();
        assert_eq!(json, serde_json::json!({ "missing_value": 2 }));
    }

    #[test]
    fn test_every_column_has_an_entry() {
        let table = sales();
        let report = Profiler::new(&table, "car_sales").report();

        assert_eq!(report.report.len(), 4);
        assert!(report.report.iter().all(|(_, d)| d.is_empty()));
    }

    #[test]
    fn test_duplicate_and_unique() {
        let table = sales();
        let profiler = Profiler::new(&table, "car_sales")
            .with_selection(ProfileSelection::all(&["id_sales", "state", "age"]));
        let report = profiler.report();

        assert_eq!(report.column("id_sales").unwrap().duplicate_value, Some(1));
        assert_eq!(report.column("state").unwrap().duplicate_value, Some(2));
        assert_eq!(
            report.column("state").unwrap().unique_value,
            Some(vec![Value::from("ca"), Value::from("ny")])
        );
        // Nulls are one value: two nulls make one duplicate.
        assert_eq!(report.column("age").unwrap().duplicate_value, Some(1));
        assert_eq!(
            report.column("age").unwrap().unique_value,
            Some(vec![Value::Int(30), Value::Null, Value::Int(-1)])
        );
    }

    #[test]
    fn test_negative_ignores_non_numeric() {
        let table = sales();
        let mut profiler = Profiler::new(&table, "car_sales");
        profiler.select_columns(vec![], vec![], vec![], vec![], vec!["mmr", "age"]);
        let report = profiler.report();

        assert_eq!(report.column("mmr").unwrap().negative_value, Some(1));
        assert_eq!(report.column("age").unwrap().negative_value, Some(1));
    }

    #[test]
    fn test_data_type_derivation() {
        let table = Table::new(vec![
            Column::from_values("i", vec![Value::Int(1), Value::Null]),
            Column::from_values("f", vec![Value::Int(1), Value::Float(1.5)]),
            Column::from_values("s", vec!["a", "b"]).with_declared(SemanticType::Float),
            Column::from_values("m", vec![Value::Int(1), Value::from("a")]),
            Column::from_values("n", vec![Value::Null, Value::Float(f64::NAN)]),
        ])
        .unwrap();
        let columns = table.column_names();
        let report = Profiler::new(&table, "t")
            .with_selection(ProfileSelection::all(&columns))
            .report();

        let dtype = |c: &str| report.column(c).unwrap().data_type.clone().unwrap();
        assert_eq!(dtype("i"), "integer");
        assert_eq!(dtype("f"), "float");
        assert_eq!(dtype("s"), "float");
        assert_eq!(dtype("m"), "mixed");
        assert_eq!(dtype("n"), "null");
    }

    #[test]
    fn test_wildcard_selection() {
        let selection = ProfileSelection {
            missing_value: vec![ALL_COLUMNS.to_string()],
            duplicate_value: vec!["id_sales".to_string()],
            ..ProfileSelection::default()
        };
        let resolved = selection.resolve(&["id_sales", "state"]);

        assert_eq!(resolved.missing_value, vec!["id_sales", "state"]);
        assert_eq!(resolved.duplicate_value, vec!["id_sales"]);
        assert!(resolved.data_type.is_empty());
    }

    #[test]
    fn test_absent_enrolled_column_is_skipped() {
        let table = sales();
        let mut profiler = Profiler::new(&table, "car_sales");
        profiler.select_columns(vec!["ghost"], vec![], vec![], vec![], vec![]);

        let report = profiler.report();
        assert!(report.column("ghost").is_none());
        assert_eq!(report.report.len(), 4);
    }

    #[test]
    fn test_store_persist_load_list() {
        let dir = tempdir().unwrap();
        let store = ReportStore::with_dir(dir.path().join("reports"));
        let table = sales();
        let report = Profiler::new(&table, "car_sales")
            .with_selection(ProfileSelection::all(&["id_sales"]))
            .report();

        let path = store.persist(&report).unwrap();
        let expected_name = format!("car_sales_{}.json", report.created_at);
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), expected_name);

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw.get("created_at").is_some());
        assert!(raw.get("report").is_some());
        assert!(raw.get("table_name").is_none());

        let loaded = store.load("car_sales", &report.created_at).unwrap();
        assert_eq!(loaded, report);
        assert_eq!(store.list().unwrap(), vec![path]);
    }

    #[test]
    fn test_report_keeps_table_column_order() {
        let table = sales();
        let report = Profiler::new(&table, "car_sales")
            .with_selection(ProfileSelection::all(&[ALL_COLUMNS]))
            .report();

        let names: Vec<&str> = report.report.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(names, vec!["id_sales", "state", "mmr", "age"]);

        let json = serde_json::to_string(&report).unwrap();
        let position = |column: &str| json.find(&format!("\"{column}\":")).unwrap();
        assert!(position("id_sales") < position("state"));
        assert!(position("state") < position("mmr"));
        assert!(position("mmr") < position("age"));

        let back: ProfilingReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.report, report.report);
    }

    #[test]
    fn test_store_list_missing_dir() {
        let dir = tempdir().unwrap();
        let store = ReportStore::with_dir(dir.path().join("none"));
        assert!(store.list().unwrap().is_empty());
    }
}
