//! Domain models for the warehouse engine.
//!
//! - [`Value`] - a tagged cell value (null, boolean, integer, float, text)
//! - [`SemanticType`] - declared column type used for casting
//! - [`ColumnSpec`] / [`Column`] - a named, optionally typed cell sequence
//! - [`Table`] - ordered, equal-length, uniquely named columns

pub mod table;
pub mod value;

pub use table::{Column, ColumnSpec, Table};
pub use value::{format_float, SemanticType, Value};
