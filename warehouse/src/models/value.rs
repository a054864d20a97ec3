//! Cell values and semantic column types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

// =============================================================================
// Value
// =============================================================================

/// A single cell.
///
/// Serialises as a plain JSON scalar (`null`, `true`, `42`, `4.2`, `"text"`).
/// Floats compare and hash by their normalised bit pattern so values can be
/// used as hash keys for duplicate detection, membership tests and joins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Missing value.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float. NaN counts as missing.
    Float(f64),
    /// UTF-8 text.
    Text(String),
}

impl Value {
    /// Whether the cell is missing (null or a NaN float).
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    /// Runtime type name of the cell.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(f) if f.is_nan() => "null",
            Value::Float(_) => "float",
            Value::Text(_) => "string",
        }
    }

    /// Borrow the text content, if this is a text cell.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Best-effort numeric reading. Text is trimmed before parsing;
    /// anything that does not read as a number yields `None`.
    pub fn to_number(&self) -> Option<f64> {
        let n = match self {
            Value::Null => return None,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Int(i) => *i as f64,
            Value::Float(f) => *f,
            Value::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        if n.is_nan() {
            None
        } else {
            Some(n)
        }
    }

    /// Textual rendering used when writing cells out. `None` for missing cells.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Float(f) if f.is_nan() => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(format_float(*f)),
            Value::Text(s) => Some(s.clone()),
        }
    }

    /// Convert to a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
        }
    }

    fn key_bits(f: f64) -> u64 {
        if f.is_nan() {
            f64::NAN.to_bits()
        } else if f == 0.0 {
            0.0f64.to_bits()
        } else {
            f.to_bits()
        }
    }
}

/// Render a float with at least one decimal for whole numbers (`10.0`).
pub fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        f.to_string()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => Self::key_bits(*a) == Self::key_bits(*b),
            (Value::Text(a), Value::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => Self::key_bits(*f).hash(state),
            Value::Text(s) => s.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_text() {
            Some(text) => write!(f, "{text}"),
            None => write!(f, "null"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<&serde_json::Value> for Value {
    fn from(v: &serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Value::Int)
                .or_else(|| n.as_f64().map(Value::Float))
                .unwrap_or(Value::Null),
            serde_json::Value::String(s) => Value::Text(s.clone()),
            // Nested structures have no cell representation; keep their JSON text.
            other => Value::Text(other.to_string()),
        }
    }
}

// =============================================================================
// Semantic Type
// =============================================================================

/// Declared semantic type of a column, resolved at cast time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    Integer,
    Float,
    String,
}

impl SemanticType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticType::Integer => "integer",
            SemanticType::Float => "float",
            SemanticType::String => "string",
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SemanticType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "integer" | "int" | "int64" | "i64" => Ok(SemanticType::Integer),
            "float" | "float64" | "f64" | "double" => Ok(SemanticType::Float),
            "string" | "str" | "text" | "object" => Ok(SemanticType::String),
            other => Err(format!("Unknown type: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_nan_is_missing() {
        assert!(Value::Null.is_null());
        assert!(Value::Float(f64::NAN).is_null());
        assert!(!Value::Text(String::new()).is_null());
        assert!(!Value::Int(0).is_null());
    }

    #[test]
    fn test_float_keys_hash_consistently() {
        let mut seen = HashSet::new();
        assert!(seen.insert(Value::Float(0.0)));
        assert!(!seen.insert(Value::Float(-0.0)));
        assert!(seen.insert(Value::Int(0)));
        assert!(seen.insert(Value::Text("0".into())));
    }

    #[test]
    fn test_to_number() {
        assert_eq!(Value::from(" -3.5 ").to_number(), Some(-3.5));
        assert_eq!(Value::from("abc").to_number(), None);
        assert_eq!(Value::from("NaN").to_number(), None);
        assert_eq!(Value::Int(-2).to_number(), Some(-2.0));
        assert_eq!(Value::Null.to_number(), None);
    }

    #[test]
    fn test_json_round_trip_scalars() {
        let json = serde_json::json!([null, true, 3, 2.5, "x"]);
        let values: Vec<Value> = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Bool(true),
                Value::Int(3),
                Value::Float(2.5),
                Value::Text("x".into())
            ]
        );
        assert_eq!(serde_json::to_value(&values).unwrap(), json);
    }

    #[test]
    fn test_float_rendering() {
        assert_eq!(Value::Float(10.0).to_text().as_deref(), Some("10.0"));
        assert_eq!(Value::Float(20.5).to_text().as_deref(), Some("20.5"));
        assert_eq!(Value::Null.to_string(), "null");
    }

    #[test]
    fn test_semantic_type_aliases() {
        assert_eq!("int64".parse::<SemanticType>(), Ok(SemanticType::Integer));
        assert_eq!("Float".parse::<SemanticType>(), Ok(SemanticType::Float));
        assert_eq!("object".parse::<SemanticType>(), Ok(SemanticType::String));
        assert!("decimal".parse::<SemanticType>().is_err());
    }
}
