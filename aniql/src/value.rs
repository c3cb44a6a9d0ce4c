use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Scalar kinds understood by the schema registry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarKind {
    Integer,
    Float,
    String,
    Boolean,
    Timestamp,
}

impl ScalarKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, ScalarKind::Integer | ScalarKind::Float)
    }

    /// Kinds that admit ordered comparison operators (gt/lt/gte/lte).
    pub fn is_comparable(self) -> bool {
        matches!(
            self,
            ScalarKind::Integer | ScalarKind::Float | ScalarKind::Timestamp
        )
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScalarKind::Integer => "integer",
            ScalarKind::Float => "float",
            ScalarKind::String => "string",
            ScalarKind::Boolean => "boolean",
            ScalarKind::Timestamp => "timestamp",
        };
        f.write_str(s)
    }
}

/// Backend-neutral scalar value carried through predicate plans, payloads
/// and result records.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    DateTime(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The scalar kind this value would satisfy, `None` for `Null`.
    pub fn kind(&self) -> Option<ScalarKind> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ScalarKind::Boolean),
            Value::Int(_) => Some(ScalarKind::Integer),
            Value::Float(_) => Some(ScalarKind::Float),
            Value::String(_) => Some(ScalarKind::String),
            Value::DateTime(_) => Some(ScalarKind::Timestamp),
        }
    }

    /// Whether this value can be stored in a field of the given kind.
    /// Integers are accepted for float fields.
    pub fn fits(&self, kind: ScalarKind) -> bool {
        match (self, kind) {
            (Value::Null, _) => true,
            (Value::Int(_), ScalarKind::Float) => true,
            (v, k) => v.kind() == Some(k),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Total order used for sorting and cursor comparison. `Null` sorts
    /// before every non-null value in ascending order; mixed-kind values
    /// fall back to a stable kind rank so sorting never panics.
    pub fn compare(&self, other: &Value) -> Ordering {
        use Value::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Int(a), Float(b)) => (*a as f64).partial_cmp(b).unwrap_or(Ordering::Equal),
            (Float(a), Int(b)) => a.partial_cmp(&(*b as f64)).unwrap_or(Ordering::Equal),
            (String(a), String(b)) => a.cmp(b),
            (DateTime(a), DateTime(b)) => a.cmp(b),
            (a, b) => kind_rank(a).cmp(&kind_rank(b)),
        }
    }
}

fn kind_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Int(_) => 2,
        Value::Float(_) => 2,
        Value::String(_) => 3,
        Value::DateTime(_) => 4,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{:?}", s),
            Value::DateTime(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sorts_first_ascending() {
        assert_eq!(Value::Null.compare(&Value::Int(0)), Ordering::Less);
        assert_eq!(Value::Int(0).compare(&Value::Null), Ordering::Greater);
        assert_eq!(Value::Null.compare(&Value::Null), Ordering::Equal);
    }

    #[test]
    fn int_fits_float_field() {
        assert!(Value::Int(3).fits(ScalarKind::Float));
        assert!(!Value::Float(3.0).fits(ScalarKind::Integer));
        assert!(Value::Null.fits(ScalarKind::String));
    }

    #[test]
    fn serde_representation_is_untagged() {
        assert_eq!(serde_json::to_string(&Value::Int(7)).unwrap(), "7");
        assert_eq!(serde_json::to_string(&Value::Null).unwrap(), "null");
        let v: Value = serde_json::from_str("\"hello\"").unwrap();
        assert_eq!(v, Value::String("hello".into()));
        let v: Value = serde_json::from_str("2.5").unwrap();
        assert_eq!(v, Value::Float(2.5));
    }

    #[test]
    fn mixed_numeric_comparison() {
        assert_eq!(Value::Int(2).compare(&Value::Float(2.5)), Ordering::Less);
        assert_eq!(Value::Float(3.5).compare(&Value::Int(3)), Ordering::Greater);
    }
}
