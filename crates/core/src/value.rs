//! Value type definitions for Quill.
//!
//! `Value` is the tagged union stored in every cell. Rows never carry `Null`;
//! it only appears in query results (for example `MIN` over an empty input).

use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use serde::{Deserialize, Serialize};

use crate::types::DataType;

/// A value that can be stored in a table cell or produced by a query.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Absent value, only produced by queries
    Null,
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit floating point
    Float(f64),
    /// UTF-8 string
    Str(String),
}

impl Value {
    /// Returns the data type of this value, or None if it's Null.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Int(_) => Some(DataType::Int),
            Value::Float(_) => Some(DataType::Float),
            Value::Str(_) => Some(DataType::Str),
        }
    }

    /// Returns the name used in error messages for this value's type.
    pub fn type_name(&self) -> &'static str {
        self.data_type().map(|dt| dt.name()).unwrap_or("null")
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the numeric value widened to f64, for both ints and floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Creates the default value for the given data type, used when a
    /// column is added to a table that already has rows.
    pub fn default_for_type(dt: DataType) -> Self {
        match dt {
            DataType::Int => Value::Int(0),
            DataType::Str => Value::Str(String::new()),
            DataType::Float => Value::Float(0.0),
        }
    }

    /// Converts this value for storage in a column of type `dt`.
    ///
    /// Ints widen into float columns. Every other cross-type assignment,
    /// `Null`, and a NaN or infinite float are rejected by returning `None`.
    pub fn cast_for_column(self, dt: DataType) -> Option<Value> {
        match (self, dt) {
            (Value::Int(v), DataType::Int) => Some(Value::Int(v)),
            (Value::Int(v), DataType::Float) => Some(Value::Float(v as f64)),
            (Value::Float(v), DataType::Float) if v.is_finite() => Some(Value::Float(v)),
            (Value::Str(v), DataType::Str) => Some(Value::Str(v)),
            _ => None,
        }
    }

    /// Converts this value into the representation a column of type `dt`
    /// would hold, if that is possible without losing information.
    ///
    /// Unlike [`Value::cast_for_column`], an integral float normalizes into
    /// an int column. Used for membership keys and index probes.
    pub fn normalize_for(&self, dt: DataType) -> Option<Value> {
        match (self, dt) {
            (Value::Float(v), DataType::Int) => {
                if v.fract() == 0.0 && v.is_finite() && *v >= i64::MIN as f64 && *v <= i64::MAX as f64 {
                    Some(Value::Int(*v as i64))
                } else {
                    None
                }
            }
            _ => self.clone().cast_for_column(dt),
        }
    }

    /// Compares two values with SQL semantics: ints and floats compare
    /// numerically, strings lexicographically. Returns None when the values
    /// are not comparable (different kinds, or either side is Null).
    pub fn sql_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Int(_), Value::Float(_))
            | (Value::Float(_), Value::Int(_))
            | (Value::Float(_), Value::Float(_)) => {
                let a = self.as_f64()?;
                let b = other.as_f64()?;
                a.partial_cmp(&b)
            }
            _ => None,
        }
    }

    /// Returns a type ordering value for comparing different types.
    fn type_order(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Int(_) => 1,
            Value::Float(_) => 2,
            Value::Str(_) => 3,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits() || a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Int(i) => i.hash(state),
            // 0.0 and -0.0 are equal, so they must hash alike
            Value::Float(f) => {
                let f = if *f == 0.0 { 0.0f64 } else { *f };
                f.to_bits().hash(state)
            }
            Value::Str(s) => s.hash(state),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Total order used for sorting and MIN/MAX. Values of one kind order
/// naturally (floats via `total_cmp`); different kinds order by type.
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => {
                if a == b {
                    Ordering::Equal
                } else {
                    a.total_cmp(b)
                }
            }
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            _ => self.type_order().cmp(&other.type_order()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{:?}", v),
            Value::Str(v) => write!(f, "'{}'", v),
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

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}
