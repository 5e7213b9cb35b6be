//! Value model for queue items and index entries
//!
//! [`Value`] is the payload type stored by every collection. Seven variants
//! mirror a JSON-like document model; the eighth, [`Value::Typed`], carries an
//! application type encoded with bincode and tagged by its type name. The log
//! writes that type name as a compact catalog id, so applications can store
//! their own structs without repeating the name in every record.
//!
//! ## Equality Rules
//!
//! - Different variants are never equal (no coercion)
//! - `Int(1)` != `Float(1.0)`
//! - `String("abc")` != `Bytes([97, 98, 99])`
//! - Float uses IEEE-754 equality: `NaN != NaN`, `-0.0 == 0.0`

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};

/// Payload value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// Absence of value; rejected as an index key or value
    Null,

    /// Boolean true or false
    Bool(bool),

    /// 64-bit signed integer
    Int(i64),

    /// 64-bit IEEE-754 floating point
    Float(f64),

    /// UTF-8 encoded string
    String(String),

    /// Arbitrary binary data, distinct from String
    Bytes(Vec<u8>),

    /// Ordered sequence of values
    Array(Vec<Value>),

    /// String-keyed map of values
    Object(HashMap<String, Value>),

    /// Application-defined type, bincode-encoded
    Typed {
        /// Stable type identifier, see [`TypedValue::TYPE_NAME`]
        type_name: String,
        /// Encoded body
        data: Vec<u8>,
    },
}

/// Application type storable as [`Value::Typed`]
///
/// # Examples
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use spool_core::{TypedValue, Value};
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct Job { id: u64 }
///
/// impl TypedValue for Job {
///     const TYPE_NAME: &'static str = "example.Job";
/// }
///
/// let v = Value::typed(&Job { id: 7 }).unwrap();
/// assert_eq!(v.decode_typed::<Job>().unwrap(), Job { id: 7 });
/// ```
pub trait TypedValue: Serialize + DeserializeOwned {
    /// Fully-qualified, stable type identifier
    const TYPE_NAME: &'static str;
}

impl Value {
    /// Returns the variant name (for error messages)
    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Bytes(_) => "Bytes",
            Value::Array(_) => "Array",
            Value::Object(_) => "Object",
            Value::Typed { type_name, .. } => type_name,
        }
    }

    /// Encode an application type
    pub fn typed<T: TypedValue>(value: &T) -> Result<Self> {
        Ok(Value::Typed {
            type_name: T::TYPE_NAME.to_string(),
            data: bincode::serialize(value)?,
        })
    }

    /// Decode an application type
    ///
    /// Fails with `InvalidInput` when the value holds a different type.
    pub fn decode_typed<T: TypedValue>(&self) -> Result<T> {
        match self {
            Value::Typed { type_name, data } if type_name == T::TYPE_NAME => {
                Ok(bincode::deserialize(data)?)
            }
            other => Err(Error::InvalidInput(format!(
                "expected {}, found {}",
                T::TYPE_NAME,
                other.type_name()
            ))),
        }
    }

    /// Check if this value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as i64
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as f64
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Try to get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as bytes slice
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Try to get as array slice
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Try to get as object reference
    pub fn as_object(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

// ============================================================================
// Equality and hashing (IEEE-754 semantics, no type coercion)
// ============================================================================

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (
                Value::Typed {
                    type_name: ta,
                    data: da,
                },
                Value::Typed {
                    type_name: tb,
                    data: db,
                },
            ) => ta == tb && da == db,
            _ => false,
        }
    }
}

// NaN breaks reflexivity; index keys holding NaN are unreachable by lookup,
// the same as in any IEEE-754 keyed map.
impl Eq for Value {}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);

        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => {
                // -0.0 == 0.0, so both hash as 0.0
                if *f == 0.0 {
                    0u64.hash(state);
                } else {
                    f.to_bits().hash(state);
                }
            }
            Value::String(s) => s.hash(state),
            Value::Bytes(b) => b.hash(state),
            Value::Array(a) => {
                a.len().hash(state);
                for v in a {
                    v.hash(state);
                }
            }
            Value::Object(o) => {
                let mut entries: Vec<_> = o.iter().collect();
                entries.sort_by_key(|(k, _)| *k);
                entries.len().hash(state);
                for (k, v) in entries {
                    k.hash(state);
                    v.hash(state);
                }
            }
            Value::Typed { type_name, data } => {
                type_name.hash(state);
                data.hash(state);
            }
        }
    }
}
