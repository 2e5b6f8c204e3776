//! Keys and their total order.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use std::cmp::Ordering;
use std::fmt;

/// A valid record key.
///
/// Keys are the subset of [`Value`]s that can be totally ordered. Kinds
/// order as `Number < Date < String < Binary < Array`; within a kind:
///
/// - numbers and dates compare numerically, with `-0` equal to `0`
/// - strings compare by UTF-16 code unit
/// - binaries compare bytewise
/// - arrays compare element-wise, a proper prefix sorting first
///
/// `NaN` is never a valid key, which keeps the order total.
#[derive(Debug, Clone)]
pub enum Key {
    /// A finite or infinite number.
    Number(f64),
    /// A date, as milliseconds since the Unix epoch.
    Date(f64),
    /// A string.
    String(String),
    /// A binary blob.
    Binary(Vec<u8>),
    /// An array of keys.
    Array(Vec<Key>),
}

impl Key {
    /// Converts a value into a key.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidKey`] if the value (or any array
    /// element) is not a valid key.
    pub fn from_value(value: &Value) -> CodecResult<Self> {
        match value {
            Value::Number(n) if n.is_nan() => Err(CodecError::invalid_key("NaN is not a valid key")),
            Value::Number(n) => Ok(Key::Number(*n)),
            Value::Date(ms) if ms.is_nan() => Err(CodecError::invalid_key("invalid date")),
            Value::Date(ms) => Ok(Key::Date(*ms)),
            Value::Text(s) => Ok(Key::String(s.clone())),
            Value::Bytes(b) => Ok(Key::Binary(b.clone())),
            Value::Array(items) => items
                .iter()
                .map(Key::from_value)
                .collect::<CodecResult<Vec<_>>>()
                .map(Key::Array),
            other => Err(CodecError::invalid_key(format!(
                "a {} is not a valid key",
                other.kind()
            ))),
        }
    }

    /// Returns true if `value` converts into a key.
    #[must_use]
    pub fn is_valid(value: &Value) -> bool {
        match value {
            Value::Number(n) | Value::Date(n) => !n.is_nan(),
            Value::Text(_) | Value::Bytes(_) => true,
            Value::Array(items) => items.iter().all(Key::is_valid),
            _ => false,
        }
    }

    /// Checks that this key belongs to the key order.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidKey`] for a `NaN` number or date,
    /// including one nested inside an array.
    pub fn validate(&self) -> CodecResult<()> {
        match self {
            Key::Number(n) if n.is_nan() => Err(CodecError::invalid_key("NaN is not a valid key")),
            Key::Date(ms) if ms.is_nan() => Err(CodecError::invalid_key("invalid date")),
            Key::Array(items) => items.iter().try_for_each(Key::validate),
            _ => Ok(()),
        }
    }

    /// Converts this key back into a value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Key::Number(n) => Value::Number(*n),
            Key::Date(ms) => Value::Date(*ms),
            Key::String(s) => Value::Text(s.clone()),
            Key::Binary(b) => Value::Bytes(b.clone()),
            Key::Array(items) => Value::Array(items.iter().map(Key::to_value).collect()),
        }
    }

    /// Returns the number if this is a numeric key.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Key::Number(n) => Some(*n),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Key::Number(_) => 0,
            Key::Date(_) => 1,
            Key::String(_) => 2,
            Key::Binary(_) => 3,
            Key::Array(_) => 4,
        }
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Key::Number(a), Key::Number(b)) | (Key::Date(a), Key::Date(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (Key::String(a), Key::String(b)) => a.encode_utf16().cmp(b.encode_utf16()),
            (Key::Binary(a), Key::Binary(b)) => a.cmp(b),
            (Key::Array(a), Key::Array(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Number(n) => write!(f, "{n}"),
            Key::Date(ms) => write!(f, "Date({ms})"),
            Key::String(s) => write!(f, "{s:?}"),
            Key::Binary(b) => {
                write!(f, "0x")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Key::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<f64> for Key {
    fn from(n: f64) -> Self {
        Key::Number(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Number(f64::from(n))
    }
}

impl From<u32> for Key {
    fn from(n: u32) -> Self {
        Key::Number(f64::from(n))
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::String(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::String(s)
    }
}

impl From<Vec<Key>> for Key {
    fn from(items: Vec<Key>) -> Self {
        Key::Array(items)
    }
}

impl TryFrom<&Value> for Key {
    type Error = CodecError;

    fn try_from(value: &Value) -> CodecResult<Self> {
        Key::from_value(value)
    }
}
