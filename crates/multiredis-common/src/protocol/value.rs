use serde::{Deserialize, Serialize};
use std::fmt;

/// A single reply (or command argument) exchanged with a backend.
///
/// This mirrors the shapes a key-value backend can answer with. The fan-out
/// layer never interprets replies beyond [`Value::is_empty`], which decides
/// whether a read answer is good enough to end a fan-out race.
///
/// # Example
///
/// ```
/// use multiredis_common::Value;
///
/// let key: Value = "my key".into();
/// assert_eq!(key.as_str(), Some("my key"));
/// assert!(Value::Nil.is_empty());
/// assert!(!Value::Int(1).is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    /// Missing key / null reply
    Nil,
    /// Integer reply
    Int(i64),
    /// Binary-safe bulk string
    Bulk(Vec<u8>),
    /// Status reply such as `OK` or `PONG`
    Status(String),
    /// Multi-bulk reply
    Array(Vec<Value>),
}

impl Value {
    /// Convenience constructor for the `OK` status reply.
    pub fn ok() -> Self {
        Value::Status("OK".to_string())
    }

    /// Returns true when the reply carries no data.
    ///
    /// `Nil`, `Int(0)`, empty strings and empty arrays are empty. A read
    /// command answered with an empty value keeps the fan-out going so a
    /// backend that does hold the key can still answer.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Nil => true,
            Value::Int(n) => *n == 0,
            Value::Bulk(bytes) => bytes.is_empty(),
            Value::Status(s) => s.is_empty(),
            Value::Array(items) => items.is_empty(),
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Borrows the reply as UTF-8 text, if it is a string reply.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Bulk(bytes) => std::str::from_utf8(bytes).ok(),
            Value::Status(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Bulk(_) | Value::Status(_) => self.as_str()?.parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "(nil)"),
            Value::Int(n) => write!(f, "(integer) {}", n),
            Value::Bulk(bytes) => write!(f, "\"{}\"", String::from_utf8_lossy(bytes)),
            Value::Status(s) => write!(f, "{}", s),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Bulk(s.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Bulk(s.into_bytes())
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Bulk(s.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bulk(bytes)
    }
}

impl From<&[u8]> for Value {
    fn from(bytes: &[u8]) -> Self {
        Value::Bulk(bytes.to_vec())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(n.into())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Nil)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}
