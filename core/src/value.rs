//! Bound parameter values and result rows.

use std::fmt;

use crate::error::{DbError, Result};

/// A value bound to a statement parameter or read from a result column.
///
/// The fixed schema only needs integers and text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Integer(i64),
    Text(String),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "'{v}'"),
        }
    }
}

/// One result row, columns in select-list order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Reads column `index` as an integer.
    pub fn get_i64(&self, index: usize) -> Result<i64> {
        match self.column(index)? {
            Value::Integer(v) => Ok(*v),
            other => Err(type_mismatch(index, "integer", other)),
        }
    }

    /// Reads column `index` as a server ID.
    pub fn get_u32(&self, index: usize) -> Result<u32> {
        let raw = self.get_i64(index)?;
        u32::try_from(raw).map_err(|_| {
            DbError::backend(format!("column {index} holds {raw}, which is not a valid server ID"))
        })
    }

    /// Reads column `index` as text.
    pub fn get_str(&self, index: usize) -> Result<&str> {
        match self.column(index)? {
            Value::Text(v) => Ok(v),
            other => Err(type_mismatch(index, "text", other)),
        }
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    fn column(&self, index: usize) -> Result<&Value> {
        self.values.get(index).ok_or_else(|| {
            DbError::backend(format!(
                "column index {index} out of range for row with {} columns",
                self.values.len()
            ))
        })
    }
}

fn type_mismatch(index: usize, expected: &str, found: &Value) -> DbError {
    DbError::backend(format!("column {index}: expected {expected}, found {found}"))
}
