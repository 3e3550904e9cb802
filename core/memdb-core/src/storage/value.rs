//! Row values and column definitions.

use crate::error::{MemDbError, MemDbResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
}

/// One table row, ordered like the table's columns.
pub type Row = Vec<Value>;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Integer(_) => "INTEGER",
            Value::Float(_) => "FLOAT",
            Value::Text(_) => "TEXT",
            Value::Boolean(_) => "BOOLEAN",
        }
    }

    /// SQL comparison. `None` when either side is NULL or the types are unrelated.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
            Value::Boolean(b) => write!(f, "{}", if *b { "true" } else { "false" }),
        }
    }
}

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Integer,
    Float,
    Text,
    Boolean,
}

impl ColumnType {
    /// Map a SQL type name (as printed by sqlparser) onto a storage type.
    pub fn from_sql(type_name: &str) -> MemDbResult<Self> {
        let upper = type_name.to_uppercase();
        // Strip length/precision: VARCHAR(20), DECIMAL(10,2)
        let base = upper.split('(').next().unwrap_or("").trim();
        match base {
            "INT" | "INTEGER" | "BIGINT" | "SMALLINT" | "TINYINT" | "INT4" | "INT8" => {
                Ok(ColumnType::Integer)
            }
            "FLOAT" | "REAL" | "DOUBLE" | "DOUBLE PRECISION" | "DECIMAL" | "NUMERIC" => {
                Ok(ColumnType::Float)
            }
            "TEXT" | "VARCHAR" | "CHAR" | "STRING" | "CHARACTER VARYING" => Ok(ColumnType::Text),
            "BOOL" | "BOOLEAN" => Ok(ColumnType::Boolean),
            _ => Err(MemDbError::SqlNotSupported {
                feature: format!("column type {type_name}"),
                hint: "Use INTEGER, FLOAT, TEXT or BOOLEAN".to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Float => "FLOAT",
            ColumnType::Text => "TEXT",
            ColumnType::Boolean => "BOOLEAN",
        }
    }

    /// Coerce `value` into this type. NULL passes through; the caller checks nullability.
    pub fn coerce(&self, value: Value) -> MemDbResult<Value> {
        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),
            (ColumnType::Integer, v @ Value::Integer(_)) => Ok(v),
            (ColumnType::Float, Value::Integer(i)) => Ok(Value::Float(i as f64)),
            (ColumnType::Float, v @ Value::Float(_)) => Ok(v),
            (ColumnType::Text, v @ Value::Text(_)) => Ok(v),
            (ColumnType::Boolean, v @ Value::Boolean(_)) => Ok(v),
            (expected, actual) => Err(MemDbError::TypeMismatch {
                expected: expected.as_str().to_string(),
                actual: actual.type_name().to_string(),
            }),
        }
    }
}

/// Column definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Coerce and NOT NULL-check a value destined for this column.
    pub fn check(&self, value: Value) -> MemDbResult<Value> {
        let value = self.column_type.coerce(value)?;
        if value.is_null() && !self.nullable {
            return Err(MemDbError::ConstraintViolation(format!(
                "column '{}' is NOT NULL",
                self.name
            )));
        }
        Ok(value)
    }
}
