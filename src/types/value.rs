// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use ordered_float::OrderedFloat;
use parse_display::Display;
use serde::{Deserialize, Serialize};

use super::FieldType;

/// A wrapper around floats providing implementations of `Eq`, `Ord`, and `Hash`.
pub type F64 = OrderedFloat<f64>;

/// Primitive value stored in a segment column.
///
/// Values of different variants are never compared with each other by the
/// engine: predicates and statistics of one column always share its type.
#[derive(Debug, Display, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DataValue {
    // NOTE: Null comes first.
    // => NULL is less than any non-NULL values
    #[display("null")]
    Null,
    #[display("{0}")]
    Bool(bool),
    #[display("{0}")]
    Int32(i32),
    #[display("{0}")]
    Int64(i64),
    #[display("{0}")]
    Float64(F64),
    #[display("'{0}'")]
    String(String),
}

impl DataValue {
    /// Returns `true` if value is null.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Type of the value, `None` for null.
    pub fn field_type(&self) -> Option<FieldType> {
        Some(match self {
            Self::Null => return None,
            Self::Bool(_) => FieldType::Bool,
            Self::Int32(_) => FieldType::Int32,
            Self::Int64(_) => FieldType::Int64,
            Self::Float64(_) => FieldType::Float64,
            Self::String(_) => FieldType::Varchar,
        })
    }

    /// The value a column of type `ty` holds when nothing was written.
    pub fn default_of(ty: FieldType) -> Self {
        match ty {
            FieldType::Bool => Self::Bool(false),
            FieldType::Int32 => Self::Int32(0),
            FieldType::Int64 => Self::Int64(0),
            FieldType::Float64 => Self::Float64(OrderedFloat(0.0)),
            FieldType::Varchar => Self::String(String::new()),
        }
    }
}

impl From<bool> for DataValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for DataValue {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<i64> for DataValue {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f64> for DataValue {
    fn from(v: f64) -> Self {
        Self::Float64(OrderedFloat(v))
    }
}

impl From<&str> for DataValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for DataValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_orders_first() {
        assert!(DataValue::Null < DataValue::Int32(i32::MIN));
        assert!(DataValue::Int32(-1) < DataValue::Int32(1));
        assert!(DataValue::from("a") < DataValue::from("b"));
    }

    #[test]
    fn test_display() {
        assert_eq!(DataValue::Null.to_string(), "null");
        assert_eq!(DataValue::from(7i64).to_string(), "7");
        assert_eq!(DataValue::from("x").to_string(), "'x'");
    }
}
