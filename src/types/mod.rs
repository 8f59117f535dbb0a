// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Types shared by the catalog, the arrays and the segment engine.

use parse_display::Display;
use serde::{Deserialize, Serialize};

mod value;
pub use self::value::*;

/// Position of a column in the table-facing (scanning) schema.
pub type ColumnId = u32;

/// Globally stable id of a column. It survives schema changes.
pub type UniqueColumnId = u32;

/// Position of a column within the physical layout of one segment.
pub type SegmentColumnId = u32;

/// Index of a block within a segment.
pub type BlockId = u32;

pub type TabletId = i64;

/// Data version, as used by version ranges and delete conditions.
pub type Version = i64;

/// Physical type of a stored column.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[display(style = "UPPERCASE")]
pub enum FieldType {
    Bool,
    Int32,
    Int64,
    Float64,
    Varchar,
}

impl FieldType {
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Bool => 1,
            Self::Int32 => 2,
            Self::Int64 => 3,
            Self::Float64 => 4,
            Self::Varchar => 5,
        }
    }

    pub fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            1 => Self::Bool,
            2 => Self::Int32,
            3 => Self::Int64,
            4 => Self::Float64,
            5 => Self::Varchar,
            _ => return None,
        })
    }

    /// Returns `true` if `value` can be stored in a column of this type.
    pub fn accepts(self, value: &DataValue) -> bool {
        matches!(
            (self, value),
            (_, DataValue::Null)
                | (Self::Bool, DataValue::Bool(_))
                | (Self::Int32, DataValue::Int32(_))
                | (Self::Int64, DataValue::Int64(_))
                | (Self::Float64, DataValue::Float64(_))
                | (Self::Varchar, DataValue::String(_))
        )
    }
}

/// How values of a column are merged when rows with equal keys meet.
///
/// Only columns with [`AggregationMethod::None`] carry statistics that bound the
/// values a reader observes; the others are skipped by statistic-based pruning.
#[derive(Debug, Display, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[display(style = "lowercase")]
pub enum AggregationMethod {
    #[default]
    None,
    Sum,
    Min,
    Max,
    Replace,
}
