// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! In-memory column vectors produced by segment scans.

use crate::types::{DataValue, FieldType, F64};

mod iterator;
mod primitive_array;
mod row_batch;
mod utf8_array;

pub use self::iterator::ArrayIter;
pub use self::primitive_array::*;
pub use self::row_batch::*;
pub use self::utf8_array::*;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ArrayError {
    #[error("cannot push {value} into a {expected} array")]
    TypeMismatch { expected: FieldType, value: String },
}

/// A trait over all array builders.
///
/// `ArrayBuilder` is a trait over all builders. You could build an array with
/// `push` with the help of `ArrayBuilder` trait. The `push` function always
/// accepts reference to an element. e.g. for `PrimitiveArray`,
/// you must do `builder.push(Some(&1))`. For `Utf8Array`, you must do
/// `builder.push(Some("xxx"))`. Note that you don't need to construct a `String`.
pub trait ArrayBuilder {
    /// Corresponding `Array` of this builder
    type Array: Array<Builder = Self>;

    /// Create a new builder with `capacity`.
    fn with_capacity(capacity: usize) -> Self;

    /// Append a value to builder.
    fn push(&mut self, value: Option<&<Self::Array as Array>::Item>);

    /// Append an array to builder.
    fn append(&mut self, other: &Self::Array);

    /// Finish build and return a new array.
    fn finish(self) -> Self::Array;
}

/// A trait over all array.
///
/// `Array` must be built with an `ArrayBuilder`. The array trait provides several
/// unified interface on an array, like `len`, `get` and `iter`.
pub trait Array: Sized {
    /// Corresponding builder of this array.
    type Builder: ArrayBuilder<Array = Self>;

    /// Type of element in the array.
    type Item: ?Sized;

    /// Retrieve a reference to value.
    fn get(&self, idx: usize) -> Option<&Self::Item>;

    /// Number of items of array.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get iterator of current array.
    fn iter(&self) -> ArrayIter<'_, Self> {
        ArrayIter::new(self)
    }
}

/// Embeds all possible arrays in `array` module.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayImpl {
    Bool(BoolArray),
    Int32(I32Array),
    Int64(I64Array),
    Float64(F64Array),
    Utf8(Utf8Array),
}

/// Embeds all possible array builders in `array` module.
pub enum ArrayBuilderImpl {
    Bool(BoolArrayBuilder),
    Int32(I32ArrayBuilder),
    Int64(I64ArrayBuilder),
    Float64(F64ArrayBuilder),
    Utf8(Utf8ArrayBuilder),
}

macro_rules! impl_into {
    ($x:ty, $y:ident) => {
        impl From<$x> for ArrayImpl {
            fn from(array: $x) -> Self {
                Self::$y(array)
            }
        }
    };
}
impl_into! { BoolArray, Bool }
impl_into! { I32Array, Int32 }
impl_into! { I64Array, Int64 }
impl_into! { F64Array, Float64 }
impl_into! { Utf8Array, Utf8 }

impl ArrayBuilderImpl {
    /// Create a new array builder for a column of type `ty`.
    pub fn with_capacity(ty: FieldType, capacity: usize) -> Self {
        match ty {
            FieldType::Bool => Self::Bool(BoolArrayBuilder::with_capacity(capacity)),
            FieldType::Int32 => Self::Int32(I32ArrayBuilder::with_capacity(capacity)),
            FieldType::Int64 => Self::Int64(I64ArrayBuilder::with_capacity(capacity)),
            FieldType::Float64 => Self::Float64(F64ArrayBuilder::with_capacity(capacity)),
            FieldType::Varchar => Self::Utf8(Utf8ArrayBuilder::with_capacity(capacity)),
        }
    }

    /// Appends an element to the back of array.
    pub fn push(&mut self, v: &DataValue) -> Result<(), ArrayError> {
        match (self, v) {
            (Self::Bool(a), DataValue::Bool(v)) => a.push(Some(v)),
            (Self::Int32(a), DataValue::Int32(v)) => a.push(Some(v)),
            (Self::Int64(a), DataValue::Int64(v)) => a.push(Some(v)),
            (Self::Float64(a), DataValue::Float64(v)) => a.push(Some(&v.0)),
            (Self::Utf8(a), DataValue::String(v)) => a.push(Some(v)),
            (Self::Bool(a), DataValue::Null) => a.push(None),
            (Self::Int32(a), DataValue::Null) => a.push(None),
            (Self::Int64(a), DataValue::Null) => a.push(None),
            (Self::Float64(a), DataValue::Null) => a.push(None),
            (Self::Utf8(a), DataValue::Null) => a.push(None),
            (this, v) => {
                return Err(ArrayError::TypeMismatch {
                    expected: this.field_type(),
                    value: v.to_string(),
                })
            }
        }
        Ok(())
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            Self::Bool(_) => FieldType::Bool,
            Self::Int32(_) => FieldType::Int32,
            Self::Int64(_) => FieldType::Int64,
            Self::Float64(_) => FieldType::Float64,
            Self::Utf8(_) => FieldType::Varchar,
        }
    }

    /// Finish build and return a new array.
    pub fn finish(self) -> ArrayImpl {
        match self {
            Self::Bool(a) => ArrayImpl::Bool(a.finish()),
            Self::Int32(a) => ArrayImpl::Int32(a.finish()),
            Self::Int64(a) => ArrayImpl::Int64(a.finish()),
            Self::Float64(a) => ArrayImpl::Float64(a.finish()),
            Self::Utf8(a) => ArrayImpl::Utf8(a.finish()),
        }
    }
}

impl ArrayImpl {
    /// Number of items of array.
    pub fn len(&self) -> usize {
        match self {
            Self::Bool(a) => a.len(),
            Self::Int32(a) => a.len(),
            Self::Int64(a) => a.len(),
            Self::Float64(a) => a.len(),
            Self::Utf8(a) => a.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the value at the given index.
    pub fn get(&self, idx: usize) -> DataValue {
        match self {
            Self::Bool(a) => a.get(idx).map_or(DataValue::Null, |v| DataValue::Bool(*v)),
            Self::Int32(a) => a.get(idx).map_or(DataValue::Null, |v| DataValue::Int32(*v)),
            Self::Int64(a) => a.get(idx).map_or(DataValue::Null, |v| DataValue::Int64(*v)),
            Self::Float64(a) => a
                .get(idx)
                .map_or(DataValue::Null, |v| DataValue::Float64(F64::from(*v))),
            Self::Utf8(a) => a
                .get(idx)
                .map_or(DataValue::Null, |v| DataValue::String(v.to_string())),
        }
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            Self::Bool(_) => FieldType::Bool,
            Self::Int32(_) => FieldType::Int32,
            Self::Int64(_) => FieldType::Int64,
            Self::Float64(_) => FieldType::Float64,
            Self::Utf8(_) => FieldType::Varchar,
        }
    }

    /// An empty array of type `ty`.
    pub fn new_empty(ty: FieldType) -> Self {
        ArrayBuilderImpl::with_capacity(ty, 0).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_impl_push() {
        let mut builder = ArrayBuilderImpl::with_capacity(FieldType::Int64, 3);
        builder.push(&DataValue::Int64(1)).unwrap();
        builder.push(&DataValue::Null).unwrap();
        assert!(builder.push(&DataValue::from("x")).is_err());
        let array = builder.finish();
        assert_eq!(array.len(), 2);
        assert_eq!(array.get(0), DataValue::Int64(1));
        assert_eq!(array.get(1), DataValue::Null);
    }
}
