// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Value encodings shared by data streams, zone maps and bloom filters.

use bytes::{Buf, BufMut};
use ordered_float::OrderedFloat;

use crate::storage::{StorageResult, TracedStorageError};
use crate::types::{DataValue, FieldType};

/// Encode a primitive value into fixed-width buffer
pub trait PrimitiveFixedWidthEncode: Copy + Clone + 'static + Send + Sync + PartialEq {
    /// Width of each element
    const WIDTH: usize;

    /// Column type stored with this encoding
    const FIELD_TYPE: FieldType;

    /// Encode current primitive data to the end of an `Vec<u8>`.
    fn encode(&self, buffer: &mut impl BufMut);

    /// Decode a data from a bytes array.
    fn decode(buffer: &mut impl Buf) -> Self;
}

impl PrimitiveFixedWidthEncode for bool {
    const WIDTH: usize = std::mem::size_of::<u8>();
    const FIELD_TYPE: FieldType = FieldType::Bool;

    fn encode(&self, buffer: &mut impl BufMut) {
        buffer.put_u8(*self as u8)
    }

    fn decode(buffer: &mut impl Buf) -> Self {
        buffer.get_u8() != 0
    }
}

impl PrimitiveFixedWidthEncode for i32 {
    const WIDTH: usize = std::mem::size_of::<i32>();
    const FIELD_TYPE: FieldType = FieldType::Int32;

    fn encode(&self, buffer: &mut impl BufMut) {
        buffer.put_i32_le(*self);
    }

    fn decode(buffer: &mut impl Buf) -> Self {
        buffer.get_i32_le()
    }
}

impl PrimitiveFixedWidthEncode for i64 {
    const WIDTH: usize = std::mem::size_of::<i64>();
    const FIELD_TYPE: FieldType = FieldType::Int64;

    fn encode(&self, buffer: &mut impl BufMut) {
        buffer.put_i64_le(*self);
    }

    fn decode(buffer: &mut impl Buf) -> Self {
        buffer.get_i64_le()
    }
}

impl PrimitiveFixedWidthEncode for f64 {
    const WIDTH: usize = std::mem::size_of::<f64>();
    const FIELD_TYPE: FieldType = FieldType::Float64;

    fn encode(&self, buffer: &mut impl BufMut) {
        buffer.put_f64_le(*self);
    }

    fn decode(buffer: &mut impl Buf) -> Self {
        buffer.get_f64_le()
    }
}

/// Encode a value as it is stored in a data stream: fixed width for primitives,
/// length-prefixed for strings. Nulls must be replaced by the caller.
pub fn encode_plain(value: &DataValue, buffer: &mut impl BufMut) -> StorageResult<()> {
    match value {
        DataValue::Bool(v) => v.encode(buffer),
        DataValue::Int32(v) => v.encode(buffer),
        DataValue::Int64(v) => v.encode(buffer),
        DataValue::Float64(v) => v.0.encode(buffer),
        DataValue::String(v) => {
            buffer.put_u32_le(v.len() as u32);
            buffer.put_slice(v.as_bytes());
        }
        DataValue::Null => {
            return Err(TracedStorageError::invalid_argument(
                "null can not be encoded as a plain value",
            ))
        }
    }
    Ok(())
}

/// Encode a tagged value. Used by zone-map statistics and as the hashed form of
/// bloom filter keys.
pub fn encode_value(value: &DataValue, buffer: &mut impl BufMut) {
    match value.field_type() {
        None => buffer.put_u8(0),
        Some(ty) => {
            buffer.put_u8(ty.to_u8());
            // only null fails, and it is handled above
            let _ = encode_plain(value, buffer);
        }
    }
}

/// Decode a tagged value written by [`encode_value`].
pub fn decode_value(buffer: &mut impl Buf) -> StorageResult<DataValue> {
    let tag = get_u8(buffer)?;
    if tag == 0 {
        return Ok(DataValue::Null);
    }
    let ty = FieldType::from_u8(tag)
        .ok_or_else(|| TracedStorageError::format(format!("unknown value tag {tag}")))?;
    Ok(match ty {
        FieldType::Bool => DataValue::Bool(decode_fixed::<bool>(buffer)?),
        FieldType::Int32 => DataValue::Int32(decode_fixed::<i32>(buffer)?),
        FieldType::Int64 => DataValue::Int64(decode_fixed::<i64>(buffer)?),
        FieldType::Float64 => DataValue::Float64(OrderedFloat(decode_fixed::<f64>(buffer)?)),
        FieldType::Varchar => {
            let len = get_u32(buffer)? as usize;
            if buffer.remaining() < len {
                return Err(TracedStorageError::format("truncated string value"));
            }
            let mut data = vec![0; len];
            buffer.copy_to_slice(&mut data);
            DataValue::String(
                String::from_utf8(data)
                    .map_err(|e| TracedStorageError::format(format!("invalid string: {e}")))?,
            )
        }
    })
}

/// Decode a fixed-width value, failing instead of panicking on short input.
pub fn decode_fixed<T: PrimitiveFixedWidthEncode>(buffer: &mut impl Buf) -> StorageResult<T> {
    if buffer.remaining() < T::WIDTH {
        return Err(TracedStorageError::format("unexpected end of buffer"));
    }
    Ok(T::decode(buffer))
}

pub fn get_u8(buffer: &mut impl Buf) -> StorageResult<u8> {
    if !buffer.has_remaining() {
        return Err(TracedStorageError::format("unexpected end of buffer"));
    }
    Ok(buffer.get_u8())
}

pub fn get_u32(buffer: &mut impl Buf) -> StorageResult<u32> {
    if buffer.remaining() < 4 {
        return Err(TracedStorageError::format("unexpected end of buffer"));
    }
    Ok(buffer.get_u32_le())
}

pub fn get_u64(buffer: &mut impl Buf) -> StorageResult<u64> {
    if buffer.remaining() < 8 {
        return Err(TracedStorageError::format("unexpected end of buffer"));
    }
    Ok(buffer.get_u64_le())
}
