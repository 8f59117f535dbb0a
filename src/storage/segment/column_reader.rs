// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use rustc_hash::FxHashMap;

use super::encode::{decode_fixed, PrimitiveFixedWidthEncode};
use super::{ColumnEncoding, ColumnMapping, PositionProvider, ReadOnlyFileStream, StreamKind};
use crate::array::{
    ArrayBuilder, ArrayBuilderImpl, NativeType, PrimitiveArrayBuilder, Utf8ArrayBuilder,
};
use crate::catalog::TabletSchema;
use crate::storage::{StorageResult, TracedStorageError};
use crate::types::{ColumnId, DataValue, FieldType, UniqueColumnId};

/// Streams of a segment, keyed by column unique id and kind.
pub type StreamName = (UniqueColumnId, StreamKind);

/// Decoder of one projected column.
pub enum ColumnReaderImpl {
    /// Reads plain-encoded values from the column's streams.
    Plain(PlainColumnReader),
    /// The column was added after the segment was written; every row holds the
    /// column default.
    Default(DefaultValueReader),
}

pub struct PlainColumnReader {
    unique_id: UniqueColumnId,
    field_type: FieldType,
    /// One byte per row, non-zero for null. Absent if the column has no nulls.
    present: Option<ReadOnlyFileStream>,
    data: ReadOnlyFileStream,
    scratch: Vec<u8>,
}

pub struct DefaultValueReader {
    unique_id: UniqueColumnId,
    value: DataValue,
}

impl ColumnReaderImpl {
    /// Create the reader of table column `cid`, taking its streams out of
    /// `streams`.
    pub fn create(
        cid: ColumnId,
        schema: &TabletSchema,
        mapping: &ColumnMapping,
        streams: &mut FxHashMap<StreamName, ReadOnlyFileStream>,
    ) -> StorageResult<Self> {
        let column = schema
            .column(cid)
            .ok_or_else(|| TracedStorageError::invalid_column(cid))?;
        let unique_id = column.unique_id();
        if mapping.segment_column(unique_id).is_none() {
            return Ok(Self::Default(DefaultValueReader {
                unique_id,
                value: column.default_value(),
            }));
        }
        match mapping.encoding(unique_id) {
            Some(ColumnEncoding::Plain) => {}
            None => {
                return Err(TracedStorageError::format(format!(
                    "no encoding for column {unique_id}"
                )))
            }
        }
        let data = streams
            .remove(&(unique_id, StreamKind::Data))
            .ok_or_else(|| {
                TracedStorageError::format(format!("column {unique_id} has no data stream"))
            })?;
        let present = streams.remove(&(unique_id, StreamKind::Present));
        Ok(Self::Plain(PlainColumnReader {
            unique_id,
            field_type: column.field_type(),
            present,
            data,
            scratch: vec![],
        }))
    }

    pub fn column_unique_id(&self) -> UniqueColumnId {
        match self {
            Self::Plain(reader) => reader.unique_id,
            Self::Default(reader) => reader.unique_id,
        }
    }

    /// Bytes buffered by the reader's streams.
    pub fn buffer_size(&self) -> usize {
        match self {
            Self::Plain(reader) => {
                reader.data.buffer_size()
                    + reader.present.as_ref().map_or(0, |p| p.buffer_size())
            }
            Self::Default(_) => 0,
        }
    }

    /// Position the reader at the start of a block. Positions are consumed in
    /// stream order: present stream first, if any, then data.
    pub fn seek(&mut self, positions: &mut PositionProvider<'_>) -> StorageResult<()> {
        match self {
            Self::Plain(reader) => {
                if let Some(present) = &mut reader.present {
                    present.seek(positions.next()?, positions.next()?)?;
                }
                reader.data.seek(positions.next()?, positions.next()?)
            }
            Self::Default(_) => Ok(()),
        }
    }

    /// Decode the next `count` rows into `builder`.
    pub fn next_vector(
        &mut self,
        builder: &mut ArrayBuilderImpl,
        count: usize,
    ) -> StorageResult<()> {
        match self {
            Self::Plain(reader) => reader.next_vector(builder, count),
            Self::Default(reader) => {
                for _ in 0..count {
                    builder.push(&reader.value)?;
                }
                Ok(())
            }
        }
    }
}

impl PlainColumnReader {
    fn next_vector(&mut self, builder: &mut ArrayBuilderImpl, count: usize) -> StorageResult<()> {
        match builder {
            ArrayBuilderImpl::Bool(builder) => self.next_primitive(builder, count),
            ArrayBuilderImpl::Int32(builder) => self.next_primitive(builder, count),
            ArrayBuilderImpl::Int64(builder) => self.next_primitive(builder, count),
            ArrayBuilderImpl::Float64(builder) => self.next_primitive(builder, count),
            ArrayBuilderImpl::Utf8(builder) => self.next_utf8(builder, count),
        }
    }

    fn check_type(&self, expected: FieldType) -> StorageResult<()> {
        if self.field_type != expected {
            return Err(TracedStorageError::invalid_argument(format!(
                "column {} of type {} read into a {expected} vector",
                self.unique_id, self.field_type
            )));
        }
        Ok(())
    }

    fn is_null(&mut self) -> StorageResult<bool> {
        match &mut self.present {
            Some(present) => Ok(present.read_u8()? != 0),
            None => Ok(false),
        }
    }

    fn next_primitive<T>(
        &mut self,
        builder: &mut PrimitiveArrayBuilder<T>,
        count: usize,
    ) -> StorageResult<()>
    where
        T: NativeType + PrimitiveFixedWidthEncode,
    {
        self.check_type(T::FIELD_TYPE)?;
        let mut buf = [0; 8];
        for _ in 0..count {
            let is_null = self.is_null()?;
            self.data.read_exact(&mut buf[..T::WIDTH])?;
            let value: T = decode_fixed(&mut &buf[..T::WIDTH])?;
            builder.push(if is_null { None } else { Some(&value) });
        }
        Ok(())
    }

    fn next_utf8(&mut self, builder: &mut Utf8ArrayBuilder, count: usize) -> StorageResult<()> {
        self.check_type(FieldType::Varchar)?;
        for _ in 0..count {
            let is_null = self.is_null()?;
            let mut len = [0; 4];
            self.data.read_exact(&mut len)?;
            let len = u32::from_le_bytes(len) as usize;
            self.scratch.clear();
            self.scratch.try_reserve(len)?;
            self.scratch.resize(len, 0);
            self.data.read_exact(&mut self.scratch)?;
            if is_null {
                builder.push(None);
            } else {
                builder
                    .push_bytes(&self.scratch)
                    .map_err(|e| TracedStorageError::format(format!("invalid string: {e}")))?;
            }
        }
        Ok(())
    }
}
