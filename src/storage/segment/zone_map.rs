// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Per-block zone maps.
//!
//! The zone map of a column has one entry per block. An entry holds the stream
//! positions where the block starts in the column's present and data streams,
//! and the min/max/has-null statistic of the block.
//!
//! ```plain
//! | entry count (u32) | entry | entry | ...
//! entry = | position count (u8) | position (u64) ... | min | max | has_null (u8) |
//! ```

use bytes::BufMut;
use smallvec::SmallVec;

use super::encode::{decode_value, encode_value, get_u64, get_u8, get_u32};
use super::IndexBuffer;
use crate::storage::{StorageResult, TracedStorageError};
use crate::types::{BlockId, DataValue, FieldType};

/// Bounds of the non-null values of a block. `min` and `max` are null when the
/// block holds no non-null value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneMapStatistic {
    pub min: DataValue,
    pub max: DataValue,
    pub has_null: bool,
}

impl ZoneMapStatistic {
    /// No row of the block holds a value.
    pub fn all_null(&self) -> bool {
        self.min.is_null()
    }
}

#[derive(Debug, Default)]
pub struct StatisticBuilder {
    min: Option<DataValue>,
    max: Option<DataValue>,
    has_null: bool,
}

impl StatisticBuilder {
    pub fn add(&mut self, value: &DataValue) {
        if value.is_null() {
            self.has_null = true;
            return;
        }
        if self.min.as_ref().map_or(true, |min| value < min) {
            self.min = Some(value.clone());
        }
        if self.max.as_ref().map_or(true, |max| value > max) {
            self.max = Some(value.clone());
        }
    }

    /// Take the statistic collected so far and reset.
    pub fn take(&mut self) -> ZoneMapStatistic {
        let this = std::mem::take(self);
        ZoneMapStatistic {
            min: this.min.unwrap_or(DataValue::Null),
            max: this.max.unwrap_or(DataValue::Null),
            has_null: this.has_null,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ZoneMapEntry {
    positions: SmallVec<[u64; 4]>,
    statistic: ZoneMapStatistic,
}

impl ZoneMapEntry {
    pub fn positions(&self) -> &[u64] {
        &self.positions
    }

    pub fn statistic(&self) -> &ZoneMapStatistic {
        &self.statistic
    }
}

#[derive(Default)]
pub struct ZoneMapBuilder {
    data: Vec<u8>,
    count: u32,
}

impl ZoneMapBuilder {
    pub fn add_entry(&mut self, positions: &[u64], statistic: &ZoneMapStatistic) {
        self.data.put_u8(positions.len() as u8);
        for position in positions {
            self.data.put_u64_le(*position);
        }
        encode_value(&statistic.min, &mut self.data);
        encode_value(&statistic.max, &mut self.data);
        self.data.put_u8(statistic.has_null as u8);
        self.count += 1;
    }

    pub fn finish(self) -> Vec<u8> {
        let mut data = Vec::with_capacity(4 + self.data.len());
        data.put_u32_le(self.count);
        data.extend(self.data);
        data
    }
}

/// Zone map of one column, decoded from an index buffer.
pub struct ZoneMapReader {
    buffer: IndexBuffer,
    entries: Vec<ZoneMapEntry>,
}

impl ZoneMapReader {
    pub fn init(buffer: IndexBuffer, field_type: FieldType) -> StorageResult<Self> {
        let mut buf = &buffer[..];
        let count = get_u32(&mut buf)?;
        let mut entries = Vec::new();
        entries.try_reserve(count as usize)?;
        for _ in 0..count {
            let num_positions = get_u8(&mut buf)?;
            let positions = (0..num_positions)
                .map(|_| get_u64(&mut buf))
                .collect::<StorageResult<_>>()?;
            let min = decode_value(&mut buf)?;
            let max = decode_value(&mut buf)?;
            if !field_type.accepts(&min) || !field_type.accepts(&max) {
                return Err(TracedStorageError::format(format!(
                    "zone map statistic {min}..{max} does not match column type {field_type}"
                )));
            }
            let has_null = get_u8(&mut buf)? != 0;
            entries.push(ZoneMapEntry {
                positions,
                statistic: ZoneMapStatistic { min, max, has_null },
            });
        }
        if !buf.is_empty() {
            return Err(TracedStorageError::format("trailing bytes after zone map"));
        }
        Ok(Self { buffer, entries })
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Entry of `block`. The block count is validated when indexes are loaded.
    pub fn entry(&self, block: BlockId) -> &ZoneMapEntry {
        &self.entries[block as usize]
    }

    pub fn buffer(&self) -> &IndexBuffer {
        &self.buffer
    }
}

/// Hands out the positions of one zone-map entry, in the order column readers
/// consume them.
pub struct PositionProvider<'a> {
    positions: &'a [u64],
}

impl<'a> PositionProvider<'a> {
    pub fn new(positions: &'a [u64]) -> Self {
        Self { positions }
    }

    pub fn next(&mut self) -> StorageResult<u64> {
        let (first, rest) = self
            .positions
            .split_first()
            .ok_or_else(|| TracedStorageError::format("zone map entry is missing positions"))?;
        self.positions = rest;
        Ok(*first)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn build(values: &[&[Option<i32>]]) -> ZoneMapReader {
        let mut builder = ZoneMapBuilder::default();
        let mut stat = StatisticBuilder::default();
        for (idx, block) in values.iter().enumerate() {
            for v in block.iter() {
                stat.add(&v.map_or(DataValue::Null, DataValue::Int32));
            }
            builder.add_entry(&[idx as u64, 0], &stat.take());
        }
        ZoneMapReader::init(
            IndexBuffer::Owned(Bytes::from(builder.finish())),
            FieldType::Int32,
        )
        .unwrap()
    }

    #[test]
    fn test_zone_map() {
        let reader = build(&[&[Some(3), Some(1), None], &[None], &[Some(5)]]);
        assert_eq!(reader.entry_count(), 3);
        assert_eq!(
            reader.entry(0).statistic(),
            &ZoneMapStatistic {
                min: DataValue::Int32(1),
                max: DataValue::Int32(3),
                has_null: true,
            }
        );
        assert!(reader.entry(1).statistic().all_null());
        assert!(!reader.entry(2).statistic().has_null);
        assert_eq!(reader.entry(2).positions(), [2, 0]);
        assert!(!reader.buffer().is_cached());
    }

    #[test]
    fn test_type_mismatch() {
        let mut builder = ZoneMapBuilder::default();
        builder.add_entry(
            &[0],
            &ZoneMapStatistic {
                min: DataValue::from("a"),
                max: DataValue::from("b"),
                has_null: false,
            },
        );
        let buffer = IndexBuffer::Owned(Bytes::from(builder.finish()));
        assert!(ZoneMapReader::init(buffer, FieldType::Int32).is_err());
    }

    #[test]
    fn test_position_provider() {
        let mut provider = PositionProvider::new(&[4, 2]);
        assert_eq!(provider.next().unwrap(), 4);
        assert_eq!(provider.next().unwrap(), 2);
        assert!(provider.next().is_err());
    }
}
