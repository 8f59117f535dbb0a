// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Segment file header.
//!
//! ```plain
//! | magic (11B) | version (u32) | body length (u32) | body crc32 (u32) | body |
//! ```
//!
//! The body lists the segment-level properties, the columns of the segment in
//! physical order and the streams in file order. Streams are laid out right
//! after the header, so the offset of a stream is the header length plus the
//! lengths of all streams listed before it.

use bytes::{Buf, BufMut};
use tracing::warn;

use super::checksum::{build_checksum, verify_checksum};
use super::encode::{get_u32, get_u64, get_u8};
use super::SegmentFile;
use crate::storage::{StorageResult, TracedStorageError};
use crate::types::{FieldType, UniqueColumnId};

pub const SEGMENT_MAGIC: &[u8; 11] = b"COLUMN DATA";
pub const CURRENT_COLUMN_DATA_VERSION: u32 = 1;

/// Length of the fixed part of the header.
pub const HEADER_PREFIX_SIZE: usize = SEGMENT_MAGIC.len() + 4 + 4 + 4;

/// Kind of a stream. `RowIndex` holds the zone map of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StreamKind {
    RowIndex,
    BloomFilter,
    Present,
    Data,
}

impl StreamKind {
    pub fn to_u8(self) -> u8 {
        match self {
            Self::RowIndex => 0,
            Self::BloomFilter => 1,
            Self::Present => 2,
            Self::Data => 3,
        }
    }

    pub fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::RowIndex,
            1 => Self::BloomFilter,
            2 => Self::Present,
            3 => Self::Data,
            _ => return None,
        })
    }

    pub fn is_index(self) -> bool {
        matches!(self, Self::RowIndex | Self::BloomFilter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnEncoding {
    Plain,
}

impl ColumnEncoding {
    fn to_u8(self) -> u8 {
        match self {
            Self::Plain => 0,
        }
    }

    fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Plain),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub column_unique_id: UniqueColumnId,
    pub kind: StreamKind,
    pub length: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentColumnMeta {
    pub unique_id: UniqueColumnId,
    pub field_type: FieldType,
    pub is_nullable: bool,
    pub encoding: ColumnEncoding,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentHeader {
    pub magic: [u8; 11],
    pub version: u32,
    pub number_of_rows: u64,
    /// `0` means the segment group default applies.
    pub num_rows_per_block: u32,
    /// Raw compression tag, resolved when the segment is opened.
    pub compress_kind: u32,
    pub stream_buffer_size: u32,
    pub bf_hash_function_num: u32,
    pub bf_bit_num: u32,
    pub null_supported: bool,
    pub columns: Vec<SegmentColumnMeta>,
    pub streams: Vec<StreamInfo>,
}

impl SegmentHeader {
    pub fn encode(&self) -> Vec<u8> {
        let mut body = vec![];
        body.put_u64_le(self.number_of_rows);
        body.put_u32_le(self.num_rows_per_block);
        body.put_u32_le(self.compress_kind);
        body.put_u32_le(self.stream_buffer_size);
        body.put_u32_le(self.bf_hash_function_num);
        body.put_u32_le(self.bf_bit_num);
        body.put_u8(self.null_supported as u8);
        body.put_u32_le(self.columns.len() as u32);
        for column in &self.columns {
            body.put_u32_le(column.unique_id);
            body.put_u8(column.field_type.to_u8());
            body.put_u8(column.is_nullable as u8);
            body.put_u8(column.encoding.to_u8());
        }
        body.put_u32_le(self.streams.len() as u32);
        for stream in &self.streams {
            body.put_u32_le(stream.column_unique_id);
            body.put_u8(stream.kind.to_u8());
            body.put_u64_le(stream.length);
        }

        let mut data = Vec::with_capacity(HEADER_PREFIX_SIZE + body.len());
        data.put_slice(&self.magic);
        data.put_u32_le(self.version);
        data.put_u32_le(body.len() as u32);
        data.put_u32_le(build_checksum(&body));
        data.put_slice(&body);
        data
    }

    /// Read the header at the beginning of `file`. Returns the header and its
    /// length in bytes.
    ///
    /// The magic and version are not validated here, see [`check_file_version`].
    pub fn read_from(file: &SegmentFile) -> StorageResult<(Self, u64)> {
        let file_len = file.len()?;
        if file_len < HEADER_PREFIX_SIZE as u64 {
            return Err(TracedStorageError::format(format!(
                "segment file of {file_len} bytes is smaller than header"
            )));
        }
        let prefix = file.read_at(0, HEADER_PREFIX_SIZE)?;
        let mut buf = &prefix[..];
        let mut magic = [0; 11];
        buf.copy_to_slice(&mut magic);
        let version = buf.get_u32_le();
        let body_len = buf.get_u32_le() as u64;
        let checksum = buf.get_u32_le();
        let header_length = HEADER_PREFIX_SIZE as u64 + body_len;
        if header_length > file_len {
            return Err(TracedStorageError::format(format!(
                "header length {header_length} exceeds file length {file_len}"
            )));
        }
        let body = file.read_at(HEADER_PREFIX_SIZE as u64, body_len as usize)?;
        verify_checksum(&body, checksum, "segment header")?;
        let header = Self::decode_body(magic, version, &mut &body[..])?;
        Ok((header, header_length))
    }

    fn decode_body(magic: [u8; 11], version: u32, buf: &mut &[u8]) -> StorageResult<Self> {
        let number_of_rows = get_u64(buf)?;
        let num_rows_per_block = get_u32(buf)?;
        let compress_kind = get_u32(buf)?;
        let stream_buffer_size = get_u32(buf)?;
        let bf_hash_function_num = get_u32(buf)?;
        let bf_bit_num = get_u32(buf)?;
        let null_supported = get_u8(buf)? != 0;

        let num_columns = get_u32(buf)?;
        let mut columns = Vec::with_capacity(num_columns.min(1024) as usize);
        for _ in 0..num_columns {
            let unique_id = get_u32(buf)?;
            let type_tag = get_u8(buf)?;
            let field_type = FieldType::from_u8(type_tag).ok_or_else(|| {
                TracedStorageError::format(format!("unknown field type {type_tag}"))
            })?;
            let is_nullable = get_u8(buf)? != 0;
            let encoding_tag = get_u8(buf)?;
            let encoding = ColumnEncoding::from_u8(encoding_tag).ok_or_else(|| {
                TracedStorageError::format(format!("unknown column encoding {encoding_tag}"))
            })?;
            columns.push(SegmentColumnMeta {
                unique_id,
                field_type,
                is_nullable,
                encoding,
            });
        }

        let num_streams = get_u32(buf)?;
        let mut streams = Vec::with_capacity(num_streams.min(4096) as usize);
        for _ in 0..num_streams {
            let column_unique_id = get_u32(buf)?;
            let kind_tag = get_u8(buf)?;
            let kind = StreamKind::from_u8(kind_tag).ok_or_else(|| {
                TracedStorageError::format(format!("unknown stream kind {kind_tag}"))
            })?;
            let length = get_u64(buf)?;
            streams.push(StreamInfo {
                column_unique_id,
                kind,
                length,
            });
        }

        Ok(Self {
            magic,
            version,
            number_of_rows,
            num_rows_per_block,
            compress_kind,
            stream_buffer_size,
            bf_hash_function_num,
            bf_bit_num,
            null_supported,
            columns,
            streams,
        })
    }
}

/// Validate magic and version of a segment header. A newer version is only
/// reported, as the reader may still understand it.
pub fn check_file_version(header: &SegmentHeader) -> StorageResult<()> {
    if &header.magic != SEGMENT_MAGIC {
        return Err(TracedStorageError::format(format!(
            "bad segment magic {:?}",
            String::from_utf8_lossy(&header.magic)
        )));
    }
    if header.version > CURRENT_COLUMN_DATA_VERSION {
        warn!(
            version = header.version,
            current = CURRENT_COLUMN_DATA_VERSION,
            "segment was written by a newer version"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn header() -> SegmentHeader {
        SegmentHeader {
            magic: *SEGMENT_MAGIC,
            version: CURRENT_COLUMN_DATA_VERSION,
            number_of_rows: 4096,
            num_rows_per_block: 1024,
            compress_kind: 1,
            stream_buffer_size: 65536,
            bf_hash_function_num: 4,
            bf_bit_num: 4096,
            null_supported: true,
            columns: vec![SegmentColumnMeta {
                unique_id: 7,
                field_type: FieldType::Int64,
                is_nullable: true,
                encoding: ColumnEncoding::Plain,
            }],
            streams: vec![
                StreamInfo {
                    column_unique_id: 7,
                    kind: StreamKind::RowIndex,
                    length: 100,
                },
                StreamInfo {
                    column_unique_id: 7,
                    kind: StreamKind::Data,
                    length: 200,
                },
            ],
        }
    }

    #[test]
    fn test_header_read() {
        let header = header();
        let mut data = header.encode();
        let header_len = data.len() as u64;
        data.extend_from_slice(&[0; 300]);
        let file = SegmentFile::InMemory(Bytes::from(data));
        let (decoded, len) = SegmentHeader::read_from(&file).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(len, header_len);
        check_file_version(&decoded).unwrap();
    }

    #[test]
    fn test_header_corrupted() {
        let mut data = header().encode();
        let last = data.len() - 1;
        data[last] ^= 0xff;
        let file = SegmentFile::InMemory(Bytes::from(data));
        assert!(SegmentHeader::read_from(&file).is_err());
    }

    #[test]
    fn test_check_file_version() {
        let mut header = header();
        header.version = CURRENT_COLUMN_DATA_VERSION + 1;
        check_file_version(&header).unwrap();
        header.magic = *b"COLUMN DATX";
        assert!(check_file_version(&header).is_err());
    }
}
