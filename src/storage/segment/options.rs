// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::CompressKind;
use crate::storage::StorageResult;
use crate::types::UniqueColumnId;

/// IO Backend of the segment readers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IOBackend {
    /// Use `pread` to read from the files.
    PositionedRead,
    /// Use cross-platform API to read from files. Note that this would hurt performance
    NormalRead,
}

/// Options for `SegmentReader`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentReaderOptions {
    /// Capacity (in bytes) of an index cache created from these options
    pub index_cache_capacity: u64,

    /// I/O Backend used to read segment files
    pub io_backend: IOBackend,

    /// Bloom filters are only consulted when at least this many blocks survive
    /// the zone-map phase
    pub min_filter_block_num: u32,
}

impl Default for SegmentReaderOptions {
    fn default() -> Self {
        Self::default_for_cli()
    }
}

impl SegmentReaderOptions {
    pub fn default_for_cli() -> Self {
        Self {
            index_cache_capacity: 256 * (1 << 20), // 256MB
            io_backend: if cfg!(unix) {
                IOBackend::PositionedRead
            } else {
                warn!("segment reader is running in compatibility mode (NormalRead), which might hurt I/O performance.");
                IOBackend::NormalRead
            },
            min_filter_block_num: 10,
        }
    }

    pub fn default_for_test() -> Self {
        Self {
            index_cache_capacity: 1 << 20, // 1MB
            io_backend: IOBackend::NormalRead,
            min_filter_block_num: 10,
        }
    }

    /// Load options from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> StorageResult<Self> {
        let data = std::fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }
}

/// Options for `SegmentWriter`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentWriterOptions {
    /// Rows in each block
    pub rows_per_block: u32,

    /// Compression of every stream
    pub compress_kind: CompressKind,

    /// Maximum uncompressed size (in bytes) of a stream chunk
    pub stream_buffer_size: u32,

    /// Whether nullable columns get a present stream
    pub null_supported: bool,

    /// Columns that get a bloom filter stream
    pub bloom_filter_columns: Vec<UniqueColumnId>,

    /// Bits in each per-block bloom filter, a multiple of 8
    pub bf_bit_num: u32,

    /// Probes per bloom filter lookup
    pub bf_hash_function_num: u32,
}

impl Default for SegmentWriterOptions {
    fn default() -> Self {
        Self {
            rows_per_block: 1024,
            compress_kind: CompressKind::Lz4,
            stream_buffer_size: 64 * (1 << 10), // 64KB
            null_supported: true,
            bloom_filter_columns: vec![],
            bf_bit_num: 4096,
            bf_hash_function_num: 4,
        }
    }
}

impl SegmentWriterOptions {
    #[cfg(test)]
    pub fn default_for_test() -> Self {
        Self {
            rows_per_block: 1024,
            compress_kind: CompressKind::None,
            stream_buffer_size: 4096,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_options_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        std::fs::write(&path, r#"{"min_filter_block_num": 3, "io_backend": "NormalRead"}"#)
            .unwrap();
        let options = SegmentReaderOptions::from_json_file(&path).unwrap();
        assert_eq!(options.min_filter_block_num, 3);
        assert_eq!(options.io_backend, IOBackend::NormalRead);
        assert_eq!(
            options.index_cache_capacity,
            SegmentReaderOptions::default_for_cli().index_cache_capacity
        );
    }
}
