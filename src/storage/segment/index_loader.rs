// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::sync::Arc;

use bytes::Bytes;
use rustc_hash::FxHashMap;
use tracing::{trace, warn};

use super::compress::Decompressor;
use super::stream_locator::{locate_streams, LocatedStream};
use super::{
    BloomFilterReader, ColumnMapping, IndexBuffer, IndexCache, IndexCacheKey, ReadOnlyFileStream,
    ReaderStatistics, SegmentFile, SegmentMeta, StreamKind, ZoneMapReader,
};
use crate::catalog::TabletSchema;
use crate::storage::{StorageError, StorageResult, TracedStorageError};
use crate::types::UniqueColumnId;

/// Index readers of one opened segment, keyed by column unique id.
#[derive(Default)]
pub struct SegmentIndexes {
    zone_maps: FxHashMap<UniqueColumnId, ZoneMapReader>,
    bloom_filters: FxHashMap<UniqueColumnId, BloomFilterReader>,
    block_count: u32,
}

impl SegmentIndexes {
    pub fn zone_map(&self, uid: UniqueColumnId) -> Option<&ZoneMapReader> {
        self.zone_maps.get(&uid)
    }

    pub fn bloom_filter(&self, uid: UniqueColumnId) -> Option<&BloomFilterReader> {
        self.bloom_filters.get(&uid)
    }

    pub fn block_count(&self) -> u32 {
        self.block_count
    }
}

/// Loads the zone maps and bloom filters a scan needs, through the index cache.
pub(super) struct IndexLoader<'a> {
    pub file: &'a SegmentFile,
    pub file_name: Arc<str>,
    pub meta: &'a SegmentMeta,
    pub mapping: &'a ColumnMapping,
    pub schema: &'a TabletSchema,
    pub decompressor: Option<Decompressor>,
    pub cache: Option<&'a IndexCache>,
    /// Whether buffers read from disk are inserted into the cache
    pub use_cache: bool,
    pub num_rows_in_block: u32,
    pub stats: &'a Arc<ReaderStatistics>,
}

impl IndexLoader<'_> {
    pub fn load_index(&self) -> StorageResult<SegmentIndexes> {
        let header = &self.meta.header;
        let expected_blocks = header
            .number_of_rows
            .div_ceil(self.num_rows_in_block as u64);
        let mut indexes = SegmentIndexes {
            // segments whose projected columns all postdate them have no index
            block_count: expected_blocks as u32,
            ..Default::default()
        };

        let streams = locate_streams(&header.streams, self.meta.header_length, |info| {
            self.mapping.needs_index_stream(info)
        });
        for located in streams {
            let uid = located.info.column_unique_id;
            let buffer = self.read_index_buffer(&located)?;
            let entry_count = match located.info.kind {
                StreamKind::RowIndex => {
                    let field_type = self
                        .mapping
                        .table_column(uid)
                        .and_then(|cid| self.schema.column(cid))
                        .map(|column| column.field_type())
                        .ok_or_else(|| {
                            TracedStorageError::format(format!("unknown column unique id {uid}"))
                        })?;
                    let reader = ZoneMapReader::init(buffer, field_type)?;
                    let entry_count = reader.entry_count();
                    indexes.zone_maps.insert(uid, reader);
                    entry_count
                }
                StreamKind::BloomFilter => {
                    let reader = BloomFilterReader::init(
                        buffer,
                        header.bf_hash_function_num,
                        header.bf_bit_num,
                    )?;
                    let entry_count = reader.entry_count();
                    indexes.bloom_filters.insert(uid, reader);
                    entry_count
                }
                StreamKind::Present | StreamKind::Data => continue,
            };
            if entry_count as u64 != expected_blocks {
                warn!(
                    column = uid,
                    kind = ?located.info.kind,
                    expected = expected_blocks,
                    actual = entry_count,
                    rows = header.number_of_rows,
                    rows_per_block = self.num_rows_in_block,
                    "index entry count does not match block count"
                );
                return Err(TracedStorageError::format(format!(
                    "expected {expected_blocks} index entries, found {entry_count}"
                )));
            }
            indexes.block_count = entry_count as u32;
        }
        trace!(block_count = indexes.block_count, "indexes loaded");
        Ok(indexes)
    }

    fn read_index_buffer(&self, located: &LocatedStream<'_>) -> StorageResult<IndexBuffer> {
        let key = IndexCacheKey::new(
            self.file_name.clone(),
            located.info.column_unique_id,
            located.info.kind,
        );
        if let Some(handle) = self.cache.and_then(|cache| cache.lookup(&key)) {
            return Ok(IndexBuffer::Cached(handle));
        }

        let mut stream = ReadOnlyFileStream::new(
            self.file.clone(),
            located.offset,
            located.info.length,
            self.decompressor,
            self.meta.header.stream_buffer_size as usize,
            self.stats.clone(),
        );
        let data = stream.read_all().map_err(|e| match e.kind() {
            StorageError::Alloc(_) | StorageError::Format(_) => e,
            _ => TracedStorageError::format(format!(
                "failed to read index stream of column {}: {e}",
                located.info.column_unique_id
            )),
        })?;
        let data = Bytes::from(data);

        Ok(match self.cache {
            Some(cache) if self.use_cache => IndexBuffer::Cached(cache.insert(key, data)),
            _ => IndexBuffer::Owned(data),
        })
    }
}
