// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use super::compress::{decompressor_for, Decompressor};
use super::index_loader::IndexLoader;
use super::row_group_picker::RowGroupPicker;
use super::stream_locator::locate_streams;
use super::{
    check_file_version, BlockDisposition, BloomFilterReader, ColumnMapping, ColumnReaderImpl,
    Conditions, DelCondSatisfied, DeleteHandler, IncludeBlocks, IndexCache, PositionProvider,
    ReadOnlyFileStream, ReaderStatistics, SegmentFile, SegmentGroup, SegmentHeader,
    SegmentIndexes, SegmentMeta, SegmentReaderOptions, ZoneMapReader,
};
use crate::array::{ArrayBuilderImpl, VectorizedRowBatch};
use crate::catalog::TabletSchema;
use crate::storage::{StorageResult, TracedStorageError};
use crate::types::{BlockId, ColumnId, UniqueColumnId};

/// Parameters of one logical scan, shared by the segment readers it opens.
#[derive(Clone)]
pub struct SegmentReadContext {
    used_columns: Vec<ColumnId>,
    load_bf_columns: BTreeSet<ColumnId>,
    conditions: Option<Arc<Conditions>>,
    delete_handler: Option<Arc<DeleteHandler>>,
    delete_status: DelCondSatisfied,
    index_cache: Option<IndexCache>,
    options: SegmentReaderOptions,
    stats: Arc<ReaderStatistics>,
}

impl SegmentReadContext {
    /// A scan projecting the table columns `used_columns`.
    pub fn new(used_columns: Vec<ColumnId>) -> Self {
        Self {
            used_columns,
            load_bf_columns: BTreeSet::new(),
            conditions: None,
            delete_handler: None,
            delete_status: DelCondSatisfied::default(),
            index_cache: None,
            options: SegmentReaderOptions::default(),
            stats: Arc::new(ReaderStatistics::new()),
        }
    }

    pub fn with_bloom_filter_columns(mut self, columns: impl IntoIterator<Item = ColumnId>) -> Self {
        self.load_bf_columns = columns.into_iter().collect();
        self
    }

    pub fn with_conditions(mut self, conditions: Arc<Conditions>) -> Self {
        self.conditions = Some(conditions);
        self
    }

    pub fn with_delete_handler(
        mut self,
        handler: Arc<DeleteHandler>,
        delete_status: DelCondSatisfied,
    ) -> Self {
        self.delete_handler = Some(handler);
        self.delete_status = delete_status;
        self
    }

    pub fn with_index_cache(mut self, cache: IndexCache) -> Self {
        self.index_cache = Some(cache);
        self
    }

    pub fn with_options(mut self, options: SegmentReaderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_statistics(mut self, stats: Arc<ReaderStatistics>) -> Self {
        self.stats = stats;
        self
    }

    pub fn used_columns(&self) -> &[ColumnId] {
        &self.used_columns
    }

    pub fn stats(&self) -> &Arc<ReaderStatistics> {
        &self.stats
    }
}

/// Where a scan continues after `seek_to_block` or `get_block`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanPosition {
    pub next_block: BlockId,
    pub eof: bool,
}

/// A segment whose header and indexes are loaded.
struct OpenedSegment {
    file: SegmentFile,
    meta: Arc<SegmentMeta>,
    decompressor: Option<Decompressor>,
    num_rows_in_block: u32,
    mapping: ColumnMapping,
    indexes: SegmentIndexes,
}

#[derive(Debug, Default, Clone, Copy)]
struct ScanCursor {
    current_block: BlockId,
    next_block: BlockId,
    end_block: BlockId,
    eof: bool,
    without_filter: bool,
    /// Column readers must be repositioned before the next load.
    needs_seek: bool,
}

impl ScanCursor {
    fn position(&self) -> ScanPosition {
        ScanPosition {
            next_block: self.next_block,
            eof: self.eof,
        }
    }
}

/// Reads the blocks of one segment file.
///
/// A reader is used in three steps: [`init`](SegmentReader::init) opens the
/// file and loads the indexes, [`seek_to_block`](SegmentReader::seek_to_block)
/// picks the blocks of a range, and [`get_block`](SegmentReader::get_block)
/// loads them one by one. A range may be re-seeked any number of times.
pub struct SegmentReader {
    file_name: PathBuf,
    segment_group: Arc<SegmentGroup>,
    segment_id: u32,
    ctx: SegmentReadContext,

    segment: Option<OpenedSegment>,
    /// Column readers, created by the first seek
    readers: Option<FxHashMap<ColumnId, ColumnReaderImpl>>,
    include_blocks: Option<IncludeBlocks>,
    cursor: ScanCursor,
}

impl SegmentReader {
    /// Reader of segment `segment_id` of `segment_group`. The file is always
    /// the group's own, so cached headers match it.
    pub fn open(segment_group: Arc<SegmentGroup>, segment_id: u32, ctx: SegmentReadContext) -> Self {
        Self {
            file_name: segment_group.segment_path(segment_id),
            segment_group,
            segment_id,
            ctx,
            segment: None,
            readers: None,
            include_blocks: None,
            cursor: ScanCursor::default(),
        }
    }

    /// Open the segment file and load the indexes of the scanned columns. With
    /// `use_cache`, index streams read from disk are added to the index cache.
    pub fn init(&mut self, use_cache: bool) -> StorageResult<()> {
        let schema = self.segment_group.schema();
        if let Some(conditions) = &self.ctx.conditions {
            conditions.check_types(schema)?;
        }
        if let Some(handler) = &self.ctx.delete_handler {
            for cond in handler.conditions() {
                cond.del_cond.check_types(schema)?;
            }
        }

        let stats = self.ctx.stats.clone();
        let _timer = stats.time_index_load();

        let file = SegmentFile::open(&self.file_name, self.ctx.options.io_backend)?;
        let meta = self.segment_group.segment_meta(self.segment_id, &file)?;
        let header = &meta.header;
        check_file_version(header)?;

        let num_rows_in_block = match header.num_rows_per_block {
            0 => self.segment_group.num_rows_per_row_block(),
            n => n,
        };
        if num_rows_in_block == 0 {
            return Err(TracedStorageError::format("rows per block is zero"));
        }
        let decompressor = decompressor_for(header.compress_kind)?;
        let mapping = ColumnMapping::build(
            schema,
            &self.ctx.used_columns,
            self.ctx.load_bf_columns.iter().copied(),
            header,
        )?;

        let indexes = IndexLoader {
            file: &file,
            file_name: Arc::from(self.file_name.to_string_lossy().as_ref()),
            meta: &meta,
            mapping: &mapping,
            schema,
            decompressor,
            cache: self.ctx.index_cache.as_ref(),
            use_cache,
            num_rows_in_block,
            stats: &stats,
        }
        .load_index()?;

        debug!(
            file = %self.file_name.display(),
            rows = header.number_of_rows,
            blocks = indexes.block_count(),
            "segment opened"
        );
        self.segment = Some(OpenedSegment {
            file,
            meta,
            decompressor,
            num_rows_in_block,
            mapping,
            indexes,
        });
        self.readers = None;
        self.include_blocks = None;
        self.cursor = ScanCursor::default();
        Ok(())
    }

    /// Prepare a scan of blocks `first..=last`. `last` is clamped to the last
    /// block of the segment. Unless `ignore_filter` is set, blocks are pruned by
    /// the delete and scan conditions.
    pub fn seek_to_block(
        &mut self,
        first: BlockId,
        last: BlockId,
        ignore_filter: bool,
    ) -> StorageResult<ScanPosition> {
        if self.readers.is_none() {
            let segment = self.segment.as_ref().ok_or_else(not_initialized)?;
            let readers = create_readers(
                segment,
                self.segment_group.schema(),
                &self.ctx.used_columns,
                &self.ctx.stats,
            )?;
            self.readers = Some(readers);
        }
        let segment = self.segment.as_ref().ok_or_else(not_initialized)?;
        let block_count = segment.indexes.block_count();

        self.include_blocks = None;
        self.cursor = ScanCursor {
            current_block: self.cursor.current_block,
            without_filter: ignore_filter,
            needs_seek: true,
            ..Default::default()
        };
        if block_count == 0 {
            self.cursor.next_block = first;
            self.cursor.eof = true;
            return Ok(self.cursor.position());
        }
        self.cursor.end_block = last.min(block_count - 1);

        if !ignore_filter {
            let picker = RowGroupPicker {
                schema: self.segment_group.schema(),
                mapping: &segment.mapping,
                indexes: &segment.indexes,
                conditions: self.ctx.conditions.as_deref(),
                delete_handler: self.ctx.delete_handler.as_deref(),
                delete_status: self.ctx.delete_status,
                load_bf_columns: &self.ctx.load_bf_columns,
                segment_version: self.segment_group.version().0,
                number_of_rows: segment.meta.header.number_of_rows,
                num_rows_in_block: segment.num_rows_in_block,
                min_filter_block_num: self.ctx.options.min_filter_block_num,
                stats: &self.ctx.stats,
            };
            self.include_blocks = Some(picker.pick_row_groups(first, self.cursor.end_block)?);
        }
        self.advance_to(first);
        Ok(self.cursor.position())
    }

    /// Move to the first block at or after `block` that is not excluded.
    fn advance_to(&mut self, mut block: BlockId) {
        if let (Some(blocks), false) = (&self.include_blocks, self.cursor.without_filter) {
            while block <= self.cursor.end_block && blocks.get(block) == BlockDisposition::Excluded {
                block += 1;
            }
        }
        if block > self.cursor.end_block {
            self.cursor.eof = true;
        }
        self.cursor.next_block = block;
    }

    /// Load the next block into `batch`. At end of scan the batch is left
    /// untouched and the returned position has `eof` set.
    pub fn get_block(&mut self, batch: &mut VectorizedRowBatch) -> StorageResult<ScanPosition> {
        if self.cursor.eof {
            return Ok(self.cursor.position());
        }
        let segment = self.segment.as_ref().ok_or_else(not_initialized)?;
        let readers = self.readers.as_mut().ok_or_else(|| {
            TracedStorageError::invalid_argument("seek_to_block must be called before get_block")
        })?;

        let block = self.cursor.next_block;
        if self.cursor.needs_seek || block != self.cursor.current_block {
            let result = seek_columns(segment, readers, batch.columns(), block, &self.ctx.stats);
            match result {
                Ok(()) => {
                    self.cursor.current_block = block;
                    self.cursor.needs_seek = false;
                }
                Err(e) if e.is_data_eof() => {
                    self.cursor.eof = true;
                    return Ok(self.cursor.position());
                }
                Err(e) => {
                    warn!(
                        tablet = self.segment_group.tablet_id(),
                        segment = self.segment_id,
                        block,
                        error = %e,
                        "failed to seek to block"
                    );
                    return Err(e);
                }
            }
        }

        let current = self.cursor.current_block;
        let mut rows = (batch.capacity() as u64).min(segment.num_rows_in_block as u64);
        if current + 1 == segment.indexes.block_count() {
            let left = segment.meta.header.number_of_rows
                - segment.num_rows_in_block as u64 * current as u64;
            rows = rows.min(left);
        }
        let rows = rows as usize;

        {
            let _timer = self.ctx.stats.time_block_load();
            for idx in 0..batch.columns().len() {
                let cid = batch.columns()[idx];
                let reader = readers
                    .get_mut(&cid)
                    .ok_or_else(|| TracedStorageError::invalid_column(cid))?;
                let mut builder = ArrayBuilderImpl::with_capacity(batch.field_type(idx), rows);
                if let Err(e) = reader.next_vector(&mut builder, rows) {
                    warn!(
                        tablet = self.segment_group.tablet_id(),
                        segment = self.segment_id,
                        column = reader.column_unique_id(),
                        rows,
                        error = %e,
                        "failed to read block"
                    );
                    return Err(e);
                }
                batch.set_column(idx, builder.finish());
            }
        }
        batch.set_size(rows);
        batch.set_block_status(
            self.include_blocks
                .as_ref()
                .map_or(BlockDisposition::RequiresRowFilter, |blocks| blocks.get(current)),
        );
        // a full block leaves the readers at the start of the next one
        if rows == segment.num_rows_in_block as usize {
            self.cursor.current_block += 1;
        } else {
            self.cursor.needs_seek = true;
        }
        self.ctx.stats.add_block_load(rows as u64);

        self.advance_to(block + 1);
        Ok(self.cursor.position())
    }

    pub fn header(&self) -> Option<&SegmentHeader> {
        self.segment.as_ref().map(|s| &s.meta.header)
    }

    pub fn block_count(&self) -> Option<u32> {
        self.segment.as_ref().map(|s| s.indexes.block_count())
    }

    pub fn num_rows_in_block(&self) -> Option<u32> {
        self.segment.as_ref().map(|s| s.num_rows_in_block)
    }

    /// Block dispositions computed by the last filtered seek.
    pub fn include_blocks(&self) -> Option<&IncludeBlocks> {
        self.include_blocks.as_ref()
    }

    pub fn zone_map(&self, uid: UniqueColumnId) -> Option<&ZoneMapReader> {
        self.segment.as_ref()?.indexes.zone_map(uid)
    }

    pub fn bloom_filter(&self, uid: UniqueColumnId) -> Option<&BloomFilterReader> {
        self.segment.as_ref()?.indexes.bloom_filter(uid)
    }

    pub fn stats(&self) -> &Arc<ReaderStatistics> {
        &self.ctx.stats
    }
}

impl Drop for SegmentReader {
    fn drop(&mut self) {
        trace!(file = %self.file_name.display(), "segment reader closed");
    }
}

fn not_initialized() -> TracedStorageError {
    TracedStorageError::invalid_argument("segment reader is not initialized")
}

/// Open the data streams of the scanned columns and build their readers.
fn create_readers(
    segment: &OpenedSegment,
    schema: &TabletSchema,
    used_columns: &[ColumnId],
    stats: &Arc<ReaderStatistics>,
) -> StorageResult<FxHashMap<ColumnId, ColumnReaderImpl>> {
    let header = &segment.meta.header;
    let mut streams = FxHashMap::default();
    let located = locate_streams(&header.streams, segment.meta.header_length, |info| {
        segment.mapping.needs_data_stream(info)
    });
    for stream in located {
        streams.insert(
            (stream.info.column_unique_id, stream.info.kind),
            ReadOnlyFileStream::new(
                segment.file.clone(),
                stream.offset,
                stream.info.length,
                segment.decompressor,
                header.stream_buffer_size as usize,
                stats.clone(),
            ),
        );
    }

    let mut readers = FxHashMap::default();
    let mut buffer_size = 0;
    for &cid in used_columns {
        if readers.contains_key(&cid) {
            continue;
        }
        let reader = ColumnReaderImpl::create(cid, schema, &segment.mapping, &mut streams)?;
        buffer_size += reader.buffer_size();
        readers.insert(cid, reader);
    }
    debug!(columns = readers.len(), buffer_size, "column readers created");
    Ok(readers)
}

/// Position the readers of `columns` at the start of `block`.
fn seek_columns(
    segment: &OpenedSegment,
    readers: &mut FxHashMap<ColumnId, ColumnReaderImpl>,
    columns: &[ColumnId],
    block: BlockId,
    stats: &ReaderStatistics,
) -> StorageResult<()> {
    let _timer = stats.time_block_seek();
    for &cid in columns {
        // columns added by a schema change have no index and nothing to seek
        let Some(zone_map) = segment
            .mapping
            .unique_id(cid)
            .and_then(|uid| segment.indexes.zone_map(uid))
        else {
            continue;
        };
        let reader = readers
            .get_mut(&cid)
            .ok_or_else(|| TracedStorageError::invalid_column(cid))?;
        let mut positions = PositionProvider::new(zone_map.entry(block).positions());
        if let Err(e) = reader.seek(&mut positions) {
            if e.is_stream_eof() {
                trace!(column = reader.column_unique_id(), block, "stream eof");
                return Err(TracedStorageError::data_eof());
            }
            warn!(
                column = reader.column_unique_id(),
                block,
                error = %e,
                "failed to seek column"
            );
            return Err(TracedStorageError::column_seek(reader.column_unique_id(), block));
        }
    }
    Ok(())
}
