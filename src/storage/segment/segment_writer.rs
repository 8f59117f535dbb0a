// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::path::Path;

use smallvec::SmallVec;
use tracing::debug;

use super::compress::{compressor_for, Compressor};
use super::encode::encode_plain;
use super::{
    BloomFilterBuilder, ColumnEncoding, OutStream, SegmentColumnMeta, SegmentHeader,
    SegmentWriterOptions, StatisticBuilder, StreamInfo, StreamKind, ZoneMapBuilder,
    CURRENT_COLUMN_DATA_VERSION, SEGMENT_MAGIC,
};
use crate::catalog::TabletSchema;
use crate::storage::{StorageResult, TracedStorageError};
use crate::types::{ColumnId, DataValue};

struct ColumnWriter {
    meta: SegmentColumnMeta,
    present: Option<OutStream>,
    data: OutStream,
    zone_map: ZoneMapBuilder,
    statistic: StatisticBuilder,
    /// Positions of the current block in the present and data streams
    block_positions: SmallVec<[u64; 4]>,
    bloom_filter: Option<(BloomFilterBuilder, Vec<u8>)>,
    scratch: Vec<u8>,
}

impl ColumnWriter {
    fn start_block(&mut self) {
        self.block_positions.clear();
        if let Some(present) = &self.present {
            let (chunk, byte) = present.position();
            self.block_positions.extend([chunk, byte]);
        }
        let (chunk, byte) = self.data.position();
        self.block_positions.extend([chunk, byte]);
    }

    fn append(&mut self, value: &DataValue) -> StorageResult<()> {
        if !self.meta.field_type.accepts(value) {
            return Err(TracedStorageError::invalid_argument(format!(
                "value {value} does not fit column {} of type {}",
                self.meta.unique_id, self.meta.field_type
            )));
        }
        match &mut self.present {
            Some(present) => present.write(&[value.is_null() as u8])?,
            None if value.is_null() => {
                return Err(TracedStorageError::invalid_argument(format!(
                    "null in column {} without present stream",
                    self.meta.unique_id
                )))
            }
            None => {}
        }
        self.statistic.add(value);
        if let Some((bloom_filter, _)) = &mut self.bloom_filter {
            if !value.is_null() {
                bloom_filter.add(value);
            }
        }
        self.scratch.clear();
        if value.is_null() {
            encode_plain(&DataValue::default_of(self.meta.field_type), &mut self.scratch)?;
        } else {
            encode_plain(value, &mut self.scratch)?;
        }
        self.data.write(&self.scratch)
    }

    fn finish_block(&mut self) {
        self.zone_map
            .add_entry(&self.block_positions, &self.statistic.take());
        if let Some((bloom_filter, output)) = &mut self.bloom_filter {
            bloom_filter.finish_entry(output);
        }
    }
}

/// Writes a segment file in the layout segment readers expect.
pub struct SegmentWriter {
    options: SegmentWriterOptions,
    compressor: Option<Compressor>,
    columns: Vec<ColumnWriter>,
    number_of_rows: u64,
    rows_in_block: u32,
}

impl SegmentWriter {
    /// Writer of a segment storing every column of `schema`.
    pub fn new(schema: &TabletSchema, options: SegmentWriterOptions) -> StorageResult<Self> {
        let columns = (0..schema.num_columns() as ColumnId).collect::<Vec<_>>();
        Self::with_columns(schema, &columns, options)
    }

    /// Writer of a segment storing only the table columns `columns`, in this
    /// order. Rows passed to [`append_row`](Self::append_row) follow it too.
    pub fn with_columns(
        schema: &TabletSchema,
        columns: &[ColumnId],
        options: SegmentWriterOptions,
    ) -> StorageResult<Self> {
        if options.rows_per_block == 0 {
            return Err(TracedStorageError::invalid_argument("rows per block is zero"));
        }
        if !options.bloom_filter_columns.is_empty()
            && (options.bf_bit_num == 0
                || options.bf_bit_num % 8 != 0
                || options.bf_hash_function_num == 0)
        {
            return Err(TracedStorageError::invalid_argument(format!(
                "invalid bloom filter parameters: {} bits, {} hash functions",
                options.bf_bit_num, options.bf_hash_function_num
            )));
        }
        let compressor: Option<Compressor> = compressor_for(options.compress_kind);
        let buffer_size = options.stream_buffer_size as usize;
        let columns = columns
            .iter()
            .map(|&cid| {
                let column = schema
                    .column(cid)
                    .ok_or_else(|| TracedStorageError::invalid_column(cid))?;
                let bloom_filter = options
                    .bloom_filter_columns
                    .contains(&column.unique_id())
                    .then(|| {
                        (
                            BloomFilterBuilder::new(options.bf_bit_num, options.bf_hash_function_num),
                            vec![],
                        )
                    });
                Ok(ColumnWriter {
                    meta: SegmentColumnMeta {
                        unique_id: column.unique_id(),
                        field_type: column.field_type(),
                        is_nullable: column.is_nullable(),
                        encoding: ColumnEncoding::Plain,
                    },
                    present: (options.null_supported && column.is_nullable())
                        .then(|| OutStream::new(compressor, buffer_size)),
                    data: OutStream::new(compressor, buffer_size),
                    zone_map: ZoneMapBuilder::default(),
                    statistic: StatisticBuilder::default(),
                    block_positions: SmallVec::new(),
                    bloom_filter,
                    scratch: vec![],
                })
            })
            .collect::<StorageResult<Vec<_>>>()?;
        Ok(Self {
            options,
            compressor,
            columns,
            number_of_rows: 0,
            rows_in_block: 0,
        })
    }

    pub fn append_row(&mut self, row: &[DataValue]) -> StorageResult<()> {
        if row.len() != self.columns.len() {
            return Err(TracedStorageError::invalid_argument(format!(
                "row has {} values, segment has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        if self.rows_in_block == 0 {
            self.columns.iter_mut().for_each(ColumnWriter::start_block);
        }
        for (column, value) in self.columns.iter_mut().zip(row) {
            column.append(value)?;
        }
        self.number_of_rows += 1;
        self.rows_in_block += 1;
        if self.rows_in_block == self.options.rows_per_block {
            self.finish_block();
        }
        Ok(())
    }

    fn finish_block(&mut self) {
        self.columns.iter_mut().for_each(ColumnWriter::finish_block);
        self.rows_in_block = 0;
    }

    pub fn num_rows(&self) -> u64 {
        self.number_of_rows
    }

    /// Finish the segment and return its header and full content.
    pub fn finish_to_bytes(mut self) -> StorageResult<(SegmentHeader, Vec<u8>)> {
        if self.rows_in_block > 0 {
            self.finish_block();
        }
        let compressor = self.compressor;
        let buffer_size = self.options.stream_buffer_size as usize;
        // index streams are chunked like data streams
        let index_stream = |data: Vec<u8>| -> StorageResult<Vec<u8>> {
            let mut stream = OutStream::new(compressor, buffer_size);
            stream.write(&data)?;
            stream.finish()
        };
        let mut streams = vec![];
        let mut body = vec![];
        let mut metas = vec![];
        for column in self.columns {
            let uid = column.meta.unique_id;
            let mut push = |kind: StreamKind, data: Vec<u8>| {
                streams.push(StreamInfo {
                    column_unique_id: uid,
                    kind,
                    length: data.len() as u64,
                });
                body.extend(data);
            };
            push(StreamKind::RowIndex, index_stream(column.zone_map.finish())?);
            if let Some((_, bloom_filters)) = column.bloom_filter {
                push(StreamKind::BloomFilter, index_stream(bloom_filters)?);
            }
            if let Some(present) = column.present {
                push(StreamKind::Present, present.finish()?);
            }
            push(StreamKind::Data, column.data.finish()?);
            metas.push(column.meta);
        }

        let header = SegmentHeader {
            magic: *SEGMENT_MAGIC,
            version: CURRENT_COLUMN_DATA_VERSION,
            number_of_rows: self.number_of_rows,
            num_rows_per_block: self.options.rows_per_block,
            compress_kind: self.options.compress_kind.to_u32(),
            stream_buffer_size: self.options.stream_buffer_size,
            bf_hash_function_num: self.options.bf_hash_function_num,
            bf_bit_num: self.options.bf_bit_num,
            null_supported: self.options.null_supported,
            columns: metas,
            streams,
        };
        let mut data = header.encode();
        data.extend(body);
        Ok((header, data))
    }

    /// Finish the segment and write it to `path`.
    pub fn finish(self, path: impl AsRef<Path>) -> StorageResult<SegmentHeader> {
        let (header, data) = self.finish_to_bytes()?;
        std::fs::write(path.as_ref(), &data)?;
        debug!(
            path = %path.as_ref().display(),
            rows = header.number_of_rows,
            bytes = data.len(),
            "segment written"
        );
        Ok(header)
    }
}
