// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use rustc_hash::{FxHashMap, FxHashSet};

use super::{ColumnEncoding, SegmentHeader, StreamInfo, StreamKind};
use crate::catalog::TabletSchema;
use crate::storage::{StorageResult, TracedStorageError};
use crate::types::{ColumnId, SegmentColumnId, UniqueColumnId};

/// Maps columns between the table schema and the physical layout of one
/// segment, and records which columns a scan projects.
///
/// A table column is missing from the segment when it was added after the
/// segment was written.
#[derive(Debug, Default)]
pub struct ColumnMapping {
    table_to_unique: FxHashMap<ColumnId, UniqueColumnId>,
    unique_to_table: FxHashMap<UniqueColumnId, ColumnId>,
    unique_to_segment: FxHashMap<UniqueColumnId, SegmentColumnId>,
    encodings: FxHashMap<UniqueColumnId, ColumnEncoding>,
    include_columns: FxHashSet<UniqueColumnId>,
    include_bf_columns: FxHashSet<UniqueColumnId>,
}

impl ColumnMapping {
    pub fn build(
        schema: &TabletSchema,
        used_columns: &[ColumnId],
        load_bf_columns: impl IntoIterator<Item = ColumnId>,
        header: &SegmentHeader,
    ) -> StorageResult<Self> {
        let mut mapping = Self::default();
        for (cid, column) in schema.columns().iter().enumerate() {
            mapping
                .table_to_unique
                .insert(cid as ColumnId, column.unique_id());
            mapping
                .unique_to_table
                .insert(column.unique_id(), cid as ColumnId);
        }
        for (idx, column) in header.columns.iter().enumerate() {
            mapping
                .unique_to_segment
                .insert(column.unique_id, idx as SegmentColumnId);
            mapping.encodings.insert(column.unique_id, column.encoding);
        }
        for cid in used_columns {
            let uid = mapping.expect_unique_id(*cid)?;
            mapping.include_columns.insert(uid);
        }
        for cid in load_bf_columns {
            let uid = mapping.expect_unique_id(cid)?;
            mapping.include_bf_columns.insert(uid);
        }
        Ok(mapping)
    }

    fn expect_unique_id(&self, cid: ColumnId) -> StorageResult<UniqueColumnId> {
        self.unique_id(cid)
            .ok_or_else(|| TracedStorageError::invalid_column(cid))
    }

    pub fn unique_id(&self, cid: ColumnId) -> Option<UniqueColumnId> {
        self.table_to_unique.get(&cid).copied()
    }

    pub fn table_column(&self, uid: UniqueColumnId) -> Option<ColumnId> {
        self.unique_to_table.get(&uid).copied()
    }

    pub fn segment_column(&self, uid: UniqueColumnId) -> Option<SegmentColumnId> {
        self.unique_to_segment.get(&uid).copied()
    }

    /// Unique id of table column `cid`, if the segment stores it.
    pub fn stored_unique_id(&self, cid: ColumnId) -> Option<UniqueColumnId> {
        self.unique_id(cid)
            .filter(|uid| self.unique_to_segment.contains_key(uid))
    }

    pub fn encoding(&self, uid: UniqueColumnId) -> Option<ColumnEncoding> {
        self.encodings.get(&uid).copied()
    }

    /// Zone maps are loaded for projected columns, bloom filters for the
    /// requested bloom filter columns.
    pub fn needs_index_stream(&self, info: &StreamInfo) -> bool {
        let uid = info.column_unique_id;
        self.unique_to_segment.contains_key(&uid)
            && match info.kind {
                StreamKind::RowIndex => self.include_columns.contains(&uid),
                StreamKind::BloomFilter => self.include_bf_columns.contains(&uid),
                StreamKind::Present | StreamKind::Data => false,
            }
    }

    pub fn needs_data_stream(&self, info: &StreamInfo) -> bool {
        let uid = info.column_unique_id;
        !info.kind.is_index()
            && self.unique_to_segment.contains_key(&uid)
            && (self.include_columns.contains(&uid) || self.include_bf_columns.contains(&uid))
    }
}
