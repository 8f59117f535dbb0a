// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Block pruning.
//!
//! Every block of a scan range starts as [`BlockDisposition::Include`], and
//! three phases may make it stricter:
//!
//! 1. delete conditions, evaluated against zone maps,
//! 2. scan conditions, evaluated against zone maps,
//! 3. scan conditions, evaluated against bloom filters, only when enough blocks
//!    are left to make the lookups worthwhile.

use std::collections::BTreeSet;

use tracing::{debug, trace, warn};

use super::{
    BlockDisposition, ColumnMapping, Conditions, DelCondSatisfied, DelMatch, DeleteHandler,
    ReaderStatistics, SegmentIndexes,
};
use crate::catalog::TabletSchema;
use crate::storage::{StorageResult, TracedStorageError};
use crate::types::{AggregationMethod, BlockId, ColumnId, Version};

/// Disposition of every block of a segment, and how many are not excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeBlocks {
    blocks: Vec<BlockDisposition>,
    remaining: u32,
}

impl IncludeBlocks {
    /// Blocks in `first..=last` are included, all others excluded.
    fn new(block_count: u32, first: BlockId, last: BlockId) -> StorageResult<Self> {
        let mut blocks = Vec::new();
        blocks.try_reserve_exact(block_count as usize)?;
        blocks.extend((0..block_count).map(|block| {
            if (first..=last).contains(&block) {
                BlockDisposition::Include
            } else {
                BlockDisposition::Excluded
            }
        }));
        Ok(Self {
            blocks,
            remaining: last - first + 1,
        })
    }

    pub fn get(&self, block: BlockId) -> BlockDisposition {
        self.blocks[block as usize]
    }

    pub fn as_slice(&self) -> &[BlockDisposition] {
        &self.blocks
    }

    /// Blocks of the scan range that are not excluded.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    fn set(&mut self, block: BlockId, status: BlockDisposition) {
        let slot = &mut self.blocks[block as usize];
        if status == BlockDisposition::Excluded && *slot != BlockDisposition::Excluded {
            self.remaining -= 1;
        }
        *slot = status;
    }
}

pub(super) struct RowGroupPicker<'a> {
    pub schema: &'a TabletSchema,
    pub mapping: &'a ColumnMapping,
    pub indexes: &'a SegmentIndexes,
    pub conditions: Option<&'a Conditions>,
    pub delete_handler: Option<&'a DeleteHandler>,
    pub delete_status: DelCondSatisfied,
    pub load_bf_columns: &'a BTreeSet<ColumnId>,
    /// First version of the segment group
    pub segment_version: Version,
    pub number_of_rows: u64,
    pub num_rows_in_block: u32,
    pub min_filter_block_num: u32,
    pub stats: &'a ReaderStatistics,
}

impl RowGroupPicker<'_> {
    pub fn pick_row_groups(&self, first: BlockId, last: BlockId) -> StorageResult<IncludeBlocks> {
        trace!(first, last, "pick row groups");
        let block_count = self.indexes.block_count();
        if first > last || last >= block_count {
            warn!(first, last, block_count, "invalid block range");
            return Err(TracedStorageError::invalid_argument(format!(
                "invalid block range {first}..={last} of {block_count} blocks"
            )));
        }

        let mut blocks = IncludeBlocks::new(block_count, first, last)?;
        self.pick_delete_row_groups(&mut blocks, first, last);

        let conditions = match self.conditions {
            Some(conditions) if !conditions.is_empty() => conditions,
            _ => return Ok(blocks),
        };

        for (cid, cond) in conditions.columns() {
            if !self.prunable(cid) {
                continue;
            }
            let Some(zone_map) = self
                .mapping
                .stored_unique_id(cid)
                .and_then(|uid| self.indexes.zone_map(uid))
            else {
                continue;
            };
            for block in first..=last {
                if blocks.get(block) == BlockDisposition::Excluded {
                    continue;
                }
                if !cond.eval(zone_map.entry(block).statistic()) {
                    blocks.set(block, BlockDisposition::Excluded);
                    self.stats.add_rows_stats_filtered(self.block_rows(block));
                }
            }
        }

        if blocks.remaining() < self.min_filter_block_num {
            debug!(
                remaining = blocks.remaining(),
                "bloom filters are skipped for too few remaining blocks"
            );
            return Ok(blocks);
        }

        for &cid in self.load_bf_columns {
            if !self.prunable(cid) {
                continue;
            }
            let Some(cond) = conditions.get(cid) else {
                continue;
            };
            let Some(bloom_filter) = self
                .mapping
                .stored_unique_id(cid)
                .and_then(|uid| self.indexes.bloom_filter(uid))
            else {
                continue;
            };
            for block in first..=last {
                if blocks.get(block) == BlockDisposition::Excluded {
                    continue;
                }
                if !cond.eval_bloom(&bloom_filter.entry(block)) {
                    blocks.set(block, BlockDisposition::Excluded);
                    self.stats.add_rows_stats_filtered(self.block_rows(block));
                }
            }
        }

        debug!(remaining = blocks.remaining(), "pick row groups finished");
        Ok(blocks)
    }

    fn pick_delete_row_groups(&self, blocks: &mut IncludeBlocks, first: BlockId, last: BlockId) {
        let handler = match self.delete_handler {
            Some(handler) if !handler.is_empty() => handler,
            _ => return,
        };
        if self.delete_status == DelCondSatisfied::NotSatisfied {
            trace!("segment does not satisfy the delete conditions");
            return;
        }

        for cond in handler.applicable(self.segment_version) {
            for block in first..=last {
                let status = blocks.get(block);
                if status == BlockDisposition::Excluded {
                    continue;
                }
                let outcome = if cond.del_cond.is_empty() {
                    DelMatch::NoMatch
                } else {
                    DelMatch::all(cond.del_cond.columns().filter_map(|(cid, col_cond)| {
                        // columns added after the segment was written do not decide
                        let uid = self.mapping.stored_unique_id(cid)?;
                        Some(match self.indexes.zone_map(uid) {
                            Some(zone_map) => col_cond.del_eval(zone_map.entry(block).statistic()),
                            None => DelMatch::PartialMatch,
                        })
                    }))
                };
                let status = status.apply_delete(outcome);
                blocks.set(block, status);
                if status == BlockDisposition::Excluded {
                    trace!(block, "block deleted");
                    self.stats.add_rows_del_filtered(self.block_rows(block));
                }
            }
        }
    }

    /// Only columns without aggregation have statistics that bound what a
    /// reader observes.
    fn prunable(&self, cid: ColumnId) -> bool {
        self.schema
            .column(cid)
            .is_some_and(|column| column.aggregation() == AggregationMethod::None)
    }

    fn block_rows(&self, block: BlockId) -> u64 {
        if block + 1 < self.indexes.block_count() {
            self.num_rows_in_block as u64
        } else {
            self.number_of_rows - block as u64 * self.num_rows_in_block as u64
        }
    }
}
