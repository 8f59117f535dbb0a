// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use super::ArrayImpl;
use crate::catalog::TabletSchemaRef;
use crate::storage::{BlockDisposition, StorageResult, TracedStorageError};
use crate::types::{ColumnId, DataValue, FieldType};

/// A batch of rows loaded from one block of a segment.
///
/// The batch lists the table columns it wants, in the order they should be
/// materialized. Each load replaces the column vectors and tags the batch with
/// the disposition of the block it came from: [`BlockDisposition::RequiresRowFilter`]
/// tells the consumer that delete conditions must still be applied per row.
pub struct VectorizedRowBatch {
    /// Types of the requested columns.
    types: Vec<FieldType>,

    /// Table-facing ids of the requested columns.
    columns: Vec<ColumnId>,

    /// One vector per requested column.
    vectors: Vec<ArrayImpl>,

    /// Maximum number of rows loaded at once.
    capacity: usize,

    /// Number of rows currently held.
    size: usize,

    block_status: BlockDisposition,
}

impl VectorizedRowBatch {
    pub fn new(
        schema: &TabletSchemaRef,
        columns: Vec<ColumnId>,
        capacity: usize,
    ) -> StorageResult<Self> {
        let types = columns
            .iter()
            .map(|cid| {
                schema
                    .column(*cid)
                    .map(|c| c.field_type())
                    .ok_or_else(|| TracedStorageError::invalid_column(*cid))
            })
            .collect::<StorageResult<Vec<_>>>()?;
        let vectors = types.iter().map(|ty| ArrayImpl::new_empty(*ty)).collect();
        Ok(Self {
            types,
            columns,
            vectors,
            capacity,
            size: 0,
            block_status: BlockDisposition::RequiresRowFilter,
        })
    }

    pub fn columns(&self) -> &[ColumnId] {
        &self.columns
    }

    pub fn field_type(&self, idx: usize) -> FieldType {
        self.types[idx]
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn block_status(&self) -> BlockDisposition {
        self.block_status
    }

    /// Vector of the `idx`-th requested column.
    pub fn column(&self, idx: usize) -> &ArrayImpl {
        &self.vectors[idx]
    }

    /// Vector of table column `cid`, if the batch requested it.
    pub fn column_by_id(&self, cid: ColumnId) -> Option<&ArrayImpl> {
        let idx = self.columns.iter().position(|c| *c == cid)?;
        Some(&self.vectors[idx])
    }

    /// Values of row `row` across all requested columns.
    pub fn row(&self, row: usize) -> Vec<DataValue> {
        self.vectors.iter().map(|v| v.get(row)).collect()
    }

    pub(crate) fn set_column(&mut self, idx: usize, array: ArrayImpl) {
        self.vectors[idx] = array;
    }

    pub(crate) fn set_size(&mut self, size: usize) {
        self.size = size;
    }

    pub(crate) fn set_block_status(&mut self, status: BlockDisposition) {
        self.block_status = status;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::catalog::{ColumnCatalog, TabletSchema};

    #[test]
    fn test_unknown_column() {
        let schema = Arc::new(TabletSchema::new(vec![ColumnCatalog::new(
            0,
            "k",
            FieldType::Int32,
        )]));
        assert!(VectorizedRowBatch::new(&schema, vec![0], 16).is_ok());
        assert!(VectorizedRowBatch::new(&schema, vec![1], 16).is_err());
    }
}
