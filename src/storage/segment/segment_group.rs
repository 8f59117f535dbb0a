// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{SegmentFile, SegmentHeader};
use crate::catalog::TabletSchemaRef;
use crate::storage::StorageResult;
use crate::types::{TabletId, Version};

/// Parsed header of a segment and its length in the file.
#[derive(Debug)]
pub struct SegmentMeta {
    pub header: SegmentHeader,
    pub header_length: u64,
}

/// A group of segments written together for one version range of a tablet.
///
/// The group owns the tablet schema and the per-group defaults, and caches the
/// parsed headers of its segments. Segment `n` is stored at `<dir>/<n>.dat`.
pub struct SegmentGroup {
    directory: PathBuf,
    tablet_id: TabletId,
    version: (Version, Version),
    schema: TabletSchemaRef,
    num_rows_per_row_block: u32,
    metas: RwLock<HashMap<u32, Arc<SegmentMeta>>>,
}

impl SegmentGroup {
    pub fn new(
        directory: impl AsRef<Path>,
        tablet_id: TabletId,
        version: (Version, Version),
        schema: TabletSchemaRef,
        num_rows_per_row_block: u32,
    ) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            tablet_id,
            version,
            schema,
            num_rows_per_row_block,
            metas: RwLock::new(HashMap::new()),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn tablet_id(&self) -> TabletId {
        self.tablet_id
    }

    pub fn version(&self) -> (Version, Version) {
        self.version
    }

    pub fn schema(&self) -> &TabletSchemaRef {
        &self.schema
    }

    pub fn num_rows_per_row_block(&self) -> u32 {
        self.num_rows_per_row_block
    }

    pub fn segment_path(&self, segment_id: u32) -> PathBuf {
        self.directory.join(format!("{segment_id}.dat"))
    }

    /// Header of segment `segment_id`, parsed from `file` on first access.
    /// `file` must be the one at `segment_path(segment_id)`.
    pub(crate) fn segment_meta(&self, segment_id: u32, file: &SegmentFile) -> StorageResult<Arc<SegmentMeta>> {
        if let Some(meta) = self.metas.read().get(&segment_id) {
            return Ok(meta.clone());
        }
        let (header, header_length) = SegmentHeader::read_from(file)?;
        let meta = Arc::new(SegmentMeta {
            header,
            header_length,
        });
        Ok(self.metas.write().entry(segment_id).or_insert(meta).clone())
    }
}
