// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Scans through the public API, the way a rowset reader drives segment readers.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use segment_scan::array::VectorizedRowBatch;
use segment_scan::catalog::{ColumnCatalog, TabletSchema, TabletSchemaRef};
use segment_scan::storage::{
    BlockDisposition, CompareOp, CompressKind, Conditions, DelCondSatisfied, DeleteHandler,
    IndexCache, Predicate, ReaderStatistics, SegmentGroup, SegmentReadContext, SegmentReader,
    SegmentReaderOptions, SegmentWriter, SegmentWriterOptions,
};
use segment_scan::types::{ColumnId, DataValue, FieldType};

fn schema() -> TabletSchemaRef {
    Arc::new(TabletSchema::new(vec![
        ColumnCatalog::new(1, "id", FieldType::Int64).key(),
        ColumnCatalog::new(2, "price", FieldType::Float64).nullable(),
        ColumnCatalog::new(3, "tag", FieldType::Varchar),
    ]))
}

/// Segment `segment_id` holds ids `offset..offset + rows`.
fn write_segment(dir: &Path, schema: &TabletSchema, segment_id: u32, offset: i64, rows: i64) {
    let options = SegmentWriterOptions {
        rows_per_block: 512,
        compress_kind: CompressKind::Lz4,
        stream_buffer_size: 8192,
        bloom_filter_columns: vec![3],
        ..Default::default()
    };
    let mut writer = SegmentWriter::new(schema, options).unwrap();
    for id in offset..offset + rows {
        let price = if id % 10 == 0 {
            DataValue::Null
        } else {
            DataValue::Float64((id as f64 / 4.0).into())
        };
        let tag = DataValue::String(format!("tag-{}", id % 3));
        writer.append_row(&[DataValue::Int64(id), price, tag]).unwrap();
    }
    writer.finish(dir.join(format!("{segment_id}.dat"))).unwrap();
}

/// Ids of all rows loaded by a scan of every segment in `segments`.
fn scan_ids(
    group: &Arc<SegmentGroup>,
    segments: &[u32],
    ctx: &SegmentReadContext,
    columns: Vec<ColumnId>,
) -> Vec<(i64, BlockDisposition)> {
    let mut ids = vec![];
    for &segment_id in segments {
        let mut reader = SegmentReader::open(group.clone(), segment_id, ctx.clone());
        reader.init(true).unwrap();
        let mut batch = VectorizedRowBatch::new(group.schema(), columns.clone(), 512).unwrap();
        let mut position = reader.seek_to_block(0, u32::MAX, false).unwrap();
        while !position.eof {
            position = reader.get_block(&mut batch).unwrap();
            for row in 0..batch.size() {
                let DataValue::Int64(id) = batch.column(0).get(row) else {
                    panic!("unexpected id");
                };
                ids.push((id, batch.block_status()));
            }
        }
    }
    ids
}

#[test]
fn scan_segment_group() {
    let dir = tempfile::tempdir().unwrap();
    let schema = schema();
    write_segment(dir.path(), &schema, 0, 0, 2000);
    write_segment(dir.path(), &schema, 1, 2000, 1000);
    let group = Arc::new(SegmentGroup::new(dir.path(), 7, (3, 5), schema, 1024));

    let stats = Arc::new(ReaderStatistics::new());
    let cache = IndexCache::new(1 << 20);
    let ctx = SegmentReadContext::new(vec![0, 1, 2])
        .with_index_cache(cache.clone())
        .with_statistics(stats.clone())
        .with_options(SegmentReaderOptions::default_for_test());

    let ids = scan_ids(&group, &[0, 1], &ctx, vec![0, 1, 2]);
    assert_eq!(ids.len(), 3000);
    assert!(ids.iter().enumerate().all(|(i, (id, _))| *id == i as i64));
    assert!(ids.iter().all(|(_, status)| *status == BlockDisposition::Include));

    let snapshot = stats.snapshot();
    // 4 blocks in the first segment, 2 in the second
    assert_eq!(snapshot.blocks_load, 6);
    assert_eq!(snapshot.raw_rows_read, 3000);
    assert_eq!(cache.pinned(), 0);
}

#[test]
fn scan_with_conditions_from_json() {
    let dir = tempfile::tempdir().unwrap();
    let schema = schema();
    write_segment(dir.path(), &schema, 0, 0, 4096);
    let group = Arc::new(SegmentGroup::new(dir.path(), 7, (3, 5), schema, 1024));

    let conditions: Conditions = serde_json::from_str(
        r#"{"columns": {"0": {"predicates": [
            {"Compare": ["Ge", {"Int64": 1000}]},
            {"Compare": ["Lt", {"Int64": 1500}]}
        ]}}}"#,
    )
    .unwrap();
    assert_eq!(
        conditions,
        Conditions::new()
            .with(0, Predicate::Compare(CompareOp::Ge, DataValue::Int64(1000)))
            .with(0, Predicate::Compare(CompareOp::Lt, DataValue::Int64(1500)))
    );

    let ctx = SegmentReadContext::new(vec![0, 2]).with_conditions(Arc::new(conditions));
    let ids = scan_ids(&group, &[0], &ctx, vec![0, 2]);
    // blocks of 512 rows: 1000..1500 lives in blocks 1 and 2
    assert_eq!(ids.first().unwrap().0, 512);
    assert_eq!(ids.last().unwrap().0, 1535);
    assert_eq!(ctx.stats().snapshot().rows_stats_filtered, 4096 - 1024);
}

#[test]
fn conditions_with_mismatched_literal_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let schema = schema();
    write_segment(dir.path(), &schema, 0, 0, 1024);
    let group = Arc::new(SegmentGroup::new(dir.path(), 7, (3, 5), schema, 1024));

    // `id` is Int64
    let conditions: Conditions = serde_json::from_str(
        r#"{"columns": {"0": {"predicates": [{"Compare": ["Eq", {"Int32": 5}]}]}}}"#,
    )
    .unwrap();
    let ctx = SegmentReadContext::new(vec![0]).with_conditions(Arc::new(conditions));
    let mut reader = SegmentReader::open(group, 0, ctx);
    let err = reader.init(false).unwrap_err();
    assert!(
        matches!(err.kind(), segment_scan::storage::StorageError::InvalidArgument(_)),
        "{err}"
    );
}

#[test]
fn scan_with_delete_conditions() {
    let dir = tempfile::tempdir().unwrap();
    let schema = schema();
    write_segment(dir.path(), &schema, 0, 0, 2048);
    let group = Arc::new(SegmentGroup::new(dir.path(), 7, (3, 5), schema, 1024));

    let id = |op, v| Conditions::new().with(0, Predicate::Compare(op, DataValue::Int64(v)));
    let mut handler = DeleteHandler::new();
    // newer than the segment: removes ids below 1024, and maybe 1600
    handler.push(4, id(CompareOp::Lt, 1024));
    handler.push(6, id(CompareOp::Eq, 1600));
    // not newer than the segment
    handler.push(3, id(CompareOp::Ge, 0));

    let ctx = SegmentReadContext::new(vec![0])
        .with_delete_handler(Arc::new(handler), DelCondSatisfied::PartialSatisfied);
    let ids = scan_ids(&group, &[0], &ctx, vec![0]);
    assert_eq!(ids.len(), 1024);
    assert_eq!(ids[0].0, 1024);
    let statuses = ids
        .iter()
        .map(|(id, status)| (id / 512, *status))
        .collect::<BTreeSet<_>>();
    assert_eq!(
        statuses.into_iter().collect::<Vec<_>>(),
        [(2, BlockDisposition::Include), (3, BlockDisposition::RequiresRowFilter)]
    );
    assert_eq!(ctx.stats().snapshot().rows_del_filtered, 1024);
}
