// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::path::Path;
use std::sync::Arc;

use criterion::*;
use segment_scan::array::VectorizedRowBatch;
use segment_scan::catalog::{ColumnCatalog, TabletSchema};
use segment_scan::storage::{
    CompareOp, CompressKind, Conditions, IndexCache, Predicate, SegmentGroup, SegmentReadContext,
    SegmentReader, SegmentWriter, SegmentWriterOptions,
};
use segment_scan::types::{DataValue, FieldType};

const ROWS: i64 = 1 << 18;

fn write_segment(dir: &Path, schema: &TabletSchema, compress_kind: CompressKind) {
    let options = SegmentWriterOptions {
        compress_kind,
        bloom_filter_columns: vec![2],
        ..Default::default()
    };
    let mut writer = SegmentWriter::new(schema, options).unwrap();
    for i in 0..ROWS {
        writer
            .append_row(&[
                DataValue::Int64(i),
                DataValue::Int32((i % 1000) as i32 * 2),
                DataValue::String(format!("value-{}", i % 100)),
            ])
            .unwrap();
    }
    writer.finish(dir.join("0.dat")).unwrap();
}

fn scan(group: &Arc<SegmentGroup>, ctx: &SegmentReadContext) -> usize {
    let mut reader = SegmentReader::open(group.clone(), 0, ctx.clone());
    reader.init(true).unwrap();
    let mut batch =
        VectorizedRowBatch::new(group.schema(), ctx.used_columns().to_vec(), 1024).unwrap();
    let mut position = reader.seek_to_block(0, u32::MAX, false).unwrap();
    let mut rows = 0;
    while !position.eof {
        position = reader.get_block(&mut batch).unwrap();
        rows += batch.size();
    }
    rows
}

fn segment_scan(c: &mut Criterion) {
    let schema = Arc::new(TabletSchema::new(vec![
        ColumnCatalog::new(1, "k", FieldType::Int64).key(),
        ColumnCatalog::new(2, "v", FieldType::Int32),
        ColumnCatalog::new(3, "s", FieldType::Varchar),
    ]));

    for kind in [CompressKind::None, CompressKind::Lz4, CompressKind::Zstd] {
        let dir = tempfile::tempdir().unwrap();
        write_segment(dir.path(), &schema, kind);
        let group = Arc::new(SegmentGroup::new(dir.path(), 0, (0, 0), schema.clone(), 1024));
        let cache = IndexCache::new(64 << 20);

        let mut bench = c.benchmark_group(format!("scan {kind:?}"));
        bench.throughput(Throughput::Elements(ROWS as u64));
        bench.bench_function("full", |b| {
            let ctx = SegmentReadContext::new(vec![0, 1, 2]).with_index_cache(cache.clone());
            b.iter(|| scan(&group, &ctx))
        });
        bench.bench_function("zone map", |b| {
            let conditions = Conditions::new()
                .with(0, Predicate::Compare(CompareOp::Lt, DataValue::Int64(ROWS / 10)));
            let ctx = SegmentReadContext::new(vec![0, 1, 2])
                .with_conditions(Arc::new(conditions))
                .with_index_cache(cache.clone());
            b.iter(|| scan(&group, &ctx))
        });
        bench.bench_function("bloom filter", |b| {
            // odd values are never written
            let conditions = Conditions::new()
                .with(1, Predicate::Compare(CompareOp::Eq, DataValue::Int32(501)));
            let ctx = SegmentReadContext::new(vec![0, 1])
                .with_conditions(Arc::new(conditions))
                .with_bloom_filter_columns([1])
                .with_index_cache(cache.clone());
            b.iter(|| scan(&group, &ctx))
        });
        bench.finish();
    }
}

criterion_group!(benches, segment_scan);
criterion_main!(benches);
