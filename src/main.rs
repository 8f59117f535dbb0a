// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Scan a segment file and report how its blocks are pruned and loaded.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use itertools::Itertools;
use segment_scan::array::VectorizedRowBatch;
use segment_scan::catalog::{ColumnCatalog, TabletSchema};
use segment_scan::storage::{
    Conditions, IndexCache, SegmentGroup, SegmentReadContext, SegmentReader,
    SegmentReaderOptions, SegmentWriter, SegmentWriterOptions,
};
use segment_scan::types::{ColumnId, DataValue, FieldType};
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter;
use tracing_subscriber::prelude::*;

const SCHEMA_FILE_NAME: &str = "schema.json";

/// Scan one segment of a segment group.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Directory of the segment group
    #[clap(short, long)]
    dir: PathBuf,

    /// Segment to scan
    #[clap(short, long, default_value_t = 0)]
    segment: u32,

    /// Tablet schema, as JSON. Defaults to `schema.json` in the segment directory
    #[clap(long)]
    schema: Option<PathBuf>,

    /// Table columns to scan, comma separated. Defaults to all columns
    #[clap(long, value_delimiter = ',')]
    columns: Vec<ColumnId>,

    /// Scan conditions, as JSON
    #[clap(long)]
    conditions: Option<PathBuf>,

    /// Table columns whose bloom filters are used, comma separated
    #[clap(long, value_delimiter = ',')]
    bloom_filter_columns: Vec<ColumnId>,

    #[clap(long, default_value_t = 0)]
    first_block: u32,

    #[clap(long, default_value_t = u32::MAX)]
    last_block: u32,

    /// Load every block, ignoring conditions
    #[clap(long)]
    ignore_filter: bool,

    /// Reader options, as JSON
    #[clap(long)]
    options: Option<PathBuf>,

    /// Do not add index streams to the index cache
    #[clap(long)]
    no_cache: bool,

    /// Print the first rows of every block
    #[clap(long, default_value_t = 0)]
    print_rows: usize,

    /// Write a sample segment with this many rows before scanning
    #[clap(long)]
    generate: Option<u64>,
}

/// Write a sample segment and its schema into `dir`.
fn generate(dir: &Path, segment: u32, rows: u64) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let schema = TabletSchema::new(vec![
        ColumnCatalog::new(0, "id", FieldType::Int64).key(),
        ColumnCatalog::new(1, "score", FieldType::Int32).nullable(),
        ColumnCatalog::new(2, "name", FieldType::Varchar),
    ]);
    std::fs::write(dir.join(SCHEMA_FILE_NAME), serde_json::to_vec_pretty(&schema)?)?;

    let options = SegmentWriterOptions {
        bloom_filter_columns: vec![0],
        ..Default::default()
    };
    let mut writer = SegmentWriter::new(&schema, options)?;
    for id in 0..rows as i64 {
        let score = if id % 7 == 0 {
            DataValue::Null
        } else {
            DataValue::Int32((id % 100) as i32)
        };
        writer.append_row(&[
            DataValue::Int64(id),
            score,
            DataValue::String(format!("row-{id}")),
        ])?;
    }
    let path = dir.join(format!("{segment}.dat"));
    writer.finish(&path)?;
    info!(path = %path.display(), rows, "sample segment written");
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let fmt_layer = tracing_subscriber::fmt::layer().compact();
    let filter_layer =
        filter::EnvFilter::from_default_env().add_directive(LevelFilter::INFO.into());

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    if let Some(rows) = args.generate {
        generate(&args.dir, args.segment, rows)?;
    }

    let schema_path = args
        .schema
        .clone()
        .unwrap_or_else(|| args.dir.join(SCHEMA_FILE_NAME));
    let schema = Arc::new(
        TabletSchema::from_json_file(&schema_path)
            .with_context(|| format!("failed to load schema {}", schema_path.display()))?,
    );
    let options = match &args.options {
        Some(path) => SegmentReaderOptions::from_json_file(path)?,
        None => SegmentReaderOptions::default_for_cli(),
    };
    let columns = if args.columns.is_empty() {
        (0..schema.num_columns() as ColumnId).collect()
    } else {
        args.columns.clone()
    };

    let mut ctx = SegmentReadContext::new(columns.clone())
        .with_bloom_filter_columns(args.bloom_filter_columns.iter().copied())
        .with_index_cache(IndexCache::new(options.index_cache_capacity))
        .with_options(options);
    if let Some(path) = &args.conditions {
        let conditions: Conditions = serde_json::from_slice(&std::fs::read(path)?)
            .with_context(|| format!("failed to parse conditions {}", path.display()))?;
        ctx = ctx.with_conditions(Arc::new(conditions));
    }
    let stats = ctx.stats().clone();

    let group = Arc::new(SegmentGroup::new(&args.dir, 0, (0, 0), schema.clone(), 1024));
    let mut reader = SegmentReader::open(group, args.segment, ctx);
    reader.init(!args.no_cache)?;
    let num_rows_in_block = reader.num_rows_in_block().unwrap_or(1024) as usize;

    let mut position =
        reader.seek_to_block(args.first_block, args.last_block, args.ignore_filter)?;
    if let Some(blocks) = reader.include_blocks() {
        info!(
            remaining = blocks.remaining(),
            "blocks: [{}]",
            blocks.as_slice().iter().map(|b| format!("{b:?}")).join(", ")
        );
    }

    let mut batch = VectorizedRowBatch::new(&schema, columns, num_rows_in_block)?;
    while !position.eof {
        let block = position.next_block;
        let loaded = stats.snapshot().blocks_load;
        position = reader.get_block(&mut batch)?;
        if stats.snapshot().blocks_load == loaded {
            // the segment ended before the block could be positioned
            break;
        }
        println!(
            "block {block}: {} rows, {:?}",
            batch.size(),
            batch.block_status()
        );
        for row in 0..batch.size().min(args.print_rows) {
            println!("  {}", batch.row(row).iter().join(", "));
        }
    }

    println!("{}", serde_json::to_string_pretty(&stats.snapshot())?);
    Ok(())
}
