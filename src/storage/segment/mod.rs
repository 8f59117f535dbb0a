// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Columnar segment files and their read path.
//!
//! # Layout
//!
//! ```plain
//! | header | stream 0 | stream 1 | ... | stream N |
//! ```
//!
//! The [`SegmentHeader`] lists every stream with its column, kind and length.
//! Each column of a segment has:
//!
//! * a row index stream holding its per-block zone map ([`ZoneMapReader`]),
//! * optionally a bloom filter stream with one filter per block,
//! * optionally a present stream marking null rows,
//! * a data stream with the plain-encoded values.
//!
//! Streams are split into checksummed chunks which may be compressed, see
//! [`ReadOnlyFileStream`].
//!
//! # Reading
//!
//! A [`SegmentReader`] loads the indexes of the scanned columns through a
//! shared [`IndexCache`], prunes blocks with delete and scan conditions, and
//! loads the surviving blocks into a [`VectorizedRowBatch`](crate::array::VectorizedRowBatch)
//! tagged with their [`BlockDisposition`].

// public modules and structures
mod condition;
mod delete_handler;
mod disposition;
mod index_cache;
mod options;
mod segment_group;
mod segment_reader;
mod segment_writer;
mod statistics;

pub use self::condition::*;
pub use self::delete_handler::*;
pub use self::disposition::*;
pub use self::index_cache::*;
pub use self::options::*;
pub use self::segment_group::*;
pub use self::segment_reader::*;
pub use self::segment_writer::*;
pub use self::statistics::*;

// internal modules and structures
mod bloom_filter;
mod checksum;
mod column_mapping;
mod column_reader;
mod compress;
mod encode;
mod file;
mod file_stream;
mod header;
mod index_loader;
mod row_group_picker;
mod stream_locator;
mod zone_map;

pub use self::bloom_filter::*;
pub use self::column_mapping::*;
pub use self::column_reader::*;
pub use self::compress::CompressKind;
pub use self::file::*;
pub use self::file_stream::*;
pub use self::header::*;
pub use self::index_loader::SegmentIndexes;
pub use self::row_group_picker::IncludeBlocks;
pub use self::zone_map::*;
