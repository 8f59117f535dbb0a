// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Counters reported by segment scans.
//!
//! One [`ReaderStatistics`] is usually shared by all segment readers of a
//! logical scan, so the counters are atomics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

/// Statistics sink of segment readers.
#[derive(Debug, Default)]
pub struct ReaderStatistics {
    /// Rows in blocks removed because a delete condition fully matched them
    rows_del_filtered: AtomicU64,
    /// Rows in blocks removed by zone maps or bloom filters
    rows_stats_filtered: AtomicU64,
    blocks_load: AtomicU64,
    raw_rows_read: AtomicU64,
    compressed_bytes_read: AtomicU64,
    uncompressed_bytes_read: AtomicU64,
    index_load_ns: AtomicU64,
    block_seek_ns: AtomicU64,
    block_load_ns: AtomicU64,
}

/// A point-in-time copy of [`ReaderStatistics`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReaderStatisticsSnapshot {
    pub rows_del_filtered: u64,
    pub rows_stats_filtered: u64,
    pub blocks_load: u64,
    pub raw_rows_read: u64,
    pub compressed_bytes_read: u64,
    pub uncompressed_bytes_read: u64,
    pub index_load_ns: u64,
    pub block_seek_ns: u64,
    pub block_load_ns: u64,
}

/// Adds the elapsed time to a counter when dropped.
pub struct ScopedTimer<'a> {
    counter: &'a AtomicU64,
    start: Instant,
}

impl Drop for ScopedTimer<'_> {
    fn drop(&mut self) {
        self.counter
            .fetch_add(self.start.elapsed().as_nanos() as u64, Ordering::Relaxed);
    }
}

impl ReaderStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rows_del_filtered(&self, rows: u64) {
        self.rows_del_filtered.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn add_rows_stats_filtered(&self, rows: u64) {
        self.rows_stats_filtered.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn add_block_load(&self, rows: u64) {
        self.blocks_load.fetch_add(1, Ordering::Relaxed);
        self.raw_rows_read.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn add_bytes_read(&self, compressed: u64, uncompressed: u64) {
        self.compressed_bytes_read
            .fetch_add(compressed, Ordering::Relaxed);
        self.uncompressed_bytes_read
            .fetch_add(uncompressed, Ordering::Relaxed);
    }

    pub fn time_index_load(&self) -> ScopedTimer<'_> {
        Self::timer(&self.index_load_ns)
    }

    pub fn time_block_seek(&self) -> ScopedTimer<'_> {
        Self::timer(&self.block_seek_ns)
    }

    pub fn time_block_load(&self) -> ScopedTimer<'_> {
        Self::timer(&self.block_load_ns)
    }

    fn timer(counter: &AtomicU64) -> ScopedTimer<'_> {
        ScopedTimer {
            counter,
            start: Instant::now(),
        }
    }

    pub fn snapshot(&self) -> ReaderStatisticsSnapshot {
        ReaderStatisticsSnapshot {
            rows_del_filtered: self.rows_del_filtered.load(Ordering::Relaxed),
            rows_stats_filtered: self.rows_stats_filtered.load(Ordering::Relaxed),
            blocks_load: self.blocks_load.load(Ordering::Relaxed),
            raw_rows_read: self.raw_rows_read.load(Ordering::Relaxed),
            compressed_bytes_read: self.compressed_bytes_read.load(Ordering::Relaxed),
            uncompressed_bytes_read: self.uncompressed_bytes_read.load(Ordering::Relaxed),
            index_load_ns: self.index_load_ns.load(Ordering::Relaxed),
            block_seek_ns: self.block_seek_ns.load(Ordering::Relaxed),
            block_load_ns: self.block_load_ns.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = ReaderStatistics::new();
        stats.add_block_load(1024);
        stats.add_block_load(10);
        stats.add_rows_del_filtered(5);
        {
            let _timer = stats.time_block_seek();
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.blocks_load, 2);
        assert_eq!(snapshot.raw_rows_read, 1034);
        assert_eq!(snapshot.rows_del_filtered, 5);
        assert!(snapshot.block_seek_ns > 0);
    }
}
