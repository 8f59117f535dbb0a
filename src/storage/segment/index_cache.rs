// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Process-wide cache of decoded index streams.
//!
//! Index streams are immutable once written, so readers of the same segment
//! share one copy. A reader holds an [`IndexCacheHandle`] for every buffer it
//! borrowed from the cache; the handle keeps the bytes alive even if the entry
//! is evicted, and is released when dropped.

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use moka::sync::Cache;

use super::StreamKind;
use crate::types::UniqueColumnId;

/// Identifies one index stream: the segment file, the column and the kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexCacheKey {
    pub file_name: Arc<str>,
    pub column_unique_id: UniqueColumnId,
    pub kind: StreamKind,
}

impl IndexCacheKey {
    pub fn new(file_name: Arc<str>, column_unique_id: UniqueColumnId, kind: StreamKind) -> Self {
        Self {
            file_name,
            column_unique_id,
            kind,
        }
    }
}

/// A shared cache of index buffers, weighted by their length in bytes.
#[derive(Clone)]
pub struct IndexCache {
    inner: Cache<IndexCacheKey, Bytes>,
    pinned: Arc<AtomicUsize>,
}

impl IndexCache {
    pub fn new(capacity: u64) -> Self {
        let inner = Cache::builder()
            .weigher(|_key: &IndexCacheKey, value: &Bytes| -> u32 {
                value.len().try_into().unwrap_or(u32::MAX)
            })
            .max_capacity(capacity)
            .build();
        Self {
            inner,
            pinned: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn lookup(&self, key: &IndexCacheKey) -> Option<IndexCacheHandle> {
        self.inner.get(key).map(|data| self.pin(data))
    }

    /// Insert `data` and return a handle to it. If another reader inserted the
    /// same key first, this one still wins; the contents are identical.
    pub fn insert(&self, key: IndexCacheKey, data: Bytes) -> IndexCacheHandle {
        self.inner.insert(key, data.clone());
        self.pin(data)
    }

    fn pin(&self, data: Bytes) -> IndexCacheHandle {
        self.pinned.fetch_add(1, Ordering::Relaxed);
        IndexCacheHandle {
            data,
            pinned: self.pinned.clone(),
        }
    }

    /// Number of handles currently alive.
    pub fn pinned(&self) -> usize {
        self.pinned.load(Ordering::Relaxed)
    }

    pub fn contains(&self, key: &IndexCacheKey) -> bool {
        self.inner.contains_key(key)
    }
}

/// A buffer borrowed from an [`IndexCache`]. Dropping it releases the pin.
pub struct IndexCacheHandle {
    data: Bytes,
    pinned: Arc<AtomicUsize>,
}

impl Deref for IndexCacheHandle {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for IndexCacheHandle {
    fn drop(&mut self) {
        self.pinned.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Bytes of one index stream, either owned by a reader or borrowed from the
/// cache.
pub enum IndexBuffer {
    Owned(Bytes),
    Cached(IndexCacheHandle),
}

impl IndexBuffer {
    pub fn is_cached(&self) -> bool {
        matches!(self, Self::Cached(_))
    }
}

impl Deref for IndexBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Owned(data) => data,
            Self::Cached(handle) => handle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(column: UniqueColumnId) -> IndexCacheKey {
        IndexCacheKey::new("0.dat".into(), column, StreamKind::RowIndex)
    }

    #[test]
    fn test_cache_pin() {
        let cache = IndexCache::new(1 << 20);
        assert!(cache.lookup(&key(1)).is_none());
        let a = cache.insert(key(1), Bytes::from_static(b"zone map"));
        let b = cache.lookup(&key(1)).unwrap();
        assert_eq!(cache.pinned(), 2);
        assert_eq!(a.as_ptr(), b.as_ptr());
        drop(a);
        assert_eq!(cache.pinned(), 1);
        assert_eq!(&b[..], b"zone map");
        drop(b);
        assert_eq!(cache.pinned(), 0);
        assert!(cache.lookup(&key(2)).is_none());
    }

    #[test]
    fn test_handle_outlives_entry() {
        let cache = IndexCache::new(1 << 20);
        let handle = cache.insert(key(1), Bytes::from(vec![1, 2, 3]));
        cache.inner.invalidate(&key(1));
        assert!(!cache.contains(&key(1)));
        assert_eq!(&handle[..], [1, 2, 3]);
    }
}
