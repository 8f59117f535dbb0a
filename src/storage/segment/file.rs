// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::io::{Read, Seek, SeekFrom};
#[cfg(unix)]
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use super::IOBackend;
use crate::storage::{StorageResult, TracedStorageError};

/// A segment file opened for reading.
#[derive(Clone)]
pub enum SegmentFile {
    /// For `read_at`
    #[cfg(unix)]
    PositionedRead(Arc<std::fs::File>),
    /// For `file.lock().seek().read()`
    NormalRead(Arc<Mutex<std::fs::File>>),
    /// An in-memory file
    InMemory(Bytes),
}

impl SegmentFile {
    pub fn open(path: impl AsRef<Path>, backend: IOBackend) -> StorageResult<Self> {
        let file = std::fs::OpenOptions::new().read(true).open(path.as_ref())?;
        Ok(match backend {
            #[cfg(unix)]
            IOBackend::PositionedRead => Self::PositionedRead(Arc::new(file)),
            #[cfg(not(unix))]
            IOBackend::PositionedRead => Self::NormalRead(Arc::new(Mutex::new(file))),
            IOBackend::NormalRead => Self::NormalRead(Arc::new(Mutex::new(file))),
        })
    }

    pub fn len(&self) -> StorageResult<u64> {
        Ok(match self {
            #[cfg(unix)]
            Self::PositionedRead(file) => file.metadata()?.len(),
            Self::NormalRead(file) => file.lock().metadata()?.len(),
            Self::InMemory(data) => data.len() as u64,
        })
    }

    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Read exactly `length` bytes at `offset`.
    pub fn read_at(&self, offset: u64, length: usize) -> StorageResult<Bytes> {
        match self {
            #[cfg(unix)]
            Self::PositionedRead(file) => {
                let mut data = vec![0; length];
                file.read_exact_at(&mut data[..], offset)?;
                Ok(Bytes::from(data))
            }
            Self::NormalRead(file) => {
                let mut data = vec![0; length];
                let mut file = file.lock();
                file.seek(SeekFrom::Start(offset))?;
                file.read_exact(&mut data[..])?;
                Ok(Bytes::from(data))
            }
            Self::InMemory(data) => {
                let end = offset as usize + length;
                if end > data.len() {
                    return Err(TracedStorageError::format(format!(
                        "read of {length} bytes at {offset} is out of file range {}",
                        data.len()
                    )));
                }
                Ok(data.slice(offset as usize..end))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(IOBackend::PositionedRead)]
    #[test_case(IOBackend::NormalRead)]
    fn test_read_at(backend: IOBackend) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.dat");
        std::fs::write(&path, b"0123456789").unwrap();
        let file = SegmentFile::open(&path, backend).unwrap();
        assert_eq!(file.len().unwrap(), 10);
        assert_eq!(&file.read_at(3, 4).unwrap()[..], b"3456");
        assert!(file.read_at(8, 4).is_err());
    }

    #[test]
    fn test_in_memory() {
        let file = SegmentFile::InMemory(Bytes::from_static(b"abcdef"));
        assert_eq!(&file.read_at(1, 2).unwrap()[..], b"bc");
        assert!(file.read_at(5, 2).is_err());
    }
}
