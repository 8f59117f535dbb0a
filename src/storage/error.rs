// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::backtrace::Backtrace;

use thiserror::Error;

use crate::array::ArrayError;
use crate::types::{BlockId, ColumnId, UniqueColumnId};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("format error: {0}")]
    Format(String),
    #[error("failed to allocate {0}")]
    Alloc(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid column id: {0}")]
    InvalidColumn(ColumnId),
    #[error("failed to seek column {column} to block {block}")]
    ColumnSeek {
        column: UniqueColumnId,
        block: BlockId,
    },
    #[error("end of column stream")]
    StreamEof,
    #[error("no more data in segment")]
    DataEof,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON decode error: {0}")]
    JsonDecode(#[from] serde_json::Error),
    #[error("array error: {0}")]
    Array(#[from] ArrayError),
}

impl From<std::io::Error> for TracedStorageError {
    #[inline]
    fn from(e: std::io::Error) -> TracedStorageError {
        StorageError::Io(e).into()
    }
}

impl From<serde_json::Error> for TracedStorageError {
    #[inline]
    fn from(e: serde_json::Error) -> TracedStorageError {
        StorageError::JsonDecode(e).into()
    }
}

impl From<ArrayError> for TracedStorageError {
    #[inline]
    fn from(e: ArrayError) -> TracedStorageError {
        StorageError::Array(e).into()
    }
}

impl From<std::collections::TryReserveError> for TracedStorageError {
    #[inline]
    fn from(e: std::collections::TryReserveError) -> TracedStorageError {
        StorageError::Alloc(e.to_string()).into()
    }
}

/// [`StorageError`] with backtrace.
pub struct TracedStorageError {
    source: StorageError,
    backtrace: Backtrace,
}

impl From<StorageError> for TracedStorageError {
    #[inline]
    fn from(source: StorageError) -> TracedStorageError {
        TracedStorageError {
            source,
            backtrace: Backtrace::capture(),
        }
    }
}

impl std::fmt::Display for TracedStorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}\n{}", self.source, self.backtrace)
    }
}

impl std::error::Error for TracedStorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl std::fmt::Debug for TracedStorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl TracedStorageError {
    pub fn format(message: impl ToString) -> Self {
        StorageError::Format(message.to_string()).into()
    }

    pub fn alloc(message: impl ToString) -> Self {
        StorageError::Alloc(message.to_string()).into()
    }

    pub fn invalid_argument(message: impl ToString) -> Self {
        StorageError::InvalidArgument(message.to_string()).into()
    }

    pub fn invalid_column(column: ColumnId) -> Self {
        StorageError::InvalidColumn(column).into()
    }

    pub fn column_seek(column: UniqueColumnId, block: BlockId) -> Self {
        StorageError::ColumnSeek { column, block }.into()
    }

    pub fn stream_eof() -> Self {
        StorageError::StreamEof.into()
    }

    pub fn data_eof() -> Self {
        StorageError::DataEof.into()
    }

    /// The underlying error.
    pub fn kind(&self) -> &StorageError {
        &self.source
    }

    /// A column stream ran out of data.
    pub fn is_stream_eof(&self) -> bool {
        matches!(self.source, StorageError::StreamEof)
    }

    /// The scan ran out of data. This is an outcome, not a failure.
    pub fn is_data_eof(&self) -> bool {
        matches!(self.source, StorageError::DataEof)
    }
}

pub type StorageResult<T> = std::result::Result<T, TracedStorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = TracedStorageError::format("bad magic");
        assert!(matches!(err.kind(), StorageError::Format(_)));
        assert!(!err.is_data_eof());
        assert!(TracedStorageError::data_eof().is_data_eof());
        assert!(TracedStorageError::stream_eof().is_stream_eof());

        let err: TracedStorageError =
            std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read").into();
        assert!(matches!(err.kind(), StorageError::Io(_)));
        assert!(err.to_string().contains("short read"));
    }
}
