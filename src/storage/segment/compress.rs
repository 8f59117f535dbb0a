// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use serde::{Deserialize, Serialize};

use crate::storage::{StorageResult, TracedStorageError};

/// Compression applied to the chunks of every stream in a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressKind {
    None,
    Lz4,
    Zstd,
}

impl CompressKind {
    pub fn to_u32(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Lz4 => 1,
            Self::Zstd => 2,
        }
    }

    pub fn from_u32(tag: u32) -> Option<Self> {
        Some(match tag {
            0 => Self::None,
            1 => Self::Lz4,
            2 => Self::Zstd,
            _ => return None,
        })
    }
}

/// Decompresses one chunk. The second argument bounds the output size.
pub type Decompressor = fn(&[u8], usize) -> StorageResult<Vec<u8>>;

/// Compresses one chunk.
pub type Compressor = fn(&[u8]) -> StorageResult<Vec<u8>>;

/// Pick the decompressor of a segment from the compression tag in its header.
/// `None` means chunks are stored as-is.
pub fn decompressor_for(tag: u32) -> StorageResult<Option<Decompressor>> {
    match CompressKind::from_u32(tag) {
        Some(CompressKind::None) => Ok(None),
        Some(CompressKind::Lz4) => Ok(Some(lz4_decompress)),
        Some(CompressKind::Zstd) => Ok(Some(zstd_decompress)),
        None => Err(TracedStorageError::format(format!(
            "unknown compression kind {tag}"
        ))),
    }
}

pub fn compressor_for(kind: CompressKind) -> Option<Compressor> {
    match kind {
        CompressKind::None => None,
        CompressKind::Lz4 => Some(lz4_compress),
        CompressKind::Zstd => Some(zstd_compress),
    }
}

fn lz4_compress(input: &[u8]) -> StorageResult<Vec<u8>> {
    Ok(lz4_flex::compress_prepend_size(input))
}

fn lz4_decompress(input: &[u8], max_len: usize) -> StorageResult<Vec<u8>> {
    let (size, body) = match input {
        [a, b, c, d, body @ ..] => (u32::from_le_bytes([*a, *b, *c, *d]) as usize, body),
        _ => return Err(TracedStorageError::format("lz4 chunk is too short")),
    };
    if size > max_len {
        return Err(TracedStorageError::format(format!(
            "decompressed chunk of {size} bytes exceeds buffer size {max_len}"
        )));
    }
    let output = lz4_flex::decompress(body, size)
        .map_err(|e| TracedStorageError::format(format!("failed to decompress chunk: {e}")))?;
    if output.len() != size {
        return Err(TracedStorageError::format(format!(
            "decompressed chunk has {} bytes, expected {size}",
            output.len()
        )));
    }
    Ok(output)
}

fn zstd_compress(input: &[u8]) -> StorageResult<Vec<u8>> {
    Ok(zstd::bulk::compress(input, 1)?)
}

fn zstd_decompress(input: &[u8], max_len: usize) -> StorageResult<Vec<u8>> {
    zstd::bulk::decompress(input, max_len)
        .map_err(|e| TracedStorageError::format(format!("failed to decompress chunk: {e}")))
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(CompressKind::Lz4)]
    #[test_case(CompressKind::Zstd)]
    fn test_compress_decompress(kind: CompressKind) {
        let data = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaabbbbbbbbbbbbbbbbbbbb".repeat(10);
        let compressed = compressor_for(kind).unwrap()(&data).unwrap();
        assert!(compressed.len() < data.len());
        let decompress = decompressor_for(kind.to_u32()).unwrap().unwrap();
        assert_eq!(decompress(&compressed, data.len()).unwrap(), data);
    }

    #[test]
    fn test_unknown_kind() {
        assert!(decompressor_for(0).unwrap().is_none());
        assert!(decompressor_for(42).is_err());
    }

    #[test]
    fn test_lz4_output_bound() {
        let data = vec![7u8; 1000];
        let compressed = lz4_compress(&data).unwrap();
        assert!(lz4_decompress(&compressed, 999).is_err());
    }

    #[test]
    fn test_lz4_size_checked_before_decompress() {
        let mut chunk = u32::MAX.to_le_bytes().to_vec();
        chunk.extend_from_slice(&[0u8; 8]);
        let err = lz4_decompress(&chunk, 4096).unwrap_err();
        assert!(err.to_string().contains("exceeds buffer size"), "{err}");
        assert!(lz4_decompress(&[1, 0], 4096).is_err());
    }
}
