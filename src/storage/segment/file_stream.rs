// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Chunked streams.
//!
//! Every stream of a segment is a sequence of chunks:
//!
//! ```plain
//! | payload length (u32) | compressed (u8) | payload crc32 (u32) | payload |
//! ```
//!
//! A position inside a stream is the pair `(chunk offset, byte offset)`: the
//! offset of a chunk from the start of the stream, and the offset inside the
//! uncompressed chunk.

use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes};

use super::checksum::{build_checksum, verify_checksum};
use super::compress::{Compressor, Decompressor};
use super::{ReaderStatistics, SegmentFile};
use crate::storage::{StorageResult, TracedStorageError};

pub const CHUNK_HEAD_SIZE: usize = 4 + 1 + 4;

/// Reads one stream of a segment file.
pub struct ReadOnlyFileStream {
    file: SegmentFile,
    /// Offset of the stream in the file
    offset: u64,
    length: u64,
    decompressor: Option<Decompressor>,
    buffer_size: usize,
    stats: Arc<ReaderStatistics>,

    /// Uncompressed content of the current chunk
    current: Bytes,
    /// Cursor inside `current`
    pos: usize,
    next_chunk_offset: u64,
}

impl ReadOnlyFileStream {
    pub fn new(
        file: SegmentFile,
        offset: u64,
        length: u64,
        decompressor: Option<Decompressor>,
        buffer_size: usize,
        stats: Arc<ReaderStatistics>,
    ) -> Self {
        Self {
            file,
            offset,
            length,
            decompressor,
            buffer_size,
            stats,
            current: Bytes::new(),
            pos: 0,
            next_chunk_offset: 0,
        }
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn load_chunk(&mut self, chunk_offset: u64) -> StorageResult<()> {
        if chunk_offset >= self.length {
            return Err(TracedStorageError::stream_eof());
        }
        if chunk_offset + CHUNK_HEAD_SIZE as u64 > self.length {
            return Err(TracedStorageError::format("truncated chunk head"));
        }
        let head = self
            .file
            .read_at(self.offset + chunk_offset, CHUNK_HEAD_SIZE)?;
        let mut head = &head[..];
        let payload_len = head.get_u32_le() as u64;
        let compressed = head.get_u8() != 0;
        let checksum = head.get_u32_le();

        let payload_offset = chunk_offset + CHUNK_HEAD_SIZE as u64;
        if payload_offset + payload_len > self.length {
            return Err(TracedStorageError::format(format!(
                "chunk at {chunk_offset} overruns stream of {} bytes",
                self.length
            )));
        }
        let payload = self
            .file
            .read_at(self.offset + payload_offset, payload_len as usize)?;
        verify_checksum(&payload, checksum, "stream chunk")?;

        self.current = if compressed {
            let decompress = self.decompressor.ok_or_else(|| {
                TracedStorageError::format("compressed chunk in an uncompressed segment")
            })?;
            Bytes::from(decompress(&payload, self.buffer_size)?)
        } else {
            payload
        };
        self.stats
            .add_bytes_read(payload_len, self.current.len() as u64);
        self.pos = 0;
        self.next_chunk_offset = payload_offset + payload_len;
        Ok(())
    }

    /// Position the cursor at `byte_offset` inside the chunk at `chunk_offset`.
    pub fn seek(&mut self, chunk_offset: u64, byte_offset: u64) -> StorageResult<()> {
        self.load_chunk(chunk_offset)?;
        if byte_offset > self.current.len() as u64 {
            return Err(TracedStorageError::format(format!(
                "byte offset {byte_offset} beyond chunk of {} bytes",
                self.current.len()
            )));
        }
        self.pos = byte_offset as usize;
        Ok(())
    }

    /// Fill `buf` from the cursor, crossing chunk boundaries as needed.
    pub fn read_exact(&mut self, mut buf: &mut [u8]) -> StorageResult<()> {
        while !buf.is_empty() {
            if self.pos == self.current.len() {
                self.load_chunk(self.next_chunk_offset)?;
                continue;
            }
            let n = buf.len().min(self.current.len() - self.pos);
            buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
            self.pos += n;
            buf = &mut buf[n..];
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> StorageResult<u8> {
        let mut buf = [0; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    /// Read the whole stream from its beginning.
    pub fn read_all(&mut self) -> StorageResult<Vec<u8>> {
        let mut data = vec![];
        let mut chunk_offset = 0;
        while chunk_offset < self.length {
            self.load_chunk(chunk_offset)?;
            data.try_reserve(self.current.len())?;
            data.extend_from_slice(&self.current);
            chunk_offset = self.next_chunk_offset;
        }
        self.current = Bytes::new();
        self.pos = 0;
        self.next_chunk_offset = 0;
        Ok(data)
    }
}

/// Builds one stream. Chunks are cut every `buffer_size` bytes.
pub struct OutStream {
    compressor: Option<Compressor>,
    buffer_size: usize,
    output: Vec<u8>,
    current: Vec<u8>,
}

impl OutStream {
    pub fn new(compressor: Option<Compressor>, buffer_size: usize) -> Self {
        Self {
            compressor,
            buffer_size: buffer_size.max(1),
            output: vec![],
            current: vec![],
        }
    }

    /// Position the next written byte will be read from.
    pub fn position(&self) -> (u64, u64) {
        (self.output.len() as u64, self.current.len() as u64)
    }

    pub fn write(&mut self, mut data: &[u8]) -> StorageResult<()> {
        while !data.is_empty() {
            let n = data.len().min(self.buffer_size - self.current.len());
            self.current.extend_from_slice(&data[..n]);
            data = &data[n..];
            if self.current.len() == self.buffer_size {
                self.spill()?;
            }
        }
        Ok(())
    }

    fn spill(&mut self) -> StorageResult<()> {
        if self.current.is_empty() {
            return Ok(());
        }
        let compressed = match self.compressor {
            Some(compress) => Some(compress(&self.current)?)
                .filter(|compressed| compressed.len() < self.current.len()),
            None => None,
        };
        let (payload, is_compressed) = match &compressed {
            Some(data) => (&data[..], true),
            None => (&self.current[..], false),
        };
        self.output.put_u32_le(payload.len() as u32);
        self.output.put_u8(is_compressed as u8);
        self.output.put_u32_le(build_checksum(payload));
        self.output.put_slice(payload);
        self.current.clear();
        Ok(())
    }

    pub fn finish(mut self) -> StorageResult<Vec<u8>> {
        self.spill()?;
        Ok(self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::segment::compress::{compressor_for, decompressor_for};
    use crate::storage::segment::CompressKind;

    fn build(kind: CompressKind, buffer_size: usize, data: &[u8]) -> (ReadOnlyFileStream, Vec<(u64, u64)>) {
        let mut out = OutStream::new(compressor_for(kind), buffer_size);
        let mut positions = vec![];
        for part in data.chunks(10) {
            positions.push(out.position());
            out.write(part).unwrap();
        }
        let stream = out.finish().unwrap();
        let mut file = vec![0xAA; 7];
        file.extend_from_slice(&stream);
        let stream = ReadOnlyFileStream::new(
            SegmentFile::InMemory(Bytes::from(file)),
            7,
            stream.len() as u64,
            decompressor_for(kind.to_u32()).unwrap(),
            buffer_size,
            Arc::new(ReaderStatistics::new()),
        );
        (stream, positions)
    }

    #[test]
    fn test_read_across_chunks() {
        let data: Vec<u8> = (0..100).collect();
        let (mut stream, _) = build(CompressKind::None, 16, &data);
        let mut buf = vec![0; 100];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(buf, data);
        assert!(stream.read_u8().unwrap_err().is_stream_eof());
        assert_eq!(stream.read_all().unwrap(), data);
    }

    #[test]
    fn test_seek() {
        let data = vec![3u8; 64]
            .into_iter()
            .chain((0..64).map(|x| x as u8))
            .collect::<Vec<_>>();
        let (mut stream, positions) = build(CompressKind::Lz4, 32, &data);
        for (idx, (chunk, byte)) in positions.iter().enumerate() {
            stream.seek(*chunk, *byte).unwrap();
            assert_eq!(stream.read_u8().unwrap(), data[idx * 10]);
        }
        assert!(stream.seek(stream.length(), 0).unwrap_err().is_stream_eof());
    }
}
