// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Per-block bloom filters.
//!
//! The bloom filter stream of a column is a plain sequence of fixed-size
//! entries, one per block. Every entry has `bit_num` bits; the segment header
//! records `bit_num` and the number of probes.

use std::hash::Hasher;

use bitvec::prelude::*;
use rustc_hash::FxHasher;

use super::encode::encode_value;
use super::IndexBuffer;
use crate::storage::{StorageResult, TracedStorageError};
use crate::types::{BlockId, DataValue};

const SEED1: u64 = 0x9E37_79B9_7F4A_7C15;
const SEED2: u64 = 0xD1B5_4A32_D192_ED03;

fn hash_with_seed(seed: u64, bytes: &[u8]) -> u64 {
    let mut h = FxHasher::default();
    h.write_u64(seed);
    h.write(bytes);
    h.finish()
}

/// Bit positions probed for `value`, by double hashing its tagged encoding.
fn probes(value: &DataValue, bit_num: usize, hash_function_num: u32) -> impl Iterator<Item = usize> {
    let mut key = vec![];
    encode_value(value, &mut key);
    let h1 = hash_with_seed(SEED1, &key);
    // odd step, so probes never collapse to one bit
    let h2 = hash_with_seed(SEED2, &key) | 1;
    (0..hash_function_num as u64).map(move |i| {
        let x = h1.wrapping_add(h2.wrapping_mul(i));
        ((x as u128 * bit_num as u128) >> 64) as usize
    })
}

/// One block's bloom filter.
pub struct BloomFilter<'a> {
    bits: &'a BitSlice<u8, Lsb0>,
    hash_function_num: u32,
}

impl BloomFilter<'_> {
    /// Returns `false` only if no row of the block holds `value`.
    pub fn test(&self, value: &DataValue) -> bool {
        probes(value, self.bits.len(), self.hash_function_num).all(|bit| self.bits[bit])
    }
}

pub struct BloomFilterBuilder {
    bits: BitVec<u8, Lsb0>,
    hash_function_num: u32,
}

impl BloomFilterBuilder {
    pub fn new(bit_num: u32, hash_function_num: u32) -> Self {
        Self {
            bits: BitVec::repeat(false, bit_num as usize),
            hash_function_num,
        }
    }

    pub fn add(&mut self, value: &DataValue) {
        let bit_num = self.bits.len();
        for bit in probes(value, bit_num, self.hash_function_num) {
            self.bits.set(bit, true);
        }
    }

    /// Append the filter to `output` and clear it for the next block.
    pub fn finish_entry(&mut self, output: &mut Vec<u8>) {
        output.extend_from_slice(self.bits.as_raw_slice());
        self.bits.fill(false);
    }
}

/// Bloom filters of one column, read in place from an index buffer.
pub struct BloomFilterReader {
    buffer: IndexBuffer,
    entry_size: usize,
    hash_function_num: u32,
}

impl BloomFilterReader {
    pub fn init(buffer: IndexBuffer, hash_function_num: u32, bit_num: u32) -> StorageResult<Self> {
        if bit_num == 0 || bit_num % 8 != 0 || hash_function_num == 0 {
            return Err(TracedStorageError::format(format!(
                "invalid bloom filter parameters: {bit_num} bits, {hash_function_num} hash functions"
            )));
        }
        let entry_size = bit_num as usize / 8;
        if buffer.len() % entry_size != 0 {
            return Err(TracedStorageError::format(format!(
                "bloom filter stream of {} bytes is not a multiple of entry size {entry_size}",
                buffer.len()
            )));
        }
        Ok(Self {
            buffer,
            entry_size,
            hash_function_num,
        })
    }

    pub fn entry_count(&self) -> usize {
        self.buffer.len() / self.entry_size
    }

    pub fn entry(&self, block: BlockId) -> BloomFilter<'_> {
        let start = block as usize * self.entry_size;
        BloomFilter {
            bits: self.buffer[start..start + self.entry_size].view_bits::<Lsb0>(),
            hash_function_num: self.hash_function_num,
        }
    }

    pub fn buffer(&self) -> &IndexBuffer {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn test_bloom_filter() {
        let mut builder = BloomFilterBuilder::new(1024, 4);
        let mut data = vec![];
        for block in 0..3i64 {
            for v in 0..50 {
                builder.add(&DataValue::Int64(block * 1000 + v));
            }
            builder.finish_entry(&mut data);
        }
        let reader = BloomFilterReader::init(IndexBuffer::Owned(Bytes::from(data)), 4, 1024).unwrap();
        assert_eq!(reader.entry_count(), 3);
        for block in 0..3i64 {
            let bf = reader.entry(block as BlockId);
            for v in 0..50 {
                assert!(bf.test(&DataValue::Int64(block * 1000 + v)));
            }
        }
        let misses = (0..1000)
            .filter(|v| reader.entry(0).test(&DataValue::Int64(500_000 + v)))
            .count();
        assert!(misses < 100, "false positive rate too high: {misses}");
    }

    #[test]
    fn test_invalid_parameters() {
        let buffer = || IndexBuffer::Owned(Bytes::from(vec![0; 24]));
        assert!(BloomFilterReader::init(buffer(), 4, 12).is_err());
        assert!(BloomFilterReader::init(buffer(), 0, 64).is_err());
        assert!(BloomFilterReader::init(buffer(), 4, 128).is_err());
        assert!(BloomFilterReader::init(buffer(), 4, 64).is_ok());
    }
}
