// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use bitvec::vec::BitVec;

use super::{Array, ArrayBuilder};

/// A collection of strings.
///
/// All values share one `data` buffer, which serves as the memory arena of the
/// array; `offset` delimits the values in it.
#[derive(Debug, Clone, PartialEq)]
pub struct Utf8Array {
    offset: Vec<usize>,
    valid: BitVec,
    data: Vec<u8>,
}

impl Array for Utf8Array {
    type Item = str;
    type Builder = Utf8ArrayBuilder;

    fn get(&self, idx: usize) -> Option<&str> {
        if self.valid[idx] {
            let data_slice = &self.data[self.offset[idx]..self.offset[idx + 1]];
            // values only enter through `push(&str)` or a validated `push_bytes`
            Some(std::str::from_utf8(data_slice).unwrap_or_default())
        } else {
            None
        }
    }

    fn len(&self) -> usize {
        self.valid.len()
    }
}

/// A builder that uses `&str` to build an [`Utf8Array`].
pub struct Utf8ArrayBuilder {
    offset: Vec<usize>,
    valid: BitVec,
    data: Vec<u8>,
}

impl Utf8ArrayBuilder {
    /// Append raw bytes read from a stream, rejecting invalid UTF-8.
    pub fn push_bytes(&mut self, value: &[u8]) -> Result<(), std::str::Utf8Error> {
        let s = std::str::from_utf8(value)?;
        self.push(Some(s));
        Ok(())
    }
}

impl ArrayBuilder for Utf8ArrayBuilder {
    type Array = Utf8Array;

    fn with_capacity(capacity: usize) -> Self {
        let mut offset = Vec::with_capacity(capacity + 1);
        offset.push(0);
        Self {
            offset,
            data: Vec::with_capacity(capacity),
            valid: BitVec::with_capacity(capacity),
        }
    }

    fn push(&mut self, value: Option<&str>) {
        self.valid.push(value.is_some());
        if let Some(x) = value {
            self.data.extend_from_slice(x.as_bytes());
        }
        self.offset.push(self.data.len());
    }

    fn append(&mut self, other: &Utf8Array) {
        self.valid.extend_from_bitslice(&other.valid);
        let start = self.data.len();
        self.data.extend_from_slice(&other.data);
        for other_offset in &other.offset[1..] {
            self.offset.push(*other_offset + start);
        }
    }

    fn finish(self) -> Utf8Array {
        Utf8Array {
            valid: self.valid,
            data: self.data,
            offset: self.offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_builder() {
        let mut builder = Utf8ArrayBuilder::with_capacity(100);
        for i in 0..100 {
            if i % 2 == 0 {
                builder.push(Some(&format!("{}", i)));
            } else {
                builder.push(None);
            }
        }
        let array = builder.finish();
        assert_eq!(array.get(10), Some("10"));
        assert_eq!(array.get(11), None);
    }

    #[test]
    fn test_push_bytes_rejects_invalid_utf8() {
        let mut builder = Utf8ArrayBuilder::with_capacity(1);
        assert!(builder.push_bytes(&[0xff, 0xfe]).is_err());
        builder.push_bytes(b"ok").unwrap();
        assert_eq!(builder.finish().get(0), Some("ok"));
    }
}
