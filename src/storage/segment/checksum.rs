// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use crate::storage::{StorageResult, TracedStorageError};

pub fn build_checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

pub fn verify_checksum(data: &[u8], checksum: u32, what: &str) -> StorageResult<()> {
    let actual = crc32fast::hash(data);
    if actual != checksum {
        return Err(TracedStorageError::format(format!(
            "{what} checksum mismatch: expected {checksum:#010x}, found {actual:#010x}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum() {
        let data = b"COLUMN DATA";
        let checksum = build_checksum(data);
        verify_checksum(data, checksum, "header").unwrap();
        assert!(verify_checksum(b"COLUMN DATE", checksum, "header").is_err());
    }
}
