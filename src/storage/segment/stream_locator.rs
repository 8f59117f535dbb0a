// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use super::StreamInfo;

/// A stream with its absolute offset in the segment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocatedStream<'a> {
    pub info: &'a StreamInfo,
    pub offset: u64,
}

/// Compute the offset of every stream and keep the ones `needed` selects.
///
/// Offsets accumulate over all streams in file order, whether they are kept or
/// not, starting right after the header.
pub fn locate_streams<'a>(
    streams: &'a [StreamInfo],
    header_length: u64,
    mut needed: impl FnMut(&StreamInfo) -> bool,
) -> Vec<LocatedStream<'a>> {
    streams
        .iter()
        .scan(header_length, |offset, info| {
            let located = LocatedStream {
                info,
                offset: *offset,
            };
            *offset += info.length;
            Some(located)
        })
        .filter(|located| needed(located.info))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::segment::StreamKind;

    #[test]
    fn test_offsets_accumulate() {
        let streams = [
            StreamInfo {
                column_unique_id: 0,
                kind: StreamKind::RowIndex,
                length: 100,
            },
            StreamInfo {
                column_unique_id: 1,
                kind: StreamKind::RowIndex,
                length: 200,
            },
            StreamInfo {
                column_unique_id: 0,
                kind: StreamKind::Data,
                length: 50,
            },
        ];
        let all = locate_streams(&streams, 500, |_| true);
        assert_eq!(
            all.iter().map(|s| s.offset).collect::<Vec<_>>(),
            [500, 600, 800]
        );
        // skipped streams still take space
        let data = locate_streams(&streams, 500, |s| s.kind == StreamKind::Data);
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].offset, 800);
    }
}
