// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use serde::Serialize;

/// What a scan does with a block.
///
/// Variants are ordered by strictness. Pruning phases only move a block towards
/// stricter variants, except that a delete condition with no match marks a
/// block [`Include`](BlockDisposition::Include) unless a previous condition
/// already required row filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum BlockDisposition {
    /// Every row of the block survives all delete conditions.
    Include,
    /// Some rows may be deleted; the consumer must filter row by row.
    RequiresRowFilter,
    /// No row of the block is visible to the scan.
    Excluded,
}

/// Result of evaluating a delete condition against a block statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelMatch {
    /// Every row of the block matches.
    FullMatch,
    /// Some rows might match.
    PartialMatch,
    /// No row matches.
    NoMatch,
}

impl DelMatch {
    /// Conjunction of outcomes: any `NoMatch` wins, then any `PartialMatch`.
    /// An empty conjunction is a `FullMatch`.
    pub fn all(outcomes: impl IntoIterator<Item = DelMatch>) -> DelMatch {
        let mut result = DelMatch::FullMatch;
        for outcome in outcomes {
            match outcome {
                DelMatch::NoMatch => return DelMatch::NoMatch,
                DelMatch::PartialMatch => result = DelMatch::PartialMatch,
                DelMatch::FullMatch => {}
            }
        }
        result
    }

    pub fn full_or_partial(has_null: bool) -> DelMatch {
        if has_null {
            DelMatch::PartialMatch
        } else {
            DelMatch::FullMatch
        }
    }
}

impl BlockDisposition {
    /// Fold the outcome of one delete condition into the disposition of a
    /// block that is not yet excluded.
    pub fn apply_delete(self, outcome: DelMatch) -> BlockDisposition {
        match outcome {
            DelMatch::FullMatch => BlockDisposition::Excluded,
            DelMatch::PartialMatch => BlockDisposition::RequiresRowFilter,
            DelMatch::NoMatch => match self {
                BlockDisposition::RequiresRowFilter => BlockDisposition::RequiresRowFilter,
                _ => BlockDisposition::Include,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        assert!(BlockDisposition::Include < BlockDisposition::RequiresRowFilter);
        assert!(BlockDisposition::RequiresRowFilter < BlockDisposition::Excluded);
    }

    #[test]
    fn test_no_downgrade() {
        let status = BlockDisposition::Include
            .apply_delete(DelMatch::PartialMatch)
            .apply_delete(DelMatch::NoMatch);
        assert_eq!(status, BlockDisposition::RequiresRowFilter);
        assert_eq!(
            BlockDisposition::Include.apply_delete(DelMatch::NoMatch),
            BlockDisposition::Include
        );
        assert_eq!(
            status.apply_delete(DelMatch::FullMatch),
            BlockDisposition::Excluded
        );
    }

    #[test]
    fn test_all() {
        use DelMatch::*;
        assert_eq!(DelMatch::all([]), FullMatch);
        assert_eq!(DelMatch::all([FullMatch, PartialMatch]), PartialMatch);
        assert_eq!(DelMatch::all([PartialMatch, NoMatch, FullMatch]), NoMatch);
        assert_eq!(DelMatch::all([FullMatch, FullMatch]), FullMatch);
    }
}
