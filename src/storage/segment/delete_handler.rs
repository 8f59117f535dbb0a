// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use super::Conditions;
use crate::types::Version;

/// A delete predicate, applied to data written before `filter_version`.
#[derive(Debug, Clone)]
pub struct DeleteCondition {
    pub filter_version: Version,
    pub del_cond: Conditions,
}

/// Delete conditions of a tablet.
#[derive(Debug, Default, Clone)]
pub struct DeleteHandler {
    conditions: Vec<DeleteCondition>,
}

impl DeleteHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, filter_version: Version, del_cond: Conditions) {
        self.conditions.push(DeleteCondition {
            filter_version,
            del_cond,
        });
    }

    pub fn conditions(&self) -> &[DeleteCondition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Conditions that apply to a segment whose data starts at `version`.
    pub fn applicable(&self, version: Version) -> impl Iterator<Item = &DeleteCondition> {
        self.conditions
            .iter()
            .filter(move |cond| cond.filter_version > version)
    }
}

/// Whether a segment as a whole is known to satisfy the delete conditions,
/// as decided by the caller before the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DelCondSatisfied {
    /// Every row is deleted.
    Satisfied,
    /// No row is deleted.
    NotSatisfied,
    /// Unknown; blocks are evaluated one by one.
    #[default]
    PartialSatisfied,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::segment::Predicate;

    #[test]
    fn test_applicable() {
        let mut handler = DeleteHandler::new();
        handler.push(3, Conditions::new().with(0, Predicate::IsNull));
        handler.push(8, Conditions::new().with(1, Predicate::IsNull));
        assert_eq!(handler.applicable(2).count(), 2);
        assert_eq!(handler.applicable(3).count(), 1);
        assert_eq!(handler.applicable(8).count(), 0);
    }
}
