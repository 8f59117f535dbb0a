// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Predicates over block statistics.
//!
//! A [`Conditions`] maps table columns to a conjunction of predicates. Scan
//! conditions ask whether a block *may* contain a matching row; delete
//! conditions ask whether *every* row of a block matches.

use std::collections::BTreeMap;

use parse_display::Display;
use serde::{Deserialize, Serialize};

use super::{BloomFilter, DelMatch, ZoneMapStatistic};
use crate::catalog::TabletSchema;
use crate::storage::{StorageResult, TracedStorageError};
use crate::types::{ColumnId, DataValue};

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[display("=")]
    Eq,
    #[display("!=")]
    Ne,
    #[display("<")]
    Lt,
    #[display("<=")]
    Le,
    #[display(">")]
    Gt,
    #[display(">=")]
    Ge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Predicate {
    Compare(CompareOp, DataValue),
    In(Vec<DataValue>),
    IsNull,
    IsNotNull,
}

impl Predicate {
    /// Literals the predicate compares against.
    pub fn literals(&self) -> &[DataValue] {
        match self {
            Predicate::Compare(_, v) => std::slice::from_ref(v),
            Predicate::In(values) => values,
            Predicate::IsNull | Predicate::IsNotNull => &[],
        }
    }

    /// Returns `false` only if no row described by `stat` can satisfy the
    /// predicate. Comparisons with null never hold.
    pub fn eval(&self, stat: &ZoneMapStatistic) -> bool {
        let (min, max) = (&stat.min, &stat.max);
        match self {
            Predicate::IsNull => stat.has_null,
            Predicate::IsNotNull => !stat.all_null(),
            _ if stat.all_null() => false,
            Predicate::Compare(_, v) if v.is_null() => false,
            Predicate::Compare(op, v) => match op {
                CompareOp::Eq => min <= v && v <= max,
                CompareOp::Ne => !(min == v && max == v),
                CompareOp::Lt => min < v,
                CompareOp::Le => min <= v,
                CompareOp::Gt => max > v,
                CompareOp::Ge => max >= v,
            },
            Predicate::In(values) => values
                .iter()
                .any(|v| !v.is_null() && min <= v && v <= max),
        }
    }

    /// Returns `false` only if the bloom filter rules the predicate out. Only
    /// equality-like predicates consult the filter.
    pub fn eval_bloom(&self, bf: &BloomFilter<'_>) -> bool {
        match self {
            Predicate::Compare(CompareOp::Eq, v) => bf.test(v),
            Predicate::In(values) => values.iter().any(|v| bf.test(v)),
            _ => true,
        }
    }

    /// Classify how the rows described by `stat` match the predicate.
    pub fn del_eval(&self, stat: &ZoneMapStatistic) -> DelMatch {
        let (min, max, has_null) = (&stat.min, &stat.max, stat.has_null);
        let full = DelMatch::full_or_partial(has_null);
        match self {
            Predicate::IsNull => match (stat.all_null(), has_null) {
                (_, false) => DelMatch::NoMatch,
                (true, true) => DelMatch::FullMatch,
                (false, true) => DelMatch::PartialMatch,
            },
            Predicate::IsNotNull if stat.all_null() => DelMatch::NoMatch,
            Predicate::IsNotNull => full,
            _ if stat.all_null() => DelMatch::NoMatch,
            Predicate::Compare(_, v) if v.is_null() => DelMatch::NoMatch,
            Predicate::Compare(op, v) => {
                // (every value matches, some value may match)
                let (all, any) = match op {
                    CompareOp::Eq => (min == v && max == v, min <= v && v <= max),
                    CompareOp::Ne => (v < min || v > max, !(min == v && max == v)),
                    CompareOp::Lt => (max < v, min < v),
                    CompareOp::Le => (max <= v, min <= v),
                    CompareOp::Gt => (min > v, max > v),
                    CompareOp::Ge => (min >= v, max >= v),
                };
                if all {
                    full
                } else if any {
                    DelMatch::PartialMatch
                } else {
                    DelMatch::NoMatch
                }
            }
            Predicate::In(values) => {
                if min == max && values.contains(min) {
                    full
                } else if values.iter().any(|v| !v.is_null() && min <= v && v <= max) {
                    DelMatch::PartialMatch
                } else {
                    DelMatch::NoMatch
                }
            }
        }
    }
}

/// Conjunction of predicates on one column.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnCondition {
    predicates: Vec<Predicate>,
}

impl ColumnCondition {
    pub fn new(predicates: Vec<Predicate>) -> Self {
        Self { predicates }
    }

    pub fn push(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn eval(&self, stat: &ZoneMapStatistic) -> bool {
        self.predicates.iter().all(|p| p.eval(stat))
    }

    pub fn eval_bloom(&self, bf: &BloomFilter<'_>) -> bool {
        self.predicates.iter().all(|p| p.eval_bloom(bf))
    }

    pub fn del_eval(&self, stat: &ZoneMapStatistic) -> DelMatch {
        if self.predicates.is_empty() {
            return DelMatch::NoMatch;
        }
        DelMatch::all(self.predicates.iter().map(|p| p.del_eval(stat)))
    }
}

/// Conditions keyed by table column, iterated in column order.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    columns: BTreeMap<ColumnId, ColumnCondition>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, cid: ColumnId, predicate: Predicate) -> Self {
        self.add(cid, predicate);
        self
    }

    pub fn add(&mut self, cid: ColumnId, predicate: Predicate) {
        self.columns.entry(cid).or_default().push(predicate);
    }

    pub fn get(&self, cid: ColumnId) -> Option<&ColumnCondition> {
        self.columns.get(&cid)
    }

    pub fn columns(&self) -> impl Iterator<Item = (ColumnId, &ColumnCondition)> {
        self.columns.iter().map(|(cid, cond)| (*cid, cond))
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Check that every literal has the type of its column in `schema`.
    /// Statistics are only comparable with values of the same type.
    pub fn check_types(&self, schema: &TabletSchema) -> StorageResult<()> {
        for (cid, cond) in self.columns() {
            let Some(column) = schema.column(cid) else {
                continue;
            };
            let field_type = column.field_type();
            for predicate in cond.predicates() {
                if let Some(v) = predicate.literals().iter().find(|v| !field_type.accepts(v)) {
                    return Err(TracedStorageError::invalid_argument(format!(
                        "literal {v} does not match type {field_type} of column {}",
                        column.name()
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::types::DataValue::{Int32, Null};

    fn stat(min: i32, max: i32, has_null: bool) -> ZoneMapStatistic {
        ZoneMapStatistic {
            min: Int32(min),
            max: Int32(max),
            has_null,
        }
    }

    fn all_null() -> ZoneMapStatistic {
        ZoneMapStatistic {
            min: Null,
            max: Null,
            has_null: true,
        }
    }

    #[test_case(CompareOp::Eq, 5, true)]
    #[test_case(CompareOp::Eq, 11, false)]
    #[test_case(CompareOp::Ne, 5, true)]
    #[test_case(CompareOp::Lt, 1, false)]
    #[test_case(CompareOp::Le, 1, true)]
    #[test_case(CompareOp::Gt, 10, false)]
    #[test_case(CompareOp::Ge, 10, true)]
    fn test_eval(op: CompareOp, v: i32, expected: bool) {
        let p = Predicate::Compare(op, Int32(v));
        assert_eq!(p.eval(&stat(1, 10, false)), expected);
    }

    #[test]
    fn test_eval_nulls() {
        assert!(!Predicate::Compare(CompareOp::Eq, Null).eval(&stat(1, 10, true)));
        assert!(!Predicate::Compare(CompareOp::Ne, Int32(1)).eval(&all_null()));
        assert!(Predicate::IsNull.eval(&all_null()));
        assert!(!Predicate::IsNull.eval(&stat(1, 1, false)));
        assert!(!Predicate::IsNotNull.eval(&all_null()));
        assert!(!Predicate::Compare(CompareOp::Ne, Int32(3)).eval(&stat(3, 3, false)));
        assert!(Predicate::In(vec![Int32(0), Int32(4)]).eval(&stat(3, 5, false)));
        assert!(!Predicate::In(vec![Int32(0), Null]).eval(&stat(3, 5, true)));
    }

    #[test_case(CompareOp::Eq, 5, stat(5, 5, false), DelMatch::FullMatch)]
    #[test_case(CompareOp::Eq, 5, stat(5, 5, true), DelMatch::PartialMatch)]
    #[test_case(CompareOp::Eq, 5, stat(1, 10, false), DelMatch::PartialMatch)]
    #[test_case(CompareOp::Eq, 50, stat(1, 10, false), DelMatch::NoMatch)]
    #[test_case(CompareOp::Ne, 50, stat(1, 10, false), DelMatch::FullMatch)]
    #[test_case(CompareOp::Ne, 5, stat(5, 5, false), DelMatch::NoMatch)]
    #[test_case(CompareOp::Lt, 11, stat(1, 10, false), DelMatch::FullMatch)]
    #[test_case(CompareOp::Lt, 10, stat(1, 10, false), DelMatch::PartialMatch)]
    #[test_case(CompareOp::Lt, 1, stat(1, 10, false), DelMatch::NoMatch)]
    #[test_case(CompareOp::Ge, 1, stat(1, 10, true), DelMatch::PartialMatch)]
    #[test_case(CompareOp::Gt, 10, stat(1, 10, false), DelMatch::NoMatch)]
    fn test_del_eval(op: CompareOp, v: i32, stat: ZoneMapStatistic, expected: DelMatch) {
        assert_eq!(Predicate::Compare(op, Int32(v)).del_eval(&stat), expected);
    }

    #[test]
    fn test_del_eval_nulls() {
        assert_eq!(Predicate::IsNull.del_eval(&all_null()), DelMatch::FullMatch);
        assert_eq!(
            Predicate::IsNull.del_eval(&stat(1, 2, true)),
            DelMatch::PartialMatch
        );
        assert_eq!(
            Predicate::IsNotNull.del_eval(&stat(1, 2, false)),
            DelMatch::FullMatch
        );
        assert_eq!(
            Predicate::Compare(CompareOp::Eq, Int32(1)).del_eval(&all_null()),
            DelMatch::NoMatch
        );
        assert_eq!(
            Predicate::In(vec![Int32(4)]).del_eval(&stat(4, 4, false)),
            DelMatch::FullMatch
        );
    }

    #[test]
    fn test_column_condition() {
        let cond = ColumnCondition::new(vec![
            Predicate::Compare(CompareOp::Ge, Int32(0)),
            Predicate::Compare(CompareOp::Lt, Int32(100)),
        ]);
        assert_eq!(cond.del_eval(&stat(10, 20, false)), DelMatch::FullMatch);
        assert_eq!(cond.del_eval(&stat(50, 150, false)), DelMatch::PartialMatch);
        assert_eq!(cond.del_eval(&stat(150, 160, false)), DelMatch::NoMatch);
        assert!(!cond.eval(&stat(150, 160, false)));
        assert_eq!(
            ColumnCondition::default().del_eval(&stat(1, 1, false)),
            DelMatch::NoMatch
        );
    }

    #[test]
    fn test_check_types() {
        use crate::catalog::ColumnCatalog;
        use crate::types::FieldType;

        let schema = TabletSchema::new(vec![
            ColumnCatalog::new(1, "a", FieldType::Int64),
            ColumnCatalog::new(2, "b", FieldType::Int32),
        ]);
        let ok = Conditions::new()
            .with(0, Predicate::Compare(CompareOp::Gt, DataValue::Int64(1)))
            .with(1, Predicate::In(vec![Int32(1), Null]))
            .with(1, Predicate::IsNull);
        ok.check_types(&schema).unwrap();

        let mismatch = Conditions::new().with(0, Predicate::Compare(CompareOp::Gt, Int32(1)));
        assert!(mismatch.check_types(&schema).is_err());
        let mismatch = Conditions::new().with(1, Predicate::In(vec![Int32(1), DataValue::Int64(2)]));
        assert!(mismatch.check_types(&schema).is_err());
    }

    #[test]
    fn test_conditions_order() {
        let conds = Conditions::new()
            .with(3, Predicate::IsNull)
            .with(1, Predicate::IsNotNull)
            .with(3, Predicate::IsNotNull);
        let columns = conds.columns().map(|(cid, c)| (cid, c.predicates().len())).collect::<Vec<_>>();
        assert_eq!(columns, [(1, 1), (3, 2)]);
    }
}
