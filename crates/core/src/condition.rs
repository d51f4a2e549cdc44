//! Row selection conditions
//!
//! A `Condition` is a conjunction of `(field, op, value)` clauses. An empty
//! condition selects every row of a key. Evaluation lives in
//! `statecache-storage` next to the table that uses it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Comparison operator of a clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionOp {
    /// Textual equality
    Eq,
    /// Textual inequality
    Ne,
    /// Integer greater-than
    Gt,
    /// Integer greater-or-equal
    Ge,
    /// Integer less-than
    Lt,
    /// Integer less-or-equal
    Le,
}

impl ConditionOp {
    /// Whether the operator compares parsed integers rather than raw text
    pub fn is_ordering(self) -> bool {
        !matches!(self, ConditionOp::Eq | ConditionOp::Ne)
    }
}

impl fmt::Display for ConditionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConditionOp::Eq => "eq",
            ConditionOp::Ne => "ne",
            ConditionOp::Gt => "gt",
            ConditionOp::Ge => "ge",
            ConditionOp::Lt => "lt",
            ConditionOp::Le => "le",
        };
        f.write_str(s)
    }
}

/// One `(field, op, value)` clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    /// Field the clause reads
    pub field: String,
    /// Comparison operator
    pub op: ConditionOp,
    /// Right-hand operand
    pub value: String,
}

/// AND of clauses, evaluated in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Condition {
    clauses: Vec<Clause>,
}

impl Condition {
    /// The empty condition, matching every row
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a clause
    pub fn clause(mut self, field: impl Into<String>, op: ConditionOp, value: impl Into<String>) -> Self {
        self.clauses.push(Clause {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    /// `field == value`
    pub fn eq(self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.clause(field, ConditionOp::Eq, value)
    }

    /// `field != value`
    pub fn ne(self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.clause(field, ConditionOp::Ne, value)
    }

    /// `field > value`
    pub fn gt(self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.clause(field, ConditionOp::Gt, value)
    }

    /// `field >= value`
    pub fn ge(self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.clause(field, ConditionOp::Ge, value)
    }

    /// `field < value`
    pub fn lt(self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.clause(field, ConditionOp::Lt, value)
    }

    /// `field <= value`
    pub fn le(self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.clause(field, ConditionOp::Le, value)
    }

    /// Clauses in evaluation order
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Check for the match-everything condition
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_keeps_order() {
        let cond = Condition::new().ge("balance", "50").eq("name", "alice");
        let clauses = cond.clauses();
        assert_eq!(clauses.len(), 2);
        assert_eq!(clauses[0].op, ConditionOp::Ge);
        assert_eq!(clauses[1].field, "name");
        assert!(!cond.is_empty());
    }

    #[test]
    fn test_ordering_ops() {
        assert!(!ConditionOp::Eq.is_ordering());
        assert!(!ConditionOp::Ne.is_ordering());
        for op in [ConditionOp::Gt, ConditionOp::Ge, ConditionOp::Lt, ConditionOp::Le] {
            assert!(op.is_ordering());
        }
        assert_eq!(ConditionOp::Le.to_string(), "le");
    }
}
