//! Condition evaluation over rows
//!
//! Equality operators compare raw field text. Ordering operators parse both
//! sides as decimal `i64`, with the empty string read as zero. A value that
//! fails to parse rejects the row (logged) rather than failing the query.
//! A row that is already deleted fails every non-empty condition.

use tracing::warn;

use statecache_core::{Condition, ConditionOp, Entry, StateError, StateResult};

fn parse_operand(field: &str, lhs: &str, rhs: &str, side: &str) -> StateResult<i64> {
    if side.is_empty() {
        return Ok(0);
    }
    side.parse::<i64>().map_err(|_| StateError::Compare {
        field: field.to_string(),
        lhs: lhs.to_string(),
        rhs: rhs.to_string(),
    })
}

/// Apply one clause to a row-side value
///
/// # Errors
///
/// Returns `StateError::Compare` if an ordering operator meets a value that
/// is not a decimal integer.
pub fn compare(field: &str, lhs: &str, op: ConditionOp, rhs: &str) -> StateResult<bool> {
    let ints = || -> StateResult<(i64, i64)> {
        Ok((
            parse_operand(field, lhs, rhs, lhs)?,
            parse_operand(field, lhs, rhs, rhs)?,
        ))
    };
    match op {
        ConditionOp::Eq => Ok(lhs == rhs),
        ConditionOp::Ne => Ok(lhs != rhs),
        ConditionOp::Gt => ints().map(|(l, r)| l > r),
        ConditionOp::Ge => ints().map(|(l, r)| l >= r),
        ConditionOp::Lt => ints().map(|(l, r)| l < r),
        ConditionOp::Le => ints().map(|(l, r)| l <= r),
    }
}

/// Whether `entry` satisfies every clause of `condition`
pub fn matches(entry: &Entry, condition: &Condition) -> bool {
    if condition.is_empty() {
        return true;
    }
    if entry.is_deleted() {
        return false;
    }
    for clause in condition.clauses() {
        let lhs = entry.field_or_empty(&clause.field);
        match compare(&clause.field, lhs, clause.op, &clause.value) {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                warn!(
                    target: "statecache::condition",
                    field = %clause.field,
                    op = %clause.op,
                    error = %e,
                    "Compare error, row rejected"
                );
                return false;
            }
        }
    }
    true
}

/// Indices of rows satisfying `condition`, in row order
pub fn matching_indices(rows: &[Entry], condition: &Condition) -> Vec<usize> {
    if condition.is_empty() {
        return (0..rows.len()).collect();
    }
    rows.iter()
        .enumerate()
        .filter(|(_, entry)| matches(entry, condition))
        .map(|(i, _)| i)
        .collect()
}
