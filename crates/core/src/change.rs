//! Undo records produced by table mutations
//!
//! Every successful mutation produces exactly one `Change` carrying enough
//! prior state to reverse it. The table hands it to its `ChangeSink`; the
//! execution engine owns the accumulated list and decides when to roll
//! back, always newest first.

/// Mutation kind a change record reverses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// A row was appended
    Insert,
    /// Field values were overwritten
    Update,
    /// Rows were marked deleted
    Remove,
}

/// Prior value of one field of one row, captured before an update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldUndo {
    /// Row index within the key's row-set
    pub index: usize,
    /// Field that was overwritten
    pub field: String,
    /// Value before the update; `None` if the row lacked the field
    pub old_value: Option<String>,
}

/// One reversible mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Row appended at `index`
    Insert {
        /// Affected key
        key: String,
        /// Index of the appended row
        index: usize,
    },
    /// Fields overwritten; one record per (row, field)
    Update {
        /// Affected key
        key: String,
        /// Prior values in write order
        records: Vec<FieldUndo>,
    },
    /// Rows marked deleted
    Remove {
        /// Affected key
        key: String,
        /// Indices of the removed rows
        indices: Vec<usize>,
    },
}

impl Change {
    /// Mutation kind
    pub fn kind(&self) -> ChangeKind {
        match self {
            Change::Insert { .. } => ChangeKind::Insert,
            Change::Update { .. } => ChangeKind::Update,
            Change::Remove { .. } => ChangeKind::Remove,
        }
    }

    /// Key the change applies to
    pub fn key(&self) -> &str {
        match self {
            Change::Insert { key, .. } | Change::Update { key, .. } | Change::Remove { key, .. } => {
                key
            }
        }
    }

    /// Number of per-row (or per-field) records the change carries
    pub fn record_count(&self) -> usize {
        match self {
            Change::Insert { .. } => 1,
            Change::Update { records, .. } => records.len(),
            Change::Remove { indices, .. } => indices.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_key() {
        let insert = Change::Insert {
            key: "alice".to_string(),
            index: 0,
        };
        assert_eq!(insert.kind(), ChangeKind::Insert);
        assert_eq!(insert.key(), "alice");
        assert_eq!(insert.record_count(), 1);

        let update = Change::Update {
            key: "bob".to_string(),
            records: vec![
                FieldUndo {
                    index: 0,
                    field: "balance".to_string(),
                    old_value: Some("1".to_string()),
                },
                FieldUndo {
                    index: 1,
                    field: "balance".to_string(),
                    old_value: None,
                },
            ],
        };
        assert_eq!(update.kind(), ChangeKind::Update);
        assert_eq!(update.key(), "bob");
        assert_eq!(update.record_count(), 2);

        let remove = Change::Remove {
            key: "carol".to_string(),
            indices: vec![0, 2, 3],
        };
        assert_eq!(remove.kind(), ChangeKind::Remove);
        assert_eq!(remove.record_count(), 3);
    }
}
