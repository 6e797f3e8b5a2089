//! ChangeSet — an ordered batch of not-yet-applied changes
//!
//! A plain container with no concurrency guarantees of its own; the
//! `ChangeBuffer` owns the live instance and mutates it only under its
//! lock. Append order is preserved exactly, because the flusher replays
//! changes in submission order.

use crate::change::Change;

/// Ordered batch of changes plus the running sum of their size estimates.
///
/// The aggregate size is maintained incrementally on append so the
/// buffer's threshold check is O(1).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    changes: Vec<Change>,
    estimated_size: u64,
}

impl ChangeSet {
    /// Create an empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a change. No validation happens here — changes are validated
    /// at construction and are immutable afterwards.
    pub fn append(&mut self, change: Change) {
        self.estimated_size += change.estimated_size();
        self.changes.push(change);
    }

    /// The changes in append order.
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Number of changes in the set.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// True if the set holds no changes.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Sum of the members' estimated sizes.
    pub fn estimated_size(&self) -> u64 {
        self.estimated_size
    }

    /// Drop all entries and reset the aggregate size to 0.
    pub fn clear(&mut self) {
        self.changes.clear();
        self.estimated_size = 0;
    }
}

impl IntoIterator for ChangeSet {
    type Item = Change;
    type IntoIter = std::vec::IntoIter<Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}
