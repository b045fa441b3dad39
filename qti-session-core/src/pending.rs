// qti-session-core/src/pending.rs
// ============================================================================
// Module: Pending Response Store
// Description: Holds candidate responses submitted under SIMULTANEOUS
//              submission mode until the enclosing testPart ends.
// Purpose: Defer response processing until the whole testPart's responses
//          are collected, per SIMULTANEOUS semantics.
// Dependencies: crate::core::variable
// ============================================================================

//! ## Overview
//! Entries are keyed by `(itemRef, occurrence)`, at most one per pair; a
//! second submission for the same occurrence replaces the first rather than
//! accumulating, since only the candidate's latest answer is meaningful.

use crate::core::variable::QtiValue;

/// One item's responses awaiting batched response processing.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingResponse {
    item_ref: String,
    occurrence: u32,
    responses: Vec<(String, QtiValue)>,
}

impl PendingResponse {
    /// Builds a pending response record.
    #[must_use]
    pub const fn new(item_ref: String, occurrence: u32, responses: Vec<(String, QtiValue)>) -> Self {
        Self {
            item_ref,
            occurrence,
            responses,
        }
    }

    /// Returns the referenced item's identifier.
    #[must_use]
    pub fn item_ref(&self) -> &str {
        &self.item_ref
    }

    /// Returns the occurrence index.
    #[must_use]
    pub const fn occurrence(&self) -> u32 {
        self.occurrence
    }

    /// Returns the submitted (identifier, value) response pairs.
    #[must_use]
    pub fn responses(&self) -> &[(String, QtiValue)] {
        &self.responses
    }
}

/// Holds responses submitted under SIMULTANEOUS submission mode until the
/// test part ends and response processing can run in a batch.
#[derive(Debug, Clone, Default)]
pub struct PendingResponseStore {
    pending: Vec<PendingResponse>,
}

impl PendingResponseStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records (or replaces) the pending responses for `(item_ref,
    /// occurrence)`.
    pub fn add_pending(&mut self, item_ref: &str, occurrence: u32, responses: Vec<(String, QtiValue)>) {
        if let Some(existing) = self.position(item_ref, occurrence) {
            self.pending[existing] = PendingResponse::new(item_ref.to_string(), occurrence, responses);
        } else {
            self.pending.push(PendingResponse::new(item_ref.to_string(), occurrence, responses));
        }
    }

    /// Returns the pending responses for `(item_ref, occurrence)`, if any.
    #[must_use]
    pub fn get_pending(&self, item_ref: &str, occurrence: u32) -> Option<&PendingResponse> {
        self.pending
            .iter()
            .find(|pending| pending.item_ref() == item_ref && pending.occurrence() == occurrence)
    }

    /// Iterates all pending responses in submission order.
    pub fn all(&self) -> impl Iterator<Item = &PendingResponse> {
        self.pending.iter()
    }

    /// Discards every pending response, typically once a testPart's batched
    /// response processing has run.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Returns the number of pending entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns whether the store holds no pending entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn position(&self, item_ref: &str, occurrence: u32) -> Option<usize> {
        self.pending
            .iter()
            .position(|pending| pending.item_ref() == item_ref && pending.occurrence() == occurrence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::variable::SingleValue;

    fn response(value: i32) -> Vec<(String, QtiValue)> {
        vec![("RESPONSE".to_string(), QtiValue::Single(SingleValue::Integer(value)))]
    }

    #[test]
    fn add_then_get_round_trips() {
        let mut store = PendingResponseStore::new();
        store.add_pending("Q01", 0, response(1));
        let pending = store.get_pending("Q01", 0).expect("pending entry");
        assert_eq!(pending.responses(), response(1).as_slice());
    }

    #[test]
    fn resubmission_replaces_not_accumulates() {
        let mut store = PendingResponseStore::new();
        store.add_pending("Q01", 0, response(1));
        store.add_pending("Q01", 0, response(2));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get_pending("Q01", 0).expect("pending entry").responses(), response(2).as_slice());
    }

    #[test]
    fn clear_empties_the_store() {
        let mut store = PendingResponseStore::new();
        store.add_pending("Q01", 0, response(1));
        store.clear();
        assert!(store.is_empty());
    }
}
