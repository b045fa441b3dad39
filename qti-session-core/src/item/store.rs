// qti-session-core/src/item/store.rs
// ============================================================================
// Module: Item Session Store
// Description: Maps (itemRef, occurrence) to its ItemSession.
// Purpose: Guarantee at-most-one session per occurrence and give the driver
//          stable insertion-order iteration for snapshotting.
// Dependencies: crate::item::session
// ============================================================================

//! ## Overview
//! The store is a flat, insertion-ordered list rather than a nested map: QTI
//! occurrence counts per item are small, and insertion order is exactly what
//! the codec (C10) and the round-trip invariants need to preserve.

use crate::item::session::ItemSession;

/// Maps (itemRef, occurrence) to its [`ItemSession`], preserving insertion
/// order.
#[derive(Debug, Clone, Default)]
pub struct ItemSessionStore {
    sessions: Vec<ItemSession>,
}

impl ItemSessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a session for `(itemRef, occurrence)`. Returns `false` without
    /// modifying the store if a session already exists for that pair.
    pub fn add_session(&mut self, session: ItemSession) -> bool {
        if self.has_session(session.item_ref(), session.occurrence()) {
            return false;
        }
        self.sessions.push(session);
        true
    }

    /// Returns whether a session exists for `(item_ref, occurrence)`.
    #[must_use]
    pub fn has_session(&self, item_ref: &str, occurrence: u32) -> bool {
        self.sessions
            .iter()
            .any(|session| session.item_ref() == item_ref && session.occurrence() == occurrence)
    }

    /// Looks up a session by `(item_ref, occurrence)`.
    #[must_use]
    pub fn get_session(&self, item_ref: &str, occurrence: u32) -> Option<&ItemSession> {
        self.sessions
            .iter()
            .find(|session| session.item_ref() == item_ref && session.occurrence() == occurrence)
    }

    /// Looks up a session mutably by `(item_ref, occurrence)`.
    pub fn get_session_mut(&mut self, item_ref: &str, occurrence: u32) -> Option<&mut ItemSession> {
        self.sessions
            .iter_mut()
            .find(|session| session.item_ref() == item_ref && session.occurrence() == occurrence)
    }

    /// Returns the highest occurrence index recorded for `item_ref`, if any.
    #[must_use]
    pub fn last_occurrence(&self, item_ref: &str) -> Option<u32> {
        self.sessions
            .iter()
            .filter(|session| session.item_ref() == item_ref)
            .map(ItemSession::occurrence)
            .max()
    }

    /// Iterates all sessions in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ItemSession> {
        self.sessions.iter()
    }

    /// Iterates all sessions mutably in insertion order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ItemSession> {
        self.sessions.iter_mut()
    }

    /// Returns sessions belonging to `item_ref` in insertion order.
    pub fn sessions_for(&self, item_ref: &str) -> impl Iterator<Item = &ItemSession> {
        self.sessions.iter().filter(move |session| session.item_ref() == item_ref)
    }

    /// Returns the number of sessions in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns whether the store holds no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::ItemSessionControl;
    use crate::core::model::NavigationMode;
    use crate::core::model::SubmissionMode;
    use crate::core::model::TimeLimits;
    use crate::core::variable::State;

    fn session(item_ref: &str, occurrence: u32) -> ItemSession {
        ItemSession::new(
            item_ref.to_string(),
            occurrence,
            State::new(),
            NavigationMode::Linear,
            SubmissionMode::Individual,
            ItemSessionControl::default(),
            TimeLimits::default(),
        )
    }

    #[test]
    fn at_most_one_session_per_occurrence() {
        let mut store = ItemSessionStore::new();
        assert!(store.add_session(session("Q01", 0)));
        assert!(!store.add_session(session("Q01", 0)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn distinct_occurrences_coexist() {
        let mut store = ItemSessionStore::new();
        store.add_session(session("Q01", 0));
        store.add_session(session("Q01", 1));
        assert_eq!(store.last_occurrence("Q01"), Some(1));
        assert_eq!(store.sessions_for("Q01").count(), 2);
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut store = ItemSessionStore::new();
        store.add_session(session("Q02", 0));
        store.add_session(session("Q01", 0));
        let order: Vec<&str> = store.iter().map(ItemSession::item_ref).collect();
        assert_eq!(order, vec!["Q02", "Q01"]);
    }
}
