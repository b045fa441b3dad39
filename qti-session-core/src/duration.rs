// qti-session-core/src/duration.rs
// ============================================================================
// Module: Duration Store
// Description: Accumulates elapsed seconds per scope identifier (item,
//              section, testPart, or the test itself).
// Purpose: Back the `duration` built-in response variable at every scope
//          without requiring each scope to carry its own counter.
// Dependencies: none
// ============================================================================

//! ## Overview
//! A scope's duration starts at zero the first time it is observed and only
//! ever grows by non-negative increments; [`DurationStore::add`] is the only
//! way time enters a scope, mirroring how a real session accumulates
//! `setTime` deltas rather than recomputing elapsed time from wall clocks.

use std::collections::BTreeMap;

/// Accumulates elapsed seconds keyed by scope identifier.
#[derive(Debug, Clone, Default)]
pub struct DurationStore {
    durations: BTreeMap<String, f64>,
}

impl DurationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the accumulated duration for `identifier`, initializing it to
    /// zero (and recording the entry) if this is the first observation.
    pub fn get(&mut self, identifier: &str) -> f64 {
        *self.durations.entry(identifier.to_string()).or_insert(0.0)
    }

    /// Adds `seconds` to the accumulated duration for `identifier`,
    /// initializing it to zero first if needed. Negative increments are
    /// rejected by the caller (see `ItemSession::set_time`); this store does
    /// not itself enforce monotonicity.
    pub fn add(&mut self, identifier: &str, seconds: f64) {
        *self.durations.entry(identifier.to_string()).or_insert(0.0) += seconds;
    }

    /// Overwrites the accumulated duration for `identifier`.
    pub fn set(&mut self, identifier: &str, seconds: f64) {
        self.durations.insert(identifier.to_string(), seconds);
    }

    /// Returns the accumulated duration for `identifier` without recording
    /// an entry if it has never been observed. Used by read-only checks
    /// (e.g. the driver's time-limit evaluation) that must not fabricate a
    /// zero entry for a scope that has not yet accrued any time.
    #[must_use]
    pub fn peek(&self, identifier: &str) -> f64 {
        self.durations.get(identifier).copied().unwrap_or(0.0)
    }

    /// Returns whether `identifier` has ever been observed.
    #[must_use]
    pub fn contains(&self, identifier: &str) -> bool {
        self.durations.contains_key(identifier)
    }

    /// Iterates all recorded (identifier, duration) pairs in identifier
    /// order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.durations.iter().map(|(identifier, seconds)| (identifier.as_str(), *seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_get_initializes_to_zero() {
        let mut store = DurationStore::new();
        assert_eq!(store.get("itemA"), 0.0);
        assert!(store.contains("itemA"));
    }

    #[test]
    fn add_accumulates() {
        let mut store = DurationStore::new();
        store.add("itemA", 1.5);
        store.add("itemA", 2.5);
        assert_eq!(store.get("itemA"), 4.0);
    }

    #[test]
    fn set_overwrites() {
        let mut store = DurationStore::new();
        store.add("itemA", 10.0);
        store.set("itemA", 1.0);
        assert_eq!(store.get("itemA"), 1.0);
    }

    #[test]
    fn scopes_are_independent() {
        let mut store = DurationStore::new();
        store.add("itemA", 1.0);
        store.add("itemB", 2.0);
        assert_eq!(store.get("itemA"), 1.0);
        assert_eq!(store.get("itemB"), 2.0);
    }
}
