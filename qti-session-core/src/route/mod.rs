// qti-session-core/src/route/mod.rs
// ============================================================================
// Module: Route
// Description: Ordered, seekable sequence of RouteItems with a position
//              cursor and branch/jump operations.
// Purpose: Give the driver a single cursor abstraction over the
//          already-materialized sequence of item occurrences.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! A [`Route`] never mutates its underlying sequence; only the cursor moves.
//! [`RouteItem`] is an immutable, enriched view of one item occurrence
//! carrying the effective rules and control it inherited by walking its
//! containing section/testPart chain.

use thiserror::Error;

use crate::core::model::BranchRule;
use crate::core::model::ItemSessionControl;
use crate::core::model::PreCondition;
use crate::core::model::TimeLimits;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by out-of-bounds Route operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// `position` does not address a valid cursor location, or a
    /// `branch`/`jumpTo` target could not be resolved.
    #[error("route position {position} out of bounds (len {len})")]
    RouteOutOfBounds {
        /// The attempted or unresolved position.
        position: usize,
        /// The number of RouteItems in the Route.
        len: usize,
    },
}

// ============================================================================
// SECTION: Route Item
// ============================================================================

/// An immutable, enriched view of one item occurrence: its place in the
/// testPart/section chain plus the rules and control it inherited by
/// walking that chain.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteItem {
    item_ref: String,
    occurrence: u32,
    test_part_identifier: String,
    section_chain: Vec<String>,
    effective_pre_conditions: Vec<PreCondition>,
    effective_branch_rules: Vec<BranchRule>,
    effective_session_control: ItemSessionControl,
    effective_time_limits: TimeLimits,
}

impl RouteItem {
    /// Builds a RouteItem from its already-flattened, effective rule set.
    #[must_use]
    pub const fn new(
        item_ref: String,
        occurrence: u32,
        test_part_identifier: String,
        section_chain: Vec<String>,
        effective_pre_conditions: Vec<PreCondition>,
        effective_branch_rules: Vec<BranchRule>,
        effective_session_control: ItemSessionControl,
        effective_time_limits: TimeLimits,
    ) -> Self {
        Self {
            item_ref,
            occurrence,
            test_part_identifier,
            section_chain,
            effective_pre_conditions,
            effective_branch_rules,
            effective_session_control,
            effective_time_limits,
        }
    }

    /// Returns the referenced item's identifier.
    #[must_use]
    pub fn item_ref(&self) -> &str {
        &self.item_ref
    }

    /// Returns the 0-based occurrence index within `item_ref`.
    #[must_use]
    pub const fn occurrence(&self) -> u32 {
        self.occurrence
    }

    /// Returns the containing test part's identifier.
    #[must_use]
    pub fn test_part_identifier(&self) -> &str {
        &self.test_part_identifier
    }

    /// Returns the containing assessment section chain, outermost first.
    #[must_use]
    pub fn section_chain(&self) -> &[String] {
        &self.section_chain
    }

    /// Returns the innermost containing section's identifier, if any.
    #[must_use]
    pub fn innermost_section(&self) -> Option<&str> {
        self.section_chain.last().map(String::as_str)
    }

    /// Returns the preconditions effective for this RouteItem.
    #[must_use]
    pub fn effective_pre_conditions(&self) -> &[PreCondition] {
        &self.effective_pre_conditions
    }

    /// Returns the branch rules effective for this RouteItem.
    #[must_use]
    pub fn effective_branch_rules(&self) -> &[BranchRule] {
        &self.effective_branch_rules
    }

    /// Returns the session control effective for this RouteItem.
    #[must_use]
    pub const fn effective_session_control(&self) -> ItemSessionControl {
        self.effective_session_control
    }

    /// Returns the time limits effective for this RouteItem.
    #[must_use]
    pub const fn effective_time_limits(&self) -> TimeLimits {
        self.effective_time_limits
    }

    /// Returns whether `identifier` names this item, one of its containing
    /// sections, or its containing test part.
    #[must_use]
    pub fn matches_identifier(&self, identifier: &str) -> bool {
        self.item_ref == identifier
            || self.test_part_identifier == identifier
            || self.section_chain.iter().any(|section| section == identifier)
    }
}

// ============================================================================
// SECTION: Route
// ============================================================================

/// A finite, ordered sequence of [`RouteItem`]s with a movable cursor. The
/// sequence itself is immutable once constructed; only `position` moves.
/// `position == count()` denotes an exhausted Route.
#[derive(Debug, Clone)]
pub struct Route {
    items: Vec<RouteItem>,
    position: usize,
}

impl Route {
    /// Builds a Route from its materialized RouteItem sequence, cursor at 0.
    #[must_use]
    pub const fn new(items: Vec<RouteItem>) -> Self {
        Self {
            items,
            position: 0,
        }
    }

    /// Returns the number of RouteItems.
    #[must_use]
    pub fn count(&self) -> usize {
        self.items.len()
    }

    /// Returns the current cursor position (`0..=count()`).
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Returns the RouteItem at the cursor, or `None` if exhausted.
    #[must_use]
    pub fn current(&self) -> Option<&RouteItem> {
        self.items.get(self.position)
    }

    /// Returns whether the cursor is exhausted (past the last RouteItem).
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.position >= self.items.len()
    }

    /// Returns whether the cursor is at the first RouteItem.
    #[must_use]
    pub const fn is_first(&self) -> bool {
        self.position == 0
    }

    /// Returns whether the cursor is at the last RouteItem.
    #[must_use]
    pub fn is_last(&self) -> bool {
        !self.items.is_empty() && self.position == self.items.len() - 1
    }

    /// Returns whether the current RouteItem is the first of its test part.
    #[must_use]
    pub fn is_first_of_test_part(&self) -> bool {
        match self.current() {
            Some(current) => self.position == 0
                || self.items[self.position - 1].test_part_identifier() != current.test_part_identifier(),
            None => false,
        }
    }

    /// Returns whether the current RouteItem is the last of its test part.
    #[must_use]
    pub fn is_last_of_test_part(&self) -> bool {
        match self.current() {
            Some(current) => self
                .items
                .get(self.position + 1)
                .is_none_or(|next| next.test_part_identifier() != current.test_part_identifier()),
            None => false,
        }
    }

    /// Returns whether the current RouteItem is the last of its innermost
    /// assessment section.
    #[must_use]
    pub fn is_last_of_assessment_section(&self) -> bool {
        match self.current() {
            Some(current) => self
                .items
                .get(self.position + 1)
                .is_none_or(|next| next.innermost_section() != current.innermost_section()),
            None => false,
        }
    }

    /// Advances the cursor by one position, possibly onto the exhausted
    /// (past-the-end) position.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::RouteOutOfBounds`] if already exhausted.
    pub fn next(&mut self) -> Result<(), RouteError> {
        if self.position >= self.items.len() {
            return Err(RouteError::RouteOutOfBounds {
                position: self.position,
                len: self.items.len(),
            });
        }
        self.position += 1;
        Ok(())
    }

    /// Moves the cursor back by one position.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::RouteOutOfBounds`] if already at position 0.
    pub fn previous(&mut self) -> Result<(), RouteError> {
        if self.position == 0 {
            return Err(RouteError::RouteOutOfBounds {
                position: 0,
                len: self.items.len(),
            });
        }
        self.position -= 1;
        Ok(())
    }

    /// Sets the cursor to an arbitrary position, `0..=count()`.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::RouteOutOfBounds`] if `position > count()`.
    pub fn set_position(&mut self, position: usize) -> Result<(), RouteError> {
        if position > self.items.len() {
            return Err(RouteError::RouteOutOfBounds {
                position,
                len: self.items.len(),
            });
        }
        self.position = position;
        Ok(())
    }

    /// Moves the cursor to the first RouteItem whose item, section, or test
    /// part identifier equals `identifier`; ties are broken by RouteItem
    /// order. The sequence itself is never cloned or reordered.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::RouteOutOfBounds`] if no RouteItem matches.
    pub fn branch(&mut self, identifier: &str) -> Result<(), RouteError> {
        let target = self
            .items
            .iter()
            .position(|item| item.matches_identifier(identifier))
            .ok_or(RouteError::RouteOutOfBounds {
                position: self.items.len(),
                len: self.items.len(),
            })?;
        self.position = target;
        Ok(())
    }

    /// Returns the contiguous slice of RouteItems belonging to `test_part_identifier`.
    pub fn items_by_test_part(&self, test_part_identifier: &str) -> impl Iterator<Item = &RouteItem> {
        self.items.iter().filter(move |item| item.test_part_identifier() == test_part_identifier)
    }

    /// Returns the RouteItems belonging to `section_identifier` anywhere in
    /// their section chain.
    pub fn items_by_assessment_section(&self, section_identifier: &str) -> impl Iterator<Item = &RouteItem> {
        self.items
            .iter()
            .filter(move |item| item.section_chain().iter().any(|section| section == section_identifier))
    }

    /// Returns the RouteItems (occurrences) belonging to `item_ref`.
    pub fn items_by_assessment_item_ref(&self, item_ref: &str) -> impl Iterator<Item = &RouteItem> {
        self.items.iter().filter(move |item| item.item_ref() == item_ref)
    }

    /// Returns all RouteItems in Route order.
    #[must_use]
    pub fn items(&self) -> &[RouteItem] {
        &self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route_item(item_ref: &str, test_part: &str, section: &str) -> RouteItem {
        RouteItem::new(
            item_ref.to_string(),
            0,
            test_part.to_string(),
            vec![section.to_string()],
            Vec::new(),
            Vec::new(),
            ItemSessionControl::default(),
            TimeLimits::default(),
        )
    }

    fn three_item_route() -> Route {
        Route::new(vec![
            route_item("Q1", "P1", "S1"),
            route_item("Q2", "P1", "S1"),
            route_item("Q3", "P1", "S2"),
        ])
    }

    #[test]
    fn next_walks_to_exhaustion() {
        let mut route = three_item_route();
        assert!(!route.is_exhausted());
        route.next().expect("advance");
        route.next().expect("advance");
        assert!(route.is_last());
        route.next().expect("advance past last");
        assert!(route.is_exhausted());
        assert_eq!(route.next(), Err(RouteError::RouteOutOfBounds { position: 3, len: 3 }));
    }

    #[test]
    fn previous_at_zero_fails() {
        let mut route = three_item_route();
        assert_eq!(route.previous(), Err(RouteError::RouteOutOfBounds { position: 0, len: 3 }));
    }

    #[test]
    fn branch_finds_first_match_by_route_order() {
        let mut route = three_item_route();
        route.branch("S2").expect("branch to S2");
        assert_eq!(route.current().expect("current").item_ref(), "Q3");
    }

    #[test]
    fn branch_with_no_match_fails() {
        let mut route = three_item_route();
        assert!(route.branch("NOPE").is_err());
    }

    #[test]
    fn section_boundaries_detected() {
        let mut route = three_item_route();
        assert!(!route.is_last_of_assessment_section());
        route.next().expect("advance");
        assert!(route.is_last_of_assessment_section());
        assert!(route.is_last_of_test_part());
    }
}
