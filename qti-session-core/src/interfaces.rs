// qti-session-core/src/interfaces.rs
// ============================================================================
// Module: Collaborator Interfaces
// Description: Traits the driver and codec consume from outside the crate:
//              expression evaluation, item session construction, and
//              snapshot persistence.
// Purpose: Keep C9 and C10 free of any concrete expression language or
//          storage backend; callers supply these.
// Dependencies: crate::core, crate::item
// ============================================================================

//! ## Overview
//! Three seams: [`ExpressionEngine`] (the one collaborator the driver is
//! generic over, per its collaborator-genericity decision), [`SessionManager`]
//! (item session construction, with a direct default the driver uses
//! internally), and [`SessionStream`] (codec-level persistence, consumed by
//! the codec's helpers rather than by the driver itself).

use std::collections::HashMap;

use crate::core::model::ItemSessionControl;
use crate::core::model::NavigationMode;
use crate::core::model::SubmissionMode;
use crate::core::model::TimeLimits;
use crate::core::variable::QtiValue;
use crate::core::variable::State;
use crate::core::ExpressionRef;
use crate::item::CompletionStatus;
use crate::item::ItemSession;
use crate::item::ItemSessionStore;

// ============================================================================
// SECTION: Expression Engine
// ============================================================================

/// A read-only view of the scopes an expression may reference: the global
/// outcome state, the item currently in focus (if any), and that item's own
/// variables. This is deliberately narrower than the full test session so
/// the trait never has to reference the driver's own type.
#[derive(Debug)]
pub struct EvaluationContext<'a> {
    /// Test-scoped global outcome variables.
    pub global_outcomes: &'a State,
    /// The item in focus when the expression is a branchRule or
    /// preCondition attached to a RouteItem; `None` for test-level rules.
    pub current_item: Option<&'a State>,
}

impl<'a> EvaluationContext<'a> {
    /// Builds a context scoped to the test only, with no item in focus.
    #[must_use]
    pub const fn test_scoped(global_outcomes: &'a State) -> Self {
        Self {
            global_outcomes,
            current_item: None,
        }
    }

    /// Builds a context scoped to the test plus one item in focus.
    #[must_use]
    pub const fn item_scoped(global_outcomes: &'a State, current_item: &'a State) -> Self {
        Self {
            global_outcomes,
            current_item: Some(current_item),
        }
    }
}

/// Evaluates expression bodies the core treats as opaque.
///
/// `evaluate` is consumed in exactly three scalar-result contexts: a
/// branchRule condition, a preCondition, and applying templateDefaults. The
/// remaining two methods run a whole rule *body* rather than a single
/// expression: response processing and outcome processing each assign many
/// variables and compute (for response processing) a completion status, so
/// they mutate a [`State`] directly instead of returning one [`QtiValue`].
/// All three stay on this one trait, consistent with the driver being
/// generic over exactly one collaborator.
pub trait ExpressionEngine {
    /// Evaluates `expression` against `context`, returning `None` for a QTI
    /// null result.
    fn evaluate(&self, expression: &ExpressionRef, context: &EvaluationContext<'_>) -> Option<QtiValue>;

    /// Runs an item's response processing rule body against its own
    /// variables, returning the resulting completion status.
    ///
    /// # Errors
    ///
    /// Returns a human-readable failure description on evaluation failure.
    fn run_response_processing(
        &self,
        expression: &ExpressionRef,
        item_variables: &mut State,
    ) -> Result<CompletionStatus, String>;

    /// Runs the test's outcome processing rule body, mutating the global
    /// outcome state. `item_sessions` is read-only, letting rules aggregate
    /// over per-item outcomes (e.g. summing a SCORE).
    ///
    /// # Errors
    ///
    /// Returns a human-readable failure description on evaluation failure.
    fn run_outcome_processing(
        &self,
        expression: &ExpressionRef,
        global_outcomes: &mut State,
        item_sessions: &ItemSessionStore,
    ) -> Result<(), String>;
}

// ============================================================================
// SECTION: Session Manager
// ============================================================================

/// Constructs an [`ItemSession`] for a RouteItem's selection. The driver
/// calls this internally via [`DefaultSessionManager`] rather than holding
/// it as a generic parameter, since the driver is generic over exactly one
/// collaborator (`ExpressionEngine`, per its collaborator-genericity
/// decision); the trait remains available for an embedding application that
/// wants to override construction (e.g. to inject item-specific template
/// variable declarations from a richer model than this crate carries).
pub trait SessionManager {
    /// Creates a new, `NotSelected`-state item session.
    fn create_assessment_item_session(
        &self,
        item_ref: &str,
        occurrence: u32,
        variables: State,
        navigation_mode: NavigationMode,
        submission_mode: SubmissionMode,
        session_control: ItemSessionControl,
        time_limits: TimeLimits,
    ) -> ItemSession;
}

/// The driver's own construction path, exposed as the default
/// [`SessionManager`] implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSessionManager;

impl SessionManager for DefaultSessionManager {
    fn create_assessment_item_session(
        &self,
        item_ref: &str,
        occurrence: u32,
        variables: State,
        navigation_mode: NavigationMode,
        submission_mode: SubmissionMode,
        session_control: ItemSessionControl,
        time_limits: TimeLimits,
    ) -> ItemSession {
        ItemSession::new(
            item_ref.to_string(),
            occurrence,
            variables,
            navigation_mode,
            submission_mode,
            session_control,
            time_limits,
        )
    }
}

// ============================================================================
// SECTION: Session Stream
// ============================================================================

/// Persists and retrieves a session's encoded byte stream by session ID.
/// Consumed by the codec's persistence helpers, not by the driver itself
/// (the driver has no notion of a session ID or a backing store).
pub trait SessionStream {
    /// Returns the previously persisted bytes for `session_id`, or `None`
    /// if nothing has been persisted yet.
    fn get_retrieval_stream(&self, session_id: &str) -> Option<Vec<u8>>;

    /// Persists `bytes` as the current snapshot for `session_id`, replacing
    /// any prior snapshot.
    fn persist_stream(&mut self, session_id: &str, bytes: Vec<u8>);
}

/// An in-memory [`SessionStream`], used by tests and as a reference
/// implementation; a file-backed implementation lives in the CLI crate.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionStream {
    snapshots: HashMap<String, Vec<u8>>,
}

impl InMemorySessionStream {
    /// Creates an empty in-memory stream store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStream for InMemorySessionStream {
    fn get_retrieval_stream(&self, session_id: &str) -> Option<Vec<u8>> {
        self.snapshots.get(session_id).cloned()
    }

    fn persist_stream(&mut self, session_id: &str, bytes: Vec<u8>) {
        self.snapshots.insert(session_id.to_string(), bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_stream_round_trips() {
        let mut stream = InMemorySessionStream::new();
        assert!(stream.get_retrieval_stream("s1").is_none());
        stream.persist_stream("s1", vec![1, 2, 3]);
        assert_eq!(stream.get_retrieval_stream("s1"), Some(vec![1, 2, 3]));
    }

    #[test]
    fn default_session_manager_builds_not_selected_session() {
        let manager = DefaultSessionManager;
        let session = manager.create_assessment_item_session(
            "Q01",
            0,
            State::new(),
            NavigationMode::Linear,
            SubmissionMode::Individual,
            ItemSessionControl::default(),
            TimeLimits::default(),
        );
        assert_eq!(session.item_ref(), "Q01");
    }
}
