// qti-session-core/src/item/session.rs
// ============================================================================
// Module: Item Session
// Description: State machine for one item occurrence: attempts, responses,
//              response processing hook, and duration accrual.
// Purpose: Own everything local to a single (itemRef, occurrence) pair so
//          the Test Session Driver only orchestrates, never bit-twiddles.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! An [`ItemSession`] tracks one item occurrence's lifecycle from
//! `NotSelected` through to `Closed`. Response processing itself is external
//! (C8); `end_attempt` takes a caller-supplied hook so this module stays free
//! of any expression-engine dependency.

use thiserror::Error;

use crate::core::model::ItemSessionControl;
use crate::core::model::NavigationMode;
use crate::core::model::SubmissionMode;
use crate::core::model::TimeLimits;
use crate::core::time::Observation;
use crate::core::variable::QtiValue;
use crate::core::variable::State;

// ============================================================================
// SECTION: States
// ============================================================================

/// Lifecycle state of one item occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemSessionState {
    /// Not yet scheduled by `selectEligibleItems`.
    NotSelected = 1,
    /// Scheduled and defaults applied, no attempt started.
    Initial = 2,
    /// An attempt is in progress.
    Interacting = 3,
    /// Between attempts, or parked while navigation moves elsewhere.
    Suspended = 4,
    /// No further attempts permitted.
    Closed = 5,
    /// Solution is being reviewed.
    Solution = 6,
    /// Candidate is reviewing a closed response.
    Review = 7,
    /// A modal feedback is being shown for this item.
    ModalFeedback = 8,
}

/// Candidate completion status, distinct from `ItemSessionState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionStatus {
    /// No attempt has been made.
    NotAttempted,
    /// Response processing could not determine completeness.
    Unknown,
    /// The candidate completed the item.
    Completed,
    /// The candidate left the item incomplete.
    Incomplete,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by item session lifecycle operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ItemSessionError {
    /// The item's own maximum time was exceeded.
    #[error("item duration overflow")]
    DurationOverflow,
    /// The item's own minimum time was not yet reached.
    #[error("item duration underflow")]
    DurationUnderflow,
    /// No further attempts are permitted by `itemSessionControl.maxAttempts`.
    #[error("attempts overflow")]
    AttemptsOverflow,
    /// A response was submitted for an identifier not declared on this item.
    #[error("invalid response: {identifier}")]
    InvalidResponse {
        /// The offending response identifier.
        identifier: String,
    },
    /// The item's session control forbids leaving it unattempted.
    #[error("skipping forbidden")]
    SkippingForbidden,
    /// The operation is not valid in the session's current state.
    #[error("state violation: expected {expected:?}, found {actual:?}")]
    StateViolation {
        /// One of the states the operation required.
        expected: ItemSessionState,
        /// The state the session was actually in.
        actual: ItemSessionState,
    },
    /// The caller-supplied response processing hook failed. Exists so
    /// `end_attempt`/`apply_deferred_response_processing`'s closure boundary
    /// can carry an `ExpressionEngine` failure detail without the driver
    /// needing a second, parallel closure-error type.
    #[error("response processing failed: {detail}")]
    ResponseProcessingFailed {
        /// Description supplied by the expression engine.
        detail: String,
    },
}

// ============================================================================
// SECTION: Item Session
// ============================================================================

/// One item occurrence's full lifecycle state.
#[derive(Debug, Clone)]
pub struct ItemSession {
    item_ref: String,
    occurrence: u32,
    state: ItemSessionState,
    variables: State,
    num_attempts: u32,
    completion_status: CompletionStatus,
    duration: f64,
    time_reference: Option<Observation>,
    navigation_mode: NavigationMode,
    submission_mode: SubmissionMode,
    session_control: ItemSessionControl,
    time_limits: TimeLimits,
}

impl ItemSession {
    /// Creates a not-yet-selected item session for one occurrence.
    #[must_use]
    pub fn new(
        item_ref: String,
        occurrence: u32,
        variables: State,
        navigation_mode: NavigationMode,
        submission_mode: SubmissionMode,
        session_control: ItemSessionControl,
        time_limits: TimeLimits,
    ) -> Self {
        Self {
            item_ref,
            occurrence,
            state: ItemSessionState::NotSelected,
            variables,
            num_attempts: 0,
            completion_status: CompletionStatus::NotAttempted,
            duration: 0.0,
            time_reference: None,
            navigation_mode,
            submission_mode,
            session_control,
            time_limits,
        }
    }

    /// Rebuilds a session from its raw fields, bypassing the lifecycle
    /// transitions. Used only by the binary snapshot codec (C10), which
    /// decodes a previously-encoded state and must reproduce it exactly
    /// rather than re-derive it through `begin_item_session`/`begin_attempt`.
    #[must_use]
    #[expect(clippy::too_many_arguments, reason = "snapshot restores every field a session holds")]
    pub(crate) fn from_snapshot(
        item_ref: String,
        occurrence: u32,
        state: ItemSessionState,
        variables: State,
        num_attempts: u32,
        completion_status: CompletionStatus,
        duration: f64,
        navigation_mode: NavigationMode,
        submission_mode: SubmissionMode,
        session_control: ItemSessionControl,
        time_limits: TimeLimits,
    ) -> Self {
        Self {
            item_ref,
            occurrence,
            state,
            variables,
            num_attempts,
            completion_status,
            duration,
            time_reference: None,
            navigation_mode,
            submission_mode,
            session_control,
            time_limits,
        }
    }

    /// Returns the item reference identifier this session belongs to.
    #[must_use]
    pub fn item_ref(&self) -> &str {
        &self.item_ref
    }

    /// Returns the 0-based occurrence index within its item reference.
    #[must_use]
    pub const fn occurrence(&self) -> u32 {
        self.occurrence
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ItemSessionState {
        self.state
    }

    /// Returns the number of attempts made so far.
    #[must_use]
    pub const fn num_attempts(&self) -> u32 {
        self.num_attempts
    }

    /// Returns the current completion status.
    #[must_use]
    pub const fn completion_status(&self) -> CompletionStatus {
        self.completion_status
    }

    /// Returns accumulated duration in seconds.
    #[must_use]
    pub const fn duration(&self) -> f64 {
        self.duration
    }

    /// Returns this session's declared navigation mode.
    #[must_use]
    pub const fn navigation_mode(&self) -> NavigationMode {
        self.navigation_mode
    }

    /// Returns this session's declared submission mode.
    #[must_use]
    pub const fn submission_mode(&self) -> SubmissionMode {
        self.submission_mode
    }

    /// Returns this session's effective session control.
    #[must_use]
    pub const fn session_control(&self) -> ItemSessionControl {
        self.session_control
    }

    /// Returns this session's effective time limits.
    #[must_use]
    pub const fn time_limits(&self) -> TimeLimits {
        self.time_limits
    }

    /// Returns a read-only view of the item's variables.
    #[must_use]
    pub const fn variables(&self) -> &State {
        &self.variables
    }

    /// Returns a mutable view of the item's variables, used by the driver's
    /// variable addressing (`offsetGet`/`offsetSet`).
    pub fn variables_mut(&mut self) -> &mut State {
        &mut self.variables
    }

    fn require_state(&self, expected: ItemSessionState) -> Result<(), ItemSessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ItemSessionError::StateViolation {
                expected,
                actual: self.state,
            })
        }
    }

    /// Schedules this session: applies template/response/outcome defaults
    /// and transitions `NotSelected` → `Initial`.
    ///
    /// # Errors
    ///
    /// Returns [`ItemSessionError::StateViolation`] if not `NotSelected`.
    pub fn begin_item_session(&mut self) -> Result<(), ItemSessionError> {
        self.require_state(ItemSessionState::NotSelected)?;
        let identifiers: Vec<String> = self.variables.iter().map(|v| v.identifier.clone()).collect();
        for identifier in identifiers {
            self.variables.apply_default_value(&identifier);
        }
        self.state = ItemSessionState::Initial;
        Ok(())
    }

    /// Starts an attempt: `Initial`/`Suspended` → `Interacting`.
    ///
    /// # Errors
    ///
    /// Returns [`ItemSessionError::StateViolation`] if not `Initial` or
    /// `Suspended`, or [`ItemSessionError::AttemptsOverflow`] if no further
    /// attempts are permitted.
    pub fn begin_attempt(&mut self) -> Result<(), ItemSessionError> {
        match self.state {
            ItemSessionState::Initial | ItemSessionState::Suspended => {}
            actual => {
                return Err(ItemSessionError::StateViolation {
                    expected: ItemSessionState::Initial,
                    actual,
                });
            }
        }
        if let Some(max_attempts) = self.session_control.max_attempts {
            if self.num_attempts >= max_attempts {
                return Err(ItemSessionError::AttemptsOverflow);
            }
        }
        self.state = ItemSessionState::Interacting;
        Ok(())
    }

    /// The simultaneous-submission-mode equivalent of [`Self::begin_attempt`]:
    /// the candidate starts interacting, but response processing for this
    /// attempt is deferred to a later `deferredResponseSubmission` batch.
    ///
    /// # Errors
    ///
    /// See [`Self::begin_attempt`].
    pub fn begin_candidate_session(&mut self) -> Result<(), ItemSessionError> {
        self.begin_attempt()
    }

    /// Ends the interacting period in simultaneous submission mode without
    /// running response processing; the caller is responsible for queuing
    /// the raw responses into the pending response store. Increments
    /// `numAttempts` immediately, since the attempt itself is complete even
    /// though processing is deferred to [`Self::apply_deferred_response_processing`].
    ///
    /// # Errors
    ///
    /// Returns [`ItemSessionError::StateViolation`] if not `Interacting`.
    pub fn end_candidate_session(&mut self) -> Result<(), ItemSessionError> {
        self.require_state(ItemSessionState::Interacting)?;
        self.num_attempts += 1;
        self.state = ItemSessionState::Suspended;
        Ok(())
    }

    /// Completes a deferred (simultaneous-mode) attempt: writes the queued
    /// responses into this item's response variables, runs
    /// `run_response_processing` unless suppressed, and transitions to
    /// `Suspended` (more attempts allowed) or `Closed`, mirroring
    /// [`Self::end_attempt`]'s tail without re-incrementing `numAttempts`
    /// (already credited by [`Self::end_candidate_session`]).
    ///
    /// # Errors
    ///
    /// Returns [`ItemSessionError::StateViolation`] if not `Suspended`, or
    /// [`ItemSessionError::InvalidResponse`] if a response addresses an
    /// undeclared identifier.
    pub fn apply_deferred_response_processing<F>(
        &mut self,
        responses: Vec<(String, QtiValue)>,
        run_response_processing: Option<F>,
    ) -> Result<(), ItemSessionError>
    where
        F: FnOnce(&mut State) -> Result<CompletionStatus, ItemSessionError>,
    {
        self.require_state(ItemSessionState::Suspended)?;

        for (identifier, value) in &responses {
            if !self.variables.set_variable(identifier, value.clone()) {
                return Err(ItemSessionError::InvalidResponse {
                    identifier: identifier.clone(),
                });
            }
        }

        self.completion_status = if let Some(run) = run_response_processing {
            run(&mut self.variables)?
        } else {
            CompletionStatus::Unknown
        };

        let more_attempts_allowed =
            self.session_control.max_attempts.is_none_or(|max| self.num_attempts < max);
        self.state = if more_attempts_allowed {
            ItemSessionState::Suspended
        } else {
            ItemSessionState::Closed
        };
        Ok(())
    }

    /// Credits elapsed time since the prior observation to this session's
    /// duration while `Interacting`, then clamps to `maxTime` if declared.
    pub fn set_time(&mut self, observation: Observation) {
        if self.state == ItemSessionState::Interacting {
            if let Some(previous) = self.time_reference {
                self.duration += observation.elapsed_seconds_since(previous);
            }
            if let Some(max_time) = self.time_limits.max_time {
                if self.duration > max_time {
                    self.duration = max_time;
                }
            }
        }
        self.time_reference = Some(observation);
    }

    /// Returns whether this session's own max time has been exhausted.
    #[must_use]
    pub fn is_time_exhausted(&self) -> bool {
        self.time_limits.max_time.is_some_and(|max_time| self.duration >= max_time)
    }

    /// Ends the current attempt: copies `responses` into the item's response
    /// variables, increments `numAttempts`, then (unless `skip_response_processing`)
    /// invokes `run_response_processing` to compute the resulting completion
    /// status, and finally transitions to `Suspended` (attempts remain) or
    /// `Closed`.
    ///
    /// # Errors
    ///
    /// Returns [`ItemSessionError::StateViolation`] if not `Interacting`,
    /// [`ItemSessionError::DurationOverflow`] if `max_time` has passed and
    /// `allow_late_submission` is false, [`ItemSessionError::InvalidResponse`]
    /// if a response addresses an undeclared identifier, or whatever
    /// `run_response_processing` returns.
    pub fn end_attempt<F>(
        &mut self,
        responses: Vec<(String, QtiValue)>,
        allow_late_submission: bool,
        skip_response_processing: bool,
        run_response_processing: Option<F>,
    ) -> Result<(), ItemSessionError>
    where
        F: FnOnce(&mut State) -> Result<CompletionStatus, ItemSessionError>,
    {
        self.require_state(ItemSessionState::Interacting)?;

        if !allow_late_submission && !self.time_limits.allow_late_submission && self.is_time_exhausted() {
            return Err(ItemSessionError::DurationOverflow);
        }
        if let Some(min_time) = self.time_limits.min_time {
            if self.navigation_mode == NavigationMode::Linear && self.duration < min_time {
                return Err(ItemSessionError::DurationUnderflow);
            }
        }

        for (identifier, value) in &responses {
            if !self.variables.set_variable(identifier, value.clone()) {
                return Err(ItemSessionError::InvalidResponse {
                    identifier: identifier.clone(),
                });
            }
        }

        self.num_attempts += 1;

        self.completion_status = if skip_response_processing {
            CompletionStatus::Unknown
        } else if let Some(run) = run_response_processing {
            run(&mut self.variables)?
        } else {
            CompletionStatus::Unknown
        };

        let more_attempts_allowed =
            self.session_control.max_attempts.is_none_or(|max| self.num_attempts < max);
        self.state = if more_attempts_allowed {
            ItemSessionState::Suspended
        } else {
            ItemSessionState::Closed
        };
        Ok(())
    }

    /// Parks the session: `Interacting` → `Suspended`. A no-op in any other
    /// state, including `ModalFeedback`, which is left untouched.
    pub fn suspend(&mut self) {
        if self.state == ItemSessionState::Interacting {
            self.state = ItemSessionState::Suspended;
        }
    }

    /// Forcibly ends the item session regardless of its current state, used
    /// when the driver closes a scope due to time overflow or test end.
    pub fn end_item_session(&mut self) {
        self.state = ItemSessionState::Closed;
    }

    /// Returns whether the given identifier addresses a variable declared
    /// on this item (response, outcome, or template).
    #[must_use]
    pub fn declares(&self, identifier: &str) -> bool {
        self.variables.contains(identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::variable::BaseType;
    use crate::core::variable::Cardinality;
    use crate::core::variable::SingleValue;
    use crate::core::variable::Variable;
    use crate::core::variable::VariableKind;

    fn response_variable() -> Variable {
        Variable::from_declaration(
            "RESPONSE".to_string(),
            VariableKind::Response,
            Cardinality::Single,
            BaseType::Identifier,
            None,
        )
    }

    fn session() -> ItemSession {
        let mut state = State::new();
        state.declare(response_variable());
        ItemSession::new(
            "Q01".to_string(),
            0,
            state,
            NavigationMode::Linear,
            SubmissionMode::Individual,
            ItemSessionControl {
                max_attempts: Some(1),
                ..ItemSessionControl::default()
            },
            TimeLimits::default(),
        )
    }

    #[test]
    fn lifecycle_happy_path_closes_after_single_attempt() {
        let mut item = session();
        item.begin_item_session().expect("begin item session");
        item.begin_attempt().expect("begin attempt");
        item.end_attempt(
            vec![("RESPONSE".to_string(), QtiValue::Single(SingleValue::Identifier("A".to_string())))],
            false,
            false,
            Some(|_: &mut State| Ok(CompletionStatus::Completed)),
        )
        .expect("end attempt");
        assert_eq!(item.state(), ItemSessionState::Closed);
        assert_eq!(item.num_attempts(), 1);
    }

    #[test]
    fn attempts_overflow_is_rejected() {
        let mut item = session();
        item.begin_item_session().expect("begin item session");
        item.begin_attempt().expect("begin attempt");
        item.end_attempt(
            vec![("RESPONSE".to_string(), QtiValue::Single(SingleValue::Identifier("A".to_string())))],
            false,
            false,
            Some(|_: &mut State| Ok(CompletionStatus::Completed)),
        )
        .expect("end attempt");
        assert_eq!(
            item.begin_attempt(),
            Err(ItemSessionError::AttemptsOverflow)
        );
    }

    #[test]
    fn invalid_response_identifier_is_rejected() {
        let mut item = session();
        item.begin_item_session().expect("begin item session");
        item.begin_attempt().expect("begin attempt");
        let result = item.end_attempt(
            vec![("NOT_DECLARED".to_string(), QtiValue::Single(SingleValue::Identifier("A".to_string())))],
            false,
            false,
            Some(|_: &mut State| Ok(CompletionStatus::Completed)),
        );
        assert_eq!(
            result,
            Err(ItemSessionError::InvalidResponse {
                identifier: "NOT_DECLARED".to_string()
            })
        );
    }

    #[test]
    fn suspend_is_idempotent_outside_interacting() {
        let mut item = session();
        item.begin_item_session().expect("begin item session");
        item.suspend();
        assert_eq!(item.state(), ItemSessionState::Initial);
    }
}
