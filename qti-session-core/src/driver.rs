// qti-session-core/src/driver.rs
// ============================================================================
// Module: Test Session Driver
// Description: The orchestrating state machine for one candidate's run
//              through an AssessmentTest: navigation, attempts, time
//              accrual, variable addressing, and feedback gating.
// Purpose: Be the single entry point every caller (CLI, server, codec)
//          drives instead of touching Route/ItemSession/State directly.
// Dependencies: crate::core, crate::item, crate::route, crate::duration,
//               crate::pending, crate::error, crate::interfaces, crate::config
// ============================================================================

//! ## Overview
//! [`TestSessionDriver`] is generic over exactly one collaborator,
//! [`ExpressionEngine`], and holds everything else concretely: the Route
//! cursor, every item session, accumulated durations, pending (simultaneous)
//! responses, and the global outcome state. It never reads a clock itself;
//! every timed operation is driven by a caller-supplied [`Observation`].

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::core::model::AssessmentTest;
use crate::core::model::BranchTarget;
use crate::core::model::NavigationMode;
use crate::core::model::PreCondition;
use crate::core::model::SubmissionMode;
use crate::core::model::TestFeedbackAccess;
use crate::core::model::TestFeedbackRef;
use crate::core::model::TimeLimits;
use crate::core::variable::QtiValue;
use crate::core::variable::SingleValue;
use crate::core::variable::State;
use crate::core::variable::Variable;
use crate::core::variable::VariableKind;
use crate::core::time::Observation;
use crate::core::identifier::VariableIdentifier;
use crate::duration::DurationStore;
use crate::error::TestSessionError;
use crate::interfaces::DefaultSessionManager;
use crate::interfaces::EvaluationContext;
use crate::interfaces::ExpressionEngine;
use crate::interfaces::SessionManager;
use crate::item::ItemSessionError;
use crate::item::ItemSessionState;
use crate::item::ItemSessionStore;
use crate::pending::PendingResponseStore;
use crate::route::Route;
use crate::route::RouteItem;

// ============================================================================
// SECTION: Driver State
// ============================================================================

/// Top-level lifecycle state of a test session, distinct from any one item's
/// [`ItemSessionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestSessionState {
    /// `beginTestSession` has not yet run.
    Initial = 1,
    /// The candidate is actively navigating/attempting items.
    Interacting = 2,
    /// Parked between interactions (e.g. mid-navigation bookkeeping).
    Suspended = 3,
    /// `endTestSession` has run; no further operations are permitted.
    Closed = 4,
    /// A test-level feedback is being displayed.
    ModalFeedback = 5,
}

impl TestSessionState {
    fn describe(states: &[Self]) -> String {
        states.iter().map(|state| state.to_string()).collect::<Vec<_>>().join(" or ")
    }
}

impl std::fmt::Display for TestSessionState {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Initial => "Initial",
            Self::Interacting => "Interacting",
            Self::Suspended => "Suspended",
            Self::Closed => "Closed",
            Self::ModalFeedback => "ModalFeedback",
        };
        formatter.write_str(name)
    }
}

// ============================================================================
// SECTION: Resolved Variable Targets
// ============================================================================

/// The concrete storage location a variable identifier resolves to, per
/// §4.8.4's addressing rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedTarget {
    /// A test-scoped (global) outcome variable.
    GlobalOutcome(String),
    /// One occurrence of one item's variable.
    ItemVariable {
        /// The item reference identifier.
        item_ref: String,
        /// The 0-based occurrence index.
        occurrence: u32,
        /// The bare variable name.
        name: String,
    },
    /// The built-in `duration` entry for the test, a testPart, or a section.
    DurationEntry(String),
}

/// The outcome of resolving an identifier before storage access is
/// attempted. [`Self::Null`] means "resolves to no value" (a legitimate
/// read result of null, distinct from an unresolvable identifier).
#[derive(Debug, Clone, PartialEq, Eq)]
enum Resolved {
    Target(ResolvedTarget),
    Null,
    Unknown,
}

// ============================================================================
// SECTION: Driver
// ============================================================================

/// Drives one candidate's run through an [`AssessmentTest`], generic over the
/// [`ExpressionEngine`] used to evaluate branch/precondition/response/outcome
/// rule bodies.
#[derive(Debug, Clone)]
pub struct TestSessionDriver<E: ExpressionEngine> {
    session_id: String,
    test: Arc<AssessmentTest>,
    state: TestSessionState,
    route: Route,
    item_sessions: ItemSessionStore,
    durations: DurationStore,
    pending: PendingResponseStore,
    global_outcomes: State,
    last_occurrence_update: BTreeMap<String, u32>,
    visited_test_parts: BTreeSet<String>,
    path: Vec<usize>,
    time_reference: Option<Observation>,
    config: EngineConfig,
    expression_engine: E,
}

impl<E: ExpressionEngine> TestSessionDriver<E> {
    /// Builds a driver at `Initial`, with every test-scoped outcome variable
    /// declared (null until its default is applied by `beginTestSession`).
    #[must_use]
    pub fn new(
        session_id: String,
        test: Arc<AssessmentTest>,
        route: Route,
        expression_engine: E,
        config: EngineConfig,
    ) -> Self {
        let mut global_outcomes = State::new();
        for declaration in &test.outcome_declarations {
            global_outcomes.declare(Variable::from_declaration(
                declaration.identifier.clone(),
                VariableKind::Outcome,
                declaration.cardinality,
                declaration.base_type,
                declaration.default_value.clone(),
            ));
        }
        Self {
            session_id,
            test,
            state: TestSessionState::Initial,
            route,
            item_sessions: ItemSessionStore::new(),
            durations: DurationStore::new(),
            pending: PendingResponseStore::new(),
            global_outcomes,
            last_occurrence_update: BTreeMap::new(),
            visited_test_parts: BTreeSet::new(),
            path: Vec::new(),
            time_reference: None,
            config,
            expression_engine,
        }
    }

    /// Rebuilds a driver from its constituent parts, bypassing `new`'s
    /// declaration step. Used only by the binary snapshot codec (C10), which
    /// already has a fully-populated `global_outcomes` to install.
    #[must_use]
    #[expect(clippy::too_many_arguments, reason = "snapshot restores every field a driver holds")]
    pub(crate) fn from_parts(
        session_id: String,
        test: Arc<AssessmentTest>,
        state: TestSessionState,
        route: Route,
        item_sessions: ItemSessionStore,
        durations: DurationStore,
        pending: PendingResponseStore,
        global_outcomes: State,
        last_occurrence_update: BTreeMap<String, u32>,
        visited_test_parts: BTreeSet<String>,
        path: Vec<usize>,
        time_reference: Option<Observation>,
        config: EngineConfig,
        expression_engine: E,
    ) -> Self {
        Self {
            session_id,
            test,
            state,
            route,
            item_sessions,
            durations,
            pending,
            global_outcomes,
            last_occurrence_update,
            visited_test_parts,
            path,
            time_reference,
            config,
            expression_engine,
        }
    }

    // ------------------------------------------------------------------
    // Accessors (used by the codec and by callers inspecting a snapshot)
    // ------------------------------------------------------------------

    /// Returns this session's identifier.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Returns the shared assessment test model.
    #[must_use]
    pub fn test(&self) -> &Arc<AssessmentTest> {
        &self.test
    }

    /// Returns the driver's top-level state.
    #[must_use]
    pub const fn state(&self) -> TestSessionState {
        self.state
    }

    /// Returns the Route cursor.
    #[must_use]
    pub const fn route(&self) -> &Route {
        &self.route
    }

    /// Returns the item session store.
    #[must_use]
    pub const fn item_sessions(&self) -> &ItemSessionStore {
        &self.item_sessions
    }

    /// Returns the duration store.
    #[must_use]
    pub const fn durations(&self) -> &DurationStore {
        &self.durations
    }

    /// Returns the pending (simultaneous-mode) response store.
    #[must_use]
    pub const fn pending(&self) -> &PendingResponseStore {
        &self.pending
    }

    /// Returns the global (test-scoped) outcome state.
    #[must_use]
    pub const fn global_outcomes(&self) -> &State {
        &self.global_outcomes
    }

    /// Returns the last-occurrence-update map used by unprefixed,
    /// unsequenced item variable addressing.
    #[must_use]
    pub const fn last_occurrence_update(&self) -> &BTreeMap<String, u32> {
        &self.last_occurrence_update
    }

    /// Returns the set of testPart identifiers visited so far.
    #[must_use]
    pub const fn visited_test_parts(&self) -> &BTreeSet<String> {
        &self.visited_test_parts
    }

    /// Returns the recorded navigation path (populated only when
    /// `config.path_tracking` is set).
    #[must_use]
    pub fn path(&self) -> &[usize] {
        &self.path
    }

    /// Returns the last time observation supplied, if any.
    #[must_use]
    pub const fn time_reference(&self) -> Option<Observation> {
        self.time_reference
    }

    /// Returns the active engine configuration.
    #[must_use]
    pub const fn config(&self) -> EngineConfig {
        self.config
    }

    // ------------------------------------------------------------------
    // Top-level lifecycle
    // ------------------------------------------------------------------

    /// Begins the test session: zero-initializes every scope's duration
    /// entry, transitions to `Interacting`, and selects the initial set of
    /// eligible items.
    ///
    /// # Errors
    ///
    /// Returns [`TestSessionError::StateViolation`] unless the driver is
    /// `Initial`.
    pub fn begin_test_session(&mut self) -> Result<(), TestSessionError> {
        self.require_state(&[TestSessionState::Initial])?;
        self.initialize_test_durations();
        self.state = TestSessionState::Interacting;
        self.select_eligible_items()?;
        self.mark_current_test_part_visited();
        self.record_last_occurrence_update();
        Ok(())
    }

    /// Ends the test session: flushes any pending simultaneous-mode
    /// responses, force-closes every open item session, and transitions to
    /// `Closed`. Subsequent calls fail rather than silently no-op, to
    /// surface a caller invoking it twice.
    ///
    /// # Errors
    ///
    /// Returns [`TestSessionError::StateViolation`] unless the driver is
    /// `Interacting` or `Suspended`, or whatever flushing pending responses
    /// fails with.
    pub fn end_test_session(&mut self) -> Result<(), TestSessionError> {
        self.require_state(&[TestSessionState::Interacting, TestSessionState::Suspended])?;
        if !self.pending.is_empty() {
            self.deferred_response_submission()?;
        }
        for session in self.item_sessions.iter_mut() {
            if session.state() != ItemSessionState::Closed {
                session.end_item_session();
            }
        }
        self.state = TestSessionState::Closed;
        Ok(())
    }

    /// Starts an attempt on the current RouteItem.
    ///
    /// # Errors
    ///
    /// Returns [`TestSessionError::StateViolation`] unless `Interacting`, a
    /// duration-overflow/underflow variant if time limits above the item
    /// scope have been exceeded (and `allow_late_submission` is false), or
    /// an [`TestSessionError::ItemSession`] error from the item itself.
    pub fn begin_attempt(&mut self, allow_late_submission: bool) -> Result<(), TestSessionError> {
        self.require_state(&[TestSessionState::Interacting])?;
        let route_item =
            self.route.current().cloned().ok_or_else(|| TestSessionError::LogicError {
                detail: "beginAttempt: no current RouteItem".to_string(),
            })?;
        let navigation_mode = self.navigation_mode_of(&route_item);
        if !allow_late_submission {
            self.check_time_limits(false, &route_item, navigation_mode)?;
        }
        let item_ref = route_item.item_ref().to_string();
        let occurrence = route_item.occurrence();
        let apply_template_defaults = navigation_mode == NavigationMode::Linear
            && self.item_sessions.get_session(&item_ref, occurrence).is_some_and(|s| s.num_attempts() == 0);
        let submission_mode = self.submission_mode_of(&route_item);
        let session = self
            .item_sessions
            .get_session_mut(&item_ref, occurrence)
            .ok_or_else(|| TestSessionError::LogicError {
                detail: format!("beginAttempt: no item session for {item_ref}.{occurrence}"),
            })?;
        if apply_template_defaults {
            session.variables_mut().reset_template_variables();
        }
        let result = match submission_mode {
            SubmissionMode::Simultaneous => session.begin_candidate_session(),
            SubmissionMode::Individual => session.begin_attempt(),
        };
        result.map_err(|source| self.wrap_item_session_error(&item_ref, occurrence, source))
    }

    /// Ends the current attempt, writing `responses` into the item's
    /// response variables and (in `Individual` submission mode) running
    /// response processing immediately, then outcome processing over the
    /// whole test; in `Simultaneous` mode the responses are only queued for
    /// `deferredResponseSubmission`.
    ///
    /// # Errors
    ///
    /// See [`Self::begin_attempt`]; additionally returns
    /// [`TestSessionError::ResponseProcessingError`] if response processing
    /// itself fails, or [`TestSessionError::OutcomeProcessingError`] if the
    /// subsequent outcome processing pass fails.
    pub fn end_attempt(
        &mut self,
        responses: Vec<(String, QtiValue)>,
        allow_late_submission: bool,
    ) -> Result<(), TestSessionError> {
        self.require_state(&[TestSessionState::Interacting])?;
        let route_item =
            self.route.current().cloned().ok_or_else(|| TestSessionError::LogicError {
                detail: "endAttempt: no current RouteItem".to_string(),
            })?;
        let navigation_mode = self.navigation_mode_of(&route_item);
        if !allow_late_submission {
            self.check_time_limits(true, &route_item, navigation_mode)?;
        }
        let item_ref = route_item.item_ref().to_string();
        let occurrence = route_item.occurrence();
        match self.submission_mode_of(&route_item) {
            SubmissionMode::Simultaneous => {
                self.pending.add_pending(&item_ref, occurrence, responses);
                let session =
                    self.item_sessions.get_session_mut(&item_ref, occurrence).ok_or_else(|| {
                        TestSessionError::LogicError {
                            detail: format!("endAttempt: no item session for {item_ref}.{occurrence}"),
                        }
                    })?;
                session
                    .end_candidate_session()
                    .map_err(|source| self.wrap_item_session_error(&item_ref, occurrence, source))
            }
            SubmissionMode::Individual => {
                let response_processing = self.test.item_ref(&item_ref).and_then(|decl| decl.response_processing.clone());
                let engine = &self.expression_engine;
                let run = response_processing.map(|expression| {
                    move |variables: &mut State| -> Result<crate::item::CompletionStatus, ItemSessionError> {
                        engine
                            .run_response_processing(&expression, variables)
                            .map_err(|detail| ItemSessionError::ResponseProcessingFailed {
                                detail,
                            })
                    }
                });
                let item_sessions = &mut self.item_sessions;
                let session = item_sessions.get_session_mut(&item_ref, occurrence).ok_or_else(|| {
                    TestSessionError::LogicError {
                        detail: format!("endAttempt: no item session for {item_ref}.{occurrence}"),
                    }
                })?;
                let result = session.end_attempt(responses, allow_late_submission, false, run);
                result.map_err(|source| self.wrap_item_session_error(&item_ref, occurrence, source))?;
                self.record_last_occurrence_update();
                self.run_outcome_processing()
            }
        }
    }

    /// Suspends the item currently in focus: `Interacting` → `Suspended`,
    /// or a no-op in any other state (including a `ModalFeedback` item).
    pub fn suspend(&mut self) {
        if let Some(route_item) = self.route.current().cloned() {
            if let Some(session) = self.item_sessions.get_session_mut(route_item.item_ref(), route_item.occurrence()) {
                session.suspend();
            }
        }
    }

    /// Advances one position forward: suspends the current item, resolves
    /// any pending modal feedback, then runs `nextRouteItem`.
    ///
    /// # Errors
    ///
    /// Returns [`TestSessionError::StateViolation`] unless `Interacting`,
    /// `Suspended`, or `ModalFeedback`; on any other failure the Route
    /// cursor is restored to its pre-call position.
    pub fn move_next(&mut self) -> Result<(), TestSessionError> {
        self.require_state(&[TestSessionState::Interacting, TestSessionState::Suspended, TestSessionState::ModalFeedback])?;
        if self.state == TestSessionState::ModalFeedback {
            self.state = TestSessionState::Interacting;
            return Ok(());
        }
        self.suspend();
        if self.any_feedback_fires() {
            self.state = TestSessionState::ModalFeedback;
            return Ok(());
        }
        let previous_position = self.route.position();
        if self.config.path_tracking {
            self.path.push(previous_position);
        }
        if let Err(error) = self.next_route_item(false, false) {
            let _ = self.route.set_position(previous_position);
            if self.config.path_tracking {
                self.path.pop();
            }
            return Err(error);
        }
        if self.state == TestSessionState::Interacting {
            self.interact_with_item_session();
            self.mark_current_test_part_visited();
        }
        Ok(())
    }

    /// Moves one position back, honoring `path` when path tracking is on.
    ///
    /// # Errors
    ///
    /// Returns [`TestSessionError::StateViolation`] unless `Interacting`, or
    /// if there is nowhere to go back to.
    pub fn move_back(&mut self) -> Result<(), TestSessionError> {
        self.require_state(&[TestSessionState::Interacting])?;
        self.suspend();
        if self.config.path_tracking {
            let previous_position = self.path.pop().ok_or_else(|| TestSessionError::StateViolation {
                expected: "a non-empty navigation path".to_string(),
                actual: "empty path".to_string(),
            })?;
            self.route.set_position(previous_position)?;
        } else {
            self.route.previous().map_err(|_| TestSessionError::StateViolation {
                expected: "route position > 0".to_string(),
                actual: "route position 0".to_string(),
            })?;
        }
        self.interact_with_item_session();
        self.mark_current_test_part_visited();
        Ok(())
    }

    /// Jumps directly to `position`, only permitted in non-linear
    /// navigation (or when `always_allow_jumps` is configured).
    ///
    /// # Errors
    ///
    /// Returns [`TestSessionError::NavigationModeViolation`] if jumps are
    /// not permitted, or [`TestSessionError::ForbiddenJump`] if `position` is
    /// out of range; on failure the cursor is restored.
    pub fn jump_to(&mut self, position: usize) -> Result<(), TestSessionError> {
        self.require_state(&[TestSessionState::Interacting])?;
        let navigation_mode =
            self.route.current().map_or(NavigationMode::Linear, |item| self.navigation_mode_of(item));
        if navigation_mode != NavigationMode::NonLinear && !self.config.always_allow_jumps {
            return Err(TestSessionError::NavigationModeViolation);
        }
        if position > self.route.count() {
            return Err(TestSessionError::ForbiddenJump {
                position,
            });
        }
        let previous_position = self.route.position();
        self.suspend();
        let outcome = self.route.set_position(position).map_err(TestSessionError::from).and_then(|()| self.select_eligible_items());
        match outcome {
            Ok(()) => {
                if self.config.path_tracking {
                    match self.path.iter().position(|&visited| visited == position) {
                        Some(index) => self.path.truncate(index),
                        None => self.path.push(previous_position),
                    }
                }
                self.interact_with_item_session();
                self.mark_current_test_part_visited();
                Ok(())
            }
            Err(error) => {
                let _ = self.route.set_position(previous_position);
                self.interact_with_item_session();
                Err(error)
            }
        }
    }

    /// Skips ahead to the first RouteItem of the next testPart, ending the
    /// test session if there is none.
    ///
    /// # Errors
    ///
    /// Returns [`TestSessionError::StateViolation`] unless `Interacting`.
    pub fn move_next_test_part(&mut self) -> Result<(), TestSessionError> {
        self.require_state(&[TestSessionState::Interacting])?;
        self.suspend();
        let Some(current) = self.route.current().cloned() else {
            return self.end_test_session();
        };
        let test_part = current.test_part_identifier().to_string();
        while self.route.current().is_some_and(|item| item.test_part_identifier() == test_part) {
            self.route.next()?;
        }
        if self.route.is_exhausted() {
            self.end_test_session()
        } else {
            self.select_eligible_items()?;
            self.interact_with_item_session();
            self.mark_current_test_part_visited();
            Ok(())
        }
    }

    /// Skips ahead to the first RouteItem outside the current innermost
    /// assessment section.
    ///
    /// # Errors
    ///
    /// Returns [`TestSessionError::StateViolation`] unless `Interacting`.
    pub fn move_next_assessment_section(&mut self) -> Result<(), TestSessionError> {
        self.require_state(&[TestSessionState::Interacting])?;
        self.suspend();
        let Some(current) = self.route.current().cloned() else {
            return self.end_test_session();
        };
        let section = current.innermost_section().map(str::to_string);
        while self.route.current().is_some_and(|item| item.innermost_section().map(str::to_string) == section) {
            self.route.next()?;
        }
        if self.route.is_exhausted() {
            self.end_test_session()
        } else {
            self.select_eligible_items()?;
            self.interact_with_item_session();
            self.mark_current_test_part_visited();
            Ok(())
        }
    }

    // ------------------------------------------------------------------
    // Time
    // ------------------------------------------------------------------

    /// Feeds a new time observation to the session: credits elapsed time to
    /// the test/testPart/section/item scopes in force, clamps any scope at
    /// its declared `maxTime`, and force-closes (or ends the whole session)
    /// any scope whose `maxTime` has just been reached.
    ///
    /// # Errors
    ///
    /// Returns whatever closing an exhausted scope returns (normally
    /// nothing, since closing is itself infallible except at test scope).
    pub fn set_time(&mut self, observation: Observation) -> Result<(), TestSessionError> {
        if self.state != TestSessionState::Interacting {
            self.time_reference = Some(observation);
            return Ok(());
        }
        let Some(previous) = self.time_reference else {
            self.time_reference = Some(observation);
            for session in self.item_sessions.iter_mut() {
                session.set_time(observation);
            }
            return Ok(());
        };
        let delta = observation.elapsed_seconds_since(previous);
        let test_identifier = self.test.identifier.clone();
        self.durations.add(&test_identifier, delta);
        let route_item = self.route.current().cloned();
        if let Some(route_item) = &route_item {
            self.durations.add(route_item.test_part_identifier(), delta);
            for section_identifier in route_item.section_chain() {
                self.durations.add(section_identifier, delta);
            }
        }
        for session in self.item_sessions.iter_mut() {
            session.set_time(observation);
        }

        self.clamp_duration(&test_identifier, self.test.time_limits);
        if let Some(route_item) = &route_item {
            if let Some(test_part) = self.test.test_part(route_item.test_part_identifier()) {
                self.clamp_duration(&test_part.identifier.clone(), test_part.time_limits);
            }
            for section_identifier in route_item.section_chain() {
                if let Some(section) = self.test.section(section_identifier) {
                    self.clamp_duration(&section.identifier.clone(), section.time_limits);
                }
            }
        }

        self.time_reference = Some(observation);
        self.close_exhausted_scopes(route_item.as_ref())
    }

    fn clamp_duration(&mut self, identifier: &str, limits: Option<TimeLimits>) {
        if let Some(max_time) = limits.and_then(|limits| limits.max_time) {
            if self.durations.peek(identifier) > max_time {
                self.durations.set(identifier, max_time);
            }
        }
    }

    fn close_exhausted_scopes(&mut self, route_item: Option<&RouteItem>) -> Result<(), TestSessionError> {
        let test_identifier = self.test.identifier.clone();
        if is_exhausted(self.test.time_limits, self.durations.peek(&test_identifier)) {
            return self.end_test_session();
        }
        let Some(route_item) = route_item else {
            return Ok(());
        };
        if let Some(test_part) = self.test.test_part(route_item.test_part_identifier()) {
            if is_exhausted(test_part.time_limits, self.durations.peek(&test_part.identifier)) {
                let test_part_identifier = test_part.identifier.clone();
                self.close_items_in_test_part(&test_part_identifier);
            }
        }
        for section_identifier in route_item.section_chain().to_vec() {
            if let Some(section) = self.test.section(&section_identifier) {
                if is_exhausted(section.time_limits, self.durations.peek(&section.identifier)) {
                    self.close_items_in_section(&section_identifier);
                }
            }
        }
        Ok(())
    }

    fn close_items_in_test_part(&mut self, test_part_identifier: &str) {
        let targets: Vec<(String, u32)> =
            self.route.items_by_test_part(test_part_identifier).map(|item| (item.item_ref().to_string(), item.occurrence())).collect();
        for (item_ref, occurrence) in targets {
            if let Some(session) = self.item_sessions.get_session_mut(&item_ref, occurrence) {
                session.end_item_session();
            }
        }
    }

    fn close_items_in_section(&mut self, section_identifier: &str) {
        let targets: Vec<(String, u32)> = self
            .route
            .items_by_assessment_section(section_identifier)
            .map(|item| (item.item_ref().to_string(), item.occurrence()))
            .collect();
        for (item_ref, occurrence) in targets {
            if let Some(session) = self.item_sessions.get_session_mut(&item_ref, occurrence) {
                session.end_item_session();
            }
        }
    }

    fn check_time_limits(
        &self,
        include_min_time: bool,
        route_item: &RouteItem,
        navigation_mode: NavigationMode,
    ) -> Result<(), TestSessionError> {
        if let Some(limits) = self.test.time_limits {
            self.check_scope_limits(&self.test.identifier, limits, include_min_time, navigation_mode, Scope::Test)?;
        }
        if let Some(test_part) = self.test.test_part(route_item.test_part_identifier()) {
            if let Some(limits) = test_part.time_limits {
                self.check_scope_limits(&test_part.identifier, limits, include_min_time, navigation_mode, Scope::TestPart)?;
            }
        }
        for section_identifier in route_item.section_chain() {
            if let Some(section) = self.test.section(section_identifier) {
                if let Some(limits) = section.time_limits {
                    self.check_scope_limits(&section.identifier, limits, include_min_time, navigation_mode, Scope::Section)?;
                }
            }
        }
        Ok(())
    }

    fn check_scope_limits(
        &self,
        identifier: &str,
        limits: TimeLimits,
        include_min_time: bool,
        navigation_mode: NavigationMode,
        scope: Scope,
    ) -> Result<(), TestSessionError> {
        let elapsed = self.durations.peek(identifier);
        if include_min_time && navigation_mode == NavigationMode::Linear {
            if let Some(min_time) = limits.min_time {
                if elapsed < min_time {
                    return Err(scope.underflow(identifier));
                }
            }
        }
        if let Some(max_time) = limits.max_time {
            if elapsed >= max_time && !limits.allow_late_submission {
                return Err(scope.overflow(identifier));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Variable addressing
    // ------------------------------------------------------------------

    /// Reads the value addressed by `identifier`. Returns `Ok(None)` both
    /// when the resolved variable is null and when the identifier addresses
    /// an ambiguous occurrence with no prior interaction to disambiguate.
    ///
    /// # Errors
    ///
    /// Returns [`TestSessionError::Identifier`] if `identifier` does not
    /// parse.
    pub fn get(&self, identifier: &str) -> Result<Option<QtiValue>, TestSessionError> {
        match self.resolve(identifier)? {
            Resolved::Null | Resolved::Unknown => Ok(None),
            Resolved::Target(ResolvedTarget::GlobalOutcome(name)) => {
                Ok(self.global_outcomes.get_variable(&name).and_then(|variable| variable.value.clone()))
            }
            Resolved::Target(ResolvedTarget::ItemVariable {
                item_ref,
                occurrence,
                name,
            }) => Ok(self
                .item_sessions
                .get_session(&item_ref, occurrence)
                .and_then(|session| session.variables().get_variable(&name))
                .and_then(|variable| variable.value.clone())),
            Resolved::Target(ResolvedTarget::DurationEntry(scope_identifier)) => {
                Ok(Some(QtiValue::Single(SingleValue::Duration(self.durations.peek(&scope_identifier)))))
            }
        }
    }

    /// Writes `value` to the variable addressed by `identifier`.
    ///
    /// # Errors
    ///
    /// Returns [`TestSessionError::OutOfScope`] if the identifier addresses
    /// an ambiguous occurrence or a read-only `duration` entry,
    /// [`TestSessionError::UnknownVariable`] if it addresses no declared
    /// variable, or [`TestSessionError::Identifier`] if it does not parse.
    pub fn set(&mut self, identifier: &str, value: QtiValue) -> Result<(), TestSessionError> {
        match self.resolve(identifier)? {
            Resolved::Null => Err(TestSessionError::OutOfScope {
                identifier: identifier.to_string(),
            }),
            Resolved::Unknown => Err(TestSessionError::UnknownVariable {
                identifier: identifier.to_string(),
            }),
            Resolved::Target(ResolvedTarget::GlobalOutcome(name)) => {
                if self.global_outcomes.set_variable(&name, value) {
                    Ok(())
                } else {
                    Err(TestSessionError::UnknownVariable {
                        identifier: identifier.to_string(),
                    })
                }
            }
            Resolved::Target(ResolvedTarget::ItemVariable {
                item_ref,
                occurrence,
                name,
            }) => {
                let session = self.item_sessions.get_session_mut(&item_ref, occurrence).ok_or_else(|| {
                    TestSessionError::UnknownVariable {
                        identifier: identifier.to_string(),
                    }
                })?;
                if session.variables_mut().set_variable(&name, value) {
                    Ok(())
                } else {
                    Err(TestSessionError::UnknownVariable {
                        identifier: identifier.to_string(),
                    })
                }
            }
            Resolved::Target(ResolvedTarget::DurationEntry(_)) => Err(TestSessionError::OutOfScope {
                identifier: identifier.to_string(),
            }),
        }
    }

    /// Clears a global outcome variable's value to null.
    ///
    /// # Errors
    ///
    /// Returns [`TestSessionError::OutOfScope`] if `identifier` carries an
    /// item-scoping prefix, or [`TestSessionError::UnknownVariable`] if it
    /// addresses no declared global outcome.
    pub fn unset(&mut self, identifier: &str) -> Result<(), TestSessionError> {
        let parsed = VariableIdentifier::parse(identifier)?;
        if parsed.has_prefix() {
            return Err(TestSessionError::OutOfScope {
                identifier: identifier.to_string(),
            });
        }
        if self.global_outcomes.unset_variable(parsed.name()) {
            Ok(())
        } else {
            Err(TestSessionError::UnknownVariable {
                identifier: identifier.to_string(),
            })
        }
    }

    fn resolve(&self, raw: &str) -> Result<Resolved, TestSessionError> {
        let parsed = VariableIdentifier::parse(raw)?;
        if !parsed.has_prefix() {
            return Ok(if parsed.name() == "duration" {
                Resolved::Target(ResolvedTarget::DurationEntry(self.test.identifier.clone()))
            } else {
                Resolved::Target(ResolvedTarget::GlobalOutcome(parsed.name().to_string()))
            });
        }
        let prefix = parsed.prefix().unwrap_or_default().to_string();
        if self.test.item_ref(&prefix).is_some() {
            let occurrence = match parsed.sequence_number() {
                Some(sequence) => sequence.saturating_sub(1),
                None => match self.last_occurrence_update.get(&prefix) {
                    Some(&occurrence) => occurrence,
                    None => {
                        if self.item_submission_mode(&prefix) == Some(SubmissionMode::Individual) {
                            return Ok(Resolved::Null);
                        }
                        0
                    }
                },
            };
            return Ok(Resolved::Target(ResolvedTarget::ItemVariable {
                item_ref: prefix,
                occurrence,
                name: parsed.name().to_string(),
            }));
        }
        if parsed.name() == "duration" && (self.test.test_part(&prefix).is_some() || self.test.section(&prefix).is_some()) {
            return Ok(Resolved::Target(ResolvedTarget::DurationEntry(prefix)));
        }
        Ok(Resolved::Unknown)
    }

    fn item_submission_mode(&self, item_ref: &str) -> Option<SubmissionMode> {
        self.route
            .items_by_assessment_item_ref(item_ref)
            .next()
            .and_then(|route_item| self.test.test_part(route_item.test_part_identifier()))
            .map(|test_part| test_part.submission_mode)
    }

    // ------------------------------------------------------------------
    // Navigation internals (§4.8.1, §4.8.2)
    // ------------------------------------------------------------------

    fn next_route_item(&mut self, initial_ignore_branching: bool, ignore_preconditions: bool) -> Result<(), TestSessionError> {
        if self.route.is_last_of_test_part() && self.current_submission_mode() == Some(SubmissionMode::Simultaneous) {
            self.deferred_response_submission()?;
        }
        let mut ignore_branching = initial_ignore_branching;
        loop {
            let branched = if ignore_branching { false } else { self.try_branch()? };
            if !branched {
                if self.route.is_exhausted() {
                    break;
                }
                self.route.next()?;
            }
            if self.route.is_exhausted() {
                break;
            }
            if ignore_preconditions || self.preconditions_pass()? {
                break;
            }
            ignore_branching = true;
        }
        if self.route.is_exhausted() {
            if self.state == TestSessionState::Interacting {
                self.end_test_session()?;
            }
        } else {
            self.select_eligible_items()?;
        }
        Ok(())
    }

    fn try_branch(&mut self) -> Result<bool, TestSessionError> {
        let Some(route_item) = self.route.current().cloned() else {
            return Ok(false);
        };
        for rule in route_item.effective_branch_rules() {
            if self.evaluate_condition(&rule.expression)? {
                match &rule.target {
                    BranchTarget::ExitTest => {
                        self.route.set_position(self.route.count())?;
                    }
                    BranchTarget::ExitTestPart => {
                        let test_part = route_item.test_part_identifier().to_string();
                        self.advance_while(|item| item.test_part_identifier() == test_part)?;
                    }
                    BranchTarget::ExitSection => {
                        if let Some(section) = route_item.innermost_section().map(str::to_string) {
                            self.advance_while(|item| item.innermost_section() == Some(section.as_str()))?;
                        }
                    }
                    BranchTarget::Identifier(target) => self.route.branch(target)?,
                }
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn advance_while(&mut self, matches: impl Fn(&RouteItem) -> bool) -> Result<(), TestSessionError> {
        while self.route.current().is_some_and(&matches) {
            self.route.next()?;
        }
        Ok(())
    }

    fn preconditions_pass(&self) -> Result<bool, TestSessionError> {
        let Some(route_item) = self.route.current() else {
            return Ok(true);
        };
        let navigation_mode = self.navigation_mode_of(route_item);
        let conditions: Vec<PreCondition> = if self.config.force_preconditions || navigation_mode == NavigationMode::Linear {
            route_item.effective_pre_conditions().to_vec()
        } else {
            self.test.test_part(route_item.test_part_identifier()).map(|test_part| test_part.pre_conditions.clone()).unwrap_or_default()
        };
        for condition in &conditions {
            if !self.evaluate_condition(&condition.expression)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn evaluate_condition(&self, expression: &crate::core::model::ExpressionRef) -> Result<bool, TestSessionError> {
        let context = self.evaluation_context();
        let result = self.expression_engine.evaluate(expression, &context);
        Ok(matches!(result, Some(QtiValue::Single(SingleValue::Boolean(true)))))
    }

    fn evaluation_context(&self) -> EvaluationContext<'_> {
        match self.route.current() {
            Some(route_item) => match self.item_sessions.get_session(route_item.item_ref(), route_item.occurrence()) {
                Some(session) => EvaluationContext::item_scoped(&self.global_outcomes, session.variables()),
                None => EvaluationContext::test_scoped(&self.global_outcomes),
            },
            None => EvaluationContext::test_scoped(&self.global_outcomes),
        }
    }

    fn any_feedback_fires(&self) -> bool {
        let is_test_end = self.route.is_last();
        let is_test_part_end = self.route.is_last_of_test_part();
        self.test.test_feedbacks.iter().any(|feedback| {
            let eligible = match feedback.access {
                TestFeedbackAccess::During => true,
                TestFeedbackAccess::AtEnd => is_test_end || is_test_part_end,
            };
            eligible && self.feedback_fires(feedback)
        })
    }

    fn feedback_fires(&self, feedback: &TestFeedbackRef) -> bool {
        let matches_value = self
            .global_outcomes
            .get_variable(&feedback.outcome_identifier)
            .and_then(|variable| variable.value.as_ref())
            .is_some_and(|value| value_contains_identifier(value, &feedback.identifier));
        match feedback.show_hide {
            crate::core::model::ShowHide::Show => matches_value,
            crate::core::model::ShowHide::Hide => !matches_value,
        }
    }

    fn select_eligible_items(&mut self) -> Result<(), TestSessionError> {
        if self.config.initialize_all_items {
            let items = self.route.items().to_vec();
            for item in &items {
                self.initialize_session_for(item)?;
            }
            return Ok(());
        }
        let Some(current) = self.route.current().cloned() else {
            return Ok(());
        };
        let first_test_part = self.test.test_parts.first().map(|part| part.identifier.clone());
        if !self.is_test_adaptive() && first_test_part.as_deref().is_some_and(|first| !self.visited_test_parts.contains(first)) {
            let items = self.route.items().to_vec();
            for item in &items {
                self.initialize_session_for(item)?;
            }
        } else if self.is_test_part_adaptive(current.test_part_identifier()) {
            self.initialize_session_for(&current)?;
        } else if !self.visited_test_parts.contains(current.test_part_identifier()) {
            let items: Vec<RouteItem> = self.route.items_by_test_part(current.test_part_identifier()).cloned().collect();
            for item in &items {
                self.initialize_session_for(item)?;
            }
        }
        Ok(())
    }

    fn initialize_session_for(&mut self, route_item: &RouteItem) -> Result<(), TestSessionError> {
        if self.item_sessions.has_session(route_item.item_ref(), route_item.occurrence()) {
            return Ok(());
        }
        let item_declaration = self.test.item_ref(route_item.item_ref()).ok_or_else(|| TestSessionError::LogicError {
            detail: format!("no declared assessmentItemRef for {}", route_item.item_ref()),
        })?;
        let mut variables = State::new();
        for declaration in item_declaration
            .template_declarations
            .iter()
            .chain(item_declaration.response_declarations.iter())
            .chain(item_declaration.outcome_declarations.iter())
        {
            variables.declare(Variable::from_declaration(
                declaration.identifier.clone(),
                declaration.kind,
                declaration.cardinality,
                declaration.base_type,
                declaration.default_value.clone(),
            ));
        }
        let navigation_mode = self.navigation_mode_of(route_item);
        let submission_mode = self.submission_mode_of(route_item);
        let mut session = DefaultSessionManager.create_assessment_item_session(
            route_item.item_ref(),
            route_item.occurrence(),
            variables,
            navigation_mode,
            submission_mode,
            route_item.effective_session_control(),
            route_item.effective_time_limits(),
        );
        if let Some(observation) = self.time_reference {
            session.set_time(observation);
        }
        session
            .begin_item_session()
            .map_err(|source| self.wrap_item_session_error(route_item.item_ref(), route_item.occurrence(), source))?;
        self.item_sessions.add_session(session);
        Ok(())
    }

    fn is_test_adaptive(&self) -> bool {
        self.test.test_parts.iter().any(|test_part| self.is_test_part_adaptive(&test_part.identifier))
    }

    fn is_test_part_adaptive(&self, test_part_identifier: &str) -> bool {
        if let Some(test_part) = self.test.test_part(test_part_identifier) {
            if !test_part.branch_rules.is_empty() || !test_part.pre_conditions.is_empty() {
                return true;
            }
        }
        self.route
            .items_by_test_part(test_part_identifier)
            .any(|item| !item.effective_branch_rules().is_empty() || !item.effective_pre_conditions().is_empty())
    }

    fn initialize_test_durations(&mut self) {
        self.durations.set(&self.test.identifier.clone(), 0.0);
        for test_part in &self.test.test_parts {
            self.durations.set(&test_part.identifier, 0.0);
        }
        for section in &self.test.sections {
            self.durations.set(&section.identifier, 0.0);
        }
    }

    fn interact_with_item_session(&mut self) {
        self.record_last_occurrence_update();
        if let Some(observation) = self.time_reference {
            if let Some(route_item) = self.route.current().cloned() {
                if let Some(session) = self.item_sessions.get_session_mut(route_item.item_ref(), route_item.occurrence()) {
                    session.set_time(observation);
                }
            }
        }
    }

    fn record_last_occurrence_update(&mut self) {
        if let Some(route_item) = self.route.current() {
            self.last_occurrence_update.insert(route_item.item_ref().to_string(), route_item.occurrence());
        }
    }

    fn mark_current_test_part_visited(&mut self) {
        if let Some(route_item) = self.route.current() {
            self.visited_test_parts.insert(route_item.test_part_identifier().to_string());
        }
    }

    fn deferred_response_submission(&mut self) -> Result<(), TestSessionError> {
        let pending: Vec<(String, u32, Vec<(String, QtiValue)>)> =
            self.pending.all().map(|entry| (entry.item_ref().to_string(), entry.occurrence(), entry.responses().to_vec())).collect();
        for (item_ref, occurrence, responses) in pending {
            let response_processing = self.test.item_ref(&item_ref).and_then(|decl| decl.response_processing.clone());
            let engine = &self.expression_engine;
            let run = response_processing.map(|expression| {
                move |variables: &mut State| -> Result<crate::item::CompletionStatus, ItemSessionError> {
                    engine
                        .run_response_processing(&expression, variables)
                        .map_err(|detail| ItemSessionError::ResponseProcessingFailed {
                            detail,
                        })
                }
            });
            let item_sessions = &mut self.item_sessions;
            let session = item_sessions.get_session_mut(&item_ref, occurrence).ok_or_else(|| TestSessionError::LogicError {
                detail: format!("deferredResponseSubmission: no item session for {item_ref}.{occurrence}"),
            })?;
            let result = session.apply_deferred_response_processing(responses, run);
            result.map_err(|source| self.wrap_item_session_error(&item_ref, occurrence, source))?;
        }
        self.pending.clear();
        self.run_outcome_processing()
    }

    fn run_outcome_processing(&mut self) -> Result<(), TestSessionError> {
        self.global_outcomes.reset_outcome_variables();
        let Some(expression) = self.test.outcome_processing.clone() else {
            return Ok(());
        };
        self.expression_engine
            .run_outcome_processing(&expression, &mut self.global_outcomes, &self.item_sessions)
            .map_err(|detail| TestSessionError::OutcomeProcessingError {
                detail,
            })
    }

    fn wrap_item_session_error(&self, item_ref: &str, occurrence: u32, source: ItemSessionError) -> TestSessionError {
        match source {
            ItemSessionError::DurationOverflow => TestSessionError::ItemDurationOverflow {
                item_ref: item_ref.to_string(),
                occurrence,
                source: Box::new(source),
            },
            ItemSessionError::DurationUnderflow => TestSessionError::ItemDurationUnderflow {
                item_ref: item_ref.to_string(),
                occurrence,
                source: Box::new(source),
            },
            ItemSessionError::ResponseProcessingFailed {
                detail,
            } => TestSessionError::ResponseProcessingError {
                detail,
            },
            other => TestSessionError::ItemSession {
                item_ref: item_ref.to_string(),
                occurrence,
                source: other,
            },
        }
    }

    fn navigation_mode_of(&self, route_item: &RouteItem) -> NavigationMode {
        self.test.test_part(route_item.test_part_identifier()).map_or(NavigationMode::Linear, |test_part| test_part.navigation_mode)
    }

    fn submission_mode_of(&self, route_item: &RouteItem) -> SubmissionMode {
        self.test.test_part(route_item.test_part_identifier()).map_or(SubmissionMode::Individual, |test_part| test_part.submission_mode)
    }

    fn current_submission_mode(&self) -> Option<SubmissionMode> {
        self.route.current().map(|route_item| self.submission_mode_of(route_item))
    }

    fn require_state(&self, allowed: &[TestSessionState]) -> Result<(), TestSessionError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(TestSessionError::StateViolation {
                expected: TestSessionState::describe(allowed),
                actual: self.state.to_string(),
            })
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Scope {
    Test,
    TestPart,
    Section,
}

impl Scope {
    fn overflow(self, identifier: &str) -> TestSessionError {
        match self {
            Self::Test => TestSessionError::TestDurationOverflow {
                identifier: identifier.to_string(),
            },
            Self::TestPart => TestSessionError::TestPartDurationOverflow {
                identifier: identifier.to_string(),
            },
            Self::Section => TestSessionError::AssessmentSectionDurationOverflow {
                identifier: identifier.to_string(),
            },
        }
    }

    fn underflow(self, identifier: &str) -> TestSessionError {
        match self {
            Self::Test => TestSessionError::TestDurationUnderflow {
                identifier: identifier.to_string(),
            },
            Self::TestPart => TestSessionError::TestPartDurationUnderflow {
                identifier: identifier.to_string(),
            },
            Self::Section => TestSessionError::AssessmentSectionDurationUnderflow {
                identifier: identifier.to_string(),
            },
        }
    }
}

fn is_exhausted(limits: Option<TimeLimits>, elapsed: f64) -> bool {
    limits.and_then(|limits| limits.max_time).is_some_and(|max_time| elapsed >= max_time)
}

fn value_contains_identifier(value: &QtiValue, identifier: &str) -> bool {
    match value {
        QtiValue::Single(SingleValue::Identifier(candidate)) => candidate == identifier,
        QtiValue::Multiple(values) | QtiValue::Ordered(values) => {
            values.iter().any(|value| matches!(value, SingleValue::Identifier(candidate) if candidate == identifier))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::AssessmentItemRefDecl;
    use crate::core::model::BaseType;
    use crate::core::model::BranchRule;
    use crate::core::model::Cardinality;
    use crate::core::model::ExpressionRef;
    use crate::core::model::ItemSessionControl;
    use crate::core::model::TestPartDecl;
    use crate::core::model::VariableDeclaration;
    use crate::item::CompletionStatus;

    // ------------------------------------------------------------------
    // Stub expression engine: interprets a small sentinel vocabulary
    // instead of a real QTI expression language, which lives outside this
    // crate's scope (§1, C8).
    // ------------------------------------------------------------------

    struct StubEngine;

    impl ExpressionEngine for StubEngine {
        fn evaluate(&self, expression: &ExpressionRef, context: &EvaluationContext<'_>) -> Option<QtiValue> {
            match expression.0.as_str() {
                "true" => Some(QtiValue::Single(SingleValue::Boolean(true))),
                "false" => Some(QtiValue::Single(SingleValue::Boolean(false))),
                "response_is_correct" => {
                    let item = context.current_item?;
                    let is_correct = item
                        .get_variable("RESPONSE")
                        .and_then(|variable| variable.value.as_ref())
                        .is_some_and(|value| matches!(value, QtiValue::Single(SingleValue::Identifier(id)) if id == "CORRECT"));
                    Some(QtiValue::Single(SingleValue::Boolean(is_correct)))
                }
                other => panic!("unexpected test expression {other}"),
            }
        }

        fn run_response_processing(
            &self,
            expression: &ExpressionRef,
            item_variables: &mut State,
        ) -> Result<CompletionStatus, String> {
            assert_eq!(expression.0, "score_response");
            let correct = item_variables
                .get_variable("RESPONSE")
                .and_then(|variable| variable.value.as_ref())
                .is_some_and(|value| matches!(value, QtiValue::Single(SingleValue::Identifier(id)) if id == "CORRECT"));
            let score = if correct { 1 } else { 0 };
            item_variables.set_variable("SCORE", QtiValue::Single(SingleValue::Integer(score)));
            Ok(CompletionStatus::Completed)
        }

        fn run_outcome_processing(
            &self,
            expression: &ExpressionRef,
            global_outcomes: &mut State,
            item_sessions: &ItemSessionStore,
        ) -> Result<(), String> {
            assert_eq!(expression.0, "sum_scores");
            let total: i32 = item_sessions
                .iter()
                .filter_map(|session| session.variables().get_variable("SCORE"))
                .filter_map(|variable| variable.value.as_ref())
                .filter_map(|value| match value {
                    QtiValue::Single(SingleValue::Integer(score)) => Some(*score),
                    _ => None,
                })
                .sum();
            global_outcomes.set_variable("SCORE", QtiValue::Single(SingleValue::Integer(total)));
            Ok(())
        }
    }

    // ------------------------------------------------------------------
    // Fixtures
    // ------------------------------------------------------------------

    fn response_declaration() -> VariableDeclaration {
        VariableDeclaration {
            identifier: "RESPONSE".to_string(),
            kind: VariableKind::Response,
            cardinality: Cardinality::Single,
            base_type: BaseType::Identifier,
            default_value: None,
        }
    }

    fn item_score_declaration() -> VariableDeclaration {
        VariableDeclaration {
            identifier: "SCORE".to_string(),
            kind: VariableKind::Outcome,
            cardinality: Cardinality::Single,
            base_type: BaseType::Integer,
            default_value: Some(QtiValue::Single(SingleValue::Integer(0))),
        }
    }

    fn scored_item(identifier: &str) -> AssessmentItemRefDecl {
        AssessmentItemRefDecl {
            identifier: identifier.to_string(),
            response_declarations: vec![response_declaration()],
            outcome_declarations: vec![item_score_declaration()],
            template_declarations: Vec::new(),
            response_processing: Some(ExpressionRef("score_response".to_string())),
        }
    }

    fn route_item(item_ref: &str, test_part: &str) -> RouteItem {
        RouteItem::new(
            item_ref.to_string(),
            0,
            test_part.to_string(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
            ItemSessionControl::default(),
            TimeLimits::default(),
        )
    }

    fn global_score_declaration() -> VariableDeclaration {
        VariableDeclaration {
            identifier: "SCORE".to_string(),
            kind: VariableKind::Outcome,
            cardinality: Cardinality::Single,
            base_type: BaseType::Integer,
            default_value: Some(QtiValue::Single(SingleValue::Integer(0))),
        }
    }

    fn two_item_linear_individual_test() -> Arc<AssessmentTest> {
        Arc::new(AssessmentTest {
            identifier: "T1".to_string(),
            outcome_declarations: vec![global_score_declaration()],
            test_parts: vec![TestPartDecl {
                identifier: "P1".to_string(),
                navigation_mode: NavigationMode::Linear,
                submission_mode: SubmissionMode::Individual,
                pre_conditions: Vec::new(),
                branch_rules: Vec::new(),
                item_session_control: None,
                time_limits: None,
            }],
            sections: Vec::new(),
            item_refs: vec![scored_item("Q1"), scored_item("Q2")],
            test_feedbacks: Vec::new(),
            time_limits: None,
            outcome_processing: Some(ExpressionRef("sum_scores".to_string())),
        })
    }

    fn two_item_nonlinear_simultaneous_test() -> Arc<AssessmentTest> {
        Arc::new(AssessmentTest {
            identifier: "T1".to_string(),
            outcome_declarations: vec![global_score_declaration()],
            test_parts: vec![TestPartDecl {
                identifier: "P1".to_string(),
                navigation_mode: NavigationMode::NonLinear,
                submission_mode: SubmissionMode::Simultaneous,
                pre_conditions: Vec::new(),
                branch_rules: Vec::new(),
                item_session_control: None,
                time_limits: None,
            }],
            sections: Vec::new(),
            item_refs: vec![scored_item("Q1"), scored_item("Q2")],
            test_feedbacks: Vec::new(),
            time_limits: None,
            outcome_processing: Some(ExpressionRef("sum_scores".to_string())),
        })
    }

    fn correct_response() -> Vec<(String, QtiValue)> {
        vec![("RESPONSE".to_string(), QtiValue::Single(SingleValue::Identifier("CORRECT".to_string())))]
    }

    fn incorrect_response() -> Vec<(String, QtiValue)> {
        vec![("RESPONSE".to_string(), QtiValue::Single(SingleValue::Identifier("WRONG".to_string())))]
    }

    // ------------------------------------------------------------------
    // Scenario 1 — linear, individual, two items, no timing (§8.1)
    // ------------------------------------------------------------------

    #[test]
    fn linear_individual_two_items_scores_and_closes() {
        let test = two_item_linear_individual_test();
        let route = Route::new(vec![route_item("Q1", "P1"), route_item("Q2", "P1")]);
        let mut driver = TestSessionDriver::new("s1".to_string(), test, route, StubEngine, EngineConfig::default());

        driver.begin_test_session().expect("begin test session");
        driver.begin_attempt(false).expect("begin attempt Q1");
        driver.end_attempt(correct_response(), false).expect("end attempt Q1");
        driver.move_next().expect("move to Q2");
        driver.begin_attempt(false).expect("begin attempt Q2");
        driver.end_attempt(incorrect_response(), false).expect("end attempt Q2");
        driver.move_next().expect("move past Q2");

        assert_eq!(driver.state(), TestSessionState::Closed);
        assert_eq!(
            driver.global_outcomes().get_variable("SCORE").and_then(|v| v.value.clone()),
            Some(QtiValue::Single(SingleValue::Integer(1)))
        );
        for session in driver.item_sessions().iter() {
            assert_eq!(session.state(), crate::item::ItemSessionState::Closed);
        }
    }

    // ------------------------------------------------------------------
    // Scenario 2 — nonlinear, simultaneous, two items (§8.2)
    // ------------------------------------------------------------------

    #[test]
    fn nonlinear_simultaneous_defers_processing_to_test_part_end() {
        let test = two_item_nonlinear_simultaneous_test();
        let route = Route::new(vec![route_item("Q1", "P1"), route_item("Q2", "P1")]);
        let mut driver = TestSessionDriver::new("s2".to_string(), test, route, StubEngine, EngineConfig::default());

        driver.begin_test_session().expect("begin test session");
        driver.begin_attempt(false).expect("begin attempt Q1");
        driver.end_attempt(correct_response(), false).expect("end attempt Q1");

        // Response processing must not have run yet: completion status still default.
        let q1 = driver.item_sessions().get_session("Q1", 0).expect("Q1 session");
        assert_eq!(q1.completion_status(), crate::item::CompletionStatus::NotAttempted);

        driver.move_next().expect("move to Q2");
        driver.begin_attempt(false).expect("begin attempt Q2");
        driver.end_attempt(correct_response(), false).expect("end attempt Q2");
        driver.move_next().expect("move past Q2, crossing test part end");

        assert_eq!(driver.state(), TestSessionState::Closed);
        assert_eq!(
            driver.global_outcomes().get_variable("SCORE").and_then(|v| v.value.clone()),
            Some(QtiValue::Single(SingleValue::Integer(2)))
        );
        assert!(driver.pending().is_empty());
    }

    // ------------------------------------------------------------------
    // Scenario 3 — branching (§8.3)
    // ------------------------------------------------------------------

    #[test]
    fn branch_rule_skips_to_target_on_true_condition() {
        let mut test = (*two_item_linear_individual_test()).clone();
        test.item_refs.push(scored_item("Q3"));
        let test = Arc::new(test);

        let branch_item = RouteItem::new(
            "Q1".to_string(),
            0,
            "P1".to_string(),
            Vec::new(),
            Vec::new(),
            vec![BranchRule {
                target: BranchTarget::Identifier("Q3".to_string()),
                expression: ExpressionRef("response_is_correct".to_string()),
            }],
            ItemSessionControl::default(),
            TimeLimits::default(),
        );
        let route = Route::new(vec![branch_item, route_item("Q2", "P1"), route_item("Q3", "P1")]);
        let mut driver = TestSessionDriver::new("s3".to_string(), test, route, StubEngine, EngineConfig::default());

        driver.begin_test_session().expect("begin test session");
        driver.begin_attempt(false).expect("begin attempt Q1");
        driver.end_attempt(correct_response(), false).expect("end attempt Q1");
        driver.move_next().expect("move, branching past Q2");

        let current = driver.route().current().expect("current route item");
        assert_eq!(current.item_ref(), "Q3");
    }

    // ------------------------------------------------------------------
    // Scenario 4 — precondition skip (§8.4)
    // ------------------------------------------------------------------

    #[test]
    fn failing_precondition_skips_item_without_a_session() {
        let mut test = (*two_item_linear_individual_test()).clone();
        test.item_refs.push(scored_item("Q3"));
        let test = Arc::new(test);

        let guarded_item = RouteItem::new(
            "Q2".to_string(),
            0,
            "P1".to_string(),
            Vec::new(),
            vec![PreCondition {
                expression: ExpressionRef("false".to_string()),
            }],
            Vec::new(),
            ItemSessionControl::default(),
            TimeLimits::default(),
        );
        let route = Route::new(vec![route_item("Q1", "P1"), guarded_item, route_item("Q3", "P1")]);
        let mut driver = TestSessionDriver::new("s4".to_string(), test, route, StubEngine, EngineConfig::default());

        driver.begin_test_session().expect("begin test session");
        driver.begin_attempt(false).expect("begin attempt Q1");
        driver.end_attempt(correct_response(), false).expect("end attempt Q1");
        driver.move_next().expect("move past guarded Q2");

        let current = driver.route().current().expect("current route item");
        assert_eq!(current.item_ref(), "Q3");
        assert!(!driver.item_sessions().has_session("Q2", 0));
    }

    // ------------------------------------------------------------------
    // Scenario 5 — time overflow (§8.5)
    // ------------------------------------------------------------------

    #[test]
    fn test_part_time_overflow_closes_its_items() {
        let mut test = (*two_item_linear_individual_test()).clone();
        test.test_parts[0].time_limits = Some(TimeLimits {
            min_time: None,
            max_time: Some(60.0),
            allow_late_submission: false,
        });
        let test = Arc::new(test);
        let route = Route::new(vec![route_item("Q1", "P1"), route_item("Q2", "P1")]);
        let mut driver = TestSessionDriver::new("s5".to_string(), test, route, StubEngine, EngineConfig::default());

        driver.begin_test_session().expect("begin test session");
        driver.set_time(Observation::from_unix_millis(0)).expect("t0");
        driver.begin_attempt(false).expect("begin attempt Q1");
        driver.set_time(Observation::from_unix_millis(61_000)).expect("t0 + 61s");

        for session in driver.item_sessions().iter() {
            assert_eq!(session.state(), crate::item::ItemSessionState::Closed);
        }
        let result = driver.end_attempt(correct_response(), false);
        assert!(matches!(result, Err(TestSessionError::TestPartDurationOverflow { .. })));
    }

    // ------------------------------------------------------------------
    // Scenario 6 — jump with path tracking (§8.6)
    // ------------------------------------------------------------------

    #[test]
    fn jump_with_path_tracking_pops_on_move_back() {
        let mut test = (*two_item_linear_individual_test()).clone();
        test.test_parts[0].navigation_mode = NavigationMode::NonLinear;
        test.item_refs.push(scored_item("Q3"));
        test.item_refs.push(scored_item("Q4"));
        let test = Arc::new(test);
        let route = Route::new(vec![
            route_item("Q1", "P1"),
            route_item("Q2", "P1"),
            route_item("Q3", "P1"),
            route_item("Q4", "P1"),
        ]);
        let config = EngineConfig {
            path_tracking: true,
            ..EngineConfig::default()
        };
        let mut driver = TestSessionDriver::new("s6".to_string(), test, route, StubEngine, config);

        driver.begin_test_session().expect("begin test session");
        assert_eq!(driver.route().position(), 0);
        driver.jump_to(3).expect("jump to 3");
        driver.jump_to(1).expect("jump to 1");
        assert_eq!(driver.path(), &[0, 3]);

        driver.move_back().expect("move back onto 3");
        assert_eq!(driver.route().position(), 3);
        driver.move_back().expect("move back onto 0");
        assert_eq!(driver.route().position(), 0);
        assert!(driver.path().is_empty());
    }

    // ------------------------------------------------------------------
    // Invariants (§8)
    // ------------------------------------------------------------------

    #[test]
    fn ending_test_session_twice_is_a_state_violation() {
        let test = two_item_linear_individual_test();
        let route = Route::new(vec![route_item("Q1", "P1"), route_item("Q2", "P1")]);
        let mut driver = TestSessionDriver::new("s7".to_string(), test, route, StubEngine, EngineConfig::default());
        driver.begin_test_session().expect("begin test session");
        driver.end_test_session().expect("first end");
        assert!(matches!(driver.end_test_session(), Err(TestSessionError::StateViolation { .. })));
    }

    #[test]
    fn jump_in_linear_mode_without_always_allow_jumps_is_rejected() {
        let test = two_item_linear_individual_test();
        let route = Route::new(vec![route_item("Q1", "P1"), route_item("Q2", "P1")]);
        let mut driver = TestSessionDriver::new("s8".to_string(), test, route, StubEngine, EngineConfig::default());
        driver.begin_test_session().expect("begin test session");
        assert!(matches!(driver.jump_to(1), Err(TestSessionError::NavigationModeViolation)));
    }

    #[test]
    fn jump_out_of_range_is_a_forbidden_jump_not_a_route_error() {
        let mut test = (*two_item_linear_individual_test()).clone();
        test.test_parts[0].navigation_mode = NavigationMode::NonLinear;
        let test = Arc::new(test);
        let route = Route::new(vec![route_item("Q1", "P1"), route_item("Q2", "P1")]);
        let mut driver = TestSessionDriver::new("s8b".to_string(), test, route, StubEngine, EngineConfig::default());
        driver.begin_test_session().expect("begin test session");
        assert!(matches!(driver.jump_to(5), Err(TestSessionError::ForbiddenJump { position: 5 })));
        assert_eq!(driver.route().position(), 0);
    }

    #[test]
    fn suspend_is_idempotent() {
        let test = two_item_linear_individual_test();
        let route = Route::new(vec![route_item("Q1", "P1"), route_item("Q2", "P1")]);
        let mut driver = TestSessionDriver::new("s9".to_string(), test, route, StubEngine, EngineConfig::default());
        driver.begin_test_session().expect("begin test session");
        driver.begin_attempt(false).expect("begin attempt");
        driver.suspend();
        driver.suspend();
        let session = driver.item_sessions().get_session("Q1", 0).expect("Q1 session");
        assert_eq!(session.state(), crate::item::ItemSessionState::Suspended);
    }

    #[test]
    fn duration_accrual_is_additive_across_chunking() {
        let test = two_item_linear_individual_test();
        let route = Route::new(vec![route_item("Q1", "P1"), route_item("Q2", "P1")]);
        let mut driver = TestSessionDriver::new("s10".to_string(), test, route, StubEngine, EngineConfig::default());
        driver.begin_test_session().expect("begin test session");
        driver.set_time(Observation::from_unix_millis(0)).expect("t0");
        driver.set_time(Observation::from_unix_millis(1_500)).expect("t1");
        driver.set_time(Observation::from_unix_millis(4_000)).expect("t2");
        assert!((driver.durations().peek("T1") - 4.0).abs() < f64::EPSILON);
    }
}
