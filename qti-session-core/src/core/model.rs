// qti-session-core/src/core/model.rs
// ============================================================================
// Module: Concrete Assessment Model
// Description: In-memory, already-parsed AssessmentTest tree pieces that the
//              Route, Test Session Driver, and codec Seeker need to read.
// Purpose: Stand in for the (out-of-scope) XML reader with plain data the
//          driver can walk without inspecting expression internals.
// Dependencies: crate::core::variable
// ============================================================================

//! ## Overview
//! XML parsing and marshalling of a QTI document are out of scope; this
//! module gives the rest of the crate something concrete to hold instead.
//! Every type here is plain data built by a caller or test fixture — none of
//! it performs parsing or schema validation beyond the structural invariants
//! already required of C1–C10.

use crate::core::variable::BaseType;
use crate::core::variable::Cardinality;
use crate::core::variable::QtiValue;
use crate::core::variable::VariableKind;

// ============================================================================
// SECTION: Enumerations (bit-exact for the codec)
// ============================================================================

/// Test part navigation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavigationMode {
    /// Forward-only; no jumps.
    Linear = 0,
    /// Arbitrary jumps within the current test part.
    NonLinear = 1,
}

/// Test part submission mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmissionMode {
    /// Response processing runs after each item.
    Individual = 0,
    /// Response processing is batched at test part end.
    Simultaneous = 1,
}

/// When a test feedback is eligible to be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestFeedbackAccess {
    /// Eligible at any point during the test part.
    During = 0,
    /// Eligible only at test or test part end.
    AtEnd = 1,
}

/// Whether a feedback fires on a match or on an absence of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShowHide {
    /// Fires when the bound outcome matches the feedback identifier.
    Show = 0,
    /// Fires when the bound outcome does not match.
    Hide = 1,
}

// ============================================================================
// SECTION: Declarations
// ============================================================================

/// A declared variable, as it appears on an item or the test itself.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDeclaration {
    /// Bare identifier (no scope prefix).
    pub identifier: String,
    /// Declaration family (outcome/response/template).
    pub kind: VariableKind,
    /// Declared cardinality.
    pub cardinality: Cardinality,
    /// Declared base type.
    pub base_type: BaseType,
    /// Declared default value, if any.
    pub default_value: Option<QtiValue>,
}

// ============================================================================
// SECTION: Expressions, Branch Rules, Preconditions
// ============================================================================

/// An opaque handle to an expression body. The core passes this unexamined
/// to the external [`ExpressionEngine`](crate::interfaces::ExpressionEngine);
/// it never inspects the expression's internal structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExpressionRef(pub String);

/// The destination of a branch rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BranchTarget {
    /// Branch to the first RouteItem whose item/section/testPart identifier
    /// matches.
    Identifier(String),
    /// End the test immediately.
    ExitTest,
    /// End the current test part.
    ExitTestPart,
    /// End the current section.
    ExitSection,
}

/// A conditional branch attached to a RouteItem, section, or test part.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BranchRule {
    /// Destination if the expression evaluates true.
    pub target: BranchTarget,
    /// The guarding expression, evaluated by the `ExpressionEngine`.
    pub expression: ExpressionRef,
}

/// A boolean guard that must pass before a RouteItem is visited.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreCondition {
    /// The guarding expression, evaluated by the `ExpressionEngine`.
    pub expression: ExpressionRef,
}

// ============================================================================
// SECTION: Session Control & Time Limits
// ============================================================================

/// Per-item/section/testPart session control, flattened onto each
/// RouteItem's effective control by walking the containing chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemSessionControl {
    /// Maximum attempts allowed; `None` means unlimited.
    pub max_attempts: Option<u32>,
    /// Whether feedback may be shown after an attempt.
    pub show_feedback: bool,
    /// Whether review of a closed item is allowed.
    pub allow_review: bool,
    /// Whether candidate comments are allowed.
    pub allow_comment: bool,
    /// Whether the candidate may leave the item unattempted.
    pub allow_skipping: bool,
    /// Whether responses are validated before acceptance.
    pub validate_responses: bool,
}

impl Default for ItemSessionControl {
    fn default() -> Self {
        Self {
            max_attempts: Some(1),
            show_feedback: false,
            allow_review: true,
            allow_comment: false,
            allow_skipping: true,
            validate_responses: false,
        }
    }
}

/// Time limits in force at one scope (test, testPart, section, or item).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimeLimits {
    /// Minimum elapsed seconds required before ending an attempt, checked
    /// only in linear navigation.
    pub min_time: Option<f64>,
    /// Maximum elapsed seconds permitted before this scope is closed.
    pub max_time: Option<f64>,
    /// Whether a late submission may proceed past `max_time`.
    pub allow_late_submission: bool,
}

impl TimeLimits {
    /// Returns whether any bound is actually in force.
    #[must_use]
    pub const fn is_in_force(&self) -> bool {
        self.min_time.is_some() || self.max_time.is_some()
    }
}

// ============================================================================
// SECTION: Test Feedback
// ============================================================================

/// A conditional feedback attached to the assessment test or a test part.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestFeedbackRef {
    /// Feedback identifier, matched against the bound outcome's value.
    pub identifier: String,
    /// When this feedback is eligible to fire.
    pub access: TestFeedbackAccess,
    /// Match/no-match firing polarity.
    pub show_hide: ShowHide,
    /// The outcome variable identifier this feedback is bound to.
    pub outcome_identifier: String,
}

// ============================================================================
// SECTION: Structural Tree
// ============================================================================

/// One reusable item reference; each reference can yield multiple
/// occurrences when selection-with-replacement is used upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentItemRefDecl {
    /// Item reference identifier.
    pub identifier: String,
    /// Declared response variables for this item.
    pub response_declarations: Vec<VariableDeclaration>,
    /// Declared outcome variables for this item.
    pub outcome_declarations: Vec<VariableDeclaration>,
    /// Declared template variables for this item.
    pub template_declarations: Vec<VariableDeclaration>,
    /// This item's response processing rule body, opaque to the core.
    pub response_processing: Option<ExpressionRef>,
}

/// A nested grouping within a test part with its own preconditions, branch
/// rules, session control, and time limits.
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentSectionDecl {
    /// Section identifier.
    pub identifier: String,
    /// Preconditions guarding entry into this section.
    pub pre_conditions: Vec<PreCondition>,
    /// Branch rules attached to this section.
    pub branch_rules: Vec<BranchRule>,
    /// Session control declared at this section, if any.
    pub item_session_control: Option<ItemSessionControl>,
    /// Time limits declared at this section, if any.
    pub time_limits: Option<TimeLimits>,
}

/// A top-level group sharing one navigation mode and one submission mode.
#[derive(Debug, Clone, PartialEq)]
pub struct TestPartDecl {
    /// Test part identifier.
    pub identifier: String,
    /// Navigation mode for every RouteItem in this part.
    pub navigation_mode: NavigationMode,
    /// Submission mode for every RouteItem in this part.
    pub submission_mode: SubmissionMode,
    /// Preconditions guarding entry into this test part.
    pub pre_conditions: Vec<PreCondition>,
    /// Branch rules attached to this test part.
    pub branch_rules: Vec<BranchRule>,
    /// Session control declared at this test part, if any.
    pub item_session_control: Option<ItemSessionControl>,
    /// Time limits declared at this test part, if any.
    pub time_limits: Option<TimeLimits>,
}

/// The top-level QTI document: parts, sections, item references, and
/// test-scoped declarations/rules. Shared read-only across all sessions
/// built against it.
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentTest {
    /// Test identifier.
    pub identifier: String,
    /// Test-scoped (global) outcome declarations.
    pub outcome_declarations: Vec<VariableDeclaration>,
    /// Test parts in document order.
    pub test_parts: Vec<TestPartDecl>,
    /// All sections across all test parts, in document order. A RouteItem's
    /// section chain is a list of indices into this vector, outermost first.
    pub sections: Vec<AssessmentSectionDecl>,
    /// All item references across all test parts, in document order.
    pub item_refs: Vec<AssessmentItemRefDecl>,
    /// Test-level and test-part-level feedbacks.
    pub test_feedbacks: Vec<TestFeedbackRef>,
    /// Test-level time limits, if any.
    pub time_limits: Option<TimeLimits>,
    /// The test's own outcome processing rule body, opaque to the core.
    pub outcome_processing: Option<ExpressionRef>,
}

impl AssessmentTest {
    /// Looks up a test part by identifier.
    #[must_use]
    pub fn test_part(&self, identifier: &str) -> Option<&TestPartDecl> {
        self.test_parts.iter().find(|part| part.identifier == identifier)
    }

    /// Looks up a section by identifier.
    #[must_use]
    pub fn section(&self, identifier: &str) -> Option<&AssessmentSectionDecl> {
        self.sections.iter().find(|section| section.identifier == identifier)
    }

    /// Looks up an item reference by identifier.
    #[must_use]
    pub fn item_ref(&self, identifier: &str) -> Option<&AssessmentItemRefDecl> {
        self.item_refs.iter().find(|item_ref| item_ref.identifier == identifier)
    }
}
