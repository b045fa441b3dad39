// qti-session-cli/src/fixture.rs
// ============================================================================
// Module: Fixture Loading
// Description: Serde-friendly mirrors of qti-session-core's concrete
//              assessment model and Route, deserialized from a single JSON
//              document and converted into the core's own domain types.
// Purpose: Let the CLI exercise a session against fixture data without the
//          core itself depending on serde for types that production callers
//          build directly (XML parsing is out of scope for this crate).
// Dependencies: serde, serde_json, qti-session-core
// ============================================================================

//! ## Overview
//! A fixture file bundles an [`AssessmentTestDef`] with an already-flattened
//! `route` so the CLI has everything it needs to build a
//! [`qti_session_core::driver::TestSessionDriver`] without a real XML reader.

use qti_session_core::core::model::AssessmentItemRefDecl;
use qti_session_core::core::model::AssessmentSectionDecl;
use qti_session_core::core::model::AssessmentTest;
use qti_session_core::core::model::BranchRule;
use qti_session_core::core::model::BranchTarget;
use qti_session_core::core::model::ExpressionRef;
use qti_session_core::core::model::ItemSessionControl;
use qti_session_core::core::model::NavigationMode;
use qti_session_core::core::model::PreCondition;
use qti_session_core::core::model::ShowHide;
use qti_session_core::core::model::SubmissionMode;
use qti_session_core::core::model::TestFeedbackAccess;
use qti_session_core::core::model::TestFeedbackRef;
use qti_session_core::core::model::TestPartDecl;
use qti_session_core::core::model::TimeLimits;
use qti_session_core::core::model::VariableDeclaration;
use qti_session_core::core::variable::BaseType;
use qti_session_core::core::variable::Cardinality;
use qti_session_core::core::variable::QtiValue;
use qti_session_core::core::variable::VariableKind;
use qti_session_core::route::Route;
use qti_session_core::route::RouteItem;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised loading or converting a fixture document.
#[derive(Debug, Error)]
pub enum FixtureError {
    /// The fixture file could not be read from disk.
    #[error("failed to read fixture {path}: {source}")]
    Read {
        /// The path that could not be read.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The fixture file was not valid JSON, or did not match the expected
    /// shape.
    #[error("failed to parse fixture {path}: {source}")]
    Parse {
        /// The path that failed to parse.
        path: String,
        /// Underlying parse failure.
        #[source]
        source: serde_json::Error,
    },
    /// A route entry referenced a test part identifier absent from the
    /// fixture's own test parts.
    #[error("route entry references unknown test part {test_part}")]
    UnknownTestPart {
        /// The dangling test part identifier.
        test_part: String,
    },
}

// ============================================================================
// SECTION: Declaration DTOs
// ============================================================================

/// Mirrors [`VariableDeclaration`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableDeclarationDef {
    /// Bare identifier (no scope prefix).
    identifier: String,
    /// Declaration family (outcome/response/template).
    kind: VariableKindDef,
    /// Declared cardinality.
    cardinality: Cardinality,
    /// Declared base type.
    base_type: BaseType,
    /// Declared default value, if any.
    #[serde(default)]
    default_value: Option<QtiValue>,
}

/// Mirrors [`VariableKind`] (the core type has no `Deserialize` of its own
/// since production callers construct it directly; the CLI needs one for
/// fixture files).
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
enum VariableKindDef {
    /// A test- or item-scoped outcome variable.
    Outcome,
    /// A candidate-facing response variable.
    Response,
    /// A pre-attempt template variable.
    Template,
}

impl From<VariableKindDef> for VariableKind {
    fn from(value: VariableKindDef) -> Self {
        match value {
            VariableKindDef::Outcome => Self::Outcome,
            VariableKindDef::Response => Self::Response,
            VariableKindDef::Template => Self::Template,
        }
    }
}

impl From<VariableDeclarationDef> for VariableDeclaration {
    fn from(value: VariableDeclarationDef) -> Self {
        Self {
            identifier: value.identifier,
            kind: value.kind.into(),
            cardinality: value.cardinality,
            base_type: value.base_type,
            default_value: value.default_value,
        }
    }
}

/// Mirrors [`PreCondition`].
#[derive(Debug, Clone, Deserialize)]
pub struct PreConditionDef {
    /// The guarding expression body, handed unexamined to an
    /// `ExpressionEngine`.
    expression: String,
}

impl From<PreConditionDef> for PreCondition {
    fn from(value: PreConditionDef) -> Self {
        Self {
            expression: ExpressionRef(value.expression),
        }
    }
}

/// Mirrors [`BranchTarget`].
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum BranchTargetDef {
    /// Branch to the first RouteItem whose item/section/testPart identifier
    /// matches.
    Identifier {
        /// The destination item/section/testPart identifier.
        identifier: String,
    },
    /// End the test immediately.
    ExitTest,
    /// End the current test part.
    ExitTestPart,
    /// End the current section.
    ExitSection,
}

impl From<BranchTargetDef> for BranchTarget {
    fn from(value: BranchTargetDef) -> Self {
        match value {
            BranchTargetDef::Identifier {
                identifier,
            } => Self::Identifier(identifier),
            BranchTargetDef::ExitTest => Self::ExitTest,
            BranchTargetDef::ExitTestPart => Self::ExitTestPart,
            BranchTargetDef::ExitSection => Self::ExitSection,
        }
    }
}

/// Mirrors [`BranchRule`].
#[derive(Debug, Clone, Deserialize)]
pub struct BranchRuleDef {
    /// Destination if the expression evaluates true.
    target: BranchTargetDef,
    /// The guarding expression body.
    expression: String,
}

impl From<BranchRuleDef> for BranchRule {
    fn from(value: BranchRuleDef) -> Self {
        Self {
            target: value.target.into(),
            expression: ExpressionRef(value.expression),
        }
    }
}

/// Mirrors [`ItemSessionControl`]; every field defaults to the QTI default
/// so a fixture can omit the whole block.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ItemSessionControlDef {
    /// Maximum attempts allowed; `None` means unlimited.
    max_attempts: Option<u32>,
    /// Whether feedback may be shown after an attempt.
    show_feedback: bool,
    /// Whether review of a closed item is allowed.
    allow_review: bool,
    /// Whether candidate comments are allowed.
    allow_comment: bool,
    /// Whether the candidate may leave the item unattempted.
    allow_skipping: bool,
    /// Whether responses are validated before acceptance.
    validate_responses: bool,
}

impl Default for ItemSessionControlDef {
    fn default() -> Self {
        ItemSessionControl::default().into()
    }
}

impl From<ItemSessionControlDef> for ItemSessionControl {
    fn from(value: ItemSessionControlDef) -> Self {
        Self {
            max_attempts: value.max_attempts,
            show_feedback: value.show_feedback,
            allow_review: value.allow_review,
            allow_comment: value.allow_comment,
            allow_skipping: value.allow_skipping,
            validate_responses: value.validate_responses,
        }
    }
}

impl From<ItemSessionControl> for ItemSessionControlDef {
    fn from(value: ItemSessionControl) -> Self {
        Self {
            max_attempts: value.max_attempts,
            show_feedback: value.show_feedback,
            allow_review: value.allow_review,
            allow_comment: value.allow_comment,
            allow_skipping: value.allow_skipping,
            validate_responses: value.validate_responses,
        }
    }
}

/// Mirrors [`TimeLimits`].
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimeLimitsDef {
    /// Minimum elapsed seconds required before ending an attempt.
    min_time: Option<f64>,
    /// Maximum elapsed seconds permitted before this scope is closed.
    max_time: Option<f64>,
    /// Whether a late submission may proceed past `max_time`.
    allow_late_submission: bool,
}

impl From<TimeLimitsDef> for TimeLimits {
    fn from(value: TimeLimitsDef) -> Self {
        Self {
            min_time: value.min_time,
            max_time: value.max_time,
            allow_late_submission: value.allow_late_submission,
        }
    }
}

/// Mirrors [`TestFeedbackAccess`].
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
enum TestFeedbackAccessDef {
    /// Eligible at any point during the test part.
    During,
    /// Eligible only at test or test part end.
    AtEnd,
}

impl From<TestFeedbackAccessDef> for TestFeedbackAccess {
    fn from(value: TestFeedbackAccessDef) -> Self {
        match value {
            TestFeedbackAccessDef::During => Self::During,
            TestFeedbackAccessDef::AtEnd => Self::AtEnd,
        }
    }
}

/// Mirrors [`ShowHide`].
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
enum ShowHideDef {
    /// Fires when the bound outcome matches the feedback identifier.
    Show,
    /// Fires when the bound outcome does not match.
    Hide,
}

impl From<ShowHideDef> for ShowHide {
    fn from(value: ShowHideDef) -> Self {
        match value {
            ShowHideDef::Show => Self::Show,
            ShowHideDef::Hide => Self::Hide,
        }
    }
}

/// Mirrors [`TestFeedbackRef`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestFeedbackRefDef {
    /// Feedback identifier, matched against the bound outcome's value.
    identifier: String,
    /// When this feedback is eligible to fire.
    access: TestFeedbackAccessDef,
    /// Match/no-match firing polarity.
    show_hide: ShowHideDef,
    /// The outcome variable identifier this feedback is bound to.
    outcome_identifier: String,
}

impl From<TestFeedbackRefDef> for TestFeedbackRef {
    fn from(value: TestFeedbackRefDef) -> Self {
        Self {
            identifier: value.identifier,
            access: value.access.into(),
            show_hide: value.show_hide.into(),
            outcome_identifier: value.outcome_identifier,
        }
    }
}

/// Mirrors [`AssessmentItemRefDecl`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentItemRefDef {
    /// Item reference identifier.
    identifier: String,
    /// Declared response variables for this item.
    #[serde(default)]
    response_declarations: Vec<VariableDeclarationDef>,
    /// Declared outcome variables for this item.
    #[serde(default)]
    outcome_declarations: Vec<VariableDeclarationDef>,
    /// Declared template variables for this item.
    #[serde(default)]
    template_declarations: Vec<VariableDeclarationDef>,
    /// This item's response processing rule body, if any.
    #[serde(default)]
    response_processing: Option<String>,
}

impl From<AssessmentItemRefDef> for AssessmentItemRefDecl {
    fn from(value: AssessmentItemRefDef) -> Self {
        Self {
            identifier: value.identifier,
            response_declarations: value.response_declarations.into_iter().map(Into::into).collect(),
            outcome_declarations: value.outcome_declarations.into_iter().map(Into::into).collect(),
            template_declarations: value.template_declarations.into_iter().map(Into::into).collect(),
            response_processing: value.response_processing.map(ExpressionRef),
        }
    }
}

/// Mirrors [`AssessmentSectionDecl`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentSectionDef {
    /// Section identifier.
    identifier: String,
    /// Preconditions guarding entry into this section.
    #[serde(default)]
    pre_conditions: Vec<PreConditionDef>,
    /// Branch rules attached to this section.
    #[serde(default)]
    branch_rules: Vec<BranchRuleDef>,
    /// Session control declared at this section, if any.
    #[serde(default)]
    item_session_control: Option<ItemSessionControlDef>,
    /// Time limits declared at this section, if any.
    #[serde(default)]
    time_limits: Option<TimeLimitsDef>,
}

impl From<AssessmentSectionDef> for AssessmentSectionDecl {
    fn from(value: AssessmentSectionDef) -> Self {
        Self {
            identifier: value.identifier,
            pre_conditions: value.pre_conditions.into_iter().map(Into::into).collect(),
            branch_rules: value.branch_rules.into_iter().map(Into::into).collect(),
            item_session_control: value.item_session_control.map(Into::into),
            time_limits: value.time_limits.map(Into::into),
        }
    }
}

/// Mirrors [`NavigationMode`].
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
enum NavigationModeDef {
    /// Forward-only; no jumps.
    Linear,
    /// Arbitrary jumps within the current test part.
    NonLinear,
}

impl From<NavigationModeDef> for NavigationMode {
    fn from(value: NavigationModeDef) -> Self {
        match value {
            NavigationModeDef::Linear => Self::Linear,
            NavigationModeDef::NonLinear => Self::NonLinear,
        }
    }
}

/// Mirrors [`SubmissionMode`].
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
enum SubmissionModeDef {
    /// Response processing runs after each item.
    Individual,
    /// Response processing is batched at test part end.
    Simultaneous,
}

impl From<SubmissionModeDef> for SubmissionMode {
    fn from(value: SubmissionModeDef) -> Self {
        match value {
            SubmissionModeDef::Individual => Self::Individual,
            SubmissionModeDef::Simultaneous => Self::Simultaneous,
        }
    }
}

/// Mirrors [`TestPartDecl`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestPartDef {
    /// Test part identifier.
    identifier: String,
    /// Navigation mode for every RouteItem in this part.
    navigation_mode: NavigationModeDef,
    /// Submission mode for every RouteItem in this part.
    submission_mode: SubmissionModeDef,
    /// Preconditions guarding entry into this test part.
    #[serde(default)]
    pre_conditions: Vec<PreConditionDef>,
    /// Branch rules attached to this test part.
    #[serde(default)]
    branch_rules: Vec<BranchRuleDef>,
    /// Session control declared at this test part, if any.
    #[serde(default)]
    item_session_control: Option<ItemSessionControlDef>,
    /// Time limits declared at this test part, if any.
    #[serde(default)]
    time_limits: Option<TimeLimitsDef>,
}

impl From<TestPartDef> for TestPartDecl {
    fn from(value: TestPartDef) -> Self {
        Self {
            identifier: value.identifier,
            navigation_mode: value.navigation_mode.into(),
            submission_mode: value.submission_mode.into(),
            pre_conditions: value.pre_conditions.into_iter().map(Into::into).collect(),
            branch_rules: value.branch_rules.into_iter().map(Into::into).collect(),
            item_session_control: value.item_session_control.map(Into::into),
            time_limits: value.time_limits.map(Into::into),
        }
    }
}

/// Mirrors [`AssessmentTest`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentTestDef {
    /// Test identifier.
    identifier: String,
    /// Test-scoped (global) outcome declarations.
    #[serde(default)]
    outcome_declarations: Vec<VariableDeclarationDef>,
    /// Test parts in document order.
    test_parts: Vec<TestPartDef>,
    /// All sections across all test parts.
    #[serde(default)]
    sections: Vec<AssessmentSectionDef>,
    /// All item references across all test parts.
    item_refs: Vec<AssessmentItemRefDef>,
    /// Test-level and test-part-level feedbacks.
    #[serde(default)]
    test_feedbacks: Vec<TestFeedbackRefDef>,
    /// Test-level time limits, if any.
    #[serde(default)]
    time_limits: Option<TimeLimitsDef>,
    /// The test's own outcome processing rule body, if any.
    #[serde(default)]
    outcome_processing: Option<String>,
}

impl From<AssessmentTestDef> for AssessmentTest {
    fn from(value: AssessmentTestDef) -> Self {
        Self {
            identifier: value.identifier,
            outcome_declarations: value.outcome_declarations.into_iter().map(Into::into).collect(),
            test_parts: value.test_parts.into_iter().map(Into::into).collect(),
            sections: value.sections.into_iter().map(Into::into).collect(),
            item_refs: value.item_refs.into_iter().map(Into::into).collect(),
            test_feedbacks: value.test_feedbacks.into_iter().map(Into::into).collect(),
            time_limits: value.time_limits.map(Into::into),
            outcome_processing: value.outcome_processing.map(ExpressionRef),
        }
    }
}

// ============================================================================
// SECTION: Route DTOs
// ============================================================================

/// Mirrors [`RouteItem`]'s already-flattened, effective rule set.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteItemDef {
    /// Referenced item's identifier.
    item_ref: String,
    /// 0-based occurrence index within `item_ref`.
    #[serde(default)]
    occurrence: u32,
    /// Containing test part's identifier.
    test_part: String,
    /// Containing assessment section chain, outermost first.
    #[serde(default)]
    section_chain: Vec<String>,
    /// Effective preconditions for this route position.
    #[serde(default)]
    pre_conditions: Vec<PreConditionDef>,
    /// Effective branch rules for this route position.
    #[serde(default)]
    branch_rules: Vec<BranchRuleDef>,
    /// Effective session control for this route position; defaults to the
    /// QTI default when omitted.
    #[serde(default)]
    session_control: Option<ItemSessionControlDef>,
    /// Effective time limits for this route position.
    #[serde(default)]
    time_limits: TimeLimitsDef,
}

// ============================================================================
// SECTION: Fixture Document
// ============================================================================

/// The top-level fixture document: a test plus its already-flattened route.
#[derive(Debug, Clone, Deserialize)]
pub struct Fixture {
    /// The assessment test this fixture describes.
    test: AssessmentTestDef,
    /// The flattened sequence of item occurrences a candidate will visit.
    route: Vec<RouteItemDef>,
}

/// A loaded fixture, converted into the core's own domain types.
pub struct LoadedFixture {
    /// The assessment test this fixture describes.
    pub test: AssessmentTest,
    /// The route built from the fixture's flattened item sequence.
    pub route: Route,
}

impl Fixture {
    /// Reads and parses a fixture document from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::Read`] if `path` cannot be read, or
    /// [`FixtureError::Parse`] if its contents are not a valid fixture.
    pub fn load(path: &std::path::Path) -> Result<Self, FixtureError> {
        let text = std::fs::read_to_string(path).map_err(|source| FixtureError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| FixtureError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Converts this fixture into the core's domain types, validating that
    /// every route entry's test part exists.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::UnknownTestPart`] if a route entry names a
    /// test part absent from the fixture's own test parts.
    pub fn into_domain(self) -> Result<LoadedFixture, FixtureError> {
        let test: AssessmentTest = self.test.into();
        let mut route_items = Vec::with_capacity(self.route.len());
        for entry in self.route {
            if test.test_part(&entry.test_part).is_none() {
                return Err(FixtureError::UnknownTestPart {
                    test_part: entry.test_part,
                });
            }
            let session_control = entry.session_control.map(Into::into).unwrap_or_default();
            route_items.push(RouteItem::new(
                entry.item_ref,
                entry.occurrence,
                entry.test_part,
                entry.section_chain,
                entry.pre_conditions.into_iter().map(Into::into).collect(),
                entry.branch_rules.into_iter().map(Into::into).collect(),
                session_control,
                entry.time_limits.into(),
            ));
        }
        Ok(LoadedFixture {
            test,
            route: Route::new(route_items),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_fixture_parses_and_converts() {
        let json = r#"{
            "test": {
                "identifier": "T1",
                "testParts": [
                    { "identifier": "P1", "navigationMode": "linear", "submissionMode": "individual" }
                ],
                "itemRefs": [
                    { "identifier": "Q1" }
                ]
            },
            "route": [
                { "itemRef": "Q1", "testPart": "P1" }
            ]
        }"#;
        let fixture: Fixture = serde_json::from_str(json).expect("parse fixture");
        let loaded = fixture.into_domain().expect("convert fixture");
        assert_eq!(loaded.test.identifier, "T1");
        assert_eq!(loaded.route.count(), 1);
    }

    #[test]
    fn route_entry_with_unknown_test_part_is_rejected() {
        let json = r#"{
            "test": {
                "identifier": "T1",
                "testParts": [
                    { "identifier": "P1", "navigationMode": "linear", "submissionMode": "individual" }
                ],
                "itemRefs": [
                    { "identifier": "Q1" }
                ]
            },
            "route": [
                { "itemRef": "Q1", "testPart": "GHOST" }
            ]
        }"#;
        let fixture: Fixture = serde_json::from_str(json).expect("parse fixture");
        assert!(matches!(fixture.into_domain(), Err(FixtureError::UnknownTestPart { .. })));
    }
}
