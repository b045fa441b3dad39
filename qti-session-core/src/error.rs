// qti-session-core/src/error.rs
// ============================================================================
// Module: Error Taxonomy
// Description: Top-level driver error composing the component-boundary
//              errors raised by C2, C3, C5, and variable addressing.
// Purpose: Give every driver method one closed Result type, each variant
//          wrapping (not flattening) its source component's error.
// Dependencies: crate::core, crate::item, crate::route
// ============================================================================

//! ## Overview
//! [`VariableAddressError`] is its own small enum (C9's §4.8.4 resolved-target
//! lookups) because it is meaningful on its own to callers of the driver's
//! `get`/`set` methods; [`TestSessionError`] is what every other fallible
//! driver method returns, composing the rest of the taxonomy.

use thiserror::Error;

use crate::core::IdentifierError;
use crate::item::ItemSessionError;
use crate::route::RouteError;

// ============================================================================
// SECTION: Variable Address Error
// ============================================================================

/// Errors raised resolving or writing through a variable identifier
/// (§4.8.4's `offsetGet`/`offsetSet`, re-architected as resolved-target
/// lookups).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VariableAddressError {
    /// The resolved target names a variable not declared in its scope.
    #[error("unknown variable: {identifier}")]
    UnknownVariable {
        /// The offending identifier, as originally written.
        identifier: String,
    },
    /// The identifier addresses a scope the operation may not cross (for
    /// example, writing a prefixed identifier through the unset path).
    #[error("identifier out of scope: {identifier}")]
    OutOfScope {
        /// The offending identifier, as originally written.
        identifier: String,
    },
}

// ============================================================================
// SECTION: Test Session Error
// ============================================================================

/// The closed error taxonomy returned by every fallible [`crate::driver`]
/// method.
#[derive(Debug, Error)]
pub enum TestSessionError {
    /// The operation is not valid in the driver's current top-level state.
    #[error("state violation: expected {expected}, found {actual}")]
    StateViolation {
        /// A human-readable description of the required state(s).
        expected: String,
        /// A human-readable description of the actual state.
        actual: String,
    },

    /// A jump or non-sequential move was attempted in linear navigation
    /// mode without `ALWAYS_ALLOW_JUMPS` set.
    #[error("navigation mode violation")]
    NavigationModeViolation,

    /// `jumpTo` addressed a position outside the Route.
    #[error("forbidden jump to position {position}")]
    ForbiddenJump {
        /// The out-of-range position requested.
        position: usize,
    },

    /// An internal invariant was violated; indicates a driver bug rather
    /// than a caller error.
    #[error("logic error: {detail}")]
    LogicError {
        /// Description of the violated invariant.
        detail: String,
    },

    /// The resolved variable target names an undeclared variable.
    #[error("unknown variable: {identifier}")]
    UnknownVariable {
        /// The offending identifier.
        identifier: String,
    },

    /// The resolved variable target crosses a scope boundary the operation
    /// forbids.
    #[error("identifier out of scope: {identifier}")]
    OutOfScope {
        /// The offending identifier.
        identifier: String,
    },

    /// The `ExpressionEngine` failed while evaluating a response processing
    /// rule.
    #[error("response processing failed: {detail}")]
    ResponseProcessingError {
        /// Description supplied by the expression engine or driver.
        detail: String,
    },

    /// The `ExpressionEngine` failed while evaluating outcome processing.
    #[error("outcome processing failed: {detail}")]
    OutcomeProcessingError {
        /// Description supplied by the expression engine or driver.
        detail: String,
    },

    /// Submitting test results to the (external) results backend failed.
    #[error("result submission failed: {detail}")]
    ResultSubmissionError {
        /// Description supplied by the caller.
        detail: String,
    },

    /// The assessment test's own maximum duration was exceeded.
    #[error("test duration overflow: {identifier}")]
    TestDurationOverflow {
        /// The test identifier.
        identifier: String,
    },
    /// A test part's maximum duration was exceeded.
    #[error("test part duration overflow: {identifier}")]
    TestPartDurationOverflow {
        /// The test part identifier.
        identifier: String,
    },
    /// An assessment section's maximum duration was exceeded.
    #[error("assessment section duration overflow: {identifier}")]
    AssessmentSectionDurationOverflow {
        /// The assessment section identifier.
        identifier: String,
    },
    /// An item's own maximum duration was exceeded.
    #[error("item duration overflow: {item_ref}.{occurrence}")]
    ItemDurationOverflow {
        /// The item reference identifier.
        item_ref: String,
        /// The occurrence index.
        occurrence: u32,
        /// The originating item session fault.
        #[source]
        source: Box<ItemSessionError>,
    },

    /// The assessment test's own minimum duration was not reached.
    #[error("test duration underflow: {identifier}")]
    TestDurationUnderflow {
        /// The test identifier.
        identifier: String,
    },
    /// A test part's minimum duration was not reached.
    #[error("test part duration underflow: {identifier}")]
    TestPartDurationUnderflow {
        /// The test part identifier.
        identifier: String,
    },
    /// An assessment section's minimum duration was not reached.
    #[error("assessment section duration underflow: {identifier}")]
    AssessmentSectionDurationUnderflow {
        /// The assessment section identifier.
        identifier: String,
    },
    /// An item's own minimum duration was not reached.
    #[error("item duration underflow: {item_ref}.{occurrence}")]
    ItemDurationUnderflow {
        /// The item reference identifier.
        item_ref: String,
        /// The occurrence index.
        occurrence: u32,
        /// The originating item session fault.
        #[source]
        source: Box<ItemSessionError>,
    },

    /// A Route cursor operation failed.
    #[error("route error: {0}")]
    Route(#[from] RouteError),

    /// A variable identifier failed to parse.
    #[error("identifier error: {0}")]
    Identifier(#[from] IdentifierError),

    /// An item session operation failed outside the duration-specific
    /// variants above (e.g. attempts overflow, invalid response,
    /// state violation on the item itself).
    #[error("item session error for {item_ref}.{occurrence}: {source}")]
    ItemSession {
        /// The item reference identifier.
        item_ref: String,
        /// The occurrence index.
        occurrence: u32,
        /// The originating item session fault.
        #[source]
        source: ItemSessionError,
    },
}

impl From<VariableAddressError> for TestSessionError {
    fn from(error: VariableAddressError) -> Self {
        match error {
            VariableAddressError::UnknownVariable {
                identifier,
            } => Self::UnknownVariable {
                identifier,
            },
            VariableAddressError::OutOfScope {
                identifier,
            } => Self::OutOfScope {
                identifier,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_address_error_converts_preserving_identifier() {
        let converted: TestSessionError = VariableAddressError::UnknownVariable {
            identifier: "Q01.RESPONSE".to_string(),
        }
        .into();
        assert!(matches!(
            converted,
            TestSessionError::UnknownVariable { identifier } if identifier == "Q01.RESPONSE"
        ));
    }

    #[test]
    fn item_duration_overflow_reports_item_scoped_string() {
        let error = TestSessionError::ItemDurationOverflow {
            item_ref: "Q01".to_string(),
            occurrence: 2,
            source: Box::new(ItemSessionError::DurationOverflow),
        };
        assert_eq!(error.to_string(), "item duration overflow: Q01.2");
    }
}
