// qti-session-core/src/core/mod.rs
// ============================================================================
// Module: Core Types
// Description: Variables, identifiers, time observations, and the concrete
//              assessment model the rest of the engine operates on.
// Purpose: Provide the stable, shared vocabulary every other component
//          builds on.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Core types are the canonical source of truth for variable data (C1),
//! identifier parsing (C2), time observation, and the concrete (already
//! parsed) assessment model pieces C5/C9/C10 read.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod hashing;
pub mod identifier;
pub mod model;
pub mod time;
pub mod variable;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use hashing::DEFAULT_HASH_ALGORITHM;
pub use hashing::HashAlgorithm;
pub use hashing::HashDigest;
pub use identifier::IdentifierError;
pub use identifier::VariableIdentifier;
pub use model::AssessmentItemRefDecl;
pub use model::AssessmentSectionDecl;
pub use model::AssessmentTest;
pub use model::BranchRule;
pub use model::BranchTarget;
pub use model::ExpressionRef;
pub use model::ItemSessionControl;
pub use model::NavigationMode;
pub use model::PreCondition;
pub use model::ShowHide;
pub use model::SubmissionMode;
pub use model::TestFeedbackAccess;
pub use model::TestFeedbackRef;
pub use model::TestPartDecl;
pub use model::TimeLimits;
pub use model::VariableDeclaration;
pub use time::Observation;
pub use variable::BaseType;
pub use variable::Cardinality;
pub use variable::QtiValue;
pub use variable::SingleValue;
pub use variable::State;
pub use variable::Variable;
pub use variable::VariableKind;
