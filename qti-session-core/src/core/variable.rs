// qti-session-core/src/core/variable.rs
// ============================================================================
// Module: Variable & State
// Description: Typed QTI variables (outcome/response/template) and the keyed
//              container that holds them for one scope (test or item).
// Purpose: Give every other component a single, typed notion of a variable
//          binding with cardinality/baseType and default-value application.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`Variable`] is a triple of identifier, cardinality, and base type, plus
//! a current value (which may be null) and an optional declared default. A
//! [`State`] is a keyed container of variables scoped to one test or one item
//! session.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Cardinality & Base Type
// ============================================================================

/// Declared cardinality of a variable's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Cardinality {
    /// Exactly one value.
    Single,
    /// An unordered bag of values of one base type.
    Multiple,
    /// An ordered list of values of one base type.
    Ordered,
    /// A heterogeneous, field-named tuple of single values.
    Record,
}

/// Declared base type of a variable's value(s).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BaseType {
    /// A QTI identifier value.
    Identifier,
    /// A boolean value.
    Boolean,
    /// A signed integer value.
    Integer,
    /// An IEEE-754 double-precision value.
    Float,
    /// A string value.
    String,
    /// An (x, y) integer coordinate pair.
    Point,
    /// An unordered pair of identifiers.
    Pair,
    /// An ordered pair of identifiers.
    DirectedPair,
    /// A time interval, stored internally in seconds.
    Duration,
    /// Opaque file content with an optional content type.
    File,
    /// A URI value.
    Uri,
}

// ============================================================================
// SECTION: Values
// ============================================================================

/// A single (non-container) value of one of the declared base types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "baseType", content = "value", rename_all = "camelCase")]
pub enum SingleValue {
    /// An identifier-valued leaf.
    Identifier(String),
    /// A boolean leaf.
    Boolean(bool),
    /// An integer leaf.
    Integer(i32),
    /// A float leaf.
    Float(f64),
    /// A string leaf.
    String(String),
    /// An (x, y) point leaf.
    Point {
        /// X coordinate.
        x: i32,
        /// Y coordinate.
        y: i32,
    },
    /// An unordered identifier pair.
    Pair(String, String),
    /// An ordered identifier pair.
    DirectedPair(String, String),
    /// A duration in seconds.
    Duration(f64),
    /// Opaque file content.
    File {
        /// Declared content type, if known.
        content_type: Option<String>,
        /// Raw file bytes.
        data: Vec<u8>,
    },
    /// A URI leaf.
    Uri(String),
}

impl SingleValue {
    /// Returns the base type this value carries.
    #[must_use]
    pub const fn base_type(&self) -> BaseType {
        match self {
            Self::Identifier(_) => BaseType::Identifier,
            Self::Boolean(_) => BaseType::Boolean,
            Self::Integer(_) => BaseType::Integer,
            Self::Float(_) => BaseType::Float,
            Self::String(_) => BaseType::String,
            Self::Point {
                ..
            } => BaseType::Point,
            Self::Pair(..) => BaseType::Pair,
            Self::DirectedPair(..) => BaseType::DirectedPair,
            Self::Duration(_) => BaseType::Duration,
            Self::File {
                ..
            } => BaseType::File,
            Self::Uri(_) => BaseType::Uri,
        }
    }
}

/// A variable's value under its declared cardinality. Absent entirely means
/// the variable is null; `State` models that with `Option<QtiValue>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cardinality", rename_all = "camelCase")]
pub enum QtiValue {
    /// Exactly one value.
    Single(SingleValue),
    /// An unordered bag of same-typed values.
    Multiple(Vec<SingleValue>),
    /// An ordered list of same-typed values.
    Ordered(Vec<SingleValue>),
    /// A field-named tuple of values.
    Record(Vec<(String, SingleValue)>),
}

impl QtiValue {
    /// Returns the cardinality this value carries.
    #[must_use]
    pub const fn cardinality(&self) -> Cardinality {
        match self {
            Self::Single(_) => Cardinality::Single,
            Self::Multiple(_) => Cardinality::Multiple,
            Self::Ordered(_) => Cardinality::Ordered,
            Self::Record(_) => Cardinality::Record,
        }
    }

    /// Returns whether this container's members match `base_type`. A record
    /// is heterogeneous by definition and always reports `true`.
    #[must_use]
    pub fn matches_base_type(&self, base_type: BaseType) -> bool {
        match self {
            Self::Single(value) => value.base_type() == base_type,
            Self::Multiple(values) | Self::Ordered(values) => {
                values.iter().all(|value| value.base_type() == base_type)
            }
            Self::Record(_) => true,
        }
    }
}

// ============================================================================
// SECTION: Variable
// ============================================================================

/// Which declaration family a variable belongs to. This governs only
/// permissible scope and whether response processing may write to it; the
/// storage and addressing mechanics are identical across kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VariableKind {
    /// Written by response/outcome processing; readable everywhere.
    Outcome,
    /// Candidate-facing input captured per item, read-only to processing
    /// rules other than response processing of its own item.
    Response,
    /// Set before an item is attempted, driving per-attempt randomization.
    Template,
}

/// A declared variable binding: identifier, cardinality, base type, current
/// value, and declared default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    /// The variable's bare identifier (no scope prefix).
    pub identifier: String,
    /// The declaration family this variable belongs to.
    pub kind: VariableKind,
    /// Declared cardinality.
    pub cardinality: Cardinality,
    /// Declared base type.
    pub base_type: BaseType,
    /// Current value; `None` means null.
    pub value: Option<QtiValue>,
    /// Declared default value, applied by [`State::apply_default_value`].
    pub default_value: Option<QtiValue>,
}

impl Variable {
    /// Builds a variable matching a declaration's cardinality/baseType, with
    /// a null value and the given default recorded (but not yet applied).
    #[must_use]
    pub const fn from_declaration(
        identifier: String,
        kind: VariableKind,
        cardinality: Cardinality,
        base_type: BaseType,
        default_value: Option<QtiValue>,
    ) -> Self {
        Self {
            identifier,
            kind,
            cardinality,
            base_type,
            value: None,
            default_value,
        }
    }
}

// ============================================================================
// SECTION: State
// ============================================================================

/// A keyed container of [`Variable`]s scoped to one test or one item session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    variables: BTreeMap<String, Variable>,
}

impl State {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a variable built from a data-model declaration. Replaces any
    /// existing binding with the same identifier.
    pub fn declare(&mut self, variable: Variable) {
        self.variables.insert(variable.identifier.clone(), variable);
    }

    /// Looks up a variable by bare identifier.
    #[must_use]
    pub fn get_variable(&self, identifier: &str) -> Option<&Variable> {
        self.variables.get(identifier)
    }

    /// Looks up a variable mutably by bare identifier.
    pub fn get_variable_mut(&mut self, identifier: &str) -> Option<&mut Variable> {
        self.variables.get_mut(identifier)
    }

    /// Sets a declared variable's value. Returns `false` if `identifier` is
    /// not declared in this state.
    pub fn set_variable(&mut self, identifier: &str, value: QtiValue) -> bool {
        match self.variables.get_mut(identifier) {
            Some(variable) => {
                variable.value = Some(value);
                true
            }
            None => false,
        }
    }

    /// Sets a declared variable's value to null without removing the
    /// binding. Returns `false` if `identifier` is not declared.
    pub fn unset_variable(&mut self, identifier: &str) -> bool {
        match self.variables.get_mut(identifier) {
            Some(variable) => {
                variable.value = None;
                true
            }
            None => false,
        }
    }

    /// Copies a variable's declared default into its current value.
    /// No-op if the variable has no default.
    pub fn apply_default_value(&mut self, identifier: &str) {
        if let Some(variable) = self.variables.get_mut(identifier) {
            if let Some(default) = variable.default_value.clone() {
                variable.value = Some(default);
            }
        }
    }

    /// Sets every [`VariableKind::Outcome`] variable to its declared default,
    /// or null if it has none.
    pub fn reset_outcome_variables(&mut self) {
        for variable in self.variables.values_mut() {
            if variable.kind == VariableKind::Outcome {
                variable.value = variable.default_value.clone();
            }
        }
    }

    /// Sets every [`VariableKind::Template`] variable to its declared
    /// default, or null if it has none. Used by `beginAttempt` on the first
    /// attempt of a linear-navigation item (§4.8's `templateDefaults`).
    pub fn reset_template_variables(&mut self) {
        for variable in self.variables.values_mut() {
            if variable.kind == VariableKind::Template {
                variable.value = variable.default_value.clone();
            }
        }
    }

    /// Iterates all declared variables in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.variables.values()
    }

    /// Returns whether `identifier` is declared in this state.
    #[must_use]
    pub fn contains(&self, identifier: &str) -> bool {
        self.variables.contains_key(identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score_variable() -> Variable {
        Variable::from_declaration(
            "SCORE".to_string(),
            VariableKind::Outcome,
            Cardinality::Single,
            BaseType::Integer,
            Some(QtiValue::Single(SingleValue::Integer(0))),
        )
    }

    #[test]
    fn set_and_get_round_trip() {
        let mut state = State::new();
        state.declare(score_variable());
        assert!(state.set_variable("SCORE", QtiValue::Single(SingleValue::Integer(7))));
        assert_eq!(
            state.get_variable("SCORE").and_then(|v| v.value.clone()),
            Some(QtiValue::Single(SingleValue::Integer(7)))
        );
    }

    #[test]
    fn unset_clears_value_but_keeps_binding() {
        let mut state = State::new();
        state.declare(score_variable());
        state.set_variable("SCORE", QtiValue::Single(SingleValue::Integer(7)));
        assert!(state.unset_variable("SCORE"));
        assert!(state.contains("SCORE"));
        assert_eq!(state.get_variable("SCORE").and_then(|v| v.value.clone()), None);
    }

    #[test]
    fn reset_outcome_variables_restores_defaults() {
        let mut state = State::new();
        state.declare(score_variable());
        state.set_variable("SCORE", QtiValue::Single(SingleValue::Integer(99)));
        state.reset_outcome_variables();
        assert_eq!(
            state.get_variable("SCORE").and_then(|v| v.value.clone()),
            Some(QtiValue::Single(SingleValue::Integer(0)))
        );
    }

    #[test]
    fn set_unknown_identifier_fails() {
        let mut state = State::new();
        assert!(!state.set_variable("UNKNOWN", QtiValue::Single(SingleValue::Boolean(true))));
    }
}
