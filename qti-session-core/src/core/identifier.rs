// qti-session-core/src/core/identifier.rs
// ============================================================================
// Module: Variable Identifier
// Description: Parses and resolves QTI variable identifiers against scope.
// Purpose: Give the driver and variable addressing a single parsed form
//          instead of repeated string inspection at every offsetGet/offsetSet.
// Dependencies: none
// ============================================================================

//! ## Overview
//! A variable identifier addresses either the global (test) scope, an item's
//! scope by reference, or one particular occurrence of an item's scope. The
//! three surface forms are `name`, `prefix.name`, and `prefix.N.name`.

use std::fmt;

use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while parsing a variable identifier.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    /// The raw string matched neither `name`, `prefix.name`, nor `prefix.N.name`.
    #[error("malformed variable identifier: {raw}")]
    MalformedIdentifier {
        /// The original, unparsed string.
        raw: String,
    },
}

// ============================================================================
// SECTION: Variable Identifier
// ============================================================================

/// A parsed variable identifier: `name`, `prefix.name`, or `prefix.N.name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariableIdentifier {
    prefix: Option<String>,
    sequence_number: Option<u32>,
    name: String,
}

impl VariableIdentifier {
    /// Parses a raw identifier string into its constituent parts.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::MalformedIdentifier`] when `raw` matches
    /// none of the three permitted forms.
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let parts: Vec<&str> = raw.split('.').collect();
        let malformed = || IdentifierError::MalformedIdentifier {
            raw: raw.to_string(),
        };

        match parts.as_slice() {
            [name] => {
                if is_valid_identifier_name(name) {
                    Ok(Self {
                        prefix: None,
                        sequence_number: None,
                        name: (*name).to_string(),
                    })
                } else {
                    Err(malformed())
                }
            }
            [prefix, name] => {
                if is_valid_identifier_name(prefix) && is_valid_identifier_name(name) {
                    Ok(Self {
                        prefix: Some((*prefix).to_string()),
                        sequence_number: None,
                        name: (*name).to_string(),
                    })
                } else {
                    Err(malformed())
                }
            }
            [prefix, seq, name] => {
                let sequence_number: u32 = seq.parse().map_err(|_| malformed())?;
                if sequence_number < 1 || !is_valid_identifier_name(prefix) || !is_valid_identifier_name(name) {
                    return Err(malformed());
                }
                Ok(Self {
                    prefix: Some((*prefix).to_string()),
                    sequence_number: Some(sequence_number),
                    name: (*name).to_string(),
                })
            }
            _ => Err(malformed()),
        }
    }

    /// Returns whether this identifier has an item-scoping prefix.
    #[must_use]
    pub const fn has_prefix(&self) -> bool {
        self.prefix.is_some()
    }

    /// Returns whether this identifier names an explicit occurrence.
    #[must_use]
    pub const fn has_sequence_number(&self) -> bool {
        self.sequence_number.is_some()
    }

    /// Returns the prefix (item or scope reference), if any.
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Returns the variable name component.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the explicit 1-based occurrence number, if any.
    #[must_use]
    pub const fn sequence_number(&self) -> Option<u32> {
        self.sequence_number
    }
}

impl fmt::Display for VariableIdentifier {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.prefix, self.sequence_number) {
            (Some(prefix), Some(seq)) => write!(formatter, "{prefix}.{seq}.{}", self.name),
            (Some(prefix), None) => write!(formatter, "{prefix}.{}", self.name),
            (None, _) => formatter.write_str(&self.name),
        }
    }
}

/// Validates the QTI identifier lexical form used by each dot-separated
/// component: a letter or underscore, followed by letters, digits,
/// underscores, or hyphens. Dots are excluded here because they are the
/// addressing separator consumed by [`VariableIdentifier::parse`] itself.
fn is_valid_identifier_name(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_name() {
        let id = VariableIdentifier::parse("SCORE").expect("valid identifier");
        assert!(!id.has_prefix());
        assert!(!id.has_sequence_number());
        assert_eq!(id.name(), "SCORE");
    }

    #[test]
    fn parses_prefixed_name() {
        let id = VariableIdentifier::parse("Q01.RESPONSE").expect("valid identifier");
        assert_eq!(id.prefix(), Some("Q01"));
        assert_eq!(id.name(), "RESPONSE");
        assert!(!id.has_sequence_number());
    }

    #[test]
    fn parses_prefixed_name_with_occurrence() {
        let id = VariableIdentifier::parse("Q01.2.RESPONSE").expect("valid identifier");
        assert_eq!(id.prefix(), Some("Q01"));
        assert_eq!(id.sequence_number(), Some(2));
        assert_eq!(id.name(), "RESPONSE");
    }

    #[test]
    fn rejects_malformed_forms() {
        assert!(VariableIdentifier::parse("").is_err());
        assert!(VariableIdentifier::parse("1BAD").is_err());
        assert!(VariableIdentifier::parse("a.b.c.d").is_err());
        assert!(VariableIdentifier::parse("a.0.b").is_err());
        assert!(VariableIdentifier::parse("a.x.b").is_err());
    }

    #[test]
    fn display_round_trips() {
        for raw in ["SCORE", "Q01.RESPONSE", "Q01.3.RESPONSE"] {
            let id = VariableIdentifier::parse(raw).expect("valid identifier");
            assert_eq!(id.to_string(), raw);
        }
    }
}
