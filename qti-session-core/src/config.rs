// qti-session-core/src/config.rs
// ============================================================================
// Module: Engine Configuration
// Description: The Config bitset and codec hash-algorithm selection, as a
//              toml-deserializable struct.
// Purpose: Let a caller tune driver/codec behavior from a config file
//          without touching code, mirroring this crate's configuration
//          conventions.
// Dependencies: serde, toml, crate::core::hashing
// ============================================================================

//! ## Overview
//! Every field defaults independently via `serde(default)`, so a caller may
//! supply an empty file, a partial file, or none at all and still get a
//! fully-populated [`EngineConfig`].

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::hashing::HashAlgorithm;
use crate::core::hashing::DEFAULT_HASH_ALGORITHM;

// ============================================================================
// SECTION: Config Bitset Values
// ============================================================================

/// Bit value for [`EngineConfig::force_branching`].
pub const FORCE_BRANCHING: u8 = 1;
/// Bit value for [`EngineConfig::force_preconditions`].
pub const FORCE_PRECONDITIONS: u8 = 2;
/// Bit value for [`EngineConfig::path_tracking`].
pub const PATH_TRACKING: u8 = 4;
/// Bit value for [`EngineConfig::always_allow_jumps`].
pub const ALWAYS_ALLOW_JUMPS: u8 = 8;
/// Bit value for [`EngineConfig::initialize_all_items`].
pub const INITIALIZE_ALL_ITEMS: u8 = 16;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised loading an [`EngineConfig`] from TOML.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The supplied text was not valid TOML, or did not match the
    /// expected shape.
    #[error("invalid engine configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

// ============================================================================
// SECTION: Engine Configuration
// ============================================================================

/// Driver and codec behavior flags, deserializable from a TOML file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct EngineConfig {
    /// Evaluate branchRules even for RouteItems that would not otherwise
    /// offer nonlinear navigation.
    pub force_branching: bool,
    /// Evaluate preConditions even where navigation mode would otherwise
    /// skip the check.
    pub force_preconditions: bool,
    /// Record visited Route positions in `path` for `moveBack` to pop.
    pub path_tracking: bool,
    /// Permit `jumpTo` regardless of navigation mode.
    pub always_allow_jumps: bool,
    /// `selectEligibleItems` initializes every Route position up front
    /// rather than lazily per testPart.
    pub initialize_all_items: bool,
    /// Hash algorithm used for the codec's optional `modelHash` field.
    pub hash_algorithm: HashAlgorithm,
    /// Whether the codec writes the optional `modelHash` field at all.
    pub write_model_hash: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            force_branching: false,
            force_preconditions: false,
            path_tracking: false,
            always_allow_jumps: false,
            initialize_all_items: false,
            hash_algorithm: DEFAULT_HASH_ALGORITHM,
            write_model_hash: false,
        }
    }
}

impl EngineConfig {
    /// Parses an `EngineConfig` from a TOML document, defaulting any
    /// field the document omits.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if `text` is not valid TOML or does
    /// not match the expected shape.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Packs the five boolean flags into the Config bitset's bit-exact
    /// representation.
    #[must_use]
    pub const fn as_bitset(&self) -> u8 {
        let mut bits = 0u8;
        if self.force_branching {
            bits |= FORCE_BRANCHING;
        }
        if self.force_preconditions {
            bits |= FORCE_PRECONDITIONS;
        }
        if self.path_tracking {
            bits |= PATH_TRACKING;
        }
        if self.always_allow_jumps {
            bits |= ALWAYS_ALLOW_JUMPS;
        }
        if self.initialize_all_items {
            bits |= INITIALIZE_ALL_ITEMS;
        }
        bits
    }

    /// Unpacks the five boolean flags from the Config bitset, leaving
    /// `hash_algorithm`/`write_model_hash` at their defaults.
    #[must_use]
    pub const fn from_bitset(bits: u8) -> Self {
        Self {
            force_branching: bits & FORCE_BRANCHING != 0,
            force_preconditions: bits & FORCE_PRECONDITIONS != 0,
            path_tracking: bits & PATH_TRACKING != 0,
            always_allow_jumps: bits & ALWAYS_ALLOW_JUMPS != 0,
            initialize_all_items: bits & INITIALIZE_ALL_ITEMS != 0,
            hash_algorithm: DEFAULT_HASH_ALGORITHM,
            write_model_hash: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = EngineConfig::from_toml_str("").expect("parse empty config");
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn partial_document_defaults_missing_fields() {
        let config = EngineConfig::from_toml_str("path_tracking = true\n").expect("parse partial config");
        assert!(config.path_tracking);
        assert!(!config.always_allow_jumps);
    }

    #[test]
    fn bitset_round_trips_boolean_flags() {
        let config = EngineConfig {
            path_tracking: true,
            always_allow_jumps: true,
            ..EngineConfig::default()
        };
        let bits = config.as_bitset();
        assert_eq!(bits, PATH_TRACKING | ALWAYS_ALLOW_JUMPS);
        let restored = EngineConfig::from_bitset(bits);
        assert!(restored.path_tracking);
        assert!(restored.always_allow_jumps);
        assert!(!restored.force_branching);
    }
}
