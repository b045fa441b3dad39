// qti-session-cli/src/script.rs
// ============================================================================
// Module: Session Script
// Description: The JSON action list driven against a TestSessionDriver by
//              the `run` command.
// Purpose: Give fixture authors a declarative, file-based way to exercise a
//          test session without writing Rust.
// Dependencies: qti-session-core, serde, serde_json
// ============================================================================

//! ## Overview
//! A script is an ordered list of [`ScriptAction`]s, one call into
//! [`qti_session_core::driver::TestSessionDriver`] per entry. Response
//! values reuse the core's own [`QtiValue`] serde representation directly,
//! rather than introducing a second value grammar for fixtures to learn.

use std::collections::BTreeMap;
use std::path::Path;

use qti_session_core::core::variable::QtiValue;
use serde::Deserialize;

/// One step of a session script, corresponding to a single
/// `TestSessionDriver` call.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ScriptAction {
    /// Calls `begin_test_session`.
    BeginTestSession,
    /// Calls `end_test_session`.
    EndTestSession,
    /// Calls `begin_attempt`.
    BeginAttempt {
        /// Forwarded to `begin_attempt`'s `allow_late_submission` argument.
        #[serde(default)]
        allow_late_submission: bool,
    },
    /// Calls `end_attempt`.
    EndAttempt {
        /// Response identifier to value, written before processing runs.
        /// Ordered by identifier so replaying a script is deterministic.
        responses: BTreeMap<String, QtiValue>,
        /// Forwarded to `end_attempt`'s `allow_late_submission` argument.
        #[serde(default)]
        allow_late_submission: bool,
    },
    /// Calls `move_next`.
    MoveNext,
    /// Calls `move_back`.
    MoveBack,
    /// Calls `jump_to`.
    JumpTo {
        /// Target route position, zero-based.
        position: usize,
    },
    /// Calls `move_next_test_part`.
    MoveNextTestPart,
    /// Calls `move_next_assessment_section`.
    MoveNextAssessmentSection,
    /// Calls `set_time` with an `Observation` built from Unix milliseconds.
    SetTimeUnixMillis {
        /// Milliseconds since the Unix epoch.
        value: i64,
    },
    /// Calls `suspend`.
    Suspend,
    /// Calls `get`, printed by the runner rather than applied to the driver.
    Get {
        /// Variable identifier to read.
        identifier: String,
    },
    /// Calls `set`.
    Set {
        /// Variable identifier to write.
        identifier: String,
        /// Value to write.
        value: QtiValue,
    },
    /// Calls `unset`.
    Unset {
        /// Global outcome identifier to clear.
        identifier: String,
    },
}

/// An ordered list of actions loaded from a script file.
#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    /// The actions to perform, in order.
    pub actions: Vec<ScriptAction>,
}

/// An error loading or parsing a script file.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// The script file could not be read.
    #[error("failed to read script file {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The script file's contents were not a valid script.
    #[error("failed to parse script file {path}: {source}")]
    Parse {
        /// Path that failed to parse.
        path: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

impl Script {
    /// Loads and parses a script from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Read`] if the file cannot be read, or
    /// [`ScriptError::Parse`] if its contents are not a valid script.
    pub fn load(path: &Path) -> Result<Self, ScriptError> {
        let text = std::fs::read_to_string(path).map_err(|source| ScriptError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ScriptError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_script_parses() {
        let text = r#"{
            "actions": [
                { "action": "beginTestSession" },
                { "action": "beginAttempt" },
                {
                    "action": "endAttempt",
                    "responses": {
                        "RESPONSE": { "cardinality": "single", "baseType": "identifier", "value": "CORRECT" }
                    }
                },
                { "action": "moveNext" },
                { "action": "setTimeUnixMillis", "value": 1000 },
                { "action": "endTestSession" }
            ]
        }"#;
        let script: Script = serde_json::from_str(text).expect("script parses");
        assert_eq!(script.actions.len(), 6);
        assert!(matches!(script.actions[0], ScriptAction::BeginTestSession));
        assert!(matches!(script.actions[4], ScriptAction::SetTimeUnixMillis { value: 1000 }));
    }

    #[test]
    fn jump_to_parses_position() {
        let text = r#"{ "actions": [ { "action": "jumpTo", "position": 2 } ] }"#;
        let script: Script = serde_json::from_str(text).expect("script parses");
        assert!(matches!(script.actions[0], ScriptAction::JumpTo { position: 2 }));
    }

    #[test]
    fn malformed_json_is_reported_as_parse_error() {
        let dir = std::env::temp_dir().join("qti-session-cli-script-test-malformed.json");
        std::fs::write(&dir, "{ not json").expect("write temp script");
        let result = Script::load(&dir);
        assert!(matches!(result, Err(ScriptError::Parse { .. })));
        let _ = std::fs::remove_file(&dir);
    }
}
