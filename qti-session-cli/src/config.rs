// qti-session-cli/src/config.rs
// ============================================================================
// Module: CLI Config Loading
// Description: Reads an EngineConfig from a TOML file on disk.
// Purpose: Let `qti-session run`/`config validate` source engine behavior
//          flags from a file rather than only defaults.
// Dependencies: qti-session-core
// ============================================================================

use std::path::Path;

use qti_session_core::config::ConfigError;
use qti_session_core::config::EngineConfig;

/// An error loading an [`EngineConfig`] from disk.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The config file's contents were not a valid configuration.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Path that failed to parse.
        path: String,
        /// Underlying config error.
        #[source]
        source: ConfigError,
    },
}

/// Loads an [`EngineConfig`] from the TOML file at `path`.
///
/// # Errors
///
/// Returns [`ConfigLoadError::Read`] if the file cannot be read, or
/// [`ConfigLoadError::Parse`] if its contents are not a valid configuration.
pub fn load_engine_config(path: &Path) -> Result<EngineConfig, ConfigLoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Read {
        path: path.display().to_string(),
        source,
    })?;
    EngineConfig::from_toml_str(&text).map_err(|source| ConfigLoadError::Parse {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_a_valid_config_file() {
        let path = std::env::temp_dir().join("qti-session-cli-config-test-valid.toml");
        std::fs::write(&path, "path_tracking = true\n").expect("write temp config");
        let config = load_engine_config(&path).expect("config loads");
        assert!(config.path_tracking);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn reports_parse_errors_for_malformed_toml() {
        let path = std::env::temp_dir().join("qti-session-cli-config-test-malformed.toml");
        std::fs::write(&path, "not valid toml = [").expect("write temp config");
        let result = load_engine_config(&path);
        assert!(matches!(result, Err(ConfigLoadError::Parse { .. })));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn reports_read_errors_for_missing_files() {
        let path = std::env::temp_dir().join("qti-session-cli-config-test-does-not-exist.toml");
        let _ = std::fs::remove_file(&path);
        let result = load_engine_config(&path);
        assert!(matches!(result, Err(ConfigLoadError::Read { .. })));
    }
}
