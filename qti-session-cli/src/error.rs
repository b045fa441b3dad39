// qti-session-cli/src/error.rs
// ============================================================================
// Module: CLI Error
// Description: The CLI's single top-level error wrapper.
// Purpose: Give every command a uniform, displayable failure type without
//          leaking internal error enum shapes into command dispatch.
// Dependencies: thiserror
// ============================================================================

use thiserror::Error;

/// CLI error wrapper carrying a single human-readable message.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`] from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// CLI result alias for fallible operations.
pub type CliResult<T> = Result<T, CliError>;

/// Wraps any displayable error behind a `{context}: {source}` [`CliError`].
pub fn context_err(context: &str, source: impl std::fmt::Display) -> CliError {
    CliError::new(format!("{context}: {source}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_err_formats_context_and_source() {
        let err = context_err("loading fixture", "file not found");
        assert_eq!(err.to_string(), "loading fixture: file not found");
    }
}
