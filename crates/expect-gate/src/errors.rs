//! Error types for rule loading

use thiserror::Error;

/// Gate error enumeration
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    /// Rules file could not be read
    #[error("Failed to read rules from {path}: {reason}")]
    Read { path: String, reason: String },

    /// Rules document is not valid JSON/YAML or has the wrong shape
    #[error("Invalid rules: {0}")]
    InvalidRules(String),

    /// A pattern in the rules does not compile
    #[error("Invalid pattern for {platform}/{step}/{parameter}: {reason}")]
    InvalidPattern {
        platform: String,
        step: String,
        parameter: String,
        reason: String,
    },
}

impl GateError {
    /// Rule problems are fixed by editing the file, never by retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GateError::Read { .. })
    }
}
