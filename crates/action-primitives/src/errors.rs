//! Error types for journey actions

use cdp_adapter::{AdapterError, AdapterErrorKind};
use thiserror::Error;

/// Error types for action execution
#[derive(Debug, Error, Clone)]
pub enum ActionError {
    /// Navigation timed out waiting for page load
    #[error("Navigation timeout: {0}")]
    NavTimeout(String),

    /// Wait operation timed out
    #[error("Wait timeout: {0}")]
    WaitTimeout(String),

    /// Operation was cancelled or interrupted
    #[error("Operation interrupted: {0}")]
    Interrupted(String),

    /// Selector matched nothing
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// Page script raised an exception
    #[error("Script error: {0}")]
    Script(String),

    /// The operator halted at a manual checkpoint
    #[error("Halted at checkpoint: {0}")]
    Halted(String),

    /// Action definition is unusable
    #[error("Invalid action: {0}")]
    Invalid(String),

    /// CDP communication or protocol error
    #[error("CDP I/O error: {0}")]
    CdpIo(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ActionError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ActionError::WaitTimeout(_) | ActionError::ElementNotFound(_) | ActionError::CdpIo(_)
        )
    }

    /// Get error severity level (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            ActionError::Internal(_) | ActionError::Halted(_) => 3,
            ActionError::NavTimeout(_) | ActionError::CdpIo(_) | ActionError::Invalid(_) => 2,
            ActionError::WaitTimeout(_) | ActionError::ElementNotFound(_) => 1,
            _ => 0,
        }
    }
}

impl From<AdapterError> for ActionError {
    fn from(err: AdapterError) -> Self {
        let text = err.to_string();
        match err.kind {
            AdapterErrorKind::NavTimeout => ActionError::NavTimeout(text),
            AdapterErrorKind::TargetNotFound => ActionError::ElementNotFound(text),
            AdapterErrorKind::ScriptException => ActionError::Script(text),
            AdapterErrorKind::Internal => ActionError::Internal(text),
            AdapterErrorKind::CdpIo | AdapterErrorKind::PageClosed => ActionError::CdpIo(text),
        }
    }
}
