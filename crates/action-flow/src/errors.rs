//! Journey execution error types

use action_primitives::ActionError;
use expect_gate::GateError;
use stealth::StealthError;
use thiserror::Error;

use crate::report::ReportError;

/// Journey execution errors
#[derive(Debug, Error)]
pub enum FlowError {
    /// Journey file could not be read or parsed
    #[error("Invalid journey: {0}")]
    InvalidJourney(String),

    /// Step execution failed
    #[error("Step '{step}' failed: {reason}")]
    StepFailed { step: String, reason: String },

    /// Operator (or policy) halted the run
    #[error("Run halted during '{step}': {reason}")]
    Halted { step: String, reason: String },

    /// Action primitive error
    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    /// Rule loading error
    #[error("Rule error: {0}")]
    Gate(#[from] GateError),

    /// Stealth profile error
    #[error("Stealth error: {0}")]
    Stealth(#[from] StealthError),

    /// Report sink error
    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FlowError {
    /// Halts end the run without the step-failure prompt.
    pub fn is_halt(&self) -> bool {
        matches!(self, FlowError::Halted { .. })
    }
}
