//! Human-in-the-loop decisions raised by the step orchestrator.
//!
//! The pipeline never prompts directly; it hands a [`DecisionPrompt`] to an
//! [`ExternalDecision`] implementation and acts on the returned [`Decision`].

use std::fmt;

use async_trait::async_trait;

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DecisionPrompt {
    /// An interstitial challenge was detected and must be cleared before capture continues.
    BotChallenge { step: String, reason: String },
    /// A step action failed; partial results have already been exported.
    StepFailed { step: String, error: String },
    /// A journey action asked for manual confirmation.
    ManualCheckpoint { step: String, message: String },
}

impl DecisionPrompt {
    pub fn step(&self) -> &str {
        match self {
            DecisionPrompt::BotChallenge { step, .. }
            | DecisionPrompt::StepFailed { step, .. }
            | DecisionPrompt::ManualCheckpoint { step, .. } => step,
        }
    }
}

impl fmt::Display for DecisionPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionPrompt::BotChallenge { step, reason } => {
                write!(f, "bot check detected during '{step}': {reason}")
            }
            DecisionPrompt::StepFailed { step, error } => {
                write!(f, "step '{step}' failed: {error}")
            }
            DecisionPrompt::ManualCheckpoint { step, message } => {
                write!(f, "manual checkpoint in '{step}': {message}")
            }
        }
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Decision {
    Continue,
    Halt,
}

impl Decision {
    pub fn is_continue(self) -> bool {
        matches!(self, Decision::Continue)
    }
}

/// Blocking (from the run's point of view) source of continue/halt answers.
#[async_trait]
pub trait ExternalDecision: Send + Sync {
    async fn decide(&self, prompt: DecisionPrompt) -> Decision;
}
