//! Non-interactive decision policies

use std::collections::VecDeque;

use async_trait::async_trait;
use beaconcheck_core_types::{Decision, DecisionPrompt, ExternalDecision};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Answers every prompt from fixed per-kind settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoDecision {
    pub on_step_failure: Decision,
    pub on_bot_challenge: Decision,
    pub on_manual_checkpoint: Decision,
}

impl Default for AutoDecision {
    fn default() -> Self {
        Self {
            on_step_failure: Decision::Continue,
            on_bot_challenge: Decision::Halt,
            on_manual_checkpoint: Decision::Continue,
        }
    }
}

impl AutoDecision {
    pub fn answer(&self, prompt: &DecisionPrompt) -> Decision {
        match prompt {
            DecisionPrompt::StepFailed { .. } => self.on_step_failure,
            DecisionPrompt::BotChallenge { .. } => self.on_bot_challenge,
            DecisionPrompt::ManualCheckpoint { .. } => self.on_manual_checkpoint,
        }
    }
}

#[async_trait]
impl ExternalDecision for AutoDecision {
    async fn decide(&self, prompt: DecisionPrompt) -> Decision {
        let decision = self.answer(&prompt);
        match decision {
            Decision::Continue => info!(%prompt, "auto decision: continue"),
            Decision::Halt => warn!(%prompt, "auto decision: halt"),
        }
        decision
    }
}

/// Pops answers from a queue and records every prompt it saw.
#[derive(Debug)]
pub struct ScriptedDecision {
    answers: Mutex<VecDeque<Decision>>,
    fallback: Decision,
    prompts: Mutex<Vec<DecisionPrompt>>,
}

impl ScriptedDecision {
    pub fn new(answers: impl IntoIterator<Item = Decision>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            fallback: Decision::Continue,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answer used once the queue is empty
    pub fn with_fallback(mut self, fallback: Decision) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn prompts(&self) -> Vec<DecisionPrompt> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl ExternalDecision for ScriptedDecision {
    async fn decide(&self, prompt: DecisionPrompt) -> Decision {
        self.prompts.lock().push(prompt);
        self.answers.lock().pop_front().unwrap_or(self.fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed() -> DecisionPrompt {
        DecisionPrompt::StepFailed {
            step: "PLP".into(),
            error: "timeout".into(),
        }
    }

    #[tokio::test]
    async fn test_auto_decision_per_kind() {
        let auto = AutoDecision::default();
        assert_eq!(auto.decide(failed()).await, Decision::Continue);
        let bot = DecisionPrompt::BotChallenge {
            step: "PLP".into(),
            reason: "Press & Hold".into(),
        };
        assert_eq!(auto.decide(bot).await, Decision::Halt);

        let strict: AutoDecision =
            serde_yaml::from_str("on_step_failure: halt").expect("policy parses");
        assert_eq!(strict.answer(&failed()), Decision::Halt);
        assert_eq!(strict.on_bot_challenge, Decision::Halt);
    }

    #[tokio::test]
    async fn test_scripted_decision_queue() {
        let scripted = ScriptedDecision::new([Decision::Halt]);
        assert_eq!(scripted.decide(failed()).await, Decision::Halt);
        assert_eq!(scripted.decide(failed()).await, Decision::Continue);
        assert_eq!(scripted.prompts().len(), 2);
    }
}
