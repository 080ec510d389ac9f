//! Bot-check guard

use std::fmt;
use std::sync::Arc;

use beaconcheck_core_types::{Decision, DecisionPrompt, ExternalDecision};
use cdp_adapter::PageId;
use stealth::StealthControl;
use tracing::{debug, info, warn};

use crate::errors::FlowError;

/// Where in the step the guard runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardPoint {
    AfterAction,
    AfterScrollNudge,
    AfterSettle,
}

impl fmt::Display for GuardPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GuardPoint::AfterAction => "after action",
            GuardPoint::AfterScrollNudge => "after scroll nudge",
            GuardPoint::AfterSettle => "after settle",
        })
    }
}

/// Blocks the run while an interstitial challenge is showing.
#[derive(Clone)]
pub struct BotCheckGuard {
    stealth: Arc<dyn StealthControl>,
    decision: Arc<dyn ExternalDecision>,
}

impl BotCheckGuard {
    pub fn new(stealth: Arc<dyn StealthControl>, decision: Arc<dyn ExternalDecision>) -> Self {
        Self { stealth, decision }
    }

    /// Returns whether a challenge had to be cleared. `Halt` ends the run.
    pub async fn clear(&self, page: &PageId, step: &str, point: GuardPoint) -> Result<bool, FlowError> {
        let Some(challenge) = self.stealth.detect_challenge(page).await else {
            debug!(step, %point, "no bot check");
            return Ok(false);
        };

        let reason = challenge.reason();
        warn!(step, %point, %reason, "bot check detected, waiting for resolution");
        let prompt = DecisionPrompt::BotChallenge {
            step: step.to_string(),
            reason: reason.clone(),
        };
        match self.decision.decide(prompt).await {
            Decision::Continue => {
                info!(step, %point, "bot check cleared, continuing");
                Ok(true)
            }
            Decision::Halt => Err(FlowError::Halted {
                step: step.to_string(),
                reason: format!("bot check {point}: {reason}"),
            }),
        }
    }
}
