//! Core types for journey orchestration

use std::fmt;
use std::path::Path;

use action_primitives::{ActionReport, StepAction};
use beacon_tap::CapturedHits;
use chrono::{DateTime, Utc};
use expect_gate::{PlatformValidation, Verdict};
use serde::{Deserialize, Serialize};

use crate::errors::FlowError;

/// Journey definition - an ordered list of named steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Journey {
    /// Journey name, used in report file names
    pub name: String,

    /// Visited at the start of the first step when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_url: Option<String>,

    pub steps: Vec<JourneyStep>,
}

impl Journey {
    /// Create a new journey
    pub fn new(name: impl Into<String>, steps: Vec<JourneyStep>) -> Self {
        Self {
            name: name.into(),
            start_url: None,
            steps,
        }
    }

    /// Set start URL
    pub fn with_start_url(mut self, url: impl Into<String>) -> Self {
        self.start_url = Some(url.into());
        self
    }

    /// Read a journey file; JSON is tried first, then YAML.
    pub fn load(path: &Path) -> Result<Self, FlowError> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            FlowError::InvalidJourney(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, FlowError> {
        let journey: Journey = match serde_json::from_str(text) {
            Ok(journey) => journey,
            Err(_) => serde_yaml::from_str(text)
                .map_err(|err| FlowError::InvalidJourney(err.to_string()))?,
        };
        journey.validate()?;
        Ok(journey)
    }

    /// Step names must be unique and non-empty since rules are keyed by them.
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.steps.is_empty() {
            return Err(FlowError::InvalidJourney(format!(
                "journey '{}' has no steps",
                self.name
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for step in &self.steps {
            if step.name.trim().is_empty() {
                return Err(FlowError::InvalidJourney("step with empty name".into()));
            }
            if !seen.insert(step.name.as_str()) {
                return Err(FlowError::InvalidJourney(format!(
                    "duplicate step name '{}'",
                    step.name
                )));
            }
        }
        Ok(())
    }

    /// Actions of step `index`, with the start URL visit prepended to the first step.
    pub fn actions_for(&self, index: usize) -> Vec<StepAction> {
        let Some(step) = self.steps.get(index) else {
            return Vec::new();
        };
        let mut actions = Vec::with_capacity(step.actions.len() + 1);
        if index == 0 {
            if let Some(url) = &self.start_url {
                actions.push(StepAction::visit(url));
            }
        }
        actions.extend(step.actions.iter().cloned());
        actions
    }
}

/// One step of a journey
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JourneyStep {
    pub name: String,

    /// `- click: { selector: ... }` in both JSON and YAML
    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    pub actions: Vec<StepAction>,

    /// Overrides [`FlowTimings::settle_ms`] for this step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settle_ms: Option<u64>,

    /// Overrides [`FlowTimings::navigation_timeout_ms`] for this step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation_timeout_ms: Option<u64>,
}

impl JourneyStep {
    pub fn new(name: impl Into<String>, actions: Vec<StepAction>) -> Self {
        Self {
            name: name.into(),
            actions,
            settle_ms: None,
            navigation_timeout_ms: None,
        }
    }

    pub fn with_settle_ms(mut self, ms: u64) -> Self {
        self.settle_ms = Some(ms);
        self
    }
}

/// Waits applied around every step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowTimings {
    /// How long after the step starts a navigation still counts
    pub navigation_timeout_ms: u64,
    /// Scroll distance of the nudge when the step did not navigate
    pub scroll_nudge_px: i64,
    /// Pause after each nudge scroll
    pub scroll_pause_ms: u64,
    /// Settling delay before the capture window closes
    pub settle_ms: u64,
    /// Extra wait after the last bot check so in-flight beacons land
    pub late_beacon_grace_ms: u64,
}

impl Default for FlowTimings {
    fn default() -> Self {
        Self {
            navigation_timeout_ms: 5_000,
            scroll_nudge_px: 100,
            scroll_pause_ms: 500,
            settle_ms: 8_000,
            late_beacon_grace_ms: 1_000,
        }
    }
}

impl FlowTimings {
    /// Timings with the step's overrides applied.
    pub fn for_step(&self, step: &JourneyStep) -> Self {
        Self {
            settle_ms: step.settle_ms.unwrap_or(self.settle_ms),
            navigation_timeout_ms: step
                .navigation_timeout_ms
                .unwrap_or(self.navigation_timeout_ms),
            ..*self
        }
    }
}

/// Per-step state machine phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPhase {
    Idle,
    ListenersAttached,
    ActionRunning,
    NavigationSettled,
    ScrollNudged,
    BotCheckCleared,
    CapturePending,
    Finalized,
}

impl StepPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepPhase::Idle => "idle",
            StepPhase::ListenersAttached => "listeners_attached",
            StepPhase::ActionRunning => "action_running",
            StepPhase::NavigationSettled => "navigation_settled",
            StepPhase::ScrollNudged => "scroll_nudged",
            StepPhase::BotCheckCleared => "bot_check_cleared",
            StepPhase::CapturePending => "capture_pending",
            StepPhase::Finalized => "finalized",
        }
    }
}

impl fmt::Display for StepPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Finalized outcome of one step
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub step: String,
    /// Position of the step in the journey
    pub index: usize,
    pub hits: CapturedHits,
    /// One entry per platform that got a report section
    pub validations: Vec<PlatformValidation>,
    /// Whether a navigation was observed during the action window
    pub navigated: bool,
    /// Number of bot checks that had to be cleared
    pub challenges: usize,
    pub actions: Vec<ActionReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl StepResult {
    pub fn verdicts(&self) -> impl Iterator<Item = &Verdict> {
        self.validations.iter().flat_map(|v| v.verdicts.iter())
    }

    pub fn failures(&self) -> impl Iterator<Item = &Verdict> {
        self.verdicts().filter(|v| !v.passed)
    }

    pub fn passed(&self) -> bool {
        self.validations.iter().all(|v| v.passed)
    }

    pub fn validation(&self, platform: beaconcheck_core_types::Platform) -> Option<&PlatformValidation> {
        self.validations.iter().find(|v| v.platform == platform)
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Halted { step: String, reason: String },
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }
}
