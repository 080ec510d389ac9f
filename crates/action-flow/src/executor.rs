//! Journey executor implementation

use std::sync::Arc;
use std::time::{Duration, Instant};

use action_primitives::{execute, scroll_by, ActionCtx, ActionReport};
use async_trait::async_trait;
use beacon_tap::{CapturedHits, HitSink, ListenerManager, StepCapture};
use beaconcheck_core_types::{Decision, DecisionPrompt, ExternalDecision, Platform};
use cdp_adapter::{Cdp, PageId};
use chrono::Utc;
use expect_gate::{PlatformValidation, RuleEngine};
use serde::{Deserialize, Serialize};
use stealth::StealthControl;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::aggregate::{RunSnapshot, RunState};
use crate::errors::FlowError;
use crate::guard::{BotCheckGuard, GuardPoint};
use crate::report::{NullReportSink, ReportSink};
use crate::types::{FlowTimings, Journey, RunOutcome, StepPhase, StepResult};

/// Journey runner trait
#[async_trait]
pub trait JourneyRunner: Send + Sync {
    /// Run every step of `journey` on `page`
    async fn run(&self, page: &PageId, journey: &Journey) -> Result<RunReport, FlowError>;

    /// Validate journey structure
    fn validate_journey(&self, journey: &Journey) -> Result<(), FlowError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationOptions {
    /// Validate platforms that have a rule but captured nothing
    pub require_hits_for_rules: bool,
}

/// Everything a finished run hands back
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub snapshot: RunSnapshot,
    pub steps: Vec<StepResult>,
}

impl RunReport {
    /// Completed with no failing verdict
    pub fn passed(&self) -> bool {
        self.outcome.is_completed() && !self.snapshot.has_failures()
    }
}

/// Default journey executor: one step at a time, one page.
pub struct JourneyExecutor {
    cdp: Arc<dyn Cdp>,
    listeners: Arc<ListenerManager>,
    engine: RuleEngine,
    guard: BotCheckGuard,
    decision: Arc<dyn ExternalDecision>,
    sink: Arc<dyn ReportSink>,
    timings: FlowTimings,
    validation: ValidationOptions,
    cancel: CancellationToken,
}

impl JourneyExecutor {
    pub fn new(
        cdp: Arc<dyn Cdp>,
        listeners: Arc<ListenerManager>,
        engine: RuleEngine,
        stealth: Arc<dyn StealthControl>,
        decision: Arc<dyn ExternalDecision>,
    ) -> Self {
        Self {
            cdp,
            listeners,
            engine,
            guard: BotCheckGuard::new(stealth, decision.clone()),
            decision,
            sink: Arc::new(NullReportSink),
            timings: FlowTimings::default(),
            validation: ValidationOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_timings(mut self, timings: FlowTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn with_validation(mut self, validation: ValidationOptions) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn timings(&self) -> &FlowTimings {
        &self.timings
    }

    fn enter(&self, step: &str, phase: StepPhase) {
        debug!(step, phase = %phase, "step phase");
    }

    /// Sleeps unless the run is cancelled.
    async fn pause(&self, step: &str, ms: u64) -> Result<(), FlowError> {
        if ms == 0 {
            return Ok(());
        }
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(()),
            _ = self.cancel.cancelled() => Err(FlowError::Halted {
                step: step.to_string(),
                reason: "run cancelled".to_string(),
            }),
        }
    }

    /// Executes one step through the full phase sequence.
    async fn run_step(
        &self,
        page: &PageId,
        journey: &Journey,
        index: usize,
    ) -> Result<StepResult, FlowError> {
        let step = &journey.steps[index];
        let name = step.name.as_str();
        let timings = self.timings.for_step(step);
        let started_at = Utc::now();
        let start = Instant::now();
        info!(step = name, index, "Running step");
        self.enter(name, StepPhase::Idle);

        let capture = Arc::new(StepCapture::new(name));
        self.listeners
            .attach(page, capture.clone() as Arc<dyn HitSink>);
        self.enter(name, StepPhase::ListenersAttached);

        // Subscribe before acting so a navigation fired by the first action counts.
        let mut watch = self.cdp.navigation_watch(page);
        self.enter(name, StepPhase::ActionRunning);
        let actions = self.run_actions(page, journey, index).await?;

        let nav_deadline = start + Duration::from_millis(timings.navigation_timeout_ms);
        let navigated = watch.wait_until(nav_deadline).await;
        debug!(step = name, navigated, "navigation race settled");
        self.enter(name, StepPhase::NavigationSettled);

        let mut challenges = 0;
        challenges += usize::from(self.guard.clear(page, name, GuardPoint::AfterAction).await?);

        if !navigated {
            self.scroll_nudge(page, name, &timings).await?;
            self.enter(name, StepPhase::ScrollNudged);
        }
        challenges += usize::from(
            self.guard
                .clear(page, name, GuardPoint::AfterScrollNudge)
                .await?,
        );
        self.enter(name, StepPhase::BotCheckCleared);

        self.enter(name, StepPhase::CapturePending);
        self.pause(name, timings.settle_ms).await?;
        challenges += usize::from(self.guard.clear(page, name, GuardPoint::AfterSettle).await?);
        self.pause(name, timings.late_beacon_grace_ms).await?;

        let hits = capture.freeze();
        self.enter(name, StepPhase::Finalized);
        if hits.is_empty() {
            info!(step = name, "No hits found for step");
        }
        let validations = self.validate(name, &hits);

        Ok(StepResult {
            step: name.to_string(),
            index,
            hits,
            validations,
            navigated,
            challenges,
            actions,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn run_actions(
        &self,
        page: &PageId,
        journey: &Journey,
        index: usize,
    ) -> Result<Vec<ActionReport>, FlowError> {
        let step = &journey.steps[index].name;
        let ctx = ActionCtx::new(
            self.cdp.clone(),
            page.clone(),
            self.decision.clone(),
            step.as_str(),
            self.cancel.child_token(),
        );
        let mut reports = Vec::new();
        for action in journey.actions_for(index) {
            let report = execute(&ctx.next_action(), &action)
                .await
                .map_err(|err| FlowError::StepFailed {
                    step: step.clone(),
                    reason: format!("{} failed: {err}", action.name()),
                })?;
            reports.push(report);
        }
        Ok(reports)
    }

    /// Scrolls down then back up to fire scroll-bound beacons.
    ///
    /// A page context that went away during the scroll is not a failure.
    async fn scroll_nudge(&self, page: &PageId, step: &str, timings: &FlowTimings) -> Result<(), FlowError> {
        let px = timings.scroll_nudge_px;
        for dy in [px, -px] {
            if let Err(err) = scroll_by(self.cdp.as_ref(), page, dy).await {
                debug!(step, error = %err, "Skipping scroll nudge (page context changed)");
                return Ok(());
            }
            self.pause(step, timings.scroll_pause_ms).await?;
        }
        Ok(())
    }

    /// One validation per platform with hits, plus platforms with rules when
    /// hits are required.
    fn validate(&self, step: &str, hits: &CapturedHits) -> Vec<PlatformValidation> {
        let mut validations = Vec::new();
        for platform in Platform::ALL {
            let platform_hits = hits.get(platform);
            let required =
                self.validation.require_hits_for_rules && self.engine.has_rule(platform, step);
            if platform_hits.is_empty() && !required {
                continue;
            }
            let validation = self.engine.validate_platform(step, platform, platform_hits);
            if validation.passed {
                info!(step, platform = platform.label(), hits = platform_hits.len(), "Validation passed");
            } else {
                warn!(
                    step,
                    platform = platform.label(),
                    hits = platform_hits.len(),
                    failures = validation.failures().count(),
                    "Validation failed"
                );
            }
            validations.push(validation);
        }
        validations
    }

    fn flush_partial(&self, state: &RunState, finalized: &[StepResult]) {
        match self.sink.export_partial(&state.snapshot(), finalized) {
            Ok(()) => info!(steps = finalized.len(), "Partial results exported"),
            Err(err) => error!(error = %err, "Partial export failed"),
        }
    }
}

#[async_trait]
impl JourneyRunner for JourneyExecutor {
    async fn run(&self, page: &PageId, journey: &Journey) -> Result<RunReport, FlowError> {
        self.validate_journey(journey)?;
        let mut state = RunState::new(&journey.name);
        let mut finalized: Vec<StepResult> = Vec::new();
        let mut outcome = RunOutcome::Completed;
        info!(
            journey = %journey.name,
            run_id = state.run_id(),
            steps = journey.steps.len(),
            "Starting journey"
        );

        for (index, step) in journey.steps.iter().enumerate() {
            match self.run_step(page, journey, index).await {
                Ok(result) => {
                    state.accumulate(&result);
                    if let Err(err) = self.sink.record_step(&result) {
                        warn!(step = %step.name, error = %err, "Recording step failed");
                    }
                    finalized.push(result);
                }
                Err(FlowError::Halted { step, reason }) => {
                    warn!(step = %step, %reason, "Run halted");
                    self.flush_partial(&state, &finalized);
                    outcome = RunOutcome::Halted { step, reason };
                    break;
                }
                Err(err) => {
                    error!(step = %step.name, error = %err, "Step failed");
                    self.flush_partial(&state, &finalized);
                    let prompt = DecisionPrompt::StepFailed {
                        step: step.name.clone(),
                        error: err.to_string(),
                    };
                    match self.decision.decide(prompt).await {
                        Decision::Continue => {
                            info!(step = %step.name, "Continuing with next step");
                        }
                        Decision::Halt => {
                            outcome = RunOutcome::Halted {
                                step: step.name.clone(),
                                reason: err.to_string(),
                            };
                            break;
                        }
                    }
                }
            }
        }

        self.listeners.release_page(page);
        let snapshot = state.snapshot();
        info!(
            run_id = %snapshot.run_id,
            hits = snapshot.hits.len(),
            failures = snapshot.failures.len(),
            completed = outcome.is_completed(),
            "Journey finished"
        );
        self.sink.export_final(&snapshot, &finalized)?;

        Ok(RunReport {
            outcome,
            snapshot,
            steps: finalized,
        })
    }

    fn validate_journey(&self, journey: &Journey) -> Result<(), FlowError> {
        journey.validate()?;
        for step in &journey.steps {
            let has_any_rule = Platform::ALL
                .iter()
                .any(|platform| self.engine.has_rule(*platform, &step.name));
            if !has_any_rule {
                debug!(step = %step.name, "no rules declared for step");
            }
        }
        Ok(())
    }
}
