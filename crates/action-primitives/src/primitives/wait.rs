//! Wait primitives - fixed and randomised delays, selector waits, manual checkpoints

use std::time::{Duration, Instant};

use beaconcheck_core_types::{Decision, DecisionPrompt};
use chrono::Utc;
use rand::Rng;
use tracing::{debug, info};

use crate::{
    errors::ActionError,
    types::{ActionCtx, ActionReport},
};

/// Sleeps for `duration` unless the run is cancelled first.
pub async fn interruptible_sleep(ctx: &ActionCtx, duration: Duration) -> Result<(), ActionError> {
    tokio::select! {
        _ = tokio::time::sleep(duration) => Ok(()),
        _ = ctx.cancel_token.cancelled() => Err(ActionError::Interrupted(format!(
            "cancelled during {}ms wait",
            duration.as_millis()
        ))),
    }
}

/// Picks a delay uniformly from `[min_ms, max_ms)`; reversed bounds are swapped.
pub fn random_delay_ms(min_ms: u64, max_ms: u64) -> u64 {
    let (low, high) = if min_ms <= max_ms {
        (min_ms, max_ms)
    } else {
        (max_ms, min_ms)
    };
    if low == high {
        return low;
    }
    rand::thread_rng().gen_range(low..high)
}

pub async fn execute_wait(ctx: &ActionCtx, ms: u64) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();
    interruptible_sleep(ctx, Duration::from_millis(ms)).await?;
    Ok(ActionReport::success("wait", started_at, start_instant.elapsed()))
}

pub async fn execute_random_delay(
    ctx: &ActionCtx,
    min_ms: u64,
    max_ms: u64,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();
    let ms = random_delay_ms(min_ms, max_ms);
    debug!(action_id = %ctx.action_id, ms, "Random delay");
    interruptible_sleep(ctx, Duration::from_millis(ms)).await?;
    Ok(
        ActionReport::success("random_delay", started_at, start_instant.elapsed())
            .with_note(format!("{ms}ms")),
    )
}

/// Waits for a selector; absence after the timeout is a note, not a failure.
pub async fn execute_wait_for_selector(
    ctx: &ActionCtx,
    selector: &str,
    timeout_ms: u64,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();
    let found = ctx
        .cdp
        .wait_for_selector(&ctx.page, selector, Duration::from_millis(timeout_ms))
        .await?;
    let report = ActionReport::success("wait_for_selector", started_at, start_instant.elapsed());
    if found {
        Ok(report)
    } else {
        debug!(action_id = %ctx.action_id, selector, "Selector never appeared");
        Ok(report.with_note(format!("'{selector}' not found within {timeout_ms}ms")))
    }
}

/// Hands control to the operator and waits for their decision.
pub async fn execute_manual_checkpoint(
    ctx: &ActionCtx,
    message: &str,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();
    info!(action_id = %ctx.action_id, step = %ctx.step, "Manual checkpoint: {message}");

    let prompt = DecisionPrompt::ManualCheckpoint {
        step: ctx.step.clone(),
        message: message.to_string(),
    };
    match ctx.decision.decide(prompt).await {
        Decision::Continue => Ok(ActionReport::success(
            "manual_checkpoint",
            started_at,
            start_instant.elapsed(),
        )),
        Decision::Halt => Err(ActionError::Halted(format!(
            "operator halted at checkpoint: {message}"
        ))),
    }
}
