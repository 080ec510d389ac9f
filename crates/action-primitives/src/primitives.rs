//! Action execution
//!
//! One module per family of actions:
//! 1. navigate - visit and reload
//! 2. click - click and cookie-banner acceptance
//! 3. type_text - fill an input
//! 4. select - set a dropdown value
//! 5. script - run page JavaScript
//! 6. scroll - scroll nudge used between steps
//! 7. wait - fixed, random, selector and manual waits

mod click;
mod navigate;
mod script;
mod scroll;
mod select;
mod type_text;
mod wait;

pub use click::*;
pub use navigate::*;
pub use script::*;
pub use scroll::*;
pub use select::*;
pub use type_text::*;
pub use wait::*;

use tracing::{info, warn};

use crate::{
    errors::ActionError,
    types::{ActionCtx, ActionReport, StepAction},
};

/// Run one journey action against `ctx.page`.
pub async fn execute(ctx: &ActionCtx, action: &StepAction) -> Result<ActionReport, ActionError> {
    if ctx.is_cancelled() {
        return Err(ActionError::Interrupted("Context cancelled".to_string()));
    }

    info!(
        action_id = %ctx.action_id,
        step = %ctx.step,
        action = action.name(),
        "Executing action"
    );

    let outcome = match action {
        StepAction::Visit { url, timeout_ms } => execute_visit(ctx, url, *timeout_ms).await,
        StepAction::Reload { settle_ms } => execute_reload(ctx, *settle_ms).await,
        StepAction::Click {
            selector,
            timeout_ms,
        } => execute_click(ctx, selector, *timeout_ms).await,
        StepAction::Fill {
            selector,
            text,
            timeout_ms,
        } => execute_fill(ctx, selector, text, *timeout_ms).await,
        StepAction::Select { selector, value } => execute_select(ctx, selector, value).await,
        StepAction::RunScript {
            script,
            await_navigation,
            timeout_ms,
        } => execute_run_script(ctx, script, *await_navigation, *timeout_ms).await,
        StepAction::AcceptCookieBanner { selector } => {
            execute_accept_cookie_banner(ctx, selector).await
        }
        StepAction::Wait { ms } => execute_wait(ctx, *ms).await,
        StepAction::RandomDelay { min_ms, max_ms } => {
            execute_random_delay(ctx, *min_ms, *max_ms).await
        }
        StepAction::WaitForSelector {
            selector,
            timeout_ms,
        } => execute_wait_for_selector(ctx, selector, *timeout_ms).await,
        StepAction::ManualCheckpoint { message } => execute_manual_checkpoint(ctx, message).await,
    };

    match &outcome {
        Ok(report) => info!(
            action_id = %ctx.action_id,
            action = action.name(),
            latency_ms = report.latency_ms,
            "Action completed"
        ),
        Err(err) => warn!(
            action_id = %ctx.action_id,
            step = %ctx.step,
            action = action.name(),
            error = %err,
            "Action failed"
        ),
    }
    outcome
}
