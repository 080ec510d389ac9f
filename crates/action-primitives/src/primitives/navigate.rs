//! Navigate primitives - visit a URL, reload the page

use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{
    errors::ActionError,
    primitives::wait::interruptible_sleep,
    types::{ActionCtx, ActionReport},
};

const RELOAD_DEADLINE: Duration = Duration::from_secs(30);

/// Execute visit primitive
///
/// Navigates the page and waits for the main-frame load event. A load that
/// does not happen within `timeout_ms` fails the action.
pub async fn execute_visit(
    ctx: &ActionCtx,
    url: &str,
    timeout_ms: u64,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    if !validate_url(url) {
        return Err(ActionError::Invalid(format!("Invalid URL: '{url}'")));
    }

    debug!(action_id = %ctx.action_id, url, "Issuing navigate");
    ctx.cdp
        .navigate(&ctx.page, url, Duration::from_millis(timeout_ms))
        .await?;

    info!(action_id = %ctx.action_id, url, "Visited page");
    Ok(ActionReport::success("visit", started_at, start_instant.elapsed()))
}

/// Execute reload primitive
///
/// Reload failures are logged and the action still succeeds; the settle
/// wait runs either way so delayed beacons can land.
pub async fn execute_reload(ctx: &ActionCtx, settle_ms: u64) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    let note = match ctx.cdp.reload(&ctx.page, RELOAD_DEADLINE).await {
        Ok(()) => None,
        Err(err) => {
            warn!(action_id = %ctx.action_id, error = %err, "Reload failed, continuing anyway");
            Some(format!("reload failed: {err}"))
        }
    };

    interruptible_sleep(ctx, Duration::from_millis(settle_ms)).await?;

    let report = ActionReport::success("reload", started_at, start_instant.elapsed());
    Ok(match note {
        Some(note) => report.with_note(note),
        None => report,
    })
}

fn validate_url(url: &str) -> bool {
    ["http://", "https://", "file://", "about:"]
        .iter()
        .any(|scheme| url.starts_with(scheme))
}
