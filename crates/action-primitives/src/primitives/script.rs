//! Custom script primitive

use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    errors::ActionError,
    types::{ActionCtx, ActionReport},
};

/// Wraps a journey script as an async function body so `return` and
/// `await` both work.
pub fn wrap_script(body: &str) -> String {
    format!("(async () => {{\n{body}\n}})()")
}

/// Execute run_script primitive
///
/// Script exceptions do not fail the action: they are logged and the
/// report carries a `null` value. When `await_navigation` is set the
/// primitive also waits for the next main-frame load.
pub async fn execute_run_script(
    ctx: &ActionCtx,
    script: &str,
    await_navigation: bool,
    timeout_ms: u64,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    let mut watch = await_navigation.then(|| ctx.cdp.navigation_watch(&ctx.page));
    let mut notes = Vec::new();

    let value = match ctx.cdp.evaluate_script(&ctx.page, &wrap_script(script)).await {
        Ok(value) => value,
        Err(err) => {
            warn!(action_id = %ctx.action_id, step = %ctx.step, error = %err, "Custom script failed");
            notes.push(format!("script error: {err}"));
            Value::Null
        }
    };

    if let Some(watch) = watch.as_mut() {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        if watch.wait_for_load(deadline).await {
            debug!(action_id = %ctx.action_id, "Script-triggered navigation loaded");
        } else {
            notes.push(format!("no page load within {timeout_ms}ms"));
        }
    }

    info!(action_id = %ctx.action_id, "Custom script executed");
    let report = ActionReport::success("run_script", started_at, start_instant.elapsed())
        .with_value(value);
    Ok(if notes.is_empty() {
        report
    } else {
        report.with_note(notes.join("; "))
    })
}
