//! Click primitives

use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info};

use crate::{
    errors::ActionError,
    types::{ActionCtx, ActionReport},
};

const BANNER_CLICK_DEADLINE: Duration = Duration::from_secs(5);

/// Execute click primitive
///
/// Waits up to `timeout_ms` for the element, scrolls it into view and
/// dispatches a real mouse click at its centre.
pub async fn execute_click(
    ctx: &ActionCtx,
    selector: &str,
    timeout_ms: u64,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    ctx.cdp
        .click(&ctx.page, selector, Duration::from_millis(timeout_ms))
        .await?;

    info!(action_id = %ctx.action_id, selector, "Clicked element");
    Ok(ActionReport::success("click", started_at, start_instant.elapsed()))
}

/// Click the consent button if the banner is showing.
pub async fn execute_accept_cookie_banner(
    ctx: &ActionCtx,
    selector: &str,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    if !ctx.cdp.element_exists(&ctx.page, selector).await? {
        debug!(action_id = %ctx.action_id, selector, "No cookie banner present");
        return Ok(
            ActionReport::success("accept_cookie_banner", started_at, start_instant.elapsed())
                .with_note("banner not present"),
        );
    }

    ctx.cdp
        .click(&ctx.page, selector, BANNER_CLICK_DEADLINE)
        .await?;
    info!(action_id = %ctx.action_id, "Cookie banner accepted");
    Ok(ActionReport::success(
        "accept_cookie_banner",
        started_at,
        start_instant.elapsed(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::testing::ctx;
    use serde_json::json;

    #[tokio::test]
    async fn test_missing_banner_is_skipped() {
        let (ctx, transport) = ctx().await;
        transport.respond(
            "Runtime.evaluate",
            Some("querySelector"),
            json!({ "result": { "type": "boolean", "value": false } }),
        );
        let report = execute_accept_cookie_banner(&ctx, "button#onetrust-accept-btn-handler")
            .await
            .expect("skipped");
        assert_eq!(report.note.as_deref(), Some("banner not present"));
        assert!(transport.commands_named("Input.dispatchMouseEvent").is_empty());
    }

    #[tokio::test]
    async fn test_click_dispatches_mouse_events() {
        let (ctx, transport) = ctx().await;
        transport.respond(
            "Runtime.evaluate",
            Some("getBoundingClientRect"),
            json!({ "result": { "type": "object", "value": { "x": 10.0, "y": 20.0 } } }),
        );
        execute_click(&ctx, "#buy", 1_000).await.expect("click");
        let events = transport.commands_named("Input.dispatchMouseEvent");
        assert_eq!(events.len(), 3);
        assert_eq!(events[1]["type"], json!("mousePressed"));
        assert_eq!(events[1]["x"], json!(10.0));
    }
}
