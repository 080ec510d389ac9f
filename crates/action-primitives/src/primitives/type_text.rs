//! Fill primitive

use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::info;

use crate::{
    errors::ActionError,
    types::{ActionCtx, ActionReport},
};

/// Execute fill primitive
///
/// The field must appear within `timeout_ms`; its value is cleared, the
/// text inserted, then `change` is dispatched.
pub async fn execute_fill(
    ctx: &ActionCtx,
    selector: &str,
    text: &str,
    timeout_ms: u64,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();
    let timeout = Duration::from_millis(timeout_ms);

    if !ctx.cdp.wait_for_selector(&ctx.page, selector, timeout).await? {
        return Err(ActionError::WaitTimeout(format!(
            "field '{selector}' did not appear within {timeout_ms}ms"
        )));
    }
    ctx.cdp.fill(&ctx.page, selector, text, timeout).await?;

    info!(action_id = %ctx.action_id, selector, chars = text.chars().count(), "Filled field");
    Ok(ActionReport::success("fill", started_at, start_instant.elapsed()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::testing::ctx;
    use serde_json::json;

    #[tokio::test]
    async fn test_fill_inserts_text() {
        let (ctx, transport) = ctx().await;
        transport.respond(
            "Runtime.evaluate",
            Some("querySelector"),
            json!({ "result": { "type": "boolean", "value": true } }),
        );
        execute_fill(&ctx, "#search", "polo shirt", 500)
            .await
            .expect("fill");
        let inserted = transport.commands_named("Input.insertText");
        assert_eq!(inserted[0]["text"], json!("polo shirt"));
    }

    #[tokio::test]
    async fn test_missing_field_times_out() {
        let (ctx, transport) = ctx().await;
        let err = execute_fill(&ctx, "#nope", "x", 50).await.unwrap_err();
        assert!(matches!(err, ActionError::WaitTimeout(_)));
        assert!(transport.commands_named("Input.insertText").is_empty());
    }
}
