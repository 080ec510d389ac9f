//! Select primitive

use std::time::Instant;

use cdp_adapter::AdapterErrorKind;
use chrono::Utc;
use tracing::{info, warn};

use crate::{
    errors::ActionError,
    types::{ActionCtx, ActionReport},
};

/// Execute select primitive
///
/// A missing dropdown is logged and reported as a note; the journey goes on.
pub async fn execute_select(
    ctx: &ActionCtx,
    selector: &str,
    value: &str,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    match ctx.cdp.select_value(&ctx.page, selector, value).await {
        Ok(()) => {
            info!(action_id = %ctx.action_id, selector, value, "Selected option");
            Ok(ActionReport::success("select", started_at, start_instant.elapsed()))
        }
        Err(err) if err.is(AdapterErrorKind::TargetNotFound) => {
            warn!(action_id = %ctx.action_id, selector, "Dropdown not found, skipping select");
            Ok(
                ActionReport::success("select", started_at, start_instant.elapsed())
                    .with_note(format!("dropdown '{selector}' not found")),
            )
        }
        Err(err) => Err(err.into()),
    }
}
