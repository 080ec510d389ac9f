//! Scroll helper

use cdp_adapter::{scripts, Cdp, PageId};
use tracing::debug;

use crate::errors::ActionError;

/// Scrolls the window vertically by `dy` pixels.
pub async fn scroll_by(cdp: &dyn Cdp, page: &PageId, dy: i64) -> Result<(), ActionError> {
    cdp.evaluate_script(page, &scripts::scroll_by(dy)).await?;
    debug!(%page, dy, "Scrolled window");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::testing::ctx;

    #[tokio::test]
    async fn test_scroll_evaluates_scroll_by() {
        let (ctx, transport) = ctx().await;
        scroll_by(ctx.cdp.as_ref(), &ctx.page, 400).await.expect("scroll");
        scroll_by(ctx.cdp.as_ref(), &ctx.page, -400).await.expect("scroll back");
        let evaluated = transport.commands_named("Runtime.evaluate");
        assert_eq!(evaluated[0]["expression"], "window.scrollBy(0, 400)");
        assert_eq!(evaluated[1]["expression"], "window.scrollBy(0, -400)");
    }
}
