//! Core data types for journey actions

use std::sync::Arc;
use std::time::Duration;

use beaconcheck_core_types::ExternalDecision;
use cdp_adapter::{Cdp, PageId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

pub const COOKIE_BANNER_SELECTOR: &str = "button#onetrust-accept-btn-handler";

/// Execution context for one action
///
/// Carries the driver, the target page, the decision channel for manual
/// checkpoints and a cancellation token shared with the run.
#[derive(Clone)]
pub struct ActionCtx {
    pub cdp: Arc<dyn Cdp>,
    pub page: PageId,
    pub decision: Arc<dyn ExternalDecision>,
    /// Step the action belongs to
    pub step: String,
    pub cancel_token: CancellationToken,
    /// Unique identifier for this action
    pub action_id: String,
}

impl ActionCtx {
    pub fn new(
        cdp: Arc<dyn Cdp>,
        page: PageId,
        decision: Arc<dyn ExternalDecision>,
        step: impl Into<String>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            cdp,
            page,
            decision,
            step: step.into(),
            cancel_token,
            action_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Same context with a fresh action id.
    pub fn next_action(&self) -> Self {
        Self {
            action_id: uuid::Uuid::new_v4().to_string(),
            ..self.clone()
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// One journey action
///
/// Externally tagged in journey files:
/// `- click: { selector: "#buy" }`, `- wait: { ms: 500 }`. YAML readers need
/// `serde_yaml::with::singleton_map_recursive` to accept that shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    /// Navigate and wait for the load event
    Visit {
        url: String,
        #[serde(default = "defaults::visit_timeout_ms")]
        timeout_ms: u64,
    },

    /// Reload; failures are logged and tolerated
    Reload {
        #[serde(default = "defaults::reload_settle_ms")]
        settle_ms: u64,
    },

    Click {
        selector: String,
        #[serde(default = "defaults::click_timeout_ms")]
        timeout_ms: u64,
    },

    /// Wait for the field, then replace its value
    Fill {
        selector: String,
        text: String,
        #[serde(default = "defaults::fill_timeout_ms")]
        timeout_ms: u64,
    },

    /// Set a `<select>` value and fire the events frameworks listen to
    Select { selector: String, value: String },

    /// Run a function body in the page; errors are logged and yield `null`
    RunScript {
        script: String,
        #[serde(default)]
        await_navigation: bool,
        #[serde(default = "defaults::script_navigation_timeout_ms")]
        timeout_ms: u64,
    },

    /// Click the consent button when it is present
    AcceptCookieBanner {
        #[serde(default = "defaults::cookie_selector")]
        selector: String,
    },

    Wait { ms: u64 },

    RandomDelay {
        #[serde(default = "defaults::random_min_ms")]
        min_ms: u64,
        #[serde(default = "defaults::random_max_ms")]
        max_ms: u64,
    },

    /// A missing element is not an error
    WaitForSelector {
        selector: String,
        #[serde(default = "defaults::wait_selector_timeout_ms")]
        timeout_ms: u64,
    },

    /// Block until the operator confirms
    ManualCheckpoint { message: String },
}

impl StepAction {
    pub fn visit(url: impl Into<String>) -> Self {
        StepAction::Visit {
            url: url.into(),
            timeout_ms: defaults::visit_timeout_ms(),
        }
    }

    pub fn click(selector: impl Into<String>) -> Self {
        StepAction::Click {
            selector: selector.into(),
            timeout_ms: defaults::click_timeout_ms(),
        }
    }

    pub fn run_script(script: impl Into<String>) -> Self {
        StepAction::RunScript {
            script: script.into(),
            await_navigation: false,
            timeout_ms: defaults::script_navigation_timeout_ms(),
        }
    }

    /// Short name used in logs and reports
    pub fn name(&self) -> &'static str {
        match self {
            StepAction::Visit { .. } => "visit",
            StepAction::Reload { .. } => "reload",
            StepAction::Click { .. } => "click",
            StepAction::Fill { .. } => "fill",
            StepAction::Select { .. } => "select",
            StepAction::RunScript { .. } => "run_script",
            StepAction::AcceptCookieBanner { .. } => "accept_cookie_banner",
            StepAction::Wait { .. } => "wait",
            StepAction::RandomDelay { .. } => "random_delay",
            StepAction::WaitForSelector { .. } => "wait_for_selector",
            StepAction::ManualCheckpoint { .. } => "manual_checkpoint",
        }
    }
}

mod defaults {
    use super::COOKIE_BANNER_SELECTOR;

    pub fn visit_timeout_ms() -> u64 {
        60_000
    }

    pub fn reload_settle_ms() -> u64 {
        3_000
    }

    pub fn click_timeout_ms() -> u64 {
        30_000
    }

    pub fn fill_timeout_ms() -> u64 {
        5_000
    }

    pub fn script_navigation_timeout_ms() -> u64 {
        30_000
    }

    pub fn cookie_selector() -> String {
        COOKIE_BANNER_SELECTOR.to_string()
    }

    pub fn random_min_ms() -> u64 {
        500
    }

    pub fn random_max_ms() -> u64 {
        1_500
    }

    pub fn wait_selector_timeout_ms() -> u64 {
        10_000
    }
}

/// Result of an executed action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionReport {
    pub action: String,
    pub started_at: DateTime<Utc>,
    pub latency_ms: u64,
    /// Script result for `run_script`
    #[serde(default)]
    pub value: Option<Value>,
    /// Human readable outcome when the action did something other than the obvious
    #[serde(default)]
    pub note: Option<String>,
}

impl ActionReport {
    pub fn success(action: &str, started_at: DateTime<Utc>, latency: Duration) -> Self {
        Self {
            action: action.to_string(),
            started_at,
            latency_ms: latency.as_millis() as u64,
            value: None,
            note: None,
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_journey_yaml_uses_defaults() {
        let actions: Vec<StepAction> = serde_yaml::with::singleton_map_recursive::deserialize(
            serde_yaml::Deserializer::from_str(
                r##"
- visit: { url: "https://shop.test/" }
- accept_cookie_banner: {}
- fill: { selector: "#q", text: polo }
- run_script: { script: "return 1" }
- random_delay: {}
"##,
            ),
        )
        .expect("actions parse");

        assert_eq!(
            actions[0],
            StepAction::Visit {
                url: "https://shop.test/".into(),
                timeout_ms: 60_000
            }
        );
        assert_eq!(
            actions[1],
            StepAction::AcceptCookieBanner {
                selector: COOKIE_BANNER_SELECTOR.into()
            }
        );
        assert!(matches!(actions[2], StepAction::Fill { timeout_ms: 5_000, .. }));
        assert!(matches!(
            actions[3],
            StepAction::RunScript {
                await_navigation: false,
                ..
            }
        ));
        assert_eq!(
            actions[4],
            StepAction::RandomDelay {
                min_ms: 500,
                max_ms: 1_500
            }
        );
        assert_eq!(actions[3].name(), "run_script");
    }
}
