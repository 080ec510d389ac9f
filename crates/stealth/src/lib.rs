//! Browser profile emulation and anti-bot interstitial detection.
//!
//! [`StealthRuntime`] applies one [`StealthProfile`] to a page before the
//! journey starts and answers "is this page a challenge?" for the bot-check
//! guard of the step orchestrator.

pub mod config;

use crate::config::{ChallengeMarkers, ConfigError, StealthProfile, StealthProfileBundle};
use async_trait::async_trait;
use cdp_adapter::{ids::PageId as AdapterPageId, Cdp};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Interstitial found on the page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub marker: String,
    pub location: ChallengeLocation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeLocation {
    Title,
    Content,
}

impl Challenge {
    pub fn reason(&self) -> String {
        let place = match self.location {
            ChallengeLocation::Title => "title",
            ChallengeLocation::Content => "page content",
        };
        format!("{place} contains \"{}\"", self.marker)
    }
}

#[derive(Clone, Debug, Error)]
pub enum StealthError {
    #[error("cdp I/O failure: {0}")]
    CdpIo(String),
    #[error("profile error: {0}")]
    Profile(String),
}

impl From<ConfigError> for StealthError {
    fn from(err: ConfigError) -> Self {
        StealthError::Profile(err.to_string())
    }
}

#[async_trait]
pub trait StealthControl: Send + Sync {
    /// Applies the active profile to `page`.
    async fn configure_page(&self, page: &AdapterPageId) -> Result<(), StealthError>;
    /// Reads title and content; read failures count as "no challenge".
    async fn detect_challenge(&self, page: &AdapterPageId) -> Option<Challenge>;
}

pub struct StealthRuntime {
    adapter: Arc<dyn Cdp>,
    profile: RwLock<StealthProfile>,
    markers: RwLock<ChallengeMarkers>,
}

impl StealthRuntime {
    pub fn new(adapter: Arc<dyn Cdp>) -> Self {
        Self {
            adapter,
            profile: RwLock::new(StealthProfile::default()),
            markers: RwLock::new(ChallengeMarkers::default()),
        }
    }

    pub fn load_bundle(&self, bundle: StealthProfileBundle) -> Result<(), StealthError> {
        let profile = bundle.active_profile()?;
        debug!(profile = %profile.name, "stealth profile loaded");
        *self.profile.write() = profile;
        *self.markers.write() = bundle.challenge;
        Ok(())
    }

    pub fn profile(&self) -> StealthProfile {
        self.profile.read().clone()
    }

    pub fn markers(&self) -> ChallengeMarkers {
        self.markers.read().clone()
    }

    async fn inject_profile(
        &self,
        page: &AdapterPageId,
        profile: &StealthProfile,
    ) -> Result<(), StealthError> {
        let adapter = &self.adapter;
        if !profile.user_agent.is_empty() {
            adapter
                .set_user_agent(
                    page,
                    &profile.user_agent,
                    profile.accept_language.as_deref(),
                    profile.platform.as_deref(),
                    profile.locale.as_deref(),
                )
                .await
                .map_err(map_adapter_error)?;
        }

        if let Some(timezone) = &profile.timezone {
            adapter
                .set_timezone(page, timezone)
                .await
                .map_err(map_adapter_error)?;
        }

        if let Some(viewport) = &profile.viewport {
            adapter
                .set_device_metrics(
                    page,
                    viewport.width,
                    viewport.height,
                    viewport.device_scale_factor,
                    viewport.mobile,
                )
                .await
                .map_err(map_adapter_error)?;
        }

        if profile.touch {
            adapter
                .set_touch_emulation(page, true)
                .await
                .map_err(map_adapter_error)?;
        }

        let script = profile.init_script();
        if !script.trim().is_empty() {
            adapter
                .add_init_script(page, script)
                .await
                .map_err(map_adapter_error)?;
        }

        Ok(())
    }
}

#[async_trait]
impl StealthControl for StealthRuntime {
    async fn configure_page(&self, page: &AdapterPageId) -> Result<(), StealthError> {
        let profile = self.profile();
        self.inject_profile(page, &profile).await?;
        debug!(page = %page, profile = %profile.name, "stealth profile applied");
        Ok(())
    }

    async fn detect_challenge(&self, page: &AdapterPageId) -> Option<Challenge> {
        let title = match self.adapter.title(page).await {
            Ok(title) => title,
            Err(err) => {
                warn!(page = %page, error = %err, "failed reading title for challenge check");
                return None;
            }
        };
        let content = match self.adapter.content(page).await {
            Ok(content) => content,
            Err(err) => {
                warn!(page = %page, error = %err, "failed reading content for challenge check");
                return None;
            }
        };
        match_challenge(&title, &content, &self.markers.read())
    }
}

/// Pure marker check over an already-read title and HTML.
pub fn match_challenge(title: &str, content: &str, markers: &ChallengeMarkers) -> Option<Challenge> {
    for marker in &markers.title_or_content {
        if title.contains(marker.as_str()) {
            return Some(Challenge {
                marker: marker.clone(),
                location: ChallengeLocation::Title,
            });
        }
        if content.contains(marker.as_str()) {
            return Some(Challenge {
                marker: marker.clone(),
                location: ChallengeLocation::Content,
            });
        }
    }
    markers
        .content
        .iter()
        .find(|marker| content.contains(marker.as_str()))
        .map(|marker| Challenge {
            marker: marker.clone(),
            location: ChallengeLocation::Content,
        })
}

fn map_adapter_error(err: cdp_adapter::AdapterError) -> StealthError {
    let mut hint = err.hint.clone().unwrap_or_default();
    if hint.is_empty() {
        hint = format!("cdp error {:?}", err.kind);
    }
    StealthError::CdpIo(hint)
}
