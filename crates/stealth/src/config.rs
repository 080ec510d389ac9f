//! Profile bundle definitions: browser profiles and challenge markers.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use thiserror::Error;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Patches applied before any page script runs.
pub const DEFAULT_INIT_SCRIPT: &str = r#"(() => {
  Object.defineProperty(navigator, 'webdriver', { get: () => false });
  window.chrome = { runtime: {} };
  const origQuery = navigator.permissions && navigator.permissions.query;
  if (origQuery) {
    navigator.permissions.query = (p) =>
      p && p.name === 'notifications'
        ? Promise.resolve({ state: Notification.permission })
        : origQuery.call(navigator.permissions, p);
  }
  Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3] });
  Object.defineProperty(navigator, 'languages', { get: () => ['en-GB', 'en'] });
})();"#;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to deserialize profile bundle: {0}")]
    Deserialize(String),
    #[error("profile '{0}' is not defined in the bundle")]
    UnknownProfile(String),
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StealthProfileBundle {
    #[serde(default)]
    pub profiles: Vec<StealthProfile>,
    /// Name of the profile to apply; the first profile when absent.
    #[serde(default)]
    pub active: Option<String>,
    #[serde(default)]
    pub challenge: ChallengeMarkers,
}

impl StealthProfileBundle {
    pub fn active_profile(&self) -> Result<StealthProfile, ConfigError> {
        match &self.active {
            Some(name) => self
                .profiles
                .iter()
                .find(|p| &p.name == name)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownProfile(name.clone())),
            None => Ok(self.profiles.first().cloned().unwrap_or_default()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StealthProfile {
    pub name: String,
    pub user_agent: String,
    #[serde(default)]
    pub accept_language: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub viewport: Option<Viewport>,
    #[serde(default)]
    pub touch: bool,
    /// Replaces the built-in patches; an empty string disables them.
    #[serde(default)]
    pub init_script: Option<String>,
}

impl Default for StealthProfile {
    fn default() -> Self {
        Self {
            name: "default".into(),
            user_agent: DEFAULT_USER_AGENT.into(),
            accept_language: Some("en-GB,en".into()),
            platform: None,
            locale: Some("en-GB".into()),
            timezone: None,
            viewport: Some(Viewport::default()),
            touch: false,
            init_script: None,
        }
    }
}

impl StealthProfile {
    pub fn init_script(&self) -> &str {
        self.init_script.as_deref().unwrap_or(DEFAULT_INIT_SCRIPT)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    #[serde(default = "Viewport::default_scale")]
    pub device_scale_factor: f64,
    #[serde(default)]
    pub mobile: bool,
}

impl Viewport {
    fn default_scale() -> f64 {
        1.0
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1366,
            height: 768,
            device_scale_factor: Self::default_scale(),
            mobile: false,
        }
    }
}

/// Substrings that identify an anti-bot interstitial.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChallengeMarkers {
    /// Checked against the title and the page HTML.
    #[serde(default = "ChallengeMarkers::default_title_or_content")]
    pub title_or_content: Vec<String>,
    /// Checked against the page HTML only.
    #[serde(default = "ChallengeMarkers::default_content")]
    pub content: Vec<String>,
}

impl ChallengeMarkers {
    fn default_title_or_content() -> Vec<String> {
        vec!["Access to this page has been denied".into()]
    }

    fn default_content() -> Vec<String> {
        vec!["Press & Hold".into(), "press-and-hold".into()]
    }
}

impl Default for ChallengeMarkers {
    fn default() -> Self {
        Self {
            title_or_content: Self::default_title_or_content(),
            content: Self::default_content(),
        }
    }
}

pub fn load_bundle_from_reader<R: Read>(
    mut reader: R,
) -> Result<StealthProfileBundle, ConfigError> {
    let mut buf = String::new();
    reader.read_to_string(&mut buf)?;
    parse_bundle_str(&buf)
}

pub fn load_bundle_from_path(path: impl AsRef<Path>) -> Result<StealthProfileBundle, ConfigError> {
    let file = File::open(path.as_ref())?;
    load_bundle_from_reader(file)
}

pub fn parse_bundle_str(raw: &str) -> Result<StealthProfileBundle, ConfigError> {
    match serde_json::from_str(raw) {
        Ok(bundle) => Ok(bundle),
        Err(json_err) => serde_yaml::from_str(raw).map_err(|yaml_err| {
            ConfigError::Deserialize(format!(
                "json error: {}; yaml error: {}",
                json_err, yaml_err
            ))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_bundle_selects_named_profile() {
        let bundle = parse_bundle_str(
            r#"
active: mobile
profiles:
  - name: desktop
    user_agent: UA-desktop
  - name: mobile
    user_agent: UA-mobile
    viewport: { width: 390, height: 844, device_scale_factor: 3, mobile: true }
    touch: true
challenge:
  content: ["px-captcha"]
"#,
        )
        .expect("bundle parses");

        let profile = bundle.active_profile().expect("active profile");
        assert_eq!(profile.user_agent, "UA-mobile");
        assert!(profile.touch);
        assert_eq!(bundle.challenge.content, vec!["px-captcha".to_string()]);
        assert_eq!(
            bundle.challenge.title_or_content,
            ChallengeMarkers::default().title_or_content
        );
    }

    #[test]
    fn empty_bundle_falls_back_to_defaults() {
        let bundle = parse_bundle_str("{}").expect("bundle parses");
        let profile = bundle.active_profile().expect("default profile");
        assert_eq!(profile, StealthProfile::default());
        assert_eq!(profile.viewport.as_ref().map(|v| (v.width, v.height)), Some((1366, 768)));
        assert!(profile.init_script().contains("webdriver"));
    }

    #[test]
    fn unknown_active_profile_is_an_error() {
        let bundle = parse_bundle_str(r#"{"active": "ghost", "profiles": []}"#).expect("parses");
        assert!(matches!(
            bundle.active_profile(),
            Err(ConfigError::UnknownProfile(name)) if name == "ghost"
        ));
    }
}
