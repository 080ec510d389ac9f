use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use uuid::Uuid;

pub mod decision;

pub use decision::{Decision, DecisionPrompt, ExternalDecision};

/// Shared error type for the pipeline crates.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("{message}")]
    Message { message: String },
    #[error("unknown platform '{0}'")]
    UnknownPlatform(String),
}

impl CoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct PageId(pub String);

impl PageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for PageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Frame identifiers are assigned by the browser, so there is no generator.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub String);

impl From<&str> for FrameId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for FrameId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracking platforms the pipeline recognises.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "lowercase"))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum Platform {
    /// Query-string beacons sent to `/b/ss/` endpoints.
    Adobe,
    /// Host-restricted collector with protocol version / measurement id markers.
    Ga4,
    /// JSON event arrays posted to Edge Network style endpoints.
    Cja,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Adobe, Platform::Ga4, Platform::Cja];

    pub fn label(self) -> &'static str {
        match self {
            Platform::Adobe => "ADOBE",
            Platform::Ga4 => "GA4",
            Platform::Cja => "CJA",
        }
    }

    /// Key used in rule files and config sections.
    pub fn key(self) -> &'static str {
        match self {
            Platform::Adobe => "adobe",
            Platform::Ga4 => "ga4",
            Platform::Cja => "cja",
        }
    }

    /// Human readable name used for report sections.
    pub fn display_name(self) -> &'static str {
        match self {
            Platform::Adobe => "Adobe",
            Platform::Ga4 => "GA4",
            Platform::Cja => "CJA",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Platform {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "adobe" | "aa" => Ok(Platform::Adobe),
            "ga4" | "ga" => Ok(Platform::Ga4),
            "cja" | "websdk" => Ok(Platform::Cja),
            other => Err(CoreError::UnknownPlatform(other.to_string())),
        }
    }
}

/// Read-only view of an intercepted outbound request.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RawRequest {
    pub request_id: String,
    pub url: String,
    pub method: String,
    pub body: Option<String>,
}

impl RawRequest {
    pub fn new(url: impl Into<String>, method: impl Into<String>, body: Option<String>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            url: url.into(),
            method: method.into(),
            body,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(url, "GET", None)
    }

    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(url, "POST", Some(body.into()))
    }
}

/// One normalized analytics event.
///
/// Keys are flat parameter names for query-string sources and dotted paths for
/// JSON sources. The platform tag and event index live beside the fields, never
/// inside them.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Hit {
    platform: Platform,
    event_index: Option<usize>,
    fields: BTreeMap<String, String>,
}

impl Hit {
    pub fn new(platform: Platform, fields: BTreeMap<String, String>) -> Self {
        Self {
            platform,
            event_index: None,
            fields,
        }
    }

    pub fn with_event_index(mut self, index: usize) -> Self {
        self.event_index = Some(index);
        self
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn event_index(&self) -> Option<usize> {
        self.event_index
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Short label for the hit: the event type for JSON events, the page
    /// name or link name for query-string beacons.
    pub fn label(&self) -> String {
        let candidates: &[&str] = match self.platform {
            Platform::Cja => &["xdm.eventType", "eventType"],
            Platform::Adobe => &["pe", "pageName", "gn"],
            Platform::Ga4 => &["en", "dl"],
        };
        for key in candidates {
            if let Some(value) = self.get(key).filter(|v| !v.is_empty()) {
                return value.to_string();
            }
        }
        match self.event_index {
            Some(idx) => format!("eventIndex_{idx}"),
            None => self.platform.label().to_string(),
        }
    }
}
