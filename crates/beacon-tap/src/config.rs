//! Endpoint patterns for the beacon classifier.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TapConfig {
    pub adobe: AdobeEndpoints,
    pub ga4: Ga4Endpoints,
    pub cja: CjaEndpoints,
}

impl Default for TapConfig {
    fn default() -> Self {
        Self {
            adobe: AdobeEndpoints::default(),
            ga4: Ga4Endpoints::default(),
            cja: CjaEndpoints::default(),
        }
    }
}

/// Query-string beacons are recognised by a path marker anywhere in the URL.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdobeEndpoints {
    pub url_markers: Vec<String>,
}

impl Default for AdobeEndpoints {
    fn default() -> Self {
        Self {
            url_markers: vec!["/b/ss/".into()],
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Ga4Endpoints {
    /// Regexes tested against the URL host.
    pub hosts: Vec<String>,
    /// Substrings, any of which must appear in the URL.
    pub paths: Vec<String>,
    /// Accepted value of the `v` protocol marker.
    pub protocol_version: String,
    /// Regex the `tid` measurement id must match when `v` is absent or different.
    pub tracking_id: String,
}

impl Default for Ga4Endpoints {
    fn default() -> Self {
        Self {
            hosts: vec![
                r"(?:www\.)?google-analytics\.com$".into(),
                r"(?:www\.)?analytics\.google\.com$".into(),
                r"g\.doubleclick\.net$".into(),
            ],
            paths: vec!["/g/collect".into(), "/j/collect".into(), "/collect".into()],
            protocol_version: "2".into(),
            tracking_id: "^G-[A-Z0-9]+".into(),
        }
    }
}

/// Edge Network event endpoints: both regexes are matched case-insensitively
/// against the full URL.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CjaEndpoints {
    pub path_pattern: String,
    pub host_pattern: String,
}

impl Default for CjaEndpoints {
    fn default() -> Self {
        Self {
            path_pattern: r"interact|collect|v1/(events|interact|collect)".into(),
            host_pattern: r"smetrics|adobedc|rlcdn".into(),
        }
    }
}
