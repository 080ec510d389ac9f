//! Platform classifier.
//!
//! Recognisers are evaluated in a fixed priority order (Adobe, GA4, CJA).
//! Each one first runs a cheap endpoint check on the URL; only the first
//! recogniser whose endpoint matches gets to inspect markers or parse the
//! body, and its verdict is final. A rejection there never falls through to
//! a lower-priority platform.

use std::fmt;

use beaconcheck_core_types::{Platform, RawRequest};
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::TapConfig;
use crate::metrics;
use crate::normalize::{body_pairs, query_pairs};
use crate::TapError;

/// Why a request whose endpoint matched was still not accepted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Rejection {
    MissingMarkers,
    MissingBody,
    BodyNotJson,
    NoEventArray,
}

impl Rejection {
    pub fn as_str(self) -> &'static str {
        match self {
            Rejection::MissingMarkers => "missing_markers",
            Rejection::MissingBody => "missing_body",
            Rejection::BodyNotJson => "body_not_json",
            Rejection::NoEventArray => "no_event_array",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of classifying one request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Verdict {
    /// No recogniser claimed the endpoint.
    Unmatched,
    Rejected(Platform, Rejection),
    Accepted(Platform),
}

enum Recognizer {
    Adobe {
        url_markers: Vec<String>,
    },
    Ga4 {
        hosts: Vec<Regex>,
        paths: Vec<String>,
        protocol_version: String,
        tracking_id: Regex,
    },
    Cja {
        path: Regex,
        host: Regex,
    },
}

impl Recognizer {
    fn platform(&self) -> Platform {
        match self {
            Recognizer::Adobe { .. } => Platform::Adobe,
            Recognizer::Ga4 { .. } => Platform::Ga4,
            Recognizer::Cja { .. } => Platform::Cja,
        }
    }

    fn endpoint_matches(&self, raw: &str, url: &Url) -> bool {
        match self {
            Recognizer::Adobe { url_markers } => url_markers.iter().any(|m| raw.contains(m.as_str())),
            Recognizer::Ga4 { hosts, paths, .. } => {
                let host = url.host_str().unwrap_or_default();
                hosts.iter().any(|re| re.is_match(host))
                    && paths.iter().any(|p| raw.contains(p.as_str()))
            }
            Recognizer::Cja { path, host } => path.is_match(raw) && host.is_match(raw),
        }
    }

    fn validate(&self, request: &RawRequest, url: &Url) -> Result<(), Rejection> {
        match self {
            Recognizer::Adobe { .. } => Ok(()),
            Recognizer::Ga4 {
                protocol_version,
                tracking_id,
                ..
            } => {
                let query = query_pairs(url);
                let mut candidates = vec![query.clone()];
                for line in body_pairs(request.body.as_deref()) {
                    let mut merged = query.clone();
                    merged.extend(line);
                    candidates.push(merged);
                }
                let marked = candidates.iter().any(|params| {
                    params.get("v").map(String::as_str) == Some(protocol_version.as_str())
                        || params
                            .get("tid")
                            .map(|tid| tracking_id.is_match(tid))
                            .unwrap_or(false)
                });
                if marked {
                    Ok(())
                } else {
                    Err(Rejection::MissingMarkers)
                }
            }
            Recognizer::Cja { .. } => {
                let body = request
                    .body
                    .as_deref()
                    .filter(|b| !b.trim().is_empty())
                    .ok_or(Rejection::MissingBody)?;
                let payload: Value =
                    serde_json::from_str(body).map_err(|_| Rejection::BodyNotJson)?;
                match payload.get("events") {
                    Some(Value::Array(_)) => Ok(()),
                    _ => Err(Rejection::NoEventArray),
                }
            }
        }
    }
}

/// Ordered list of platform recognisers built from [`TapConfig`].
pub struct Classifier {
    recognizers: Vec<Recognizer>,
}

impl Classifier {
    pub fn new(config: &TapConfig) -> Result<Self, TapError> {
        let hosts = config
            .ga4
            .hosts
            .iter()
            .map(|pattern| compile(pattern, false))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            recognizers: vec![
                Recognizer::Adobe {
                    url_markers: config.adobe.url_markers.clone(),
                },
                Recognizer::Ga4 {
                    hosts,
                    paths: config.ga4.paths.clone(),
                    protocol_version: config.ga4.protocol_version.clone(),
                    tracking_id: compile(&config.ga4.tracking_id, false)?,
                },
                Recognizer::Cja {
                    path: compile(&config.cja.path_pattern, true)?,
                    host: compile(&config.cja.host_pattern, true)?,
                },
            ],
        })
    }

    /// Endpoint-only check: the platform whose URL pattern claims the request.
    pub fn endpoint_candidate(&self, raw_url: &str) -> Option<Platform> {
        let url = Url::parse(raw_url).ok()?;
        self.recognizers
            .iter()
            .find(|r| r.endpoint_matches(raw_url, &url))
            .map(Recognizer::platform)
    }

    pub fn verdict(&self, request: &RawRequest) -> Verdict {
        let Ok(url) = Url::parse(&request.url) else {
            return Verdict::Unmatched;
        };
        let Some(recognizer) = self
            .recognizers
            .iter()
            .find(|r| r.endpoint_matches(&request.url, &url))
        else {
            return Verdict::Unmatched;
        };

        let platform = recognizer.platform();
        match recognizer.validate(request, &url) {
            Ok(()) => Verdict::Accepted(platform),
            Err(reason) => Verdict::Rejected(platform, reason),
        }
    }

    /// Pure and safe to call concurrently.
    pub fn classify(&self, request: &RawRequest) -> Option<Platform> {
        match self.verdict(request) {
            Verdict::Accepted(platform) => Some(platform),
            Verdict::Rejected(platform, reason) => {
                metrics::record_rejection(platform, reason);
                debug!(
                    target: "beacon-tap",
                    request_id = %request.request_id,
                    platform = %platform,
                    %reason,
                    "endpoint matched but request rejected"
                );
                None
            }
            Verdict::Unmatched => None,
        }
    }
}

fn compile(pattern: &str, case_insensitive: bool) -> Result<Regex, TapError> {
    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|err| TapError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::new(&TapConfig::default()).expect("default patterns compile")
    }

    #[test]
    fn adobe_query_beacon_is_recognised() {
        let req = RawRequest::get("https://smetrics.shop.test/b/ss/rsid/1/JS-2.22/s123?v10=x&events=event12");
        assert_eq!(classifier().classify(&req), Some(Platform::Adobe));
    }

    #[test]
    fn adobe_wins_over_cja_when_both_endpoints_match() {
        // smetrics host and "collect" in the query satisfy the CJA endpoint too.
        let req = RawRequest::get("https://smetrics.shop.test/b/ss/rsid/1?c1=collect");
        assert_eq!(classifier().verdict(&req), Verdict::Accepted(Platform::Adobe));
    }

    #[test]
    fn ga4_requires_version_or_measurement_id() {
        let c = classifier();
        let with_version =
            RawRequest::get("https://region1.google-analytics.com/g/collect?v=2&en=page_view");
        let with_tid = RawRequest::get("https://www.google-analytics.com/g/collect?tid=G-ABC123");
        let universal = RawRequest::get("https://www.google-analytics.com/collect?v=1&tid=UA-1-1");

        assert_eq!(c.classify(&with_version), Some(Platform::Ga4));
        assert_eq!(c.classify(&with_tid), Some(Platform::Ga4));
        assert_eq!(
            c.verdict(&universal),
            Verdict::Rejected(Platform::Ga4, Rejection::MissingMarkers)
        );
    }

    #[test]
    fn ga4_markers_may_arrive_in_the_body() {
        let req = RawRequest::post(
            "https://analytics.google.com/g/collect?gtm=45je",
            "v=2&tid=G-XYZ&en=add_to_cart",
        );
        assert_eq!(classifier().classify(&req), Some(Platform::Ga4));
    }

    #[test]
    fn ga4_host_check_uses_the_host_only() {
        let req = RawRequest::get("https://cdn.shop.test/g/collect?v=2&ref=google-analytics.com");
        assert_eq!(classifier().verdict(&req), Verdict::Unmatched);
    }

    #[test]
    fn cja_requires_json_event_array() {
        let c = classifier();
        let url = "https://edge.adobedc.net/ee/v1/interact?configId=abc";
        assert_eq!(
            c.classify(&RawRequest::post(url, r#"{"events":[{"xdm":{}}]}"#)),
            Some(Platform::Cja)
        );
        assert_eq!(
            c.verdict(&RawRequest::post(url, "not json")),
            Verdict::Rejected(Platform::Cja, Rejection::BodyNotJson)
        );
        assert_eq!(
            c.verdict(&RawRequest::post(url, r#"{"events":{}}"#)),
            Verdict::Rejected(Platform::Cja, Rejection::NoEventArray)
        );
        assert_eq!(
            c.verdict(&RawRequest::get(url)),
            Verdict::Rejected(Platform::Cja, Rejection::MissingBody)
        );
    }

    #[test]
    fn unrelated_traffic_is_unmatched() {
        let c = classifier();
        for url in [
            "https://shop.test/products?id=1",
            "https://fonts.gstatic.test/s/roboto.woff2",
            "not a url",
        ] {
            assert_eq!(c.verdict(&RawRequest::get(url)), Verdict::Unmatched, "{url}");
            assert_eq!(c.endpoint_candidate(url), None);
        }
    }

    #[test]
    fn invalid_patterns_fail_construction() {
        let mut cfg = TapConfig::default();
        cfg.cja.host_pattern = "(".into();
        assert!(matches!(
            Classifier::new(&cfg),
            Err(TapError::InvalidPattern { .. })
        ));
    }
}
