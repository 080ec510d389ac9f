//! Hit normalizer: turns a classified request into zero or more flat hits.

use std::collections::BTreeMap;

use beaconcheck_core_types::{Hit, Platform, RawRequest};
use serde_json::Value;
use tracing::warn;
use url::{form_urlencoded, Url};

/// Tagged view of a JSON value used for flattening.
#[derive(Clone, Debug, PartialEq)]
pub enum JsonNode {
    Object(Vec<(String, JsonNode)>),
    Array(Vec<JsonNode>),
    Scalar(String),
    Null,
}

impl From<&Value> for JsonNode {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => JsonNode::Null,
            Value::Bool(b) => JsonNode::Scalar(b.to_string()),
            Value::Number(n) => JsonNode::Scalar(number_text(n)),
            Value::String(s) => JsonNode::Scalar(s.clone()),
            Value::Array(items) => JsonNode::Array(items.iter().map(JsonNode::from).collect()),
            Value::Object(map) => JsonNode::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), JsonNode::from(v)))
                    .collect(),
            ),
        }
    }
}

// Integral floats print without a fractional part, the way browsers stringify them.
fn number_text(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

/// Flattens a node into dotted-path keys. Nulls produce no key; a scalar at
/// the root is stored under the empty key.
pub fn flatten(node: &JsonNode) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    flatten_into(node, String::new(), &mut out);
    out
}

fn flatten_into(node: &JsonNode, path: String, out: &mut BTreeMap<String, String>) {
    match node {
        JsonNode::Null => {}
        JsonNode::Scalar(value) => {
            out.insert(path, value.clone());
        }
        JsonNode::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                flatten_into(item, join(&path, &index.to_string()), out);
            }
        }
        JsonNode::Object(entries) => {
            for (key, value) in entries {
                flatten_into(value, join(&path, key), out);
            }
        }
    }
}

fn join(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{prefix}.{segment}")
    }
}

pub(crate) fn query_pairs(url: &Url) -> BTreeMap<String, String> {
    url.query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// URL-encoded body parameters, one map per non-empty line. JSON bodies and
/// bodies without any `=` carry no parameters.
pub(crate) fn body_pairs(body: Option<&str>) -> Vec<BTreeMap<String, String>> {
    let Some(body) = body.map(str::trim) else {
        return Vec::new();
    };
    if body.is_empty() || !body.contains('=') || body.starts_with('{') || body.starts_with('[') {
        return Vec::new();
    }
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            form_urlencoded::parse(line.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect()
        })
        .collect()
}

/// Never fails: unparseable payloads are logged and yield no hits.
pub fn normalize(request: &RawRequest, platform: Platform) -> Vec<Hit> {
    let url = match Url::parse(&request.url) {
        Ok(url) => url,
        Err(err) => {
            warn!(target: "beacon-tap", request_id = %request.request_id, %err, "unparseable beacon url");
            return Vec::new();
        }
    };

    match platform {
        Platform::Adobe => {
            let mut fields = query_pairs(&url);
            for line in body_pairs(request.body.as_deref()) {
                fields.extend(line);
            }
            vec![Hit::new(platform, fields)]
        }
        Platform::Ga4 => {
            let query = query_pairs(&url);
            let lines = body_pairs(request.body.as_deref());
            if lines.is_empty() {
                return vec![Hit::new(platform, query)];
            }
            // Batched collect calls carry one event per body line.
            lines
                .into_iter()
                .map(|line| {
                    let mut fields = query.clone();
                    fields.extend(line);
                    Hit::new(platform, fields)
                })
                .collect()
        }
        Platform::Cja => normalize_events(request),
    }
}

fn normalize_events(request: &RawRequest) -> Vec<Hit> {
    let Some(body) = request.body.as_deref() else {
        warn!(target: "beacon-tap", request_id = %request.request_id, "event beacon without body");
        return Vec::new();
    };
    let payload: Value = match serde_json::from_str(body) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(target: "beacon-tap", request_id = %request.request_id, %err, "event beacon body is not json");
            return Vec::new();
        }
    };
    let Some(events) = payload.get("events").and_then(Value::as_array) else {
        warn!(target: "beacon-tap", request_id = %request.request_id, "event beacon without events array");
        return Vec::new();
    };

    events
        .iter()
        .enumerate()
        .map(|(index, event)| {
            Hit::new(Platform::Cja, flatten(&JsonNode::from(event))).with_event_index(index)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn flat(value: Value) -> BTreeMap<String, String> {
        flatten(&JsonNode::from(&value))
    }

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn nested_objects_join_with_dots() {
        assert_eq!(flat(json!({"a": {"b": {"c": 1}}})), map(&[("a.b.c", "1")]));
    }

    #[test]
    fn array_elements_use_their_index() {
        assert_eq!(
            flat(json!({"a": [{"b": 1}, {"b": 2}]})),
            map(&[("a.0.b", "1"), ("a.1.b", "2")])
        );
    }

    #[test]
    fn nulls_are_dropped_and_reflattening_is_stable() {
        let first = flat(json!({"a": null, "b": {"c": null, "d": false}, "e": 2.0, "f": 0.5}));
        assert_eq!(first, map(&[("b.d", "false"), ("e", "2"), ("f", "0.5")]));

        let as_object: serde_json::Map<String, Value> = first
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        assert_eq!(flat(Value::Object(as_object)), first);
    }

    #[test]
    fn scalar_event_lands_under_empty_key() {
        assert_eq!(flat(json!("ping")), map(&[("", "ping")]));
        assert!(flat(json!(null)).is_empty());
    }

    #[test]
    fn body_parameters_override_query_parameters() {
        let req = RawRequest::post(
            "https://smetrics.shop.test/b/ss/rsid/1?pageName=home&v10=q",
            "v10=body&events=event1",
        );
        let hits = normalize(&req, Platform::Adobe);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].get("v10"), Some("body"));
        assert_eq!(hits[0].get("pageName"), Some("home"));
        assert_eq!(hits[0].get("events"), Some("event1"));
    }

    #[test]
    fn query_values_are_percent_decoded() {
        let req = RawRequest::get("https://smetrics.shop.test/b/ss/rsid/1?pageName=men%3Apolo+shirts");
        let hits = normalize(&req, Platform::Adobe);
        assert_eq!(hits[0].get("pageName"), Some("men:polo shirts"));
    }

    #[test]
    fn ga4_batches_split_per_line() {
        let req = RawRequest::post(
            "https://region1.google-analytics.com/g/collect?v=2&tid=G-ABC",
            "en=view_item&ep.sku=1\nen=add_to_cart&ep.sku=1\n",
        );
        let hits = normalize(&req, Platform::Ga4);
        let events: Vec<_> = hits.iter().filter_map(|h| h.get("en")).collect();
        assert_eq!(events, vec!["view_item", "add_to_cart"]);
        assert!(hits.iter().all(|h| h.get("tid") == Some("G-ABC")));
    }

    #[test]
    fn event_array_yields_one_hit_per_element() {
        let req = RawRequest::post(
            "https://edge.adobedc.net/ee/v1/interact",
            r#"{"events":[{"xdm":{"eventType":"a"}},{"xdm":{"eventType":"b"}},null]}"#,
        );
        let hits = normalize(&req, Platform::Cja);
        assert_eq!(hits.len(), 3);
        for (index, hit) in hits.iter().enumerate() {
            assert_eq!(hit.event_index(), Some(index));
            assert_eq!(hit.platform(), Platform::Cja);
        }
        assert_eq!(hits[1].get("xdm.eventType"), Some("b"));
        assert!(hits[2].is_empty());
    }

    #[test]
    fn malformed_event_body_yields_nothing() {
        let req = RawRequest::post("https://edge.adobedc.net/ee/v1/interact", "{oops");
        assert!(normalize(&req, Platform::Cja).is_empty());
    }
}
