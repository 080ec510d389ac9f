//! Expectation rule engine

use std::collections::HashSet;
use std::sync::Arc;

use beaconcheck_core_types::{Hit, Platform};
use tracing::debug;

use crate::rules::{RuleBook, StepRule};
use crate::types::*;

const JOIN: &str = " | ";

/// Full validation of one step/platform.
///
/// Every declared parameter is checked against the union of its values
/// across `hits`. Without a rule (or with an empty one) the result is a
/// single informational pass.
pub fn evaluate(step: &str, platform: Platform, hits: &[Hit], rule: Option<&StepRule>) -> Vec<Verdict> {
    let Some(rule) = rule.filter(|r| !r.is_empty()) else {
        return vec![Verdict::no_rules(step, platform)];
    };

    let mut verdicts = Vec::with_capacity(rule.parameter_count());
    for expectation in rule.expectations() {
        for (parameter, expected) in expectation.params() {
            let values: Vec<&str> = hits.iter().filter_map(|hit| hit.get(parameter)).collect();
            let actual = values.join(JOIN);
            let verdict = if expected.matches_any(&values) {
                Verdict::pass(step, platform, parameter, expected.to_string(), actual)
            } else {
                debug!(
                    step,
                    platform = %platform,
                    parameter,
                    expected = %expected,
                    "parameter failed validation"
                );
                Verdict::fail(step, platform, parameter, expected.to_string(), actual)
            };
            verdicts.push(verdict);
        }
    }
    verdicts
}

/// Display matrix of one step/platform.
///
/// Rows follow the first appearance of each parameter across the hits. A
/// row is coloured against the rule's first `expectedHits` entry using the
/// joined values of all hits; parameters without an expectation pass.
pub fn matrix(hits: &[Hit], rule: Option<&StepRule>) -> HitMatrix {
    let primary = rule.and_then(StepRule::primary);

    let mut seen = HashSet::new();
    let mut parameters = Vec::new();
    for hit in hits {
        for key in hit.keys() {
            if seen.insert(key) {
                parameters.push(key);
            }
        }
    }

    let rows = parameters
        .into_iter()
        .map(|parameter| {
            let values: Vec<Option<String>> = hits
                .iter()
                .map(|hit| hit.get(parameter).map(str::to_string))
                .collect();
            let expected = primary.and_then(|e| e.get(parameter));
            let passed = match expected {
                Some(expected) => {
                    let joined = values
                        .iter()
                        .map(|v| v.as_deref().unwrap_or(""))
                        .collect::<Vec<_>>()
                        .join(JOIN);
                    expected.matches_joined(&joined)
                }
                None => true,
            };
            MatrixRow {
                parameter: parameter.to_string(),
                values,
                expected: expected.map(ToString::to_string),
                passed,
            }
        })
        .collect();

    HitMatrix {
        hit_labels: hits.iter().map(Hit::label).collect(),
        rows,
    }
}

/// Step-level status: every verdict passed.
pub fn all_passed(verdicts: &[Verdict]) -> bool {
    verdicts.iter().all(|v| v.passed)
}

/// Rule book bound to the engine functions.
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    book: Arc<RuleBook>,
}

impl RuleEngine {
    pub fn new(book: RuleBook) -> Self {
        Self {
            book: Arc::new(book),
        }
    }

    pub fn book(&self) -> &RuleBook {
        &self.book
    }

    pub fn has_rule(&self, platform: Platform, step: &str) -> bool {
        self.book.rule(platform, step).is_some_and(|r| !r.is_empty())
    }

    pub fn evaluate(&self, step: &str, platform: Platform, hits: &[Hit]) -> Vec<Verdict> {
        evaluate(step, platform, hits, self.book.rule(platform, step))
    }

    pub fn validate_platform(&self, step: &str, platform: Platform, hits: &[Hit]) -> PlatformValidation {
        let rule = self.book.rule(platform, step);
        let verdicts = evaluate(step, platform, hits, rule);
        PlatformValidation {
            platform,
            matrix: matrix(hits, rule),
            passed: all_passed(&verdicts),
            verdicts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expected::ExpectedValue;
    use crate::rules::Expectation;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn hit(platform: Platform, pairs: &[(&str, &str)]) -> Hit {
        let fields: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Hit::new(platform, fields)
    }

    fn rule(entries: &[(&str, serde_json::Value)]) -> StepRule {
        let expectation = entries.iter().fold(Expectation::new(), |acc, (k, v)| {
            acc.with(*k, ExpectedValue::from_json(v).expect("valid"))
        });
        StepRule::new(vec![expectation])
    }

    #[test]
    fn test_literal_and_pattern_pass() {
        let hits = vec![hit(Platform::Adobe, &[("v10", "x"), ("events", "event12")])];
        let rule = rule(&[("v10", json!("x")), ("events", json!("/event12/"))]);
        let verdicts = evaluate("Home", Platform::Adobe, &hits, Some(&rule));
        assert_eq!(verdicts.len(), 2);
        assert!(all_passed(&verdicts));
        assert_eq!(verdicts[1].expected, "/event12/");
    }

    #[test]
    fn test_values_are_unioned_across_hits() {
        let hits = vec![
            hit(Platform::Ga4, &[("p", "100")]),
            hit(Platform::Ga4, &[("p", "200")]),
            hit(Platform::Ga4, &[("q", "1")]),
        ];
        let rule = rule(&[("p", json!(["/^1/", "/^2/"]))]);
        let verdicts = evaluate("PLP", Platform::Ga4, &hits, Some(&rule));
        assert!(verdicts[0].passed);
        assert_eq!(verdicts[0].actual, "100 | 200");
    }

    #[test]
    fn test_missing_parameter_fails() {
        let hits = vec![hit(Platform::Adobe, &[("v1", "guest")])];
        let rule = rule(&[("v2", json!("/.*/")), ("v3", json!("a")), ("v4", json!(["/.*/"]))]);
        let verdicts = evaluate("Home", Platform::Adobe, &hits, Some(&rule));
        assert!(verdicts.iter().all(|v| !v.passed && v.actual.is_empty()));
        assert_eq!(verdicts[0].origin(), "Home [ADOBE]");
    }

    #[test]
    fn test_no_rule_yields_one_informational_pass() {
        let hits = vec![hit(Platform::Cja, &[("eventType", "a")])];
        for rule in [None, Some(StepRule::default())] {
            let verdicts = evaluate("PDP", Platform::Cja, &hits, rule.as_ref());
            assert_eq!(verdicts.len(), 1);
            assert!(verdicts[0].passed && verdicts[0].informational);
            assert_eq!(verdicts[0].parameter, NO_RULES_PARAMETER);
        }
    }

    #[test]
    fn test_matrix_rows_and_colouring() {
        let hits = vec![
            hit(Platform::Adobe, &[("pageName", "home"), ("v10", "en_gb:home")]),
            hit(Platform::Adobe, &[("events", "event12"), ("pageName", "home")]),
        ];
        let rule = rule(&[("v10", json!("en_gb")), ("events", json!("/event99/"))]);
        let m = matrix(&hits, Some(&rule));

        let params: Vec<&str> = m.rows.iter().map(|r| r.parameter.as_str()).collect();
        assert_eq!(params, vec!["pageName", "v10", "events"]);
        assert_eq!(m.hit_labels, vec!["home", "home"]);

        let v10 = &m.rows[1];
        assert!(v10.passed, "substring of the joined values");
        assert_eq!(v10.values, vec![Some("en_gb:home".to_string()), None]);
        assert!(!m.rows[2].passed);
        assert!(m.rows[0].passed && m.rows[0].expected.is_none());
    }

    #[test]
    fn test_engine_validates_against_book() {
        let mut book = RuleBook::empty();
        book.insert(Platform::Cja, "PLP", rule(&[("xdm.eventType", json!("a"))]));
        let engine = RuleEngine::new(book);
        let hits = vec![
            hit(Platform::Cja, &[("xdm.eventType", "a")]).with_event_index(0),
            hit(Platform::Cja, &[("xdm.eventType", "b")]).with_event_index(1),
        ];
        let validation = engine.validate_platform("PLP", Platform::Cja, &hits);
        assert!(validation.passed);
        assert_eq!(validation.failures().count(), 0);
        assert_eq!(validation.matrix.hit_count(), 2);
        assert!(engine.has_rule(Platform::Cja, "PLP"));
        assert!(!engine.has_rule(Platform::Adobe, "PLP"));
    }
}
