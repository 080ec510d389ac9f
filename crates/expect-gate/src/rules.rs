//! Rule book: `platform -> step -> expectedHits`
//!
//! Documents are read as JSON first and YAML second. A top-level map with
//! no platform keys is the legacy flat form and holds Adobe rules.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use beaconcheck_core_types::Platform;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::errors::GateError;
use crate::expected::ExpectedValue;

/// One `expectedHits` entry: parameters in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expectation {
    params: Vec<(String, ExpectedValue)>,
}

impl Expectation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, parameter: impl Into<String>, expected: ExpectedValue) -> Self {
        self.params.push((parameter.into(), expected));
        self
    }

    pub fn params(&self) -> impl Iterator<Item = (&str, &ExpectedValue)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get(&self, parameter: &str) -> Option<&ExpectedValue> {
        self.params
            .iter()
            .find(|(k, _)| k == parameter)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// Rules of one step for one platform
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepRule {
    expected_hits: Vec<Expectation>,
}

impl StepRule {
    pub fn new(expected_hits: Vec<Expectation>) -> Self {
        Self { expected_hits }
    }

    pub fn expectations(&self) -> &[Expectation] {
        &self.expected_hits
    }

    /// The entry the display matrix colours against.
    pub fn primary(&self) -> Option<&Expectation> {
        self.expected_hits.first()
    }

    pub fn parameter_count(&self) -> usize {
        self.expected_hits.iter().map(Expectation::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.parameter_count() == 0
    }
}

/// Per-platform rule counts, for `rules check`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleSummary {
    pub platform: Platform,
    pub steps: usize,
    pub parameters: usize,
}

/// All rules of a run, loaded once
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleBook {
    platforms: BTreeMap<Platform, BTreeMap<String, StepRule>>,
}

impl RuleBook {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, GateError> {
        let text = fs::read_to_string(path).map_err(|err| GateError::Read {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        let book = Self::parse(&text)?;
        debug!(path = %path.display(), steps = book.step_count(), "rules loaded");
        Ok(book)
    }

    pub fn parse(text: &str) -> Result<Self, GateError> {
        let document: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(_) => serde_yaml::from_str(text)
                .map_err(|err| GateError::InvalidRules(err.to_string()))?,
        };
        Self::from_value(&document)
    }

    pub fn from_value(document: &Value) -> Result<Self, GateError> {
        let root = match document {
            Value::Object(map) => map,
            Value::Null => return Ok(Self::empty()),
            _ => return Err(GateError::InvalidRules("top level must be a map".into())),
        };

        let keyed: Vec<(Option<Platform>, &String)> = root
            .keys()
            .map(|key| (key.parse::<Platform>().ok(), key))
            .collect();

        let mut book = Self::empty();
        if keyed.iter().all(|(platform, _)| platform.is_none()) {
            book.insert_steps(Platform::Adobe, root)?;
            return Ok(book);
        }

        for (platform, key) in keyed {
            let platform = platform
                .ok_or_else(|| GateError::InvalidRules(format!("unknown platform key '{key}'")))?;
            match &root[key.as_str()] {
                Value::Object(steps) => book.insert_steps(platform, steps)?,
                Value::Null => {}
                _ => {
                    return Err(GateError::InvalidRules(format!(
                        "rules for '{key}' must be a map of steps"
                    )))
                }
            }
        }
        Ok(book)
    }

    fn insert_steps(&mut self, platform: Platform, steps: &Map<String, Value>) -> Result<(), GateError> {
        for (step, body) in steps {
            let rule = parse_step(platform, step, body)?;
            self.insert(platform, step.clone(), rule);
        }
        Ok(())
    }

    pub fn insert(&mut self, platform: Platform, step: impl Into<String>, rule: StepRule) {
        self.platforms
            .entry(platform)
            .or_default()
            .insert(step.into(), rule);
    }

    pub fn rule(&self, platform: Platform, step: &str) -> Option<&StepRule> {
        self.platforms.get(&platform)?.get(step)
    }

    pub fn has_rules_for_step(&self, step: &str) -> bool {
        Platform::ALL
            .into_iter()
            .any(|platform| self.rule(platform, step).is_some_and(|r| !r.is_empty()))
    }

    pub fn steps(&self, platform: Platform) -> impl Iterator<Item = &str> {
        self.platforms
            .get(&platform)
            .into_iter()
            .flat_map(|steps| steps.keys().map(String::as_str))
    }

    pub fn step_count(&self) -> usize {
        self.platforms.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.step_count() == 0
    }

    pub fn summary(&self) -> Vec<RuleSummary> {
        Platform::ALL
            .into_iter()
            .map(|platform| {
                let steps = self.platforms.get(&platform);
                RuleSummary {
                    platform,
                    steps: steps.map(BTreeMap::len).unwrap_or(0),
                    parameters: steps
                        .map(|s| s.values().map(StepRule::parameter_count).sum())
                        .unwrap_or(0),
                }
            })
            .collect()
    }
}

fn parse_step(platform: Platform, step: &str, body: &Value) -> Result<StepRule, GateError> {
    let invalid = |reason: String| GateError::InvalidRules(format!("{}/{step}: {reason}", platform.key()));

    let entries: &[Value] = match body {
        Value::Object(map) => match map.get("expectedHits").or_else(|| map.get("expected_hits")) {
            Some(Value::Array(entries)) => entries.as_slice(),
            Some(Value::Null) | None => &[],
            Some(_) => return Err(invalid("expectedHits must be a list".into())),
        },
        Value::Null => &[],
        _ => return Err(invalid("step rules must be a map".into())),
    };

    let mut expected_hits = Vec::with_capacity(entries.len());
    for entry in entries {
        let Value::Object(params) = entry else {
            return Err(invalid("expectedHits entries must be maps".into()));
        };
        let mut expectation = Expectation::new();
        for (parameter, raw) in params {
            let expected = ExpectedValue::from_json(raw).map_err(|reason| GateError::InvalidPattern {
                platform: platform.key().to_string(),
                step: step.to_string(),
                parameter: parameter.clone(),
                reason,
            })?;
            expectation = expectation.with(parameter.clone(), expected);
        }
        expected_hits.push(expectation);
    }
    Ok(StepRule::new(expected_hits))
}
