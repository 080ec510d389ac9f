//! Expected-value model for rule parameters

use std::fmt;

use regex::{Regex, RegexBuilder};
use serde_json::Value;

const FLAG_CHARS: &str = "gimsuy";

/// A compiled `/source/flags` pattern
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    flags: String,
    regex: Regex,
}

impl Pattern {
    /// Recognise the `/source/flags` notation. Returns `None` when `text`
    /// is not written as a pattern at all.
    pub fn parse(text: &str) -> Option<Result<Self, regex::Error>> {
        let rest = text.strip_prefix('/')?;
        let end = rest.rfind('/')?;
        let (source, flags) = (&rest[..end], &rest[end + 1..]);
        if source.is_empty() || !flags.chars().all(|c| FLAG_CHARS.contains(c)) {
            return None;
        }
        Some(Self::compile(source, flags))
    }

    /// `g`, `u` and `y` are accepted and have no effect on matching.
    pub fn compile(source: &str, flags: &str) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(source)
            .case_insensitive(flags.contains('i'))
            .multi_line(flags.contains('m'))
            .dot_matches_new_line(flags.contains('s'))
            .build()?;
        Ok(Self {
            source: source.to_string(),
            flags: flags.to_string(),
            regex,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.flags == other.flags
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.source, self.flags)
    }
}

/// One element of a pattern list
#[derive(Debug, Clone)]
pub enum ExpectItem {
    Pattern(Pattern),
    /// Matches by equality during validation. The matrix reads it as a
    /// case-insensitive regex when it compiles as one.
    Literal { text: String, loose: Option<Regex> },
}

impl ExpectItem {
    pub fn literal(text: impl Into<String>) -> Self {
        let text = text.into();
        let loose = RegexBuilder::new(&text).case_insensitive(true).build().ok();
        ExpectItem::Literal { text, loose }
    }

    fn matches_value(&self, value: &str) -> bool {
        match self {
            ExpectItem::Pattern(pattern) => pattern.is_match(value),
            ExpectItem::Literal { text, .. } => value == text,
        }
    }

    fn matches_joined(&self, joined: &str) -> bool {
        match self {
            ExpectItem::Pattern(pattern) => pattern.is_match(joined),
            ExpectItem::Literal {
                loose: Some(regex), ..
            } => regex.is_match(joined),
            ExpectItem::Literal { text, loose: None } => {
                joined.to_lowercase().contains(&text.to_lowercase())
            }
        }
    }
}

impl PartialEq for ExpectItem {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ExpectItem::Pattern(a), ExpectItem::Pattern(b)) => a == b,
            (ExpectItem::Literal { text: a, .. }, ExpectItem::Literal { text: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for ExpectItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectItem::Pattern(pattern) => pattern.fmt(f),
            ExpectItem::Literal { text, .. } => f.write_str(text),
        }
    }
}

/// Expected value of one rule parameter
#[derive(Debug, Clone, PartialEq)]
pub enum ExpectedValue {
    /// Exact value (validation) or substring (matrix)
    Literal(String),

    /// At least one observed value must match
    Pattern(Pattern),

    /// Every item must be satisfied by some observed value, not necessarily the same one
    AllOf(Vec<ExpectItem>),
}

impl ExpectedValue {
    /// Decode the rules-file encoding of an expected value.
    pub fn from_json(value: &Value) -> Result<Self, String> {
        match value {
            Value::String(text) => match Pattern::parse(text) {
                Some(Ok(pattern)) => Ok(ExpectedValue::Pattern(pattern)),
                Some(Err(err)) => Err(err.to_string()),
                None => Ok(ExpectedValue::Literal(text.clone())),
            },
            Value::Number(_) | Value::Bool(_) => Ok(ExpectedValue::Literal(value.to_string())),
            Value::Array(items) => items
                .iter()
                .map(item_from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(ExpectedValue::AllOf),
            Value::Null => Err("null is not an expected value".to_string()),
            Value::Object(_) => Err("nested objects are not expected values".to_string()),
        }
    }

    /// Full-validation check against the parameter's observed values.
    pub fn matches_any(&self, values: &[&str]) -> bool {
        match self {
            ExpectedValue::Literal(text) => values.iter().any(|v| v == text),
            ExpectedValue::Pattern(pattern) => values.iter().any(|v| pattern.is_match(v)),
            ExpectedValue::AllOf(items) => items
                .iter()
                .all(|item| values.iter().any(|v| item.matches_value(v))),
        }
    }

    /// Matrix check against the `" | "`-joined values of every hit.
    pub fn matches_joined(&self, joined: &str) -> bool {
        match self {
            ExpectedValue::Literal(text) => joined.contains(text.as_str()),
            ExpectedValue::Pattern(pattern) => pattern.is_match(joined),
            ExpectedValue::AllOf(items) => items.iter().all(|item| item.matches_joined(joined)),
        }
    }
}

fn item_from_json(value: &Value) -> Result<ExpectItem, String> {
    match value {
        Value::String(text) => match Pattern::parse(text) {
            Some(Ok(pattern)) => Ok(ExpectItem::Pattern(pattern)),
            Some(Err(err)) => Err(err.to_string()),
            None => Ok(ExpectItem::literal(text.clone())),
        },
        Value::Number(_) | Value::Bool(_) => Ok(ExpectItem::literal(value.to_string())),
        _ => Err("pattern lists may only hold strings, numbers and booleans".to_string()),
    }
}

impl fmt::Display for ExpectedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedValue::Literal(text) => f.write_str(text),
            ExpectedValue::Pattern(pattern) => pattern.fmt(f),
            ExpectedValue::AllOf(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                f.write_str(&parts.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn expected(value: Value) -> ExpectedValue {
        ExpectedValue::from_json(&value).expect("valid expectation")
    }

    #[test]
    fn test_pattern_notation() {
        let pattern = Pattern::parse("/en_gb:home/i").expect("pattern").expect("compiles");
        assert!(pattern.is_match("EN_GB:HOME"));
        assert_eq!(pattern.to_string(), "/en_gb:home/i");

        assert!(Pattern::parse("en_gb:home").is_none());
        assert!(Pattern::parse("/").is_none());
        assert!(Pattern::parse("/path/to/page.html").is_none());
        assert!(Pattern::parse("/event(12/").expect("pattern").is_err());
    }

    #[test]
    fn test_scalar_literals() {
        assert_eq!(expected(json!("guest")), ExpectedValue::Literal("guest".into()));
        assert_eq!(expected(json!(12)), ExpectedValue::Literal("12".into()));
        assert_eq!(expected(json!(true)), ExpectedValue::Literal("true".into()));
        assert!(ExpectedValue::from_json(&json!(null)).is_err());
        assert!(ExpectedValue::from_json(&json!({"a": 1})).is_err());
    }

    #[test]
    fn test_pattern_list_needs_every_item_somewhere() {
        let rule = expected(json!(["/^1/", "/^2/"]));
        assert!(rule.matches_any(&["100", "200"]));
        assert!(!rule.matches_any(&["100", "150"]));
        assert!(!rule.matches_any(&[]));
    }

    #[test]
    fn test_empty_values_fail_everything() {
        for value in [json!("x"), json!("/.*/"), json!(["/.*/"])] {
            let rule = expected(value);
            assert!(!rule.matches_any(&[]), "{rule}");
        }
        assert!(!expected(json!("x")).matches_joined(""));
    }

    #[test]
    fn test_literal_checks_differ_between_matrix_and_validation() {
        let rule = expected(json!("event1"));
        assert!(rule.matches_joined("event12,event1 | event5"));
        assert!(!rule.matches_any(&["event12,event1", "event5"]));
    }

    #[test]
    fn test_literal_list_items_are_loose_in_matrix() {
        let rule = expected(json!(["PRODVIEW", "eVar(22"]));
        assert!(rule.matches_joined("prodView | eVar(22=abc"));
        assert!(!rule.matches_any(&["prodView", "eVar(22=abc"]));
        assert_eq!(rule.to_string(), "PRODVIEW, eVar(22");
    }
}
