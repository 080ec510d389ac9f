use std::collections::BTreeMap;
use std::io::Write;

use beaconcheck_core_types::{Hit, Platform};
use expect_gate::{all_passed, evaluate, matrix, RuleBook, RuleEngine};

fn hit(platform: Platform, pairs: &[(&str, &str)]) -> Hit {
    let fields: BTreeMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Hit::new(platform, fields)
}

const RULES: &str = r#"
adobe:
  Click First Product:
    expectedHits:
      - v12: product
        pageName: /en_gb:pdp:/i
        events: ["/prodView/"]
        products: ["/eVar22=[^|]+/", "/eVar17/"]
ga4:
  Click First Product:
    expectedHits:
      - en: view_item
"#;

#[test]
fn rules_file_round_trips_through_the_engine() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(RULES.as_bytes()).expect("write rules");
    let book = RuleBook::load(file.path()).expect("rules load");
    let engine = RuleEngine::new(book);

    let adobe = vec![
        hit(
            Platform::Adobe,
            &[
                ("v12", "product"),
                ("pageName", "EN_GB:PDP:polo"),
                ("events", "prodView,event3"),
                ("products", ";123;;;;eVar22=polo"),
            ],
        ),
        hit(Platform::Adobe, &[("products", ";123;;;;eVar17=m")]),
    ];
    let validation = engine.validate_platform("Click First Product", Platform::Adobe, &adobe);
    assert!(validation.passed, "{:?}", validation.verdicts);
    assert_eq!(validation.verdicts.len(), 4);

    // The GA4 rule is declared but the event never fired.
    let ga4 = vec![hit(Platform::Ga4, &[("en", "page_view")])];
    let verdicts = engine.evaluate("Click First Product", Platform::Ga4, &ga4);
    assert!(!all_passed(&verdicts));
    assert_eq!(verdicts[0].actual, "page_view");
}

#[test]
fn matrix_and_validation_may_disagree() {
    let book = RuleBook::parse(r#"{"adobe": {"Home": {"expectedHits": [{"v10": "en_gb"}]}}}"#)
        .expect("rules parse");
    let rule = book.rule(Platform::Adobe, "Home");
    let hits = vec![hit(Platform::Adobe, &[("v10", "en_gb:home")])];

    let rows = matrix(&hits, rule).rows;
    assert!(rows[0].passed);
    let verdicts = evaluate("Home", Platform::Adobe, &hits, rule);
    assert!(!verdicts[0].passed);
}

#[test]
fn zero_hits_fail_every_declared_parameter() {
    let book = RuleBook::parse(r#"{"cja": {"Home": {"expectedHits": [{"a": "x", "b": "/y/", "c": ["/z/"]}]}}}"#)
        .expect("rules parse");
    let verdicts = evaluate("Home", Platform::Cja, &[], book.rule(Platform::Cja, "Home"));
    assert_eq!(verdicts.len(), 3);
    assert!(verdicts.iter().all(|v| !v.passed));
}
