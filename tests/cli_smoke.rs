use assert_cmd::prelude::*;
use serde_json::Value;
use std::path::Path;
use std::process::Command;

fn beaconcheck() -> Command {
    let bin = assert_cmd::cargo::cargo_bin!("beaconcheck");
    Command::new(bin)
}

fn stdout_json(output: &std::process::Output) -> Value {
    let stdout = String::from_utf8(output.stdout.clone()).expect("utf8 output");
    serde_json::from_str(&stdout).expect("valid json")
}

#[test]
fn rules_check_summarises_each_platform() {
    let rules = Path::new("tests/fixtures/rules.json");
    assert!(rules.exists(), "fixture missing");

    let assert = beaconcheck()
        .args(["--output", "json", "rules", "check", rules.to_str().unwrap()])
        .assert()
        .success();
    let value = stdout_json(assert.get_output());
    let entries = value.as_array().expect("summary list");
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0]["platform"].as_str(), Some("adobe"));
    assert_eq!(entries[0]["steps"].as_u64(), Some(2));
    assert_eq!(entries[0]["parameters"].as_u64(), Some(3));
    assert_eq!(entries[1]["platform"].as_str(), Some("ga4"));
    assert_eq!(entries[2]["steps"].as_u64(), Some(0));
}

#[test]
fn rules_check_rejects_uncompilable_patterns() {
    beaconcheck()
        .args(["rules", "check", "tests/fixtures/bad_pattern_rules.json"])
        .assert()
        .failure();
}

#[test]
fn classify_normalizes_a_ga4_beacon() {
    let assert = beaconcheck()
        .args([
            "--output",
            "json",
            "classify",
            "--url",
            "https://www.google-analytics.com/g/collect?v=2&tid=G-ABC123&en=page_view&ep.page_type=home",
        ])
        .assert()
        .success();
    let value = stdout_json(assert.get_output());
    assert_eq!(value["platform"].as_str(), Some("ga4"));
    let hits = value["hits"].as_array().expect("hits");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["fields"]["en"].as_str(), Some("page_view"));
    assert_eq!(hits[0]["fields"]["ep.page_type"].as_str(), Some("home"));
}

#[test]
fn classify_splits_an_edge_batch_into_events() {
    let assert = beaconcheck()
        .args([
            "--output",
            "json",
            "classify",
            "--url",
            "https://edge.adobedc.net/ee/v1/interact?configId=abc",
            "--method",
            "post",
            "--body-file",
            "tests/fixtures/edge_batch.json",
        ])
        .assert()
        .success();
    let value = stdout_json(assert.get_output());
    assert_eq!(value["platform"].as_str(), Some("cja"));
    let hits = value["hits"].as_array().expect("hits");
    assert_eq!(hits.len(), 2);
    assert_eq!(
        hits[0]["fields"]["xdm.web.webPageDetails.name"].as_str(),
        Some("pdp")
    );
    assert_eq!(hits[1]["event_index"].as_u64(), Some(1));
}

#[test]
fn classify_fails_for_unrelated_requests() {
    beaconcheck()
        .args(["classify", "--url", "https://cdn.shop.test/app.js"])
        .assert()
        .failure();
}

#[test]
fn info_reports_version() {
    let assert = beaconcheck().arg("info").assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8 output");
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
    assert!(stdout.contains("Report Directory"));
}

#[test]
fn run_requires_a_journey() {
    beaconcheck().arg("run").assert().failure();
}
