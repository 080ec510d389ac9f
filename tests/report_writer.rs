use std::collections::BTreeMap;
use std::fs;

use action_flow::{ReportSink, RunState, StepResult};
use beacon_tap::CapturedHits;
use beaconcheck_cli::config::{ReportConfig, ReportFormat};
use beaconcheck_cli::report::{build_sinks, CsvReportWriter, JsonReportWriter};
use beaconcheck_core_types::{Hit, Platform};
use chrono::Utc;
use expect_gate::{RuleBook, RuleEngine};
use tempfile::TempDir;

fn adobe_hit(pairs: &[(&str, &str)]) -> Hit {
    let fields: BTreeMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Hit::new(Platform::Adobe, fields)
}

fn step_result(name: &str, index: usize, engine: &RuleEngine, hits: Vec<Hit>) -> StepResult {
    let mut captured = CapturedHits::new();
    for hit in hits {
        captured.push(hit);
    }
    let validations = captured
        .platforms_with_hits()
        .into_iter()
        .map(|platform| engine.validate_platform(name, platform, captured.get(platform)))
        .collect();
    StepResult {
        step: name.to_string(),
        index,
        hits: captured,
        validations,
        navigated: false,
        challenges: 0,
        actions: Vec::new(),
        started_at: Utc::now(),
        finished_at: Utc::now(),
    }
}

fn engine() -> RuleEngine {
    RuleEngine::new(
        RuleBook::parse(r#"{"adobe": {"PDP: Size [M]": {"expectedHits": [{"v10": "pdp"}]}}}"#)
            .expect("rules"),
    )
}

#[test]
fn csv_report_lays_out_steps_and_summaries() {
    let dir = TempDir::new().expect("tempdir");
    let engine = engine();
    let mut state = RunState::new("Mobile Checkout");
    let steps = vec![
        step_result("Home", 0, &engine, vec![adobe_hit(&[("v10", "home"), ("pageName", "home")])]),
        step_result(
            "PDP: Size [M]",
            1,
            &engine,
            vec![adobe_hit(&[("v10", "plp\u{1}"), ("events", "prodView")])],
        ),
    ];
    for step in &steps {
        state.accumulate(step);
    }
    let snapshot = state.snapshot();

    let writer = CsvReportWriter::new(dir.path());
    writer.export_final(&snapshot, &steps).expect("export");

    let run_dir = dir.path().join(&snapshot.run_id);
    let pdp = CsvReportWriter::step_file(&run_dir, "Mobile Checkout", Platform::Adobe, "PDP: Size [M]");
    assert!(pdp.ends_with("Mobile_Checkout_adobe_hits_per_step/ADOBE Step - PDP Size M.csv"));
    let text = fs::read_to_string(&pdp).expect("step file");
    assert!(text.starts_with("Param,Hit 1,Status\n"));
    assert!(text.contains("v10,plp,Fail"));
    assert!(text.contains("Step,Parameter,Expected,Actual,Status"));
    assert!(text.trim_end().ends_with("PDP: Size [M] [ADOBE],,,,Fail"));

    let summary = fs::read_to_string(run_dir.join("Summary.csv")).expect("summary");
    assert!(summary.starts_with("Param,Hit 1,Hit 2\n"));

    let failures = fs::read_to_string(run_dir.join("validation_summary.csv")).expect("failures");
    let mut lines = failures.lines();
    assert_eq!(lines.next(), Some("Platform,Step,Parameter,Expected,Actual,Status"));
    assert_eq!(lines.next(), Some("ADOBE,PDP: Size [M] [ADOBE],v10,pdp,plp,Fail"));
}

#[test]
fn truncated_step_names_get_their_own_files() {
    let dir = TempDir::new().expect("tempdir");
    let engine = engine();
    let mut state = RunState::new("plp");
    let steps = vec![
        step_result(
            "Click First Product Tile - Men",
            0,
            &engine,
            vec![adobe_hit(&[("v10", "men")])],
        ),
        step_result(
            "Click First Product Tile - Women",
            1,
            &engine,
            vec![adobe_hit(&[("v10", "women")])],
        ),
    ];
    for step in &steps {
        state.accumulate(step);
    }
    let snapshot = state.snapshot();

    CsvReportWriter::new(dir.path())
        .export_final(&snapshot, &steps)
        .expect("export");
    let folder = dir.path().join(&snapshot.run_id).join("plp_adobe_hits_per_step");
    let men = fs::read_to_string(folder.join("ADOBE Step - Click First Produc.csv")).expect("men");
    let women = fs::read_to_string(folder.join("ADOBE Step - Click First Prod-2.csv")).expect("women");
    assert!(men.contains("v10,men,Pass"));
    assert!(women.contains("v10,women,Pass"));
    assert!(women.trim_end().ends_with("Click First Product Tile - Women [ADOBE],,,,Pass"));
}

#[test]
fn clean_runs_skip_the_validation_summary() {
    let dir = TempDir::new().expect("tempdir");
    let engine = engine();
    let mut state = RunState::new("home");
    let steps = vec![step_result("Home", 0, &engine, vec![adobe_hit(&[("v10", "home")])])];
    state.accumulate(&steps[0]);
    let snapshot = state.snapshot();

    CsvReportWriter::new(dir.path())
        .export_final(&snapshot, &steps)
        .expect("export");
    let run_dir = dir.path().join(&snapshot.run_id);
    assert!(run_dir.join("Summary.csv").exists());
    assert!(!run_dir.join("validation_summary.csv").exists());
}

#[test]
fn partial_exports_go_to_their_own_folder() {
    let dir = TempDir::new().expect("tempdir");
    let engine = engine();
    let mut state = RunState::new("home");
    let steps = vec![step_result("Home", 0, &engine, vec![adobe_hit(&[("v10", "home")])])];
    state.accumulate(&steps[0]);
    let snapshot = state.snapshot();

    let sink = build_sinks(&ReportConfig {
        output_dir: dir.path().to_path_buf(),
        formats: vec![ReportFormat::Csv, ReportFormat::Json],
    });
    sink.export_partial(&snapshot, &steps).expect("partial");

    let partial = dir.path().join(&snapshot.run_id).join("partial");
    assert!(partial.join("report.json").exists());
    assert!(partial.join("home_adobe_hits_per_step").join("ADOBE Step - Home.csv").exists());
    assert!(!dir.path().join(&snapshot.run_id).join("Summary.csv").exists());
}

#[test]
fn json_report_carries_the_run_model() {
    let dir = TempDir::new().expect("tempdir");
    let engine = engine();
    let mut state = RunState::new("home");
    let steps = vec![step_result("Home", 0, &engine, vec![adobe_hit(&[("v10", "home")])])];
    state.accumulate(&steps[0]);
    let snapshot = state.snapshot();

    JsonReportWriter::new(dir.path())
        .export_final(&snapshot, &steps)
        .expect("export");
    let body = fs::read_to_string(dir.path().join(&snapshot.run_id).join("report.json")).expect("json");
    let value: serde_json::Value = serde_json::from_str(&body).expect("valid json");
    assert_eq!(value["partial"], false);
    assert_eq!(value["run"]["journey"], "home");
    assert_eq!(value["steps"][0]["step"], "Home");
    assert_eq!(value["run"]["hits"].as_array().map(Vec::len), Some(1));
}
