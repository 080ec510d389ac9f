use std::path::Path;

use action_flow::Journey;
use action_primitives::StepAction;
use beaconcheck_cli::config::{AppConfig, ReportFormat};
use beaconcheck_core_types::Platform;
use expect_gate::RuleBook;
use stealth::config::load_bundle_from_path;

#[test]
fn demo_journey_loads() {
    let journey = Journey::load(Path::new("demos/checkout_journey.yaml")).expect("journey");
    assert_eq!(journey.name, "Desktop Checkout");
    assert_eq!(journey.steps.len(), 7);

    let first = journey.actions_for(0);
    assert!(matches!(&first[0], StepAction::Visit { url, .. } if url == "https://www.shop.test/"));
    assert_eq!(journey.steps[3].settle_ms, Some(4_000));
    assert!(matches!(
        journey.steps[5].actions[1],
        StepAction::RunScript { await_navigation: true, .. }
    ));
}

#[test]
fn demo_rules_cover_every_platform() {
    let book = RuleBook::load(Path::new("demos/checkout_rules.json")).expect("rules");
    assert!(book.rule(Platform::Adobe, "Add To Bag").is_some());
    assert!(book.rule(Platform::Ga4, "Homepage").is_some());
    assert!(book.rule(Platform::Cja, "PDP").is_some());
    assert!(book.summary().iter().all(|entry| entry.steps > 0));
}

#[test]
fn shipped_config_and_profile_parse() {
    let config = AppConfig::load(Path::new("config/beaconcheck.yaml")).expect("config");
    assert_eq!(config.timings.settle_ms, 8_000);
    assert_eq!(config.report.formats, vec![ReportFormat::Csv, ReportFormat::Json]);
    assert!(config.decisions.interactive);

    let bundle = load_bundle_from_path("demos/stealth_profile.yaml").expect("profile");
    let profile = bundle.active_profile().expect("active profile");
    assert_eq!(profile.name, "desktop-gb");
    assert_eq!(profile.timezone.as_deref(), Some("Europe/London"));
}
