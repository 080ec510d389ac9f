use std::io::Write;
use std::sync::Arc;

use cdp_adapter::{Cdp, CdpAdapter, CdpConfig, CdpTransport, PageId, ScriptedTransport};
use serde_json::json;
use stealth::config::{load_bundle_from_path, DEFAULT_USER_AGENT};
use stealth::{ChallengeLocation, StealthControl, StealthRuntime};

async fn runtime() -> (StealthRuntime, Arc<ScriptedTransport>, PageId, Arc<CdpAdapter>) {
    let (bus, _rx) = cdp_adapter::event_bus(16);
    let transport = ScriptedTransport::new();
    let adapter = Arc::new(CdpAdapter::with_transport(
        CdpConfig::default(),
        bus,
        transport.clone() as Arc<dyn CdpTransport>,
    ));
    Arc::clone(&adapter).start().await.expect("adapter starts");
    let page = adapter.create_page().await.expect("page");
    let runtime = StealthRuntime::new(adapter.clone() as Arc<dyn Cdp>);
    (runtime, transport, page, adapter)
}

#[tokio::test]
async fn default_profile_is_applied_to_the_page() {
    let (runtime, transport, page, adapter) = runtime().await;
    runtime.configure_page(&page).await.expect("profile applied");

    let ua = transport.commands_named("Emulation.setUserAgentOverride");
    assert_eq!(ua.len(), 1);
    assert_eq!(ua[0]["userAgent"], json!(DEFAULT_USER_AGENT));
    assert_eq!(ua[0]["acceptLanguage"], json!("en-GB,en"));

    let metrics = transport.commands_named("Emulation.setDeviceMetricsOverride");
    assert_eq!(metrics[0]["width"], json!(1366));
    assert_eq!(metrics[0]["height"], json!(768));

    let scripts = transport.commands_named("Page.addScriptToEvaluateOnNewDocument");
    assert!(scripts[0]["source"]
        .as_str()
        .unwrap_or_default()
        .contains("webdriver"));
    assert!(transport
        .commands_named("Emulation.setTouchEmulationEnabled")
        .is_empty());
    adapter.shutdown().await;
}

#[tokio::test]
async fn bundle_from_file_replaces_profile_and_markers() {
    let (runtime, transport, page, adapter) = runtime().await;
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(
        file,
        "profiles:\n  - name: kiosk\n    user_agent: KioskUA\n    timezone: Europe/London\n    init_script: ''\nchallenge:\n  title_or_content: []\n  content: [px-captcha]"
    )
    .expect("write bundle");

    runtime
        .load_bundle(load_bundle_from_path(file.path()).expect("bundle"))
        .expect("bundle applies");
    runtime.configure_page(&page).await.expect("profile applied");

    assert_eq!(
        transport.commands_named("Emulation.setTimezoneOverride")[0]["timezoneId"],
        json!("Europe/London")
    );
    assert!(transport
        .commands_named("Page.addScriptToEvaluateOnNewDocument")
        .is_empty());
    assert_eq!(runtime.markers().content, vec!["px-captcha".to_string()]);
    adapter.shutdown().await;
}

#[tokio::test]
async fn challenge_pages_are_detected() {
    let (runtime, transport, page, adapter) = runtime().await;
    assert!(runtime.detect_challenge(&page).await.is_none());

    transport.respond(
        "Runtime.evaluate",
        Some("outerHTML"),
        json!({ "result": { "type": "string", "value": "<div>Press & Hold</div>" } }),
    );
    let challenge = runtime.detect_challenge(&page).await.expect("challenge");
    assert_eq!(challenge.location, ChallengeLocation::Content);
    assert_eq!(challenge.marker, "Press & Hold");
    adapter.shutdown().await;
}

#[tokio::test]
async fn unreadable_pages_are_not_challenges() {
    let (runtime, transport, page, adapter) = runtime().await;
    transport.fail("Runtime.evaluate", None, "context destroyed");
    assert!(runtime.detect_challenge(&page).await.is_none());
    adapter.shutdown().await;
}
