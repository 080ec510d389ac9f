//! Contract tests against a real Chromium binary. Ignored by default; run with
//! `BEACONCHECK_CDP_CONTRACT=1 cargo test -- --ignored` on a machine with Chrome.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use beaconcheck_core_types::RawRequest;
use cdp_adapter::{event_bus, Cdp, CdpAdapter, CdpConfig, RequestObserver};
use parking_lot::Mutex;
use tokio::time::sleep;

fn contract_enabled() -> bool {
    env::var("BEACONCHECK_CDP_CONTRACT")
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

#[derive(Default)]
struct Urls(Mutex<Vec<String>>);

impl RequestObserver for Urls {
    fn on_request(&self, request: &RawRequest) {
        self.0.lock().push(request.url.clone());
    }
}

#[tokio::test]
#[ignore = "requires Chrome/Chromium; set BEACONCHECK_CDP_CONTRACT=1"]
async fn contract_navigation_is_observed() {
    if !contract_enabled() {
        eprintln!("skipping CDP contract test (BEACONCHECK_CDP_CONTRACT not enabled)");
        return;
    }

    let (bus, _rx) = event_bus(64);
    let cfg = CdpConfig {
        headless: true,
        ..CdpConfig::default()
    };
    let adapter = Arc::new(CdpAdapter::new(cfg, bus));
    Arc::clone(&adapter).start().await.expect("adapter start");
    let page = adapter.create_page().await.expect("create page");

    let urls = Arc::new(Urls::default());
    let main = adapter.main_frame(&page).expect("main frame");
    adapter.add_request_observer(&page, &main, urls.clone());

    adapter
        .navigate(&page, "https://example.com/", Duration::from_secs(20))
        .await
        .expect("navigate");
    sleep(Duration::from_millis(500)).await;

    let title = adapter.title(&page).await.expect("title");
    assert!(title.contains("Example"));
    assert!(urls.0.lock().iter().any(|u| u.starts_with("https://example.com")));

    adapter.shutdown().await;
}
