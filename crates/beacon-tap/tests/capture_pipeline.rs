use std::sync::Arc;
use std::time::Duration;

use beacon_tap::{Classifier, HitSink, ListenerManager, Platform, StepCapture, TapConfig};
use cdp_adapter::{Cdp, CdpAdapter, CdpConfig, CdpTransport, FrameId, PageId, ScriptedTransport};
use serde_json::json;
use tokio::time::sleep;

const ADOBE_URL: &str = "https://smetrics.shop.test/b/ss/rsid/1/JS-2.22/s1?v10=x&events=event12";
const EDGE_URL: &str = "https://edge.adobedc.net/ee/v1/interact?configId=abc";

struct Harness {
    adapter: Arc<CdpAdapter>,
    transport: Arc<ScriptedTransport>,
    page: PageId,
    listeners: ListenerManager,
}

async fn harness() -> Harness {
    let (bus, _rx) = cdp_adapter::event_bus(64);
    let transport = ScriptedTransport::new();
    let adapter = Arc::new(CdpAdapter::with_transport(
        CdpConfig::default(),
        bus,
        transport.clone() as Arc<dyn CdpTransport>,
    ));
    Arc::clone(&adapter).start().await.expect("adapter starts");
    let page = adapter.create_page().await.expect("page");
    let classifier = Arc::new(Classifier::new(&TapConfig::default()).expect("classifier"));
    let listeners = ListenerManager::new(adapter.clone() as Arc<dyn Cdp>, classifier);
    Harness {
        adapter,
        transport,
        page,
        listeners,
    }
}

async fn settle() {
    sleep(Duration::from_millis(60)).await;
}

#[tokio::test]
async fn reattaching_never_double_counts() {
    let h = harness().await;
    let first = Arc::new(StepCapture::new("first"));
    let second = Arc::new(StepCapture::new("second"));
    h.listeners.attach(&h.page, first.clone() as Arc<dyn HitSink>);
    h.listeners.attach(&h.page, second.clone() as Arc<dyn HitSink>);
    h.listeners.attach(&h.page, second.clone() as Arc<dyn HitSink>);

    h.transport.emit_request("r1", Some("main"), ADOBE_URL, "GET", None);
    settle().await;

    assert_eq!(first.total(), 0);
    assert_eq!(second.count(Platform::Adobe), 1);
    assert_eq!(h.listeners.active_frames(&h.page), vec![FrameId::from("main")]);
    h.adapter.shutdown().await;
}

#[tokio::test]
async fn frames_attached_later_are_observed() {
    let h = harness().await;
    let capture = Arc::new(StepCapture::new("pdp"));
    h.listeners.attach(&h.page, capture.clone() as Arc<dyn HitSink>);

    h.transport.emit(
        "Page.frameAttached",
        json!({ "frameId": "tag-frame", "parentFrameId": "main" }),
    );
    settle().await;
    h.transport
        .emit_request("r2", Some("tag-frame"), ADOBE_URL, "GET", None);
    settle().await;

    assert_eq!(capture.count(Platform::Adobe), 1);
    assert_eq!(
        h.listeners.active_frames(&h.page),
        vec![FrameId::from("main"), FrameId::from("tag-frame")]
    );

    // Re-attaching replaces the observers on both frames.
    let next = Arc::new(StepCapture::new("next"));
    h.listeners.attach(&h.page, next.clone() as Arc<dyn HitSink>);
    h.transport
        .emit_request("r3", Some("tag-frame"), ADOBE_URL, "GET", None);
    settle().await;
    assert_eq!(capture.count(Platform::Adobe), 1);
    assert_eq!(next.count(Platform::Adobe), 1);
    h.adapter.shutdown().await;
}

#[tokio::test]
async fn event_arrays_fan_out_and_noise_is_ignored() {
    let h = harness().await;
    let capture = Arc::new(StepCapture::new("plp"));
    h.listeners.attach(&h.page, capture.clone() as Arc<dyn HitSink>);

    h.transport.emit_request(
        "r4",
        Some("main"),
        EDGE_URL,
        "POST",
        Some(r#"{"events":[{"xdm":{"eventType":"a"}},{"xdm":{"eventType":"b"}}]}"#),
    );
    h.transport
        .emit_request("r5", Some("main"), "https://shop.test/api/cart", "GET", None);
    h.transport
        .emit_request("r6", Some("main"), EDGE_URL, "POST", Some("not json"));
    settle().await;

    let hits = capture.freeze();
    assert_eq!(hits.total(), 2);
    let cja = hits.get(Platform::Cja);
    assert_eq!(cja[0].event_index(), Some(0));
    assert_eq!(cja[1].label(), "b");
    h.adapter.shutdown().await;
}

#[tokio::test]
async fn released_pages_stop_capturing() {
    let h = harness().await;
    let capture = Arc::new(StepCapture::new("home"));
    h.listeners.attach(&h.page, capture.clone() as Arc<dyn HitSink>);
    h.listeners.release_page(&h.page);

    h.transport.emit_request("r7", Some("main"), ADOBE_URL, "GET", None);
    settle().await;
    assert_eq!(capture.total(), 0);
    assert!(h.listeners.active_frames(&h.page).is_empty());
    h.adapter.shutdown().await;
}
