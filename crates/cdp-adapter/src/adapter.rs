use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use beaconcheck_core_types::RawRequest;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio::{select, spawn};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::events::RawEvent;
use crate::ids::{BrowserId, FrameId, PageId};
use crate::metrics;
use crate::observers::{FrameObserver, ObserverId, ObserverRegistry, RequestObserver};
use crate::registry::Registry;
use crate::scripts;
use crate::transport::{CdpTransport, ChromiumTransport, CommandTarget, TransportEvent};

/// Shared event bus type alias used by the adapter.
pub type EventBus = broadcast::Sender<RawEvent>;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Driver surface the capture pipeline depends on.
#[async_trait]
pub trait Cdp: Send + Sync {
    /// Navigates the page and waits for the main-frame load event.
    async fn navigate(&self, page: &PageId, url: &str, deadline: Duration)
        -> Result<(), AdapterError>;
    async fn reload(&self, page: &PageId, deadline: Duration) -> Result<(), AdapterError>;
    /// Subscribes to navigation events immediately; wait on the watch later.
    fn navigation_watch(&self, page: &PageId) -> NavigationWatch;
    async fn title(&self, page: &PageId) -> Result<String, AdapterError>;
    async fn content(&self, page: &PageId) -> Result<String, AdapterError>;
    async fn current_url(&self, page: &PageId) -> Result<String, AdapterError>;
    async fn element_exists(&self, page: &PageId, selector: &str) -> Result<bool, AdapterError>;
    /// Polls for the selector; `Ok(false)` when it never appeared.
    async fn wait_for_selector(
        &self,
        page: &PageId,
        selector: &str,
        timeout: Duration,
    ) -> Result<bool, AdapterError>;
    async fn click(&self, page: &PageId, selector: &str, deadline: Duration)
        -> Result<(), AdapterError>;
    async fn fill(
        &self,
        page: &PageId,
        selector: &str,
        text: &str,
        deadline: Duration,
    ) -> Result<(), AdapterError>;
    async fn select_value(
        &self,
        page: &PageId,
        selector: &str,
        value: &str,
    ) -> Result<(), AdapterError>;
    async fn evaluate_script(&self, page: &PageId, expression: &str)
        -> Result<Value, AdapterError>;
    async fn add_init_script(&self, page: &PageId, source: &str) -> Result<(), AdapterError>;
    async fn set_user_agent(
        &self,
        page: &PageId,
        user_agent: &str,
        accept_language: Option<&str>,
        platform: Option<&str>,
        locale: Option<&str>,
    ) -> Result<(), AdapterError>;
    async fn set_timezone(&self, page: &PageId, timezone: &str) -> Result<(), AdapterError>;
    async fn set_device_metrics(
        &self,
        page: &PageId,
        width: u32,
        height: u32,
        device_scale_factor: f64,
        mobile: bool,
    ) -> Result<(), AdapterError>;
    async fn set_touch_emulation(&self, page: &PageId, enabled: bool)
        -> Result<(), AdapterError>;
    fn frames(&self, page: &PageId) -> Vec<FrameId>;
    fn main_frame(&self, page: &PageId) -> Option<FrameId>;
    fn add_request_observer(
        &self,
        page: &PageId,
        frame: &FrameId,
        observer: Arc<dyn RequestObserver>,
    ) -> ObserverId;
    fn remove_request_observer(&self, page: &PageId, id: ObserverId) -> bool;
    fn add_frame_observer(&self, page: &PageId, observer: Arc<dyn FrameObserver>) -> ObserverId;
    fn remove_frame_observer(&self, page: &PageId, id: ObserverId) -> bool;
}

/// Navigation subscription taken before an action runs so that a navigation
/// triggered by the action itself is never missed.
pub struct NavigationWatch {
    page: PageId,
    rx: broadcast::Receiver<RawEvent>,
}

impl NavigationWatch {
    pub fn new(page: PageId, rx: broadcast::Receiver<RawEvent>) -> Self {
        Self { page, rx }
    }

    /// `true` if the main frame navigated before `deadline`. Timing out is not an error.
    pub async fn wait_until(&mut self, deadline: Instant) -> bool {
        let cutoff = epoch_cutoff(deadline);
        let page = self.page.clone();
        self.wait_for(deadline, |event| match event {
            RawEvent::PageNavigated { page: p, ts, .. } => *p == page && *ts <= cutoff,
            _ => false,
        })
        .await
    }

    /// `true` once the page fires its load event before `deadline`.
    pub async fn wait_for_load(&mut self, deadline: Instant) -> bool {
        let page = self.page.clone();
        self.wait_for(deadline, |event| match event {
            RawEvent::PageLifecycle { page: p, phase, .. } => *p == page && phase == "load",
            _ => false,
        })
        .await
    }

    async fn wait_for<F>(&mut self, deadline: Instant, mut accept: F) -> bool
    where
        F: FnMut(&RawEvent) -> bool,
    {
        let deadline = tokio::time::Instant::from_std(deadline);
        loop {
            match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Err(_) => return false,
                Ok(Ok(event)) if accept(&event) => return true,
                Ok(Ok(_)) => continue,
                Ok(Err(RecvError::Lagged(skipped))) => {
                    debug!(target: "cdp-adapter", skipped, "navigation watch lagged");
                }
                Ok(Err(RecvError::Closed)) => return false,
            }
        }
    }
}

/// Wall-clock millis of `deadline`, which may already lie in the past.
fn epoch_cutoff(deadline: Instant) -> u64 {
    let now = Instant::now();
    let epoch_now = timestamp_now();
    if deadline >= now {
        epoch_now.saturating_add(deadline.duration_since(now).as_millis() as u64)
    } else {
        epoch_now.saturating_sub(now.duration_since(deadline).as_millis() as u64)
    }
}

/// Adapter implementation with pluggable transport.
pub struct CdpAdapter {
    pub browser_id: BrowserId,
    pub cfg: CdpConfig,
    pub bus: EventBus,
    registry: Arc<Registry>,
    observers: Arc<ObserverRegistry>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    transport: Arc<dyn CdpTransport>,
}

impl CdpAdapter {
    pub fn new(cfg: CdpConfig, bus: EventBus) -> Self {
        let transport: Arc<dyn CdpTransport> = Arc::new(ChromiumTransport::new(cfg.clone()));
        Self::with_transport(cfg, bus, transport)
    }

    pub fn with_transport(cfg: CdpConfig, bus: EventBus, transport: Arc<dyn CdpTransport>) -> Self {
        Self {
            browser_id: BrowserId::new(),
            cfg,
            bus,
            registry: Arc::new(Registry::new()),
            observers: Arc::new(ObserverRegistry::new()),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            transport,
        }
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RawEvent> {
        self.bus.subscribe()
    }

    pub async fn start(self: Arc<Self>) -> Result<(), AdapterError> {
        {
            let guard = self.tasks.lock().await;
            if !guard.is_empty() {
                return Ok(());
            }
        }

        self.transport.start().await?;
        let loop_task = spawn(Self::event_loop(Arc::clone(&self)));
        self.tasks.lock().await.push(loop_task);
        info!(target: "cdp-adapter", browser = %self.browser_id.0, "event loop started");
        Ok(())
    }

    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let mut handles = self.tasks.lock().await;
        while let Some(handle) = handles.pop() {
            let _ = handle.await;
        }
    }

    /// Opens a fresh page target, attaches a flat session and enables the
    /// domains the pipeline listens to.
    pub async fn create_page(&self) -> Result<PageId, AdapterError> {
        let created = self
            .send_command("Target.createTarget", json!({ "url": "about:blank" }))
            .await?;
        let target_id = created
            .get("targetId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint("createTarget missing targetId")
            })?
            .to_string();

        let attached = self
            .send_command(
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
            )
            .await?;
        let session = attached
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint("attachToTarget missing sessionId")
            })?
            .to_string();

        let page = PageId::new();
        self.registry
            .insert_page(page.clone(), target_id.clone(), session.clone());

        for domain in ["Page.enable", "Network.enable", "Runtime.enable"] {
            self.send_page_command(&page, domain, json!({})).await?;
        }
        self.send_page_command(
            &page,
            "Page.setLifecycleEventsEnabled",
            json!({ "enabled": true }),
        )
        .await?;

        let tree = self
            .send_page_command(&page, "Page.getFrameTree", json!({}))
            .await?;
        if let Some(root) = tree.get("frameTree") {
            self.seed_frames(&page, root, true);
        }

        info!(
            target: "cdp-adapter",
            page = %page,
            target = %target_id,
            frames = self.registry.frames(&page).len(),
            "page attached"
        );
        Ok(page)
    }

    fn seed_frames(&self, page: &PageId, node: &Value, is_root: bool) {
        if let Some(id) = node
            .get("frame")
            .and_then(|frame| frame.get("id"))
            .and_then(Value::as_str)
        {
            let frame = FrameId::from(id);
            if is_root {
                self.registry.set_main_frame(page, frame);
                if let Some(url) = node
                    .get("frame")
                    .and_then(|frame| frame.get("url"))
                    .and_then(Value::as_str)
                {
                    self.registry.set_recent_url(page, url.to_string());
                }
            } else {
                self.registry.add_frame(page, frame);
            }
        }
        if let Some(children) = node.get("childFrames").and_then(Value::as_array) {
            for child in children {
                self.seed_frames(page, child, false);
            }
        }
    }

    async fn event_loop(self: Arc<Self>) {
        debug!(target: "cdp-adapter", "event loop entered");
        loop {
            select! {
                _ = self.shutdown.cancelled() => break,
                event = self.transport.next_event() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        if !self.shutdown.is_cancelled() {
                            self.handle_transport_closed();
                        }
                        break;
                    }
                },
            }
        }
        debug!(target: "cdp-adapter", "event loop exiting");
    }

    /// Drops every page; later commands on them fail with `PageClosed`.
    fn handle_transport_closed(&self) {
        let pages = self.registry.pages();
        warn!(target: "cdp-adapter", pages = pages.len(), "browser connection closed");
        for page in &pages {
            self.observers.drop_page(page);
            self.registry.remove_page(page);
            self.emit(RawEvent::PageLifecycle {
                page: page.clone(),
                frame: None,
                phase: "closed".into(),
                ts: timestamp_now(),
            });
        }
        self.emit(RawEvent::Error {
            page: None,
            message: "browser connection closed".to_string(),
        });
    }

    async fn handle_event(&self, event: TransportEvent) {
        if let Err(err) = self.process_event(event).await {
            self.emit(RawEvent::Error {
                page: None,
                message: format!("cdp event handling error: {err}"),
            });
        }
    }

    async fn process_event(&self, event: TransportEvent) -> Result<(), AdapterError> {
        metrics::record_event(&event.method);
        match event.method.as_str() {
            "Network.requestWillBeSent" => self.on_request_will_be_sent(event).await,
            "Page.frameAttached" => self.on_frame_attached(event),
            "Page.frameDetached" => self.on_frame_detached(event),
            "Page.frameNavigated" => self.on_frame_navigated(event),
            "Page.navigatedWithinDocument" => self.on_navigated_within_document(event),
            "Page.loadEventFired" => {
                if let Some(page) = self.page_from_session(event.session_id.as_deref()) {
                    let frame = self.registry.main_frame(&page);
                    self.emit_lifecycle(page, frame, "load");
                }
                Ok(())
            }
            "Page.lifecycleEvent" => self.on_lifecycle(event),
            "Target.detachedFromTarget" => self.on_target_detached(event),
            _ => {
                debug!(target: "cdp-adapter", method = %event.method, "unhandled cdp event");
                Ok(())
            }
        }
    }

    async fn on_request_will_be_sent(&self, event: TransportEvent) -> Result<(), AdapterError> {
        let payload: RequestWillBeSentParams = decode(event.params)?;
        let Some(page) = self.page_from_session(event.session_id.as_deref()) else {
            return Ok(());
        };

        let frame = match payload.frame_id.map(FrameId::from) {
            Some(frame) if self.registry.has_frame(&page, &frame) => frame,
            _ => match self.registry.main_frame(&page) {
                Some(main) => main,
                None => return Ok(()),
            },
        };

        if self.observers.request_observer_count(&page, &frame) == 0 {
            return Ok(());
        }

        let mut body = payload.request.post_data.clone();
        if body.is_none() {
            body = decode_post_entries(payload.request.post_data_entries.as_deref());
        }
        if body.is_none() && payload.request.has_post_data.unwrap_or(false) {
            body = self.fetch_post_data(&page, &payload.request_id).await;
        }

        let request = RawRequest {
            request_id: payload.request_id,
            url: payload.request.url,
            method: payload.request.method,
            body,
        };
        let seen = self.observers.dispatch_request(&page, &frame, &request);
        metrics::record_request(seen);
        Ok(())
    }

    async fn fetch_post_data(&self, page: &PageId, request_id: &str) -> Option<String> {
        match self
            .send_page_command(
                page,
                "Network.getRequestPostData",
                json!({ "requestId": request_id }),
            )
            .await
        {
            Ok(value) => value
                .get("postData")
                .and_then(Value::as_str)
                .map(str::to_string),
            Err(err) => {
                debug!(target: "cdp-adapter", request_id, %err, "post data unavailable");
                None
            }
        }
    }

    fn on_frame_attached(&self, event: TransportEvent) -> Result<(), AdapterError> {
        let payload: FrameAttachedParams = decode(event.params)?;
        let Some(page) = self.page_from_session(event.session_id.as_deref()) else {
            return Ok(());
        };
        let frame = FrameId::from(payload.frame_id);
        self.register_child_frame(&page, frame, payload.parent_frame_id.map(FrameId::from));
        Ok(())
    }

    fn register_child_frame(&self, page: &PageId, frame: FrameId, parent: Option<FrameId>) {
        if !self.registry.add_frame(page, frame.clone()) {
            return;
        }
        self.emit(RawEvent::FrameAttached {
            page: page.clone(),
            frame: frame.clone(),
            parent,
        });
        self.observers.dispatch_frame_attached(page, &frame);
    }

    fn on_frame_detached(&self, event: TransportEvent) -> Result<(), AdapterError> {
        let payload: FrameDetachedParams = decode(event.params)?;
        let Some(page) = self.page_from_session(event.session_id.as_deref()) else {
            return Ok(());
        };
        let frame = FrameId::from(payload.frame_id);
        if self.registry.remove_frame(&page, &frame) {
            self.observers.drop_frame(&page, &frame);
            self.emit(RawEvent::FrameDetached { page, frame });
        }
        Ok(())
    }

    fn on_frame_navigated(&self, event: TransportEvent) -> Result<(), AdapterError> {
        let payload: FrameNavigatedParams = decode(event.params)?;
        let Some(page) = self.page_from_session(event.session_id.as_deref()) else {
            return Ok(());
        };
        let frame = FrameId::from(payload.frame.id);

        match payload.frame.parent_id {
            None => {
                if let Some(previous) = self.registry.set_main_frame(&page, frame.clone()) {
                    self.observers.rekey_frame(&page, &previous, &frame);
                }
                let url = payload.frame.url.unwrap_or_default();
                self.registry.set_recent_url(&page, url.clone());
                self.emit(RawEvent::PageNavigated {
                    page,
                    url,
                    same_document: false,
                    ts: timestamp_now(),
                });
            }
            Some(parent) => {
                self.register_child_frame(&page, frame, Some(FrameId::from(parent)));
            }
        }
        Ok(())
    }

    fn on_navigated_within_document(&self, event: TransportEvent) -> Result<(), AdapterError> {
        let payload: NavigatedWithinDocumentParams = decode(event.params)?;
        let Some(page) = self.page_from_session(event.session_id.as_deref()) else {
            return Ok(());
        };
        if self.registry.main_frame(&page).as_ref().map(|f| f.0.as_str())
            != Some(payload.frame_id.as_str())
        {
            return Ok(());
        }
        self.registry.set_recent_url(&page, payload.url.clone());
        self.emit(RawEvent::PageNavigated {
            page,
            url: payload.url,
            same_document: true,
            ts: timestamp_now(),
        });
        Ok(())
    }

    fn on_lifecycle(&self, event: TransportEvent) -> Result<(), AdapterError> {
        let payload: PageLifecycleParams = decode(event.params)?;
        if let Some(page) = self.page_from_session(event.session_id.as_deref()) {
            let frame = payload.frame_id.map(FrameId::from);
            let phase = payload.name.to_ascii_lowercase();
            // Page.loadEventFired already covers the main-frame load.
            if phase == "load" {
                return Ok(());
            }
            self.emit_lifecycle(page, frame, &phase);
        }
        Ok(())
    }

    fn on_target_detached(&self, event: TransportEvent) -> Result<(), AdapterError> {
        let payload: DetachedFromTargetParams = decode(event.params)?;
        if let Some(page) = self.registry.page_for_session(&payload.session_id) {
            self.observers.drop_page(&page);
            self.registry.remove_page(&page);
            self.emit_lifecycle(page, None, "closed");
        }
        Ok(())
    }

    fn page_from_session(&self, session: Option<&str>) -> Option<PageId> {
        session.and_then(|sid| self.registry.page_for_session(sid))
    }

    fn emit_lifecycle(&self, page: PageId, frame: Option<FrameId>, phase: &str) {
        self.emit(RawEvent::PageLifecycle {
            page,
            frame,
            phase: phase.to_string(),
            ts: timestamp_now(),
        });
    }

    fn emit(&self, event: RawEvent) {
        let _ = self.bus.send(event);
    }

    async fn send_command(&self, method: &str, params: Value) -> Result<Value, AdapterError> {
        self.send_to(CommandTarget::Browser, method, params).await
    }

    async fn send_page_command(
        &self,
        page: &PageId,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        let session = self.registry.cdp_session(page).ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::PageClosed)
                .with_hint(format!("missing cdp session for page {page}"))
        })?;
        self.send_to(CommandTarget::Session(session), method, params)
            .await
    }

    async fn send_to(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        let start = Instant::now();
        let result = self.transport.send_command(target, method, params).await;
        metrics::record_command(method, start.elapsed(), result.is_ok());
        result
    }

    async fn evaluate_string(&self, page: &PageId, expression: &str) -> Result<String, AdapterError> {
        let value = self.evaluate_script(page, expression).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn dispatch_click_at(&self, page: &PageId, x: f64, y: f64) -> Result<(), AdapterError> {
        for kind in ["mouseMoved", "mousePressed", "mouseReleased"] {
            let mut payload = json!({
                "type": kind,
                "x": x,
                "y": y,
                "pointerType": "mouse",
            });
            if kind != "mouseMoved" {
                payload["button"] = json!("left");
                payload["buttons"] = json!(1);
                payload["clickCount"] = json!(1);
            }
            self.send_page_command(page, "Input.dispatchMouseEvent", payload)
                .await?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct RequestWillBeSentParams {
    #[serde(rename = "requestId")]
    request_id: String,
    #[serde(rename = "frameId")]
    frame_id: Option<String>,
    request: RequestPayload,
}

#[derive(Debug, Deserialize)]
struct RequestPayload {
    url: String,
    method: String,
    #[serde(rename = "postData")]
    post_data: Option<String>,
    #[serde(rename = "hasPostData")]
    has_post_data: Option<bool>,
    #[serde(rename = "postDataEntries")]
    post_data_entries: Option<Vec<PostDataEntry>>,
}

#[derive(Debug, Deserialize)]
struct PostDataEntry {
    bytes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FrameAttachedParams {
    #[serde(rename = "frameId")]
    frame_id: String,
    #[serde(rename = "parentFrameId")]
    parent_frame_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FrameDetachedParams {
    #[serde(rename = "frameId")]
    frame_id: String,
}

#[derive(Debug, Deserialize)]
struct FrameNavigatedParams {
    frame: FramePayload,
}

#[derive(Debug, Deserialize)]
struct FramePayload {
    id: String,
    #[serde(rename = "parentId")]
    parent_id: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NavigatedWithinDocumentParams {
    #[serde(rename = "frameId")]
    frame_id: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct PageLifecycleParams {
    name: String,
    #[serde(rename = "frameId")]
    frame_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetachedFromTargetParams {
    #[serde(rename = "sessionId")]
    session_id: String,
}

fn decode<T: for<'de> Deserialize<'de>>(params: Value) -> Result<T, AdapterError> {
    serde_json::from_value(params)
        .map_err(|err| AdapterError::new(AdapterErrorKind::Internal).with_hint(err.to_string()))
}

fn decode_post_entries(entries: Option<&[PostDataEntry]>) -> Option<String> {
    let entries = entries?;
    let mut bytes = Vec::new();
    for entry in entries {
        let chunk = entry.bytes.as_deref()?;
        bytes.extend(STANDARD.decode(chunk).ok()?);
    }
    (!bytes.is_empty()).then(|| String::from_utf8_lossy(&bytes).into_owned())
}

fn timestamp_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_millis() as u64
}

#[async_trait]
impl Cdp for CdpAdapter {
    async fn navigate(
        &self,
        page: &PageId,
        url: &str,
        deadline: Duration,
    ) -> Result<(), AdapterError> {
        let mut watch = self.navigation_watch(page);
        let response = self
            .send_page_command(page, "Page.navigate", json!({ "url": url }))
            .await?;
        if let Some(error) = response
            .get("errorText")
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
        {
            return Err(AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint(format!("navigation to {url} failed: {error}")));
        }
        self.registry.set_recent_url(page, url.to_string());
        if !watch.wait_for_load(Instant::now() + deadline).await {
            return Err(AdapterError::new(AdapterErrorKind::NavTimeout)
                .with_hint(format!("load event for {url} not seen within {deadline:?}")));
        }
        Ok(())
    }

    async fn reload(&self, page: &PageId, deadline: Duration) -> Result<(), AdapterError> {
        let mut watch = self.navigation_watch(page);
        self.send_page_command(page, "Page.reload", json!({ "ignoreCache": false }))
            .await?;
        if !watch.wait_for_load(Instant::now() + deadline).await {
            return Err(AdapterError::new(AdapterErrorKind::NavTimeout)
                .with_hint("reload did not reach the load event"));
        }
        Ok(())
    }

    fn navigation_watch(&self, page: &PageId) -> NavigationWatch {
        NavigationWatch::new(page.clone(), self.bus.subscribe())
    }

    async fn title(&self, page: &PageId) -> Result<String, AdapterError> {
        self.evaluate_string(page, scripts::DOCUMENT_TITLE).await
    }

    async fn content(&self, page: &PageId) -> Result<String, AdapterError> {
        self.evaluate_string(page, scripts::DOCUMENT_HTML).await
    }

    async fn current_url(&self, page: &PageId) -> Result<String, AdapterError> {
        self.evaluate_string(page, scripts::LOCATION_HREF).await
    }

    async fn element_exists(&self, page: &PageId, selector: &str) -> Result<bool, AdapterError> {
        let value = self
            .evaluate_script(page, &scripts::selector_exists(selector)?)
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn wait_for_selector(
        &self,
        page: &PageId,
        selector: &str,
        timeout: Duration,
    ) -> Result<bool, AdapterError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.element_exists(page, selector).await {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(err) if err.is(AdapterErrorKind::PageClosed) => return Err(err),
                // Execution contexts vanish mid-navigation; keep polling.
                Err(err) => debug!(target: "cdp-adapter", %err, selector, "selector check failed"),
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn click(
        &self,
        page: &PageId,
        selector: &str,
        deadline: Duration,
    ) -> Result<(), AdapterError> {
        let script = scripts::element_center(selector)?;
        let deadline_at = Instant::now() + deadline;
        let (x, y) = loop {
            let value = self.evaluate_script(page, &script).await?;
            if let (Some(x), Some(y)) = (
                value.get("x").and_then(Value::as_f64),
                value.get("y").and_then(Value::as_f64),
            ) {
                break (x, y);
            }
            if Instant::now() >= deadline_at {
                return Err(AdapterError::new(AdapterErrorKind::TargetNotFound)
                    .with_hint(format!("click target not found for selector '{selector}'")));
            }
            sleep(POLL_INTERVAL).await;
        };
        self.dispatch_click_at(page, x, y).await
    }

    async fn fill(
        &self,
        page: &PageId,
        selector: &str,
        text: &str,
        deadline: Duration,
    ) -> Result<(), AdapterError> {
        if !self.wait_for_selector(page, selector, deadline).await? {
            return Err(AdapterError::new(AdapterErrorKind::TargetNotFound)
                .with_hint(format!("fill target not found for selector '{selector}'")));
        }
        let focused = self
            .evaluate_script(page, &scripts::prepare_fill(selector)?)
            .await?;
        if !focused.as_bool().unwrap_or(false) {
            return Err(AdapterError::new(AdapterErrorKind::TargetNotFound)
                .with_hint(format!("fill target detached for selector '{selector}'")));
        }
        self.send_page_command(page, "Input.insertText", json!({ "text": text }))
            .await?;
        self.evaluate_script(page, &scripts::dispatch_change(selector)?)
            .await?;
        Ok(())
    }

    async fn select_value(
        &self,
        page: &PageId,
        selector: &str,
        value: &str,
    ) -> Result<(), AdapterError> {
        let applied = self
            .evaluate_script(page, &scripts::select_value(selector, value)?)
            .await?;
        if applied.as_bool().unwrap_or(false) {
            Ok(())
        } else {
            Err(AdapterError::new(AdapterErrorKind::TargetNotFound)
                .with_hint(format!("select target not found for selector '{selector}'")))
        }
    }

    async fn evaluate_script(
        &self,
        page: &PageId,
        expression: &str,
    ) -> Result<Value, AdapterError> {
        let response = self
            .send_page_command(
                page,
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "awaitPromise": true,
                    "returnByValue": true,
                    "userGesture": true,
                }),
            )
            .await?;

        if let Some(details) = response.get("exceptionDetails") {
            let text = details
                .get("exception")
                .and_then(|e| e.get("description"))
                .or_else(|| details.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("evaluation raised an exception")
                .to_string();
            return Err(AdapterError::new(AdapterErrorKind::ScriptException)
                .with_hint(text)
                .with_data(details.clone()));
        }

        Ok(response
            .get("result")
            .and_then(|res| res.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn add_init_script(&self, page: &PageId, source: &str) -> Result<(), AdapterError> {
        self.send_page_command(
            page,
            "Page.addScriptToEvaluateOnNewDocument",
            json!({ "source": source }),
        )
        .await?;
        Ok(())
    }

    async fn set_user_agent(
        &self,
        page: &PageId,
        user_agent: &str,
        accept_language: Option<&str>,
        platform: Option<&str>,
        locale: Option<&str>,
    ) -> Result<(), AdapterError> {
        let mut params = serde_json::Map::new();
        params.insert("userAgent".into(), Value::String(user_agent.to_string()));
        if let Some(lang) = accept_language {
            params.insert("acceptLanguage".into(), Value::String(lang.to_string()));
        }
        if let Some(platform) = platform {
            params.insert("platform".into(), Value::String(platform.to_string()));
        }
        self.send_page_command(page, "Emulation.setUserAgentOverride", Value::Object(params))
            .await?;

        if let Some(locale) = locale {
            self.send_page_command(
                page,
                "Emulation.setLocaleOverride",
                json!({ "locale": locale }),
            )
            .await?;
        }
        Ok(())
    }

    async fn set_timezone(&self, page: &PageId, timezone: &str) -> Result<(), AdapterError> {
        self.send_page_command(
            page,
            "Emulation.setTimezoneOverride",
            json!({ "timezoneId": timezone }),
        )
        .await?;
        Ok(())
    }

    async fn set_device_metrics(
        &self,
        page: &PageId,
        width: u32,
        height: u32,
        device_scale_factor: f64,
        mobile: bool,
    ) -> Result<(), AdapterError> {
        self.send_page_command(
            page,
            "Emulation.setDeviceMetricsOverride",
            json!({
                "width": width,
                "height": height,
                "deviceScaleFactor": device_scale_factor,
                "mobile": mobile,
            }),
        )
        .await?;
        Ok(())
    }

    async fn set_touch_emulation(&self, page: &PageId, enabled: bool) -> Result<(), AdapterError> {
        self.send_page_command(
            page,
            "Emulation.setTouchEmulationEnabled",
            json!({ "enabled": enabled }),
        )
        .await?;
        Ok(())
    }

    fn frames(&self, page: &PageId) -> Vec<FrameId> {
        self.registry.frames(page)
    }

    fn main_frame(&self, page: &PageId) -> Option<FrameId> {
        self.registry.main_frame(page)
    }

    fn add_request_observer(
        &self,
        page: &PageId,
        frame: &FrameId,
        observer: Arc<dyn RequestObserver>,
    ) -> ObserverId {
        self.observers.add_request(page, frame, observer)
    }

    fn remove_request_observer(&self, page: &PageId, id: ObserverId) -> bool {
        self.observers.remove_request(page, id)
    }

    fn add_frame_observer(&self, page: &PageId, observer: Arc<dyn FrameObserver>) -> ObserverId {
        self.observers.add_frame(page, observer)
    }

    fn remove_frame_observer(&self, page: &PageId, id: ObserverId) -> bool {
        self.observers.remove_frame(page, id)
    }
}
