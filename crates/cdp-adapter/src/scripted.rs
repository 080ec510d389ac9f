//! In-process transport that answers commands from scripted rules.
//!
//! It never opens a socket. Tests (and offline dry runs) register rules that
//! map a method, optionally narrowed by a substring of the serialized params,
//! to a response plus follow-up protocol events, and can inject events at any
//! time. Commands without a matching rule get the responses a freshly
//! launched Chromium would give for a blank page.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify};

use crate::error::{AdapterError, AdapterErrorKind};
use crate::transport::{CdpTransport, CommandTarget, TransportEvent};

pub const DEFAULT_TARGET: &str = "target-1";
pub const DEFAULT_SESSION: &str = "session-1";
pub const MAIN_FRAME: &str = "main";

#[derive(Clone, Debug)]
pub struct ScriptedEvent {
    pub method: String,
    pub params: Value,
}

impl ScriptedEvent {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

#[derive(Clone, Debug)]
struct Rule {
    method: String,
    contains: Option<String>,
    outcome: Result<Value, String>,
    events: Vec<ScriptedEvent>,
}

impl Rule {
    fn matches(&self, method: &str, params: &str) -> bool {
        self.method == method
            && self
                .contains
                .as_deref()
                .map(|needle| params.contains(needle))
                .unwrap_or(true)
    }
}

pub struct ScriptedTransport {
    started: AtomicBool,
    closed: AtomicBool,
    closed_signal: Notify,
    tx: mpsc::UnboundedSender<TransportEvent>,
    rx: AsyncMutex<mpsc::UnboundedReceiver<TransportEvent>>,
    rules: Mutex<Vec<Rule>>,
    commands: Mutex<Vec<(String, Value)>>,
    last_url: Mutex<String>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            closed_signal: Notify::new(),
            tx,
            rx: AsyncMutex::new(rx),
            rules: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
            last_url: Mutex::new("about:blank".into()),
        })
    }

    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Ends the event stream the way a crashed or closed browser does.
    pub fn disconnect(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.closed_signal.notify_one();
    }

    /// Later rules win over earlier ones for the same command.
    pub fn respond(&self, method: &str, contains: Option<&str>, response: Value) {
        self.respond_with_events(method, contains, response, Vec::new());
    }

    pub fn respond_with_events(
        &self,
        method: &str,
        contains: Option<&str>,
        response: Value,
        events: Vec<ScriptedEvent>,
    ) {
        self.rules.lock().push(Rule {
            method: method.to_string(),
            contains: contains.map(str::to_string),
            outcome: Ok(response),
            events,
        });
    }

    pub fn fail(&self, method: &str, contains: Option<&str>, message: &str) {
        self.rules.lock().push(Rule {
            method: method.to_string(),
            contains: contains.map(str::to_string),
            outcome: Err(message.to_string()),
            events: Vec::new(),
        });
    }

    /// Injects a page-session event.
    pub fn emit(&self, method: &str, params: Value) {
        self.push(method, params, Some(DEFAULT_SESSION.to_string()));
    }

    /// Injects a browser-level event.
    pub fn emit_browser(&self, method: &str, params: Value) {
        self.push(method, params, None);
    }

    pub fn emit_request(
        &self,
        request_id: &str,
        frame: Option<&str>,
        url: &str,
        method: &str,
        body: Option<&str>,
    ) {
        self.emit(
            "Network.requestWillBeSent",
            request_event(request_id, frame, url, method, body),
        );
    }

    pub fn commands(&self) -> Vec<(String, Value)> {
        self.commands.lock().clone()
    }

    pub fn commands_named(&self, method: &str) -> Vec<Value> {
        self.commands
            .lock()
            .iter()
            .filter(|(name, _)| name == method)
            .map(|(_, params)| params.clone())
            .collect()
    }

    fn push(&self, method: &str, params: Value, session_id: Option<String>) {
        let _ = self.tx.send(TransportEvent {
            method: method.to_string(),
            params,
            session_id,
        });
    }

    fn default_response(&self, method: &str, params: &Value) -> (Value, Vec<ScriptedEvent>) {
        match method {
            "Target.createTarget" => (json!({ "targetId": DEFAULT_TARGET }), Vec::new()),
            "Target.attachToTarget" => (json!({ "sessionId": DEFAULT_SESSION }), Vec::new()),
            "Page.getFrameTree" => (
                json!({
                    "frameTree": {
                        "frame": { "id": MAIN_FRAME, "url": "about:blank" },
                        "childFrames": []
                    }
                }),
                Vec::new(),
            ),
            "Page.navigate" => {
                let url = params
                    .get("url")
                    .and_then(Value::as_str)
                    .unwrap_or("about:blank")
                    .to_string();
                *self.last_url.lock() = url.clone();
                (
                    json!({ "frameId": MAIN_FRAME, "loaderId": "loader-1" }),
                    main_frame_load(&url),
                )
            }
            "Page.reload" => {
                let url = self.last_url.lock().clone();
                (json!({}), main_frame_load(&url))
            }
            "Runtime.evaluate" => (json!({ "result": { "type": "undefined" } }), Vec::new()),
            _ => (json!({}), Vec::new()),
        }
    }
}

/// Events Chromium emits when the main frame commits and finishes loading `url`.
pub fn main_frame_load(url: &str) -> Vec<ScriptedEvent> {
    vec![
        ScriptedEvent::new(
            "Page.frameNavigated",
            json!({ "frame": { "id": MAIN_FRAME, "url": url } }),
        ),
        ScriptedEvent::new("Page.loadEventFired", json!({ "timestamp": 0.0 })),
    ]
}

pub fn request_event(
    request_id: &str,
    frame: Option<&str>,
    url: &str,
    method: &str,
    body: Option<&str>,
) -> Value {
    let mut request = json!({ "url": url, "method": method });
    if let Some(body) = body {
        request["postData"] = json!(body);
        request["hasPostData"] = json!(true);
    }
    let mut params = json!({ "requestId": request_id, "request": request });
    if let Some(frame) = frame {
        params["frameId"] = json!(frame);
    }
    params
}

#[async_trait]
impl CdpTransport for ScriptedTransport {
    async fn start(&self) -> Result<(), AdapterError> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        let mut rx = self.rx.lock().await;
        tokio::select! {
            event = rx.recv() => event,
            _ = self.closed_signal.notified() => None,
        }
    }

    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AdapterError::new(AdapterErrorKind::CdpIo).with_hint("browser connection closed"));
        }
        self.commands
            .lock()
            .push((method.to_string(), params.clone()));

        let serialized = params.to_string();
        let rule = self
            .rules
            .lock()
            .iter()
            .rev()
            .find(|rule| rule.matches(method, &serialized))
            .cloned();

        let (outcome, events) = match rule {
            Some(rule) => (rule.outcome, rule.events),
            None => {
                let (value, events) = self.default_response(method, &params);
                (Ok(value), events)
            }
        };

        let session = match target {
            CommandTarget::Session(session) => Some(session),
            CommandTarget::Browser => None,
        };
        for event in events {
            self.push(&event.method, event.params, session.clone());
        }

        outcome.map_err(|message| {
            AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint(format!("{method}: {message}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn latest_matching_rule_wins() {
        let transport = ScriptedTransport::new();
        transport.respond("Runtime.evaluate", None, json!({ "result": { "value": 1 } }));
        transport.respond(
            "Runtime.evaluate",
            Some("document.title"),
            json!({ "result": { "value": "Shop" } }),
        );

        let title = transport
            .send_command(
                CommandTarget::Session(DEFAULT_SESSION.into()),
                "Runtime.evaluate",
                json!({ "expression": "document.title" }),
            )
            .await
            .expect("title");
        let other = transport
            .send_command(
                CommandTarget::Session(DEFAULT_SESSION.into()),
                "Runtime.evaluate",
                json!({ "expression": "1" }),
            )
            .await
            .expect("other");

        assert_eq!(title["result"]["value"], "Shop");
        assert_eq!(other["result"]["value"], 1);
        assert_eq!(transport.commands_named("Runtime.evaluate").len(), 2);
    }

    #[tokio::test]
    async fn navigate_emits_commit_and_load_on_the_calling_session() {
        let transport = ScriptedTransport::new();
        transport
            .send_command(
                CommandTarget::Session("s-9".into()),
                "Page.navigate",
                json!({ "url": "https://shop.test/" }),
            )
            .await
            .expect("navigate");

        let first = transport.next_event().await.expect("commit");
        let second = transport.next_event().await.expect("load");
        assert_eq!(first.method, "Page.frameNavigated");
        assert_eq!(first.session_id.as_deref(), Some("s-9"));
        assert_eq!(second.method, "Page.loadEventFired");
    }

    #[tokio::test]
    async fn failures_surface_as_cdp_io() {
        let transport = ScriptedTransport::new();
        transport.fail("Page.navigate", None, "net::ERR_NAME_NOT_RESOLVED");
        let err = transport
            .send_command(CommandTarget::Browser, "Page.navigate", json!({}))
            .await
            .expect_err("scripted failure");
        assert!(err.is(AdapterErrorKind::CdpIo));
    }
}
