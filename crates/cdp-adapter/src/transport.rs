//! Wire to the browser.
//!
//! A run owns one Chromium and one websocket. Commands are multiplexed over
//! the socket by a single pump task; events outside the domains the adapter
//! consumes are dropped before they reach the adapter's channel.

use std::collections::HashMap;
use std::convert::TryInto;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::async_process::Child;
use chromiumoxide::cdp::browser_protocol::target::SessionId as CdpSessionId;
use chromiumoxide::cdp::events::CdpEventMessage;
use chromiumoxide::conn::Connection;
use chromiumoxide_types::{CallId, CdpJsonEventMessage, Message, MethodId, Response};
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::launch::launch;

/// Event domains the adapter acts on.
const FORWARDED_DOMAINS: [&str; 3] = ["Network.", "Page.", "Target."];

#[derive(Clone, Debug)]
pub struct TransportEvent {
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

#[derive(Clone, Debug)]
pub enum CommandTarget {
    Browser,
    Session(String),
}

#[async_trait]
pub trait CdpTransport: Send + Sync {
    async fn start(&self) -> Result<(), AdapterError>;
    /// `None` once the browser connection is gone for good.
    async fn next_event(&self) -> Option<TransportEvent>;
    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError>;
}

pub fn is_forwarded(method: &str) -> bool {
    FORWARDED_DOMAINS.iter().any(|domain| method.starts_with(domain))
}

/// Launches Chromium, or attaches to `websocket_url` when one is configured.
pub struct ChromiumTransport {
    cfg: CdpConfig,
    link: OnceCell<Link>,
}

impl ChromiumTransport {
    pub fn new(cfg: CdpConfig) -> Self {
        Self {
            cfg,
            link: OnceCell::new(),
        }
    }

    fn deadline(&self) -> Duration {
        Duration::from_millis(self.cfg.default_deadline_ms)
    }
}

#[async_trait]
impl CdpTransport for ChromiumTransport {
    async fn start(&self) -> Result<(), AdapterError> {
        let link = self.link.get_or_try_init(|| Link::open(&self.cfg)).await?;
        link.call(
            CommandTarget::Browser,
            "Target.setDiscoverTargets",
            json!({ "discover": true }),
            self.deadline(),
        )
        .await
        .map(|_| ())
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        let link = self.link.get()?;
        link.events.lock().await.recv().await
    }

    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        let link = self.link.get().ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::CdpIo).with_hint("browser not started")
        })?;
        link.call(target, method, params, self.deadline()).await
    }
}

struct Call {
    target: CommandTarget,
    method: String,
    params: Value,
    reply: oneshot::Sender<Result<Value, AdapterError>>,
}

type Pending = HashMap<CallId, (String, oneshot::Sender<Result<Value, AdapterError>>)>;

/// Live connection; dropping it stops the pump and the launched browser.
struct Link {
    calls: mpsc::Sender<Call>,
    events: AsyncMutex<mpsc::Receiver<TransportEvent>>,
    pump: JoinHandle<()>,
    browser: Mutex<Option<Child>>,
}

impl Link {
    async fn open(cfg: &CdpConfig) -> Result<Self, AdapterError> {
        let (browser, endpoint) = match &cfg.websocket_url {
            Some(url) => (None, url.clone()),
            None => {
                let (child, endpoint) = launch(cfg).await?;
                (Some(child), endpoint)
            }
        };

        let conn = Connection::<CdpEventMessage>::connect(&endpoint)
            .await
            .map_err(|err| {
                AdapterError::new(AdapterErrorKind::CdpIo)
                    .with_hint(format!("cannot connect to {endpoint}: {err}"))
            })?;
        let (calls, call_rx) = mpsc::channel(128);
        let (event_tx, events) = mpsc::channel(1024);
        let pump = tokio::spawn(pump(conn, call_rx, event_tx));
        info!(
            target: "cdp-transport",
            %endpoint,
            attached = browser.is_none(),
            "browser connection open"
        );

        Ok(Self {
            calls,
            events: AsyncMutex::new(events),
            pump,
            browser: Mutex::new(browser),
        })
    }

    async fn call(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<Value, AdapterError> {
        let (reply, answer) = oneshot::channel();
        let call = Call {
            target,
            method: method.to_string(),
            params,
            reply,
        };
        self.calls.send(call).await.map_err(|_| connection_closed())?;
        match tokio::time::timeout(deadline, answer).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(connection_closed()),
            Err(_) => Err(AdapterError::new(AdapterErrorKind::NavTimeout)
                .with_hint(format!("{method} got no answer in {}ms", deadline.as_millis()))
                .retriable(true)),
        }
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.pump.abort();
        let Some(mut child) = self.browser.lock().take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = child.kill().await {
                        warn!(target: "cdp-transport", ?err, "failed to stop chromium");
                    }
                });
            }
            Err(_) => debug!(target: "cdp-transport", "no runtime left to stop chromium"),
        }
    }
}

fn connection_closed() -> AdapterError {
    AdapterError::new(AdapterErrorKind::CdpIo).with_hint("browser connection closed")
}

/// Moves calls onto the socket and answers and events off it. Returning drops
/// the event sender, which ends the adapter's event stream.
async fn pump(
    mut conn: Connection<CdpEventMessage>,
    mut calls: mpsc::Receiver<Call>,
    events: mpsc::Sender<TransportEvent>,
) {
    let mut pending = Pending::new();
    let mut dropped_events: u64 = 0;

    let reason = loop {
        tokio::select! {
            call = calls.recv() => match call {
                Some(call) => submit(&mut conn, call, &mut pending),
                None => break "transport dropped".to_string(),
            },
            message = conn.next() => match message {
                Some(Ok(Message::Response(response))) => answer(response, &mut pending),
                Some(Ok(Message::Event(event))) => {
                    if !forward(event, &events).await {
                        dropped_events += 1;
                    }
                }
                Some(Err(err)) => break err.to_string(),
                None => break "websocket closed".to_string(),
            },
        }
    };

    warn!(
        target: "cdp-transport",
        %reason,
        pending = pending.len(),
        dropped_events,
        "browser connection ended"
    );
    for (_, (method, reply)) in pending.drain() {
        let _ = reply.send(Err(connection_closed().with_data(json!({
            "method": method,
            "reason": reason,
        }))));
    }
}

fn submit(conn: &mut Connection<CdpEventMessage>, call: Call, pending: &mut Pending) {
    let session = match call.target {
        CommandTarget::Browser => None,
        CommandTarget::Session(id) => Some(CdpSessionId::from(id)),
    };
    let method_id: MethodId = call.method.clone().into();
    match conn.submit_command(method_id, session, call.params) {
        Ok(id) => {
            pending.insert(id, (call.method, call.reply));
        }
        Err(err) => {
            let _ = call.reply.send(Err(AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint(format!("{} not sent: {err}", call.method))));
        }
    }
}

fn answer(response: Response, pending: &mut Pending) {
    let Some((method, reply)) = pending.remove(&response.id) else {
        debug!(target: "cdp-transport", id = ?response.id, "answer for unknown call");
        return;
    };
    let result = match (response.result, response.error) {
        (Some(result), _) => Ok(result),
        (None, Some(error)) => Err(AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint(format!("{method} failed ({}): {}", error.code, error.message))),
        (None, None) => Ok(Value::Object(Default::default())),
    };
    let _ = reply.send(result);
}

/// `false` when the event was filtered out or could not be decoded.
async fn forward(event: CdpEventMessage, events: &mpsc::Sender<TransportEvent>) -> bool {
    let raw: CdpJsonEventMessage = match event.try_into() {
        Ok(raw) => raw,
        Err(err) => {
            debug!(target: "cdp-transport", %err, "undecodable event");
            return false;
        }
    };
    if !is_forwarded(&raw.method) {
        return false;
    }
    events
        .send(TransportEvent {
            method: raw.method.into_owned(),
            params: raw.params,
            session_id: raw.session_id,
        })
        .await
        .is_ok()
}
