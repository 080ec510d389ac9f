//! Chrome DevTools Protocol driver for BeaconCheck.
//!
//! The adapter owns one CDP connection, keeps a registry of pages and their
//! frames, and exposes the [`Cdp`] trait the capture pipeline drives: page
//! navigation with a navigation watch, element primitives, script evaluation,
//! emulation overrides, and frame-scoped request observers.

use tokio::sync::broadcast;

pub mod ids {
    pub use beaconcheck_core_types::{FrameId, PageId};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    /// Unique identifier for the browser instance managed by the adapter.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
    pub struct BrowserId(pub Uuid);

    impl BrowserId {
        pub fn new() -> Self {
            Self(Uuid::new_v4())
        }
    }

    impl Default for BrowserId {
        fn default() -> Self {
            Self::new()
        }
    }
}

pub mod error {
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use thiserror::Error;

    /// High-level error categories surfaced by the adapter.
    #[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
    pub enum AdapterErrorKind {
        #[error("navigation timed out")]
        NavTimeout,
        #[error("cdp i/o failure")]
        CdpIo,
        #[error("target element not found")]
        TargetNotFound,
        #[error("script raised an exception")]
        ScriptException,
        #[error("page is not attached")]
        PageClosed,
        #[error("internal error")]
        Internal,
    }

    /// Enriched error metadata passed back to higher layers.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct AdapterError {
        pub kind: AdapterErrorKind,
        pub hint: Option<String>,
        pub retriable: bool,
        pub data: Option<serde_json::Value>,
    }

    impl fmt::Display for AdapterError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.kind)?;
            if let Some(hint) = &self.hint {
                write!(f, ": {}", hint)?;
            }
            Ok(())
        }
    }

    impl std::error::Error for AdapterError {}

    impl AdapterError {
        pub fn new(kind: AdapterErrorKind) -> Self {
            Self {
                kind,
                hint: None,
                retriable: false,
                data: None,
            }
        }

        pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
            self.hint = Some(hint.into());
            self
        }

        pub fn retriable(mut self, flag: bool) -> Self {
            self.retriable = flag;
            self
        }

        pub fn with_data(mut self, data: serde_json::Value) -> Self {
            self.data = Some(data);
            self
        }

        pub fn is(&self, kind: AdapterErrorKind) -> bool {
            self.kind == kind
        }
    }
}

pub mod events {
    use super::ids::{FrameId, PageId};
    use serde::{Deserialize, Serialize};

    /// Page-level events broadcast by the adapter.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub enum RawEvent {
        PageLifecycle {
            page: PageId,
            frame: Option<FrameId>,
            phase: String,
            ts: u64,
        },
        /// Main-frame navigation, including same-document history changes.
        PageNavigated {
            page: PageId,
            url: String,
            same_document: bool,
            ts: u64,
        },
        FrameAttached {
            page: PageId,
            frame: FrameId,
            parent: Option<FrameId>,
        },
        FrameDetached {
            page: PageId,
            frame: FrameId,
        },
        Error {
            page: Option<PageId>,
            message: String,
        },
    }

    impl RawEvent {
        pub fn page(&self) -> Option<&PageId> {
            match self {
                RawEvent::PageLifecycle { page, .. }
                | RawEvent::PageNavigated { page, .. }
                | RawEvent::FrameAttached { page, .. }
                | RawEvent::FrameDetached { page, .. } => Some(page),
                RawEvent::Error { page, .. } => page.as_ref(),
            }
        }
    }
}

pub mod config {
    use serde::{Deserialize, Serialize};
    use std::{
        env,
        path::{Path, PathBuf},
    };

    /// Configuration for launching and tuning the adapter.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    #[serde(default)]
    pub struct CdpConfig {
        pub executable: PathBuf,
        pub user_data_dir: PathBuf,
        pub headless: bool,
        pub no_sandbox: bool,
        pub default_deadline_ms: u64,
        pub websocket_url: Option<String>,
        /// Extra Chromium switches appended after the built-in ones.
        pub extra_args: Vec<String>,
    }

    impl Default for CdpConfig {
        fn default() -> Self {
            Self {
                executable: default_chrome_path(),
                user_data_dir: default_profile_dir(),
                headless: resolve_headless_default(),
                no_sandbox: true,
                default_deadline_ms: 30_000,
                websocket_url: None,
                extra_args: Vec::new(),
            }
        }
    }

    // Journeys run headful unless BEACONCHECK_HEADLESS opts in; bot checks need a visible window.
    fn resolve_headless_default() -> bool {
        match env::var("BEACONCHECK_HEADLESS") {
            Ok(value) => matches!(
                value.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            ),
            Err(_) => false,
        }
    }

    fn default_chrome_path() -> PathBuf {
        crate::find_chrome()
            .map(|install| install.path)
            .unwrap_or_default()
    }

    fn default_profile_dir() -> PathBuf {
        if let Ok(path) = env::var("BEACONCHECK_CHROME_PROFILE") {
            return PathBuf::from(path);
        }

        Path::new("./.beaconcheck-profile").into()
    }
}

pub mod adapter;
mod launch;
pub mod metrics;
pub mod observers;
pub mod registry;
pub mod scripted;
pub mod scripts;
pub mod transport;

pub use adapter::{Cdp, CdpAdapter, EventBus, NavigationWatch};
pub use config::CdpConfig;
pub use launch::{find_chrome, ChromeInstall, ChromeSource};
pub use error::{AdapterError, AdapterErrorKind};
pub use events::RawEvent;
pub use ids::{BrowserId, FrameId, PageId};
pub use observers::{FrameObserver, ObserverId, RequestObserver};
pub use scripted::ScriptedTransport;
pub use transport::{CdpTransport, ChromiumTransport, CommandTarget, TransportEvent};

/// Create a broadcast bus for adapter events.
pub fn event_bus(buffer: usize) -> (EventBus, broadcast::Receiver<RawEvent>) {
    broadcast::channel(buffer)
}

pub type EventStream = broadcast::Receiver<RawEvent>;
