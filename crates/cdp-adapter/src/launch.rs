//! Local Chromium for a journey run.

use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::async_process::Child;
use chromiumoxide::browser::BrowserConfig;
use futures::io::{AsyncBufReadExt, BufReader};
use futures::stream::StreamExt;
use serde_json::json;
use tracing::info;
use which::which;

use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};

const ENDPOINT_WAIT: Duration = Duration::from_secs(20);
const STDERR_TAIL: usize = 8;
const CHROME_ENV: &str = "BEACONCHECK_CHROME";

#[cfg(target_os = "windows")]
const BINARY_NAMES: &[&str] = &["chrome.exe", "chromium.exe", "msedge.exe"];
#[cfg(not(target_os = "windows"))]
const BINARY_NAMES: &[&str] = &[
    "google-chrome-stable",
    "google-chrome",
    "chromium",
    "chromium-browser",
];

/// Where [`find_chrome`] found the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromeSource {
    Env,
    Path,
    Install,
}

impl fmt::Display for ChromeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChromeSource::Env => f.write_str(CHROME_ENV),
            ChromeSource::Path => f.write_str("PATH"),
            ChromeSource::Install => f.write_str("default install location"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromeInstall {
    pub path: PathBuf,
    pub source: ChromeSource,
}

/// `BEACONCHECK_CHROME` when it names an existing file, then the first
/// Chrome/Chromium binary on `PATH`, then the platform's usual install paths.
pub fn find_chrome() -> Option<ChromeInstall> {
    let found = |path: PathBuf, source| Some(ChromeInstall { path, source });

    if let Ok(raw) = std::env::var(CHROME_ENV) {
        let path = PathBuf::from(raw.trim());
        if !path.as_os_str().is_empty() && path.is_file() {
            return found(path, ChromeSource::Env);
        }
    }
    if let Some(path) = BINARY_NAMES.iter().find_map(|name| which(name).ok()) {
        return found(path, ChromeSource::Path);
    }
    install_locations()
        .into_iter()
        .find(|path| path.is_file())
        .and_then(|path| found(path, ChromeSource::Install))
}

fn install_locations() -> Vec<PathBuf> {
    if cfg!(target_os = "windows") {
        ["PROGRAMFILES", "PROGRAMFILES(X86)", "LOCALAPPDATA"]
            .iter()
            .filter_map(|key| std::env::var_os(key))
            .map(PathBuf::from)
            .flat_map(|root| {
                [
                    root.join("Google").join("Chrome").join("Application").join("chrome.exe"),
                    root.join("Microsoft").join("Edge").join("Application").join("msedge.exe"),
                ]
            })
            .collect()
    } else if cfg!(target_os = "macos") {
        ["Google Chrome.app/Contents/MacOS/Google Chrome", "Chromium.app/Contents/MacOS/Chromium"]
            .iter()
            .map(|bundle| PathBuf::from("/Applications").join(bundle))
            .collect()
    } else {
        BINARY_NAMES
            .iter()
            .map(|name| PathBuf::from("/usr/bin").join(name))
            .collect()
    }
}

/// Starts Chromium and returns it with its DevTools browser endpoint.
pub(crate) async fn launch(cfg: &CdpConfig) -> Result<(Child, String), AdapterError> {
    let mut child = browser_config(cfg)?.launch().map_err(|err| {
        AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint(format!("failed to launch chromium: {err}"))
    })?;
    let endpoint = read_endpoint(&mut child).await?;
    info!(
        target: "cdp-transport",
        executable = %cfg.executable.display(),
        headless = cfg.headless,
        %endpoint,
        "chromium launched"
    );
    Ok((child, endpoint))
}

/// Chromium switches for an analytics journey: automation banners hidden and
/// background services that would add requests to the capture turned off.
pub(crate) fn launch_args(cfg: &CdpConfig) -> Vec<String> {
    const SWITCHES: &[&str] = &[
        "--disable-blink-features=AutomationControlled",
        "--disable-background-timer-throttling",
        "--disable-breakpad",
        "--disable-client-side-phishing-detection",
        "--disable-component-update",
        "--disable-default-apps",
        "--disable-dev-shm-usage",
        "--disable-hang-monitor",
        "--disable-popup-blocking",
        "--disable-sync",
        "--no-first-run",
        "--no-default-browser-check",
        "--password-store=basic",
        "--remote-allow-origins=*",
        "--use-mock-keychain",
    ];
    let mut args: Vec<String> = SWITCHES.iter().map(|s| s.to_string()).collect();
    if cfg.headless {
        args.extend(["--headless=new".to_string(), "--mute-audio".to_string()]);
    }
    args.extend(cfg.extra_args.iter().cloned());
    args
}

/// The `ws://.../devtools/browser/...` address in a Chromium stderr line.
pub(crate) fn devtools_endpoint(line: &str) -> Option<&str> {
    let (_, tail) = line.split_once("DevTools listening on ")?;
    let endpoint = tail.trim();
    (endpoint.starts_with("ws") && endpoint.contains("/devtools/browser/")).then_some(endpoint)
}

fn browser_config(cfg: &CdpConfig) -> Result<BrowserConfig, AdapterError> {
    if cfg.executable.as_os_str().is_empty() {
        return Err(AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint("no chrome executable found")
            .with_data(json!({
                "hint": "Install Chrome, set BEACONCHECK_CHROME, or pass --ws-url to attach."
            })));
    }
    if !cfg.executable.exists() {
        return Err(AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint(format!("chrome executable not found at {}", cfg.executable.display()))
            .with_data(json!({ "expected": cfg.executable })));
    }

    let profile = profile_dir(cfg)?;
    let mut builder = BrowserConfig::builder()
        .chrome_executable(cfg.executable.clone())
        .user_data_dir(profile)
        .request_timeout(Duration::from_millis(cfg.default_deadline_ms))
        .launch_timeout(ENDPOINT_WAIT)
        .args(launch_args(cfg));
    if !cfg.headless {
        builder = builder.with_head();
    }
    if cfg.no_sandbox {
        builder = builder.no_sandbox();
    }
    builder.build().map_err(|err| {
        AdapterError::new(AdapterErrorKind::Internal).with_hint(format!("browser config: {err}"))
    })
}

/// Relative profile directories are anchored at the working directory and
/// created up front.
fn profile_dir(cfg: &CdpConfig) -> Result<PathBuf, AdapterError> {
    let dir = if cfg.user_data_dir.is_absolute() {
        cfg.user_data_dir.clone()
    } else {
        std::env::current_dir()
            .map_err(|err| {
                AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint(format!("cannot resolve working directory: {err}"))
            })?
            .join(&cfg.user_data_dir)
    };
    std::fs::create_dir_all(&dir).map_err(|err| {
        AdapterError::new(AdapterErrorKind::Internal)
            .with_hint(format!("cannot create profile dir {}: {err}", dir.display()))
    })?;
    Ok(dir)
}

async fn read_endpoint(child: &mut Child) -> Result<String, AdapterError> {
    let stderr = child.stderr.take().ok_or_else(|| {
        AdapterError::new(AdapterErrorKind::Internal).with_hint("chromium stderr is not piped")
    })?;
    let mut lines = BufReader::new(stderr).lines();
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL);

    let scan = async {
        while let Some(Ok(line)) = lines.next().await {
            if let Some(endpoint) = devtools_endpoint(&line) {
                return Some(endpoint.to_string());
            }
            if tail.len() == STDERR_TAIL {
                tail.pop_front();
            }
            tail.push_back(line);
        }
        None
    };

    match tokio::time::timeout(ENDPOINT_WAIT, scan).await {
        Ok(Some(endpoint)) => Ok(endpoint),
        Ok(None) => Err(AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint("chromium exited before printing its devtools endpoint")
            .with_data(json!({ "stderr": tail }))),
        Err(_) => Err(AdapterError::new(AdapterErrorKind::CdpIo).with_hint(format!(
            "no devtools endpoint after {}s",
            ENDPOINT_WAIT.as_secs()
        ))),
    }
}
