use std::env;
use std::fs as stdfs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{config_search_path, AppConfig};

pub const LOCAL_ENV_PATH: &str = "config/local.env";

pub fn load_local_env_overrides() {
    let path = Path::new(LOCAL_ENV_PATH);
    if !path.exists() {
        return;
    }

    match stdfs::read_to_string(path) {
        Ok(contents) => {
            for (key, value) in parse_env_lines(&contents) {
                if env::var(&key).is_ok() {
                    continue;
                }
                env::set_var(key, value);
            }
            info!(path = %path.display(), "Loaded environment overrides from local.env");
        }
        Err(err) => {
            warn!(path = %path.display(), ?err, "failed to read local.env overrides");
        }
    }
}

fn parse_env_lines(contents: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (idx, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            warn!(line = idx + 1, "invalid local.env entry; skipping");
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        pairs.push((key.to_string(), unescape_value(value.trim())));
    }
    pairs
}

/// Console logs go to stderr; `log_file` adds a JSON copy written off-thread.
/// Keep the returned guard alive until exit so the file gets flushed.
pub fn init_logging(level: &str, debug: bool, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow!("log file path has no file name: {}", path.display()))?;
            let dir = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            stdfs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string())),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(guard)
}

pub struct LoadedConfig {
    pub config: AppConfig,
    pub path: Option<PathBuf>,
}

/// An explicit `--config` must exist; the default locations may be missing.
pub fn load_config(explicit: Option<&PathBuf>) -> Result<LoadedConfig> {
    let Some(config_path) = config_search_path(explicit.map(PathBuf::as_path)) else {
        debug!("No config directory on this platform, using defaults");
        return Ok(LoadedConfig {
            config: AppConfig::default(),
            path: None,
        });
    };

    if config_path.exists() {
        let config = AppConfig::load(&config_path)?;
        info!("Loaded configuration from: {}", config_path.display());
        Ok(LoadedConfig {
            config,
            path: Some(config_path),
        })
    } else if explicit.is_some() {
        Err(anyhow!("Config file not found: {}", config_path.display()))
    } else {
        debug!("Config file not found, using defaults: {}", config_path.display());
        Ok(LoadedConfig {
            config: AppConfig::default(),
            path: None,
        })
    }
}

fn truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// `BEACONCHECK_*` variables win over the config file.
pub fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(dir) = env::var("BEACONCHECK_OUTPUT_DIR") {
        info!("Using report directory from environment: {dir}");
        config.report.output_dir = PathBuf::from(dir);
    }

    if let Ok(url) = env::var("BEACONCHECK_WS_URL") {
        config.browser.websocket_url = Some(url);
    }

    if let Ok(value) = env::var("BEACONCHECK_NON_INTERACTIVE") {
        if truthy(&value) {
            config.decisions.interactive = false;
        }
    }

    if let Ok(value) = env::var("BEACONCHECK_SETTLE_MS") {
        match value.parse() {
            Ok(ms) => config.timings.settle_ms = ms,
            Err(_) => warn!(%value, "ignoring BEACONCHECK_SETTLE_MS, not a number of milliseconds"),
        }
    }
}

fn unescape_value(value: &str) -> String {
    if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
        let inner = &value[1..value.len() - 1];
        inner
            .replace("\\\"", "\"")
            .replace("\\n", "\n")
            .replace("\\r", "\r")
            .replace("\\t", "\t")
    } else {
        value.to_string()
    }
}
