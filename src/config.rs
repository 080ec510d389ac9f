//! Application configuration
//!
//! One YAML file with a section per collaborator. Every section falls back to
//! its defaults, so an empty file (or none at all) is a valid configuration.

use std::path::{Path, PathBuf};

use action_flow::{AutoDecision, FlowTimings, ValidationOptions};
use beacon_tap::TapConfig;
use beaconcheck_core_types::Decision;
use cdp_adapter::CdpConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const LOCAL_CONFIG_PATH: &str = "config/beaconcheck.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub browser: CdpConfig,
    /// Stealth profile bundle; the built-in profile is used when unset
    pub stealth_profile: Option<PathBuf>,
    pub tap: TapConfig,
    pub timings: FlowTimings,
    pub validation: ValidationOptions,
    pub report: ReportConfig,
    pub decisions: DecisionConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Csv,
    Json,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub output_dir: PathBuf,
    pub formats: Vec<ReportFormat>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./reports"),
            formats: vec![ReportFormat::Csv, ReportFormat::Json],
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Ask on the terminal; otherwise answer from the policy below
    pub interactive: bool,
    pub on_step_failure: Decision,
    pub on_bot_challenge: Decision,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        let auto = AutoDecision::default();
        Self {
            interactive: true,
            on_step_failure: auto.on_step_failure,
            on_bot_challenge: auto.on_bot_challenge,
        }
    }
}

impl DecisionConfig {
    pub fn policy(&self) -> AutoDecision {
        AutoDecision {
            on_step_failure: self.on_step_failure,
            on_bot_challenge: self.on_bot_challenge,
            ..AutoDecision::default()
        }
    }
}

impl AppConfig {
    pub fn from_yaml(text: &str, path: &Path) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text, path)
    }
}

/// `--config`, else `./config/beaconcheck.yaml`, else the user config dir.
pub fn config_search_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(LOCAL_CONFIG_PATH);
    if local.exists() {
        return Some(local);
    }
    dirs::config_dir().map(|dir| dir.join("beaconcheck").join("config.yaml"))
}
