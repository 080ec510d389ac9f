//! Beacon capture for the BeaconCheck pipeline.
//!
//! Requests observed on a page (and every frame inside it) are run through
//! the [`Classifier`], turned into flat [`Hit`]s by [`normalize`] and pushed
//! into a [`HitSink`], normally the current step's [`StepCapture`]. The
//! [`ListenerManager`] owns observer registration and keeps it idempotent
//! across reloads.

pub mod buffer;
pub mod classify;
pub mod config;
pub mod listener;
pub mod metrics;
pub mod normalize;

use thiserror::Error;

pub use beaconcheck_core_types::{Hit, Platform, RawRequest};
pub use buffer::{CapturedHits, HitSink, StepCapture};
pub use classify::{Classifier, Rejection, Verdict};
pub use config::TapConfig;
pub use listener::ListenerManager;
pub use normalize::{flatten, normalize, JsonNode};

#[derive(Debug, Error)]
pub enum TapError {
    #[error("invalid endpoint pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}
