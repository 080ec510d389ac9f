//! Per-step hit buffers.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use beaconcheck_core_types::{Hit, Platform};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::metrics;

/// Destination for normalized hits. Called from the driver's event loop.
pub trait HitSink: Send + Sync {
    fn accept(&self, hit: Hit);
}

/// Hits grouped by platform, in arrival order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CapturedHits {
    by_platform: BTreeMap<Platform, Vec<Hit>>,
}

impl CapturedHits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, hit: Hit) {
        self.by_platform.entry(hit.platform()).or_default().push(hit);
    }

    pub fn get(&self, platform: Platform) -> &[Hit] {
        self.by_platform
            .get(&platform)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn total(&self) -> usize {
        self.by_platform.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn platforms_with_hits(&self) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|p| !self.get(*p).is_empty())
            .collect()
    }

    /// All hits, platform by platform in [`Platform::ALL`] order.
    pub fn all(&self) -> impl Iterator<Item = &Hit> {
        Platform::ALL.into_iter().flat_map(move |p| self.get(p).iter())
    }
}

/// Append-only buffer for one step's capture window.
///
/// After [`StepCapture::freeze`] further hits are dropped; a beacon arriving
/// that late belongs to no step.
pub struct StepCapture {
    step: String,
    hits: Mutex<CapturedHits>,
    frozen: AtomicBool,
}

impl StepCapture {
    pub fn new(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            hits: Mutex::new(CapturedHits::new()),
            frozen: AtomicBool::new(false),
        }
    }

    pub fn step(&self) -> &str {
        &self.step
    }

    pub fn count(&self, platform: Platform) -> usize {
        self.hits.lock().get(platform).len()
    }

    pub fn total(&self) -> usize {
        self.hits.lock().total()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Stops accepting hits and hands back what was captured. A second call
    /// returns an empty set.
    pub fn freeze(&self) -> CapturedHits {
        let mut guard = self.hits.lock();
        self.frozen.store(true, Ordering::Release);
        std::mem::take(&mut *guard)
    }
}

impl HitSink for StepCapture {
    fn accept(&self, hit: Hit) {
        let mut guard = self.hits.lock();
        if self.frozen.load(Ordering::Acquire) {
            metrics::record_late_hit(hit.platform());
            debug!(
                target: "beacon-tap",
                step = %self.step,
                platform = %hit.platform(),
                "dropping hit that arrived after capture closed"
            );
            return;
        }
        guard.push(hit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(platform: Platform, key: &str, value: &str) -> Hit {
        let mut fields = BTreeMap::new();
        fields.insert(key.to_string(), value.to_string());
        Hit::new(platform, fields)
    }

    #[test]
    fn hits_are_grouped_by_platform() {
        let capture = StepCapture::new("home");
        capture.accept(hit(Platform::Ga4, "en", "page_view"));
        capture.accept(hit(Platform::Adobe, "pageName", "home"));
        capture.accept(hit(Platform::Ga4, "en", "scroll"));

        assert_eq!(capture.count(Platform::Ga4), 2);
        let frozen = capture.freeze();
        assert_eq!(frozen.total(), 3);
        assert_eq!(frozen.platforms_with_hits(), vec![Platform::Adobe, Platform::Ga4]);
        assert!(frozen.get(Platform::Cja).is_empty());
        let order: Vec<_> = frozen.all().map(|h| h.platform()).collect();
        assert_eq!(order, vec![Platform::Adobe, Platform::Ga4, Platform::Ga4]);
    }

    #[test]
    fn late_hits_are_dropped_after_freeze() {
        let capture = StepCapture::new("pdp");
        capture.accept(hit(Platform::Cja, "eventType", "a"));
        let frozen = capture.freeze();
        capture.accept(hit(Platform::Cja, "eventType", "b"));

        assert_eq!(frozen.total(), 1);
        assert!(capture.is_frozen());
        assert_eq!(capture.total(), 0);
    }
}
