use std::sync::atomic::{AtomicU64, Ordering};

use beaconcheck_core_types::Platform;
use lazy_static::lazy_static;
use prometheus::{core::Collector, IntCounterVec, Registry};
use tracing::error;

use crate::classify::Rejection;

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct TapMetricsSnapshot {
    pub hits: u64,
    pub rejected: u64,
    pub late_hits: u64,
}

static HITS: AtomicU64 = AtomicU64::new(0);
static REJECTED: AtomicU64 = AtomicU64::new(0);
static LATE_HITS: AtomicU64 = AtomicU64::new(0);

lazy_static! {
    static ref HITS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("beaconcheck_hits_total", "Normalized hits captured"),
        &["platform"]
    )
    .unwrap();
    static ref REJECTED_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new(
            "beaconcheck_requests_rejected_total",
            "Requests whose endpoint matched a platform but failed its markers"
        ),
        &["platform", "reason"]
    )
    .unwrap();
    static ref LATE_HITS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new(
            "beaconcheck_late_hits_total",
            "Hits that arrived after their step capture was frozen"
        ),
        &["platform"]
    )
    .unwrap();
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register tap metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, HITS_TOTAL.clone());
    register(registry, REJECTED_TOTAL.clone());
    register(registry, LATE_HITS_TOTAL.clone());
}

pub fn record_hits(platform: Platform, count: usize) {
    HITS.fetch_add(count as u64, Ordering::Relaxed);
    HITS_TOTAL
        .with_label_values(&[platform.key()])
        .inc_by(count as u64);
}

pub fn record_rejection(platform: Platform, reason: Rejection) {
    REJECTED.fetch_add(1, Ordering::Relaxed);
    REJECTED_TOTAL
        .with_label_values(&[platform.key(), reason.as_str()])
        .inc();
}

pub fn record_late_hit(platform: Platform) {
    LATE_HITS.fetch_add(1, Ordering::Relaxed);
    LATE_HITS_TOTAL.with_label_values(&[platform.key()]).inc();
}

pub fn snapshot() -> TapMetricsSnapshot {
    TapMetricsSnapshot {
        hits: HITS.load(Ordering::Relaxed),
        rejected: REJECTED.load(Ordering::Relaxed),
        late_hits: LATE_HITS.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_track_hits_and_rejections() {
        let before = snapshot();
        record_hits(Platform::Cja, 3);
        record_rejection(Platform::Ga4, Rejection::MissingMarkers);
        let after = snapshot();
        assert!(after.hits >= before.hits + 3);
        assert!(after.rejected > before.rejected);

        let registry = Registry::new();
        register_metrics(&registry);
        register_metrics(&registry);
        assert!(registry
            .gather()
            .iter()
            .any(|family| family.get_name() == "beaconcheck_requests_rejected_total"));
    }
}
