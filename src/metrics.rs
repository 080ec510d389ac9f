//! Prometheus text export of a run

use std::fs;
use std::path::Path;

use action_flow::RunReport;
use cdp_adapter::metrics as cdp_metrics;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tracing::{info, warn};

use beacon_tap::metrics as tap_metrics;

/// Registry holding adapter, tap and run-level metrics.
pub struct RunMetrics {
    registry: Registry,
    steps: IntCounterVec,
    failed_verdicts: IntCounterVec,
    halted: IntGauge,
}

impl RunMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        cdp_metrics::register_metrics(&registry);
        tap_metrics::register_metrics(&registry);

        let steps = IntCounterVec::new(
            Opts::new("beaconcheck_steps_total", "Finalized steps by validation status"),
            &["status"],
        )?;
        let failed_verdicts = IntCounterVec::new(
            Opts::new(
                "beaconcheck_failed_verdicts_total",
                "Parameter checks that failed, by platform",
            ),
            &["platform"],
        )?;
        let halted = IntGauge::new("beaconcheck_run_halted", "1 when the run was halted early")?;
        registry.register(Box::new(steps.clone()))?;
        registry.register(Box::new(failed_verdicts.clone()))?;
        registry.register(Box::new(halted.clone()))?;

        Ok(Self {
            registry,
            steps,
            failed_verdicts,
            halted,
        })
    }

    pub fn observe(&self, report: &RunReport) {
        for step in &report.steps {
            let status = if step.passed() { "passed" } else { "failed" };
            self.steps.with_label_values(&[status]).inc();
        }
        for failure in &report.snapshot.failures {
            self.failed_verdicts
                .with_label_values(&[failure.platform.key()])
                .inc();
        }
        self.halted.set(i64::from(!report.outcome.is_completed()));
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|err| prometheus::Error::Msg(err.to_string()))
    }

    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        match self.render() {
            Ok(body) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(path, body)?;
                info!(path = %path.display(), "Wrote run metrics");
            }
            Err(err) => warn!(?err, "failed to encode run metrics"),
        }
        Ok(())
    }
}
