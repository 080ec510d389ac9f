//! Driver counters, labelled by protocol domain so a run's export shows where
//! browser time went (`Page` navigation vs `Runtime` scripts vs `Input`).

use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::{core::Collector, histogram_opts, HistogramVec, IntCounterVec, Opts, Registry};
use tracing::error;

lazy_static! {
    static ref COMMANDS: IntCounterVec = IntCounterVec::new(
        Opts::new("beaconcheck_cdp_commands_total", "Protocol commands by domain and outcome"),
        &["domain", "outcome"]
    )
    .unwrap();
    static ref COMMAND_SECONDS: HistogramVec = HistogramVec::new(
        histogram_opts!(
            "beaconcheck_cdp_command_seconds",
            "Protocol command round trip",
            vec![0.005, 0.025, 0.1, 0.25, 1.0, 5.0, 30.0]
        ),
        &["domain"]
    )
    .unwrap();
    static ref EVENTS: IntCounterVec = IntCounterVec::new(
        Opts::new("beaconcheck_cdp_events_total", "Protocol events handled by the adapter"),
        &["method"]
    )
    .unwrap();
    static ref REQUESTS: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "beaconcheck_cdp_requests_total",
            "Outbound page requests, by whether a frame observer saw them"
        ),
        &["observed"]
    )
    .unwrap();
}

/// `Page` for `Page.navigate`.
fn domain(method: &str) -> &str {
    method.split_once('.').map_or(method, |(domain, _)| domain)
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register cdp metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, COMMANDS.clone());
    register(registry, COMMAND_SECONDS.clone());
    register(registry, EVENTS.clone());
    register(registry, REQUESTS.clone());
}

pub fn record_command(method: &str, elapsed: Duration, ok: bool) {
    let domain = domain(method);
    let outcome = if ok { "ok" } else { "error" };
    COMMANDS.with_label_values(&[domain, outcome]).inc();
    COMMAND_SECONDS
        .with_label_values(&[domain])
        .observe(elapsed.as_secs_f64());
}

pub fn record_event(method: &str) {
    EVENTS.with_label_values(&[method]).inc();
}

/// `observers` is how many callbacks saw the request; zero means it raced a re-attach.
pub fn record_request(observers: usize) {
    let observed = if observers == 0 { "no" } else { "yes" };
    REQUESTS.with_label_values(&[observed]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_are_counted_per_domain() {
        assert_eq!(domain("Page.navigate"), "Page");
        assert_eq!(domain("bogus"), "bogus");

        let ok_before = COMMANDS.with_label_values(&["Runtime", "ok"]).get();
        let failed_before = COMMANDS.with_label_values(&["Runtime", "error"]).get();
        record_command("Runtime.evaluate", Duration::from_millis(3), true);
        record_command("Runtime.evaluate", Duration::from_millis(3), false);
        record_request(0);
        assert!(COMMANDS.with_label_values(&["Runtime", "ok"]).get() > ok_before);
        assert!(COMMANDS.with_label_values(&["Runtime", "error"]).get() > failed_before);
        assert!(REQUESTS.with_label_values(&["no"]).get() >= 1);

        let registry = Registry::new();
        register_metrics(&registry);
        register_metrics(&registry);
        assert!(registry
            .gather()
            .iter()
            .any(|family| family.get_name() == "beaconcheck_cdp_commands_total"));
    }
}
