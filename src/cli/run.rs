use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use action_flow::{Journey, JourneyExecutor, JourneyRunner, RunOutcome, RunReport};
use anyhow::{Context, Result};
use beacon_tap::{Classifier, ListenerManager};
use beaconcheck_core_types::ExternalDecision;
use cdp_adapter::{event_bus, Cdp, CdpAdapter};
use clap::Args;
use expect_gate::{RuleBook, RuleEngine, Verdict};
use serde::Serialize;
use stealth::config::load_bundle_from_path;
use stealth::{StealthControl, StealthRuntime};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::metrics::RunMetrics;
use crate::prompt::TerminalDecision;
use crate::report::build_sinks;

use super::context::CliContext;
use super::output::print_structured;

const EXIT_VALIDATION_FAILED: u8 = 1;
const EXIT_HALTED: u8 = 2;

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Journey definition (JSON or YAML)
    #[arg(short, long, value_name = "FILE")]
    pub journey: PathBuf,

    /// Expectation rules (JSON or YAML); without rules every section is informational
    #[arg(short, long, value_name = "FILE")]
    pub rules: Option<PathBuf>,

    /// Report root directory
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Launch Chrome headless
    #[arg(long)]
    pub headless: bool,

    /// Attach to a running browser instead of launching one
    #[arg(long, value_name = "URL")]
    pub ws_url: Option<String>,

    /// Answer prompts from the configured policy instead of the terminal
    #[arg(long)]
    pub non_interactive: bool,

    /// Exit with status 0 even when validations fail
    #[arg(long)]
    pub allow_failures: bool,

    /// Settle time per step, e.g. "8s" or "1500ms"
    #[arg(long, value_parser = humantime::parse_duration)]
    pub settle: Option<Duration>,

    /// Write Prometheus text metrics for the run to this file
    #[arg(long, value_name = "FILE")]
    pub metrics_file: Option<PathBuf>,
}

impl RunArgs {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(dir) = &self.output_dir {
            config.report.output_dir = dir.clone();
        }
        if self.headless {
            config.browser.headless = true;
        }
        if let Some(url) = &self.ws_url {
            config.browser.websocket_url = Some(url.clone());
        }
        if self.non_interactive {
            config.decisions.interactive = false;
        }
        if let Some(settle) = self.settle {
            config.timings.settle_ms = u64::try_from(settle.as_millis()).unwrap_or(u64::MAX);
        }
    }
}

#[derive(Serialize)]
struct StepLine<'a> {
    step: &'a str,
    hits: usize,
    navigated: bool,
    passed: bool,
}

#[derive(Serialize)]
struct RunSummary<'a> {
    run_id: &'a str,
    journey: &'a str,
    outcome: &'a RunOutcome,
    report_dir: PathBuf,
    steps: Vec<StepLine<'a>>,
    failures: &'a [Verdict],
}

pub async fn cmd_run(args: RunArgs, ctx: &CliContext) -> Result<ExitCode> {
    let mut config = ctx.config().clone();
    args.apply(&mut config);

    let journey = Journey::load(&args.journey)
        .with_context(|| format!("Failed to load journey {}", args.journey.display()))?;
    let rules = match &args.rules {
        Some(path) => RuleBook::load(path)?,
        None => {
            warn!("No rules file given; results are informational only");
            RuleBook::empty()
        }
    };
    let classifier = Arc::new(Classifier::new(&config.tap)?);

    let (bus, _events) = event_bus(1024);
    let adapter = Arc::new(CdpAdapter::new(config.browser.clone(), bus));
    Arc::clone(&adapter)
        .start()
        .await
        .context("Failed to start the browser")?;

    let result = drive(&config, &adapter, classifier, rules, &journey).await;
    adapter.shutdown().await;
    let report = result?;

    if let Some(path) = &args.metrics_file {
        let metrics = RunMetrics::new()?;
        metrics.observe(&report);
        metrics.write(path)?;
    }

    print_report(ctx, &config, &report)?;

    let code = match (&report.outcome, report.snapshot.has_failures()) {
        (RunOutcome::Halted { .. }, _) => ExitCode::from(EXIT_HALTED),
        (RunOutcome::Completed, true) if !args.allow_failures => ExitCode::from(EXIT_VALIDATION_FAILED),
        _ => ExitCode::SUCCESS,
    };
    Ok(code)
}

async fn drive(
    config: &AppConfig,
    adapter: &Arc<CdpAdapter>,
    classifier: Arc<Classifier>,
    rules: RuleBook,
    journey: &Journey,
) -> Result<RunReport> {
    let page = adapter.create_page().await.context("Failed to open a page")?;
    let cdp = adapter.clone() as Arc<dyn Cdp>;

    let stealth = Arc::new(StealthRuntime::new(cdp.clone()));
    if let Some(path) = &config.stealth_profile {
        let bundle = load_bundle_from_path(path)
            .with_context(|| format!("Failed to load stealth profile {}", path.display()))?;
        stealth.load_bundle(bundle)?;
    }
    stealth.configure_page(&page).await?;

    let policy = config.decisions.policy();
    let decision: Arc<dyn ExternalDecision> = if config.decisions.interactive {
        Arc::new(TerminalDecision::new(policy))
    } else {
        Arc::new(policy)
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current phase");
            on_interrupt.cancel();
        }
    });

    let listeners = Arc::new(ListenerManager::new(cdp.clone(), classifier));
    let executor = JourneyExecutor::new(cdp, listeners, RuleEngine::new(rules), stealth, decision)
        .with_sink(build_sinks(&config.report))
        .with_timings(config.timings)
        .with_validation(config.validation)
        .with_cancel_token(cancel.clone());

    let report = executor.run(&page, journey).await;
    cancel.cancel();
    Ok(report?)
}

fn print_report(ctx: &CliContext, config: &AppConfig, report: &RunReport) -> Result<()> {
    let snapshot = &report.snapshot;
    let summary = RunSummary {
        run_id: &snapshot.run_id,
        journey: &snapshot.journey,
        outcome: &report.outcome,
        report_dir: config.report.output_dir.join(&snapshot.run_id),
        steps: report
            .steps
            .iter()
            .map(|step| StepLine {
                step: &step.step,
                hits: step.hits.total(),
                navigated: step.navigated,
                passed: step.passed(),
            })
            .collect(),
        failures: &snapshot.failures,
    };
    if print_structured(ctx.output(), &summary)? {
        return Ok(());
    }

    println!("Journey: {} (run {})", summary.journey, summary.run_id);
    for line in &summary.steps {
        let status = if line.passed { "PASS" } else { "FAIL" };
        println!("  [{status}] {} ({} hits)", line.step, line.hits);
    }
    if !snapshot.failures.is_empty() {
        println!();
        println!("Failed checks:");
        for failure in &snapshot.failures {
            println!(
                "  {} {}: expected {}, got {}",
                failure.origin(),
                failure.parameter,
                failure.expected,
                if failure.actual.is_empty() { "nothing" } else { failure.actual.as_str() }
            );
        }
    }
    match &report.outcome {
        RunOutcome::Completed => info!("Journey completed"),
        RunOutcome::Halted { step, reason } => println!("\nHalted at '{step}': {reason}"),
    }
    println!("Reports: {}", summary.report_dir.display());
    Ok(())
}
