use clap::Subcommand;

use super::classify::ClassifyArgs;
use super::rules::RulesArgs;
use super::run::RunArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Drive a journey in Chrome and validate the beacons of every step
    Run(RunArgs),

    /// Classify and normalize a single request without a browser
    Classify(ClassifyArgs),

    /// Inspect expectation rule files
    Rules(RulesArgs),

    /// Show version and environment information
    Info,
}
