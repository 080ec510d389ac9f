//! BeaconCheck command line library
//!
//! Exposes the CLI modules for integration testing

pub mod cli;
pub mod config;
pub mod metrics;
pub mod prompt;
pub mod report;

pub use config::AppConfig;
pub use prompt::TerminalDecision;
