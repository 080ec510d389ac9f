//! `beaconcheck` command line

pub mod app;
pub mod classify;
pub mod commands;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod info;
pub mod output;
pub mod rules;
pub mod run;
pub mod runtime;

pub use app::run;
pub use env::CliArgs;
