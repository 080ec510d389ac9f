//! Journey Orchestration Layer
//!
//! Runs a journey step by step against one page: attaches fresh beacon
//! listeners, executes the step's actions while watching for navigation,
//! nudges the scroll for scroll-triggered beacons, clears bot checks, waits for late
//! beacons and finally validates what was captured. Results accumulate in a
//! [`RunState`] and are handed to a [`ReportSink`].

pub mod aggregate;
pub mod errors;
pub mod executor;
pub mod guard;
pub mod report;
pub mod strategies;
pub mod types;

pub use aggregate::{RunSnapshot, RunState};
pub use errors::FlowError;
pub use executor::{JourneyExecutor, JourneyRunner, RunReport, ValidationOptions};
pub use guard::{BotCheckGuard, GuardPoint};
pub use report::{FanoutSink, NullReportSink, ReportError, ReportSink};
pub use strategies::{AutoDecision, ScriptedDecision};
pub use types::{FlowTimings, Journey, JourneyStep, RunOutcome, StepPhase, StepResult};
