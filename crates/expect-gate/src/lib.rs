//! Expectation gate for captured analytics hits
//!
//! This crate implements the per-step validation layer:
//! - Rule book model and loader (JSON or YAML, literal / pattern / pattern list values)
//! - Display matrix: one row per parameter seen in the step's hits
//! - Full validation: one verdict per declared parameter, across all hits
//! - Informational pass when a step declares no rules

pub mod errors;
pub mod expected;
pub mod rules;
pub mod types;
pub mod validator;

pub use errors::*;
pub use expected::*;
pub use rules::*;
pub use types::*;
pub use validator::*;
