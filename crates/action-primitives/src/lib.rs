//! Journey actions for BeaconCheck
//!
//! Each [`StepAction`] is one user-visible operation on the page (visit,
//! click, fill, run a script, wait...). Actions run through the
//! [`cdp_adapter::Cdp`] driver and report through [`ActionReport`]; failures
//! surface as [`ActionError`] so the step orchestrator can decide what to do.

pub mod errors;
mod primitives;
pub mod types;

pub use errors::*;
pub use primitives::*;
pub use types::*;
