//! sat-declaration library
//!
//! Drives the SAT provisional declaration wizard in a real browser: login
//! with e.firma, period setup, income and tax sections, the totals gate and
//! submission, under a supervisor that retries once and always logs out.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod errors;
pub mod mapping;
pub mod phases;
pub mod reconcile;
pub mod session;
pub mod sources;
pub mod supervisor;
pub mod values;

pub use errors::EngineError;
pub use phases::{PhaseState, PhaseTimings, StopPoint, Wizard, WizardSettings};
pub use session::{ChromeLauncher, SessionLauncher};
pub use supervisor::{OutcomeReason, RunMode, RunOutcome, RunRequest, Supervisor};
