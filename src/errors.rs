//! Engine error taxonomy
//!
//! Every failure leaving a phase is one of these variants; the supervisor
//! decides from `is_retryable()` whether the attempt may be repeated.

use action_locator::LocatorError;
use action_primitives::ActionError;
use cdp_adapter::AdapterError;
use thiserror::Error;

use crate::phases::PhaseState;

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// HTTP error status or a server-fault phrase on the page.
    #[error("remote fault: {0}")]
    RemoteFault(String),

    /// A mandatory step could not be completed.
    #[error("{phase:?} failed: {reason}")]
    PhaseFailed { phase: PhaseState, reason: String },

    #[error("totals mismatch: {0}")]
    TotalsMismatch(String),

    #[error("submit control not found")]
    SubmitUnavailable,

    /// The command line is incomplete for the chosen command.
    #[error("usage: {0}")]
    Usage(String),

    /// Credentials, workbook data or configuration missing.
    #[error("missing prerequisite: {0}")]
    Prerequisite(String),

    #[error("interrupted")]
    Interrupted,

    #[error("browser failure: {message}")]
    Browser { message: String, retryable: bool },

    #[error("phase panicked: {0}")]
    Panicked(String),
}

impl EngineError {
    pub fn phase(phase: PhaseState, reason: impl Into<String>) -> Self {
        EngineError::PhaseFailed {
            phase,
            reason: reason.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            // An uncaught failure inside a phase gets the same single retry.
            EngineError::RemoteFault(_)
            | EngineError::PhaseFailed { .. }
            | EngineError::Panicked(_) => true,
            EngineError::Browser { retryable, .. } => *retryable,
            EngineError::TotalsMismatch(_)
            | EngineError::SubmitUnavailable
            | EngineError::Usage(_)
            | EngineError::Prerequisite(_)
            | EngineError::Interrupted => false,
        }
    }

    /// 0 = informational, 3 = critical.
    pub fn severity(&self) -> u8 {
        match self {
            EngineError::Interrupted => 0,
            EngineError::TotalsMismatch(_) | EngineError::RemoteFault(_) => 1,
            EngineError::PhaseFailed { .. }
            | EngineError::SubmitUnavailable
            | EngineError::Browser { .. } => 2,
            EngineError::Usage(_) | EngineError::Prerequisite(_) | EngineError::Panicked(_) => 3,
        }
    }
}

impl From<AdapterError> for EngineError {
    fn from(err: AdapterError) -> Self {
        EngineError::Browser {
            retryable: err.is_retryable(),
            message: err.to_string(),
        }
    }
}

/// Classifies primitive failures raised while `phase` is active.
pub trait PhaseResultExt<T> {
    fn in_phase(self, phase: PhaseState) -> Result<T, EngineError>;
}

impl<T> PhaseResultExt<T> for Result<T, ActionError> {
    fn in_phase(self, phase: PhaseState) -> Result<T, EngineError> {
        self.map_err(|err| match err {
            ActionError::Interrupted(_) => EngineError::Interrupted,
            ActionError::CdpIo { message, retryable } => EngineError::Browser { message, retryable },
            other => EngineError::phase(phase, other.to_string()),
        })
    }
}

impl<T> PhaseResultExt<T> for Result<T, AdapterError> {
    fn in_phase(self, phase: PhaseState) -> Result<T, EngineError> {
        self.map_err(ActionError::from).in_phase(phase)
    }
}

impl<T> PhaseResultExt<T> for Result<T, LocatorError> {
    fn in_phase(self, phase: PhaseState) -> Result<T, EngineError> {
        self.map_err(ActionError::from).in_phase(phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(EngineError::RemoteFault("HTTP 500".into()).is_retryable());
        assert!(EngineError::phase(PhaseState::SelectingObligation, "miss").is_retryable());
        assert!(!EngineError::TotalsMismatch("x".into()).is_retryable());
        assert!(!EngineError::Prerequisite("no .cer".into()).is_retryable());
        assert!(!EngineError::Usage("no workbook".into()).is_retryable());
        assert!(!EngineError::Interrupted.is_retryable());
        assert!(EngineError::Panicked("index out of bounds".into()).is_retryable());
    }

    #[test]
    fn action_errors_take_the_phase() {
        let err = Err::<(), _>(ActionError::NotFound("no file input".into()))
            .in_phase(PhaseState::LoggingIn)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::PhaseFailed {
                phase: PhaseState::LoggingIn,
                ..
            }
        ));

        let err = Err::<(), _>(ActionError::Interrupted("run cancelled".into()))
            .in_phase(PhaseState::LoggingIn)
            .unwrap_err();
        assert!(matches!(err, EngineError::Interrupted));
    }
}
