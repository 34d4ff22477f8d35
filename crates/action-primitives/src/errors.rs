//! Error types for action primitives

use action_locator::{ChainError, LocatorError};
use cdp_adapter::{AdapterError, AdapterErrorKind};
use thiserror::Error;

/// Error types for form actions
#[derive(Debug, Error, Clone)]
pub enum ActionError {
    /// Control could not be resolved or went stale mid-action
    #[error("Control not found: {0}")]
    NotFound(String),

    /// Dropdown option was not found by any layer
    #[error("Option not found in dropdown: {0}")]
    OptionNotFound(String),

    /// Wait operation timed out
    #[error("Wait timeout: {0}")]
    WaitTimeout(String),

    /// Operation was cancelled or interrupted
    #[error("Operation interrupted: {0}")]
    Interrupted(String),

    /// CDP communication or protocol error
    #[error("CDP I/O error: {message}")]
    CdpIo { message: String, retryable: bool },

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ActionError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            ActionError::WaitTimeout(_) => true,
            ActionError::CdpIo { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Get error severity level (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            ActionError::Internal(_) => 3,
            ActionError::CdpIo { .. } => 2,
            ActionError::WaitTimeout(_) | ActionError::Interrupted(_) => 1,
            ActionError::NotFound(_) | ActionError::OptionNotFound(_) => 0,
        }
    }

    /// Misses that a caller may skip past.
    pub fn is_miss(&self) -> bool {
        matches!(self, ActionError::NotFound(_) | ActionError::OptionNotFound(_))
    }
}

impl From<AdapterError> for ActionError {
    fn from(err: AdapterError) -> Self {
        match err.kind {
            AdapterErrorKind::TargetNotFound => ActionError::NotFound(err.to_string()),
            AdapterErrorKind::OptionNotFound => ActionError::OptionNotFound(err.to_string()),
            AdapterErrorKind::NavTimeout => ActionError::WaitTimeout(err.to_string()),
            AdapterErrorKind::Internal => ActionError::Internal(err.to_string()),
            _ => ActionError::CdpIo {
                retryable: err.is_retryable(),
                message: err.to_string(),
            },
        }
    }
}

impl From<LocatorError> for ActionError {
    fn from(err: LocatorError) -> Self {
        match err {
            LocatorError::Cancelled => ActionError::Interrupted("run cancelled".to_string()),
            LocatorError::Driver(inner) => inner.into(),
            other => ActionError::Internal(other.to_string()),
        }
    }
}

impl ChainError for ActionError {
    fn aborts_chain(&self) -> bool {
        matches!(self, ActionError::Interrupted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_errors_are_classified() {
        let miss: ActionError = AdapterError::not_found("#x").into();
        assert!(miss.is_miss());
        let io: ActionError = AdapterError::new(AdapterErrorKind::CdpIo).into();
        assert!(io.is_retryable());
        let cancelled: ActionError = LocatorError::Cancelled.into();
        assert!(cancelled.aborts_chain());
        assert!(!cancelled.is_retryable());
    }
}
