//! Error types for locator system

use cdp_adapter::AdapterError;
use thiserror::Error;

/// Locator error enumeration
///
/// A control that cannot be found is not an error: see
/// [`crate::types::Resolution::NotFound`].
#[derive(Debug, Error, Clone)]
pub enum LocatorError {
    /// Mapping entry could not be parsed
    #[error("Invalid strategy for '{key}': {reason}")]
    InvalidStrategy { key: String, reason: String },

    /// Mapping document is malformed
    #[error("Invalid mapping: {0}")]
    InvalidMapping(String),

    /// Browser transport failed while resolving
    #[error("Driver error: {0}")]
    Driver(#[from] AdapterError),

    /// Run was cancelled while waiting
    #[error("Resolution interrupted")]
    Cancelled,
}

impl LocatorError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            LocatorError::Driver(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Get error severity (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            LocatorError::InvalidStrategy { .. } | LocatorError::InvalidMapping(_) => 3,
            LocatorError::Driver(_) => 2,
            LocatorError::Cancelled => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_adapter::AdapterErrorKind;

    #[test]
    fn driver_errors_inherit_retryability() {
        let err: LocatorError = AdapterError::new(AdapterErrorKind::CdpIo).retriable(true).into();
        assert!(err.is_retryable());
        assert_eq!(err.severity(), 2);
        assert!(!LocatorError::Cancelled.is_retryable());
    }
}
