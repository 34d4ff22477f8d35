use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// High-level error categories surfaced by the adapter.
#[derive(Clone, Copy, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum AdapterErrorKind {
    #[error("navigation timed out")]
    NavTimeout,
    #[error("cdp i/o failure")]
    CdpIo,
    #[error("browser launch failed")]
    Launch,
    #[error("target element not found")]
    TargetNotFound,
    #[error("option not found")]
    OptionNotFound,
    #[error("page script failed")]
    Script,
    #[error("internal error")]
    Internal,
}

/// Enriched error metadata passed back to higher layers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdapterError {
    pub kind: AdapterErrorKind,
    pub hint: Option<String>,
    pub retriable: bool,
    pub data: Option<serde_json::Value>,
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(hint) = &self.hint {
            write!(f, ": {}", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for AdapterError {}

impl AdapterError {
    pub fn new(kind: AdapterErrorKind) -> Self {
        Self {
            kind,
            hint: None,
            retriable: false,
            data: None,
        }
    }

    pub fn not_found(hint: impl Into<String>) -> Self {
        Self::new(AdapterErrorKind::TargetNotFound).with_hint(hint)
    }

    pub fn internal(hint: impl Into<String>) -> Self {
        Self::new(AdapterErrorKind::Internal).with_hint(hint)
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn retriable(mut self, flag: bool) -> Self {
        self.retriable = flag;
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Missing elements and options are expected while a page settles.
    pub fn is_miss(&self) -> bool {
        matches!(
            self.kind,
            AdapterErrorKind::TargetNotFound | AdapterErrorKind::OptionNotFound
        )
    }

    pub fn is_retryable(&self) -> bool {
        self.retriable
            || matches!(
                self.kind,
                AdapterErrorKind::NavTimeout | AdapterErrorKind::CdpIo | AdapterErrorKind::Launch
            )
    }

    /// Get error severity (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self.kind {
            AdapterErrorKind::Internal => 3,
            AdapterErrorKind::CdpIo | AdapterErrorKind::Launch => 2,
            AdapterErrorKind::NavTimeout | AdapterErrorKind::Script => 1,
            AdapterErrorKind::TargetNotFound | AdapterErrorKind::OptionNotFound => 0,
        }
    }
}
