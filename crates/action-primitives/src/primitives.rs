//! Action primitives implementation
//!
//! Five form actions layered on the resolver:
//! 1. click - resolve, require visibility, click
//! 2. select - dropdown set with layered fallbacks
//! 3. text - focus, settle, replace contents
//! 4. file - primary/secondary credential file inputs
//! 5. read - displayed amount of a control

mod click;
mod file;
mod read;
mod select;
mod text;

pub use file::FileOutcome;
pub use select::DropdownOutcome;

use action_locator::{FieldMapping, Resolver};
use cdp_adapter::DomPort;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::errors::ActionError;
use crate::waiting::{pause, Waiter};

/// Pacing between the steps of one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionTimings {
    /// Settle after focusing a login field
    pub focus_settle_short: Duration,
    /// Settle after focusing any other field
    pub focus_settle: Duration,
    /// Delay between opening a dropdown and picking from it
    pub option_open: Duration,
}

impl Default for ActionTimings {
    fn default() -> Self {
        Self {
            focus_settle_short: Duration::from_millis(100),
            focus_settle: Duration::from_millis(300),
            option_open: Duration::from_millis(120),
        }
    }
}

impl ActionTimings {
    pub fn fast() -> Self {
        Self {
            focus_settle_short: Duration::ZERO,
            focus_settle: Duration::ZERO,
            option_open: Duration::ZERO,
        }
    }

    fn settle_for(&self, key: &str) -> Duration {
        if key.starts_with("_login_") {
            self.focus_settle_short
        } else {
            self.focus_settle
        }
    }
}

/// Form actions bound to one page and mapping.
#[derive(Clone)]
pub struct Actions<'a> {
    resolver: Resolver<'a>,
    timings: ActionTimings,
}

impl<'a> Actions<'a> {
    pub fn new(resolver: Resolver<'a>) -> Self {
        Self {
            resolver,
            timings: ActionTimings::default(),
        }
    }

    pub fn with_timings(mut self, timings: ActionTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn resolver(&self) -> &Resolver<'a> {
        &self.resolver
    }

    pub fn dom(&self) -> &'a dyn DomPort {
        self.resolver.dom()
    }

    pub fn mapping(&self) -> &'a FieldMapping {
        self.resolver.mapping()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        self.resolver.cancel_token()
    }

    pub fn waiter(&self) -> Waiter<'_> {
        Waiter::new(self.resolver.dom(), self.resolver.cancel_token())
    }

    /// Cancellable delay.
    pub async fn pause(&self, delay: Duration) -> Result<(), ActionError> {
        pause(self.resolver.cancel_token(), delay).await
    }
}
