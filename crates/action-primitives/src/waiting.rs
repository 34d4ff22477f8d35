//! Bounded, cancellable waits on page state

use cdp_adapter::{text_matches, DomPort, NodeId, Scope};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::errors::ActionError;

/// Deadline plus poll cadence for one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSpec {
    pub timeout: Duration,
    pub poll: Duration,
}

impl WaitSpec {
    pub const fn new(timeout: Duration, poll: Duration) -> Self {
        Self { timeout, poll }
    }

    pub const fn millis(timeout_ms: u64, poll_ms: u64) -> Self {
        Self::new(
            Duration::from_millis(timeout_ms),
            Duration::from_millis(poll_ms),
        )
    }
}

/// Sleeps for `delay` unless the run is cancelled first.
pub async fn pause(cancel: &CancellationToken, delay: Duration) -> Result<(), ActionError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(ActionError::Interrupted("run cancelled".to_string())),
        _ = sleep(delay) => Ok(()),
    }
}

/// Page-state waits shared by the phases.
pub struct Waiter<'a> {
    dom: &'a dyn DomPort,
    cancel: &'a CancellationToken,
}

impl<'a> Waiter<'a> {
    pub fn new(dom: &'a dyn DomPort, cancel: &'a CancellationToken) -> Self {
        Self { dom, cancel }
    }

    /// First of `needles` the page body shows within the wait, if any.
    pub async fn text_appears(
        &self,
        needles: &[&str],
        within: WaitSpec,
    ) -> Result<Option<String>, ActionError> {
        let started = Instant::now();
        loop {
            let body = self.dom.body_text().await?;
            if let Some(hit) = needles.iter().find(|n| text_matches(&body, n, false)) {
                debug!(marker = %hit, elapsed_ms = started.elapsed().as_millis() as u64, "text appeared");
                return Ok(Some(hit.to_string()));
            }
            if started.elapsed() >= within.timeout {
                return Ok(None);
            }
            pause(self.cancel, within.poll).await?;
        }
    }

    /// `true` once `needle` is no longer shown, `false` if it outlasts the wait.
    pub async fn text_disappears(&self, needle: &str, within: WaitSpec) -> Result<bool, ActionError> {
        let started = Instant::now();
        loop {
            let body = self.dom.body_text().await?;
            if !text_matches(&body, needle, false) {
                return Ok(true);
            }
            if started.elapsed() >= within.timeout {
                return Ok(false);
            }
            trace!(needle, "still showing");
            pause(self.cancel, within.poll).await?;
        }
    }

    /// First visible match of `selector` within the wait.
    pub async fn visible(
        &self,
        scope: &Scope,
        selector: &str,
        within: WaitSpec,
    ) -> Result<Option<NodeId>, ActionError> {
        let started = Instant::now();
        loop {
            for node in self.dom.query(scope, selector).await? {
                match self.dom.describe(node).await {
                    Ok(info) if info.visible => return Ok(Some(node)),
                    Ok(_) => {}
                    Err(err) if err.is_miss() => {}
                    Err(err) => return Err(err.into()),
                }
            }
            if started.elapsed() >= within.timeout {
                return Ok(None);
            }
            pause(self.cancel, within.poll).await?;
        }
    }

    /// Polls the current URL until it contains `fragment` or `stop` reports a
    /// reason to give up early.
    pub async fn url_contains<F>(
        &self,
        fragment: &str,
        within: WaitSpec,
        mut stop: F,
    ) -> Result<UrlWait, ActionError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let started = Instant::now();
        loop {
            let url = self.dom.current_url().await?;
            if url.contains(fragment) {
                return Ok(UrlWait::Reached(url));
            }
            let body = self.dom.body_text().await?;
            if let Some(reason) = stop(&body) {
                return Ok(UrlWait::Stopped(reason));
            }
            if started.elapsed() >= within.timeout {
                return Ok(UrlWait::TimedOut(url));
            }
            pause(self.cancel, within.poll).await?;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlWait {
    Reached(String),
    Stopped(String),
    TimedOut(String),
}
