//! Run supervisor
//!
//! Owns the browser session for every attempt, allows one retry of a
//! retryable failure after a cooling-off delay, and tears the session down
//! on every exit path, panics and interrupts included.

use action_locator::{FieldMapping, Resolver, WaitBudgets};
use action_primitives::{ActionError, ActionTimings, Actions};
use cdp_adapter::{DomPort, Scope};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::EngineError;
use crate::phases::{PhaseState, StopPoint, Wizard, WizardSettings};
use crate::session::SessionLauncher;
use crate::sources::Credentials;
use crate::values::ExternalValueSet;

/// A retryable failure gets exactly one more attempt.
pub const MAX_ATTEMPTS: u32 = 2;

const LOGOUT_LINK: &str = "button=Cerrar";

/// How far the wizard goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    Full,
    TestLogin,
    TestInitialForm,
    TestPhase3,
    TestFull,
}

impl RunMode {
    /// Only `Full` submits; every test mode stops before the send.
    pub fn stop_point(self) -> Option<StopPoint> {
        match self {
            RunMode::Full => None,
            RunMode::TestLogin => Some(StopPoint::LoggedIn),
            RunMode::TestInitialForm => Some(StopPoint::PeriodConfigured),
            RunMode::TestPhase3 | RunMode::TestFull => Some(StopPoint::IsrFilled),
        }
    }
}

/// Everything one run needs besides the browser.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub mode: RunMode,
    pub values: ExternalValueSet,
    pub credentials: Credentials,
    pub mapping: FieldMapping,
    pub settings: WizardSettings,
    pub retry_wait: Duration,
    pub budgets: WaitBudgets,
    pub action_timings: ActionTimings,
}

#[derive(Debug, Clone)]
pub enum OutcomeReason {
    Completed,
    /// A test mode reached its last phase.
    StoppedAfter(PhaseState),
    Failed(EngineError),
}

/// Always produced, whatever happened during the run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub success: bool,
    pub reason: OutcomeReason,
    pub attempts: u32,
    pub reached: PhaseState,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match &self.reason {
            _ if self.success => 0,
            OutcomeReason::Failed(EngineError::Interrupted) => 130,
            _ => 1,
        }
    }

    pub fn error(&self) -> Option<&EngineError> {
        match &self.reason {
            OutcomeReason::Failed(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            OutcomeReason::Failed(err) => write!(f, "FAIL: {err}"),
            OutcomeReason::Completed | OutcomeReason::StoppedAfter(_) => write!(f, "OK"),
        }
    }
}

pub struct Supervisor {
    launcher: Box<dyn SessionLauncher>,
    cancel: CancellationToken,
}

impl Supervisor {
    pub fn new(launcher: impl SessionLauncher + 'static, cancel: CancellationToken) -> Self {
        Self {
            launcher: Box::new(launcher),
            cancel,
        }
    }

    pub async fn run(&self, request: &RunRequest) -> RunOutcome {
        let mut attempts = 0;
        loop {
            attempts += 1;
            info!(attempt = attempts, mode = ?request.mode, "starting attempt");
            let (result, reached) = self.attempt(request).await;
            let err = match result {
                Ok(last) => {
                    let reason = match request.mode.stop_point() {
                        Some(stop) if stop.phase() == last => OutcomeReason::StoppedAfter(last),
                        _ => OutcomeReason::Completed,
                    };
                    info!(attempts, reached = ?last, "run finished");
                    return RunOutcome {
                        success: true,
                        reason,
                        attempts,
                        reached: last,
                    };
                }
                Err(err) => err,
            };

            let retry = err.is_retryable() && attempts < MAX_ATTEMPTS && !self.cancel.is_cancelled();
            if !retry {
                error!(
                    attempts,
                    reached = ?reached,
                    severity = err.severity(),
                    error = %err,
                    "run failed"
                );
                return RunOutcome {
                    success: false,
                    reason: OutcomeReason::Failed(err),
                    attempts,
                    reached,
                };
            }

            warn!(
                attempt = attempts,
                reached = ?reached,
                error = %err,
                wait_s = request.retry_wait.as_secs(),
                "retryable failure; cooling off before retry"
            );
            if self.cool_off(request.retry_wait).await.is_err() {
                return RunOutcome {
                    success: false,
                    reason: OutcomeReason::Failed(EngineError::Interrupted),
                    attempts,
                    reached,
                };
            }
        }
    }

    /// One fresh session from login onward. Returns the result with the last
    /// phase entered.
    async fn attempt(&self, request: &RunRequest) -> (Result<PhaseState, EngineError>, PhaseState) {
        let dom = match self.launcher.launch().await {
            Ok(dom) => dom,
            Err(err) => return (Err(err), PhaseState::LoggedOut),
        };

        let outcome = {
            let resolver = Resolver::new(dom.as_ref(), &request.mapping, self.cancel.clone())
                .with_budgets(request.budgets);
            let actions = Actions::new(resolver).with_timings(request.action_timings);
            let mut wizard = Wizard::new(
                actions,
                &request.values,
                &request.credentials,
                request.settings.clone(),
            );
            let result = AssertUnwindSafe(wizard.run(request.mode.stop_point()))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(EngineError::Panicked(panic_message(payload))));
            wizard.finish();
            (result, wizard.reached())
        };

        self.teardown(dom.as_ref(), request).await;
        outcome
    }

    /// Bounded logout on a token of its own, then page release.
    async fn teardown(&self, dom: &dyn DomPort, request: &RunRequest) {
        let resolver = Resolver::new(dom, &request.mapping, CancellationToken::new())
            .with_budgets(request.budgets);
        let actions = Actions::new(resolver).with_timings(request.action_timings);
        match tokio::time::timeout(request.settings.timings.logout, logout(&actions)).await {
            Ok(Ok(true)) => info!("logged out"),
            Ok(Ok(false)) => debug!("no logout control on the page"),
            Ok(Err(err)) => warn!(error = %err, "logout failed"),
            Err(_) => warn!("logout timed out"),
        }
        if let Err(err) = dom.close().await {
            warn!(error = %err, "failed to close browser page");
        }
        info!("session closed");
    }

    async fn cool_off(&self, delay: Duration) -> Result<(), EngineError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(EngineError::Interrupted),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

async fn logout(actions: &Actions<'_>) -> Result<bool, ActionError> {
    let page = Scope::Page;
    if actions.click_key(&page, "_nav_cerrar").await? {
        return Ok(true);
    }
    let dom = actions.dom();
    for node in dom.query(&page, LOGOUT_LINK).await? {
        let info = dom.describe(node).await?;
        if info.tag == "a" && info.visible {
            actions.click_node(node).await?;
            return Ok(true);
        }
    }
    Ok(false)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
