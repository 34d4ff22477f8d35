//! Declaration wizard state machine
//!
//! Phases run strictly in order on one task. The only backward move is the
//! draft detour returning to `ConfiguringPeriod`; a retry starts a new
//! [`Wizard`] at `LoggedOut`.

mod additional;
mod configure;
mod faults;
mod income;
mod login;
mod obligation;
mod popups;
mod totals;
mod transition;

pub use faults::{detect_fault, login_fault, FAULT_PHRASES};

use action_primitives::{Actions, WaitSpec};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

use crate::errors::EngineError;
use crate::sources::Credentials;
use crate::values::ExternalValueSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PhaseState {
    LoggedOut,
    LoggingIn,
    ConfiguringPeriod,
    DismissingDraft,
    TransitioningToDetail,
    SelectingObligation,
    FillingIncomeSection,
    FillingAdditionalSections,
    VerifyingTotals,
    Submitting,
    Terminal,
}

/// Where a test mode ends the wizard. A run without one goes on to submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopPoint {
    LoggedIn,
    PeriodConfigured,
    /// Income section and ISR labels filled; IVA and the send untouched.
    IsrFilled,
}

impl StopPoint {
    /// The phase that is active when the wizard stops here.
    pub fn phase(self) -> PhaseState {
        match self {
            StopPoint::LoggedIn => PhaseState::LoggingIn,
            StopPoint::PeriodConfigured => PhaseState::ConfiguringPeriod,
            StopPoint::IsrFilled => PhaseState::FillingAdditionalSections,
        }
    }
}

impl fmt::Display for PhaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Waits and settle delays of the wizard. Portal defaults; tests use [`PhaseTimings::fast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTimings {
    pub navigation: Duration,
    /// Settle after a step that makes the portal re-render.
    pub settle: Duration,
    /// Pacing between consecutive field fills.
    pub field_pause: Duration,

    pub login_form: WaitSpec,
    pub post_login_url: WaitSpec,
    pub post_login_marker: WaitSpec,

    pub form_ready: WaitSpec,
    pub draft_initial: Duration,
    pub draft_check: WaitSpec,
    pub draft_confirm: WaitSpec,

    pub after_next: Duration,
    pub loading: WaitSpec,
    pub after_loading: Duration,
    pub prefill_popup: WaitSpec,
    pub popup_click: Duration,
    pub after_popup: Duration,

    pub dialog_open: WaitSpec,
    pub confirm_popup: WaitSpec,
    pub logout: Duration,
}

impl Default for PhaseTimings {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(30),
            settle: Duration::from_millis(1_000),
            field_pause: Duration::from_millis(200),
            login_form: WaitSpec::millis(300, 50),
            post_login_url: WaitSpec::millis(8_000, 150),
            post_login_marker: WaitSpec::millis(15_000, 250),
            form_ready: WaitSpec::millis(12_000, 100),
            draft_initial: Duration::from_millis(100),
            draft_check: WaitSpec::millis(2_000, 100),
            draft_confirm: WaitSpec::millis(1_000, 100),
            after_next: Duration::from_millis(500),
            loading: WaitSpec::millis(90_000, 500),
            after_loading: Duration::from_millis(300),
            prefill_popup: WaitSpec::millis(45_000, 250),
            popup_click: Duration::from_secs(5),
            after_popup: Duration::from_millis(1_500),
            dialog_open: WaitSpec::millis(3_000, 100),
            confirm_popup: WaitSpec::millis(1_500, 100),
            logout: Duration::from_secs(5),
        }
    }
}

impl PhaseTimings {
    pub fn fast() -> Self {
        let short = WaitSpec::millis(30, 5);
        Self {
            navigation: Duration::from_millis(50),
            settle: Duration::ZERO,
            field_pause: Duration::ZERO,
            login_form: short,
            post_login_url: WaitSpec::millis(60, 5),
            post_login_marker: short,
            form_ready: short,
            draft_initial: Duration::ZERO,
            draft_check: short,
            draft_confirm: short,
            after_next: Duration::ZERO,
            loading: WaitSpec::millis(100, 5),
            after_loading: Duration::ZERO,
            prefill_popup: short,
            popup_click: Duration::from_millis(100),
            after_popup: Duration::ZERO,
            dialog_open: short,
            confirm_popup: short,
            logout: Duration::from_millis(200),
        }
    }
}

/// Per-run inputs of the wizard besides the page.
#[derive(Debug, Clone)]
pub struct WizardSettings {
    pub portal_url: String,
    /// Submission gate tolerance in pesos.
    pub totals_tolerance: f64,
    pub timings: PhaseTimings,
}

pub struct Wizard<'a> {
    actions: Actions<'a>,
    values: &'a ExternalValueSet,
    credentials: &'a Credentials,
    settings: WizardSettings,
    state: PhaseState,
    reached: PhaseState,
}

impl<'a> Wizard<'a> {
    pub fn new(
        actions: Actions<'a>,
        values: &'a ExternalValueSet,
        credentials: &'a Credentials,
        settings: WizardSettings,
    ) -> Self {
        Self {
            actions,
            values,
            credentials,
            settings,
            state: PhaseState::LoggedOut,
            reached: PhaseState::LoggedOut,
        }
    }

    pub fn state(&self) -> PhaseState {
        self.state
    }

    /// Last phase entered before `Terminal`.
    pub fn reached(&self) -> PhaseState {
        self.reached
    }

    /// Drives every phase in order and ends in `Terminal` whatever the
    /// result. Returns the last phase entered before that.
    ///
    /// With `stop`, the run ends successfully at that point.
    pub async fn run(&mut self, stop: Option<StopPoint>) -> Result<PhaseState, EngineError> {
        let result = self.drive(stop).await;
        if let Err(err) = &result {
            debug!(phase = ?self.state, error = %err, "wizard stopped on error");
        }
        self.finish();
        result.map(|()| self.reached)
    }

    async fn drive(&mut self, stop: Option<StopPoint>) -> Result<(), EngineError> {
        let done = |point: StopPoint| stop == Some(point);

        self.advance(PhaseState::LoggingIn)?;
        self.login().await?;
        if done(StopPoint::LoggedIn) {
            return Ok(());
        }

        self.advance(PhaseState::ConfiguringPeriod)?;
        self.configure_period().await?;
        if done(StopPoint::PeriodConfigured) {
            return Ok(());
        }

        self.advance(PhaseState::TransitioningToDetail)?;
        self.transition_to_detail().await?;

        self.advance(PhaseState::SelectingObligation)?;
        self.select_obligation().await?;

        self.advance(PhaseState::FillingIncomeSection)?;
        self.fill_income_section().await?;

        self.advance(PhaseState::FillingAdditionalSections)?;
        self.fill_isr_labels().await?;
        if done(StopPoint::IsrFilled) {
            info!("stopping before the IVA labels and the send");
            return Ok(());
        }
        self.fill_iva_labels().await?;

        self.advance(PhaseState::VerifyingTotals)?;
        self.verify_totals().await?;

        self.advance(PhaseState::Submitting)?;
        self.submit().await
    }

    /// Moves to `Terminal`; no-op once there.
    pub(crate) fn finish(&mut self) {
        if self.state != PhaseState::Terminal {
            info!(from = ?self.state, to = ?PhaseState::Terminal, "phase transition");
            self.state = PhaseState::Terminal;
        }
    }

    pub(crate) fn advance(&mut self, next: PhaseState) -> Result<(), EngineError> {
        let allowed = next > self.state
            || (self.state == PhaseState::DismissingDraft && next == PhaseState::ConfiguringPeriod);
        if !allowed {
            return Err(EngineError::phase(
                self.state,
                format!("illegal transition to {next}"),
            ));
        }
        info!(from = ?self.state, to = ?next, "phase transition");
        self.state = next;
        if next != PhaseState::Terminal {
            self.reached = next;
        }
        Ok(())
    }

    async fn settle(&self) -> Result<(), EngineError> {
        self.pause(self.settings.timings.settle).await
    }

    async fn pause(&self, delay: Duration) -> Result<(), EngineError> {
        if delay.is_zero() {
            return Ok(());
        }
        debug!(delay_ms = delay.as_millis() as u64, "pause");
        self.actions
            .pause(delay)
            .await
            .map_err(|_| EngineError::Interrupted)
    }

    fn timings(&self) -> &PhaseTimings {
        &self.settings.timings
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use action_locator::{FieldMapping, Resolver, WaitBudgets};
    use action_primitives::ActionTimings;
    use cdp_adapter::MemoryDom;
    use std::path::PathBuf;
    use tokio_util::sync::CancellationToken;

    pub fn credentials() -> Credentials {
        Credentials {
            cer_path: PathBuf::from("/fiel/empresa.cer"),
            key_path: PathBuf::from("/fiel/empresa.key"),
            password: "secreto".to_string(),
            rfc: "EKU9003173C9".to_string(),
        }
    }

    pub fn settings() -> WizardSettings {
        WizardSettings {
            portal_url: "https://pstcdypisr.clouda.sat.gob.mx/".to_string(),
            totals_tolerance: 1.0,
            timings: PhaseTimings::fast(),
        }
    }

    pub fn actions<'a>(
        dom: &'a MemoryDom,
        mapping: &'a FieldMapping,
        cancel: CancellationToken,
    ) -> Actions<'a> {
        Actions::new(Resolver::new(dom, mapping, cancel).with_budgets(WaitBudgets::fast()))
            .with_timings(ActionTimings::fast())
    }
}
