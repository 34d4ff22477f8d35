use cdp_adapter::Scope;
use tracing::info;

use super::{PhaseState, Wizard};
use crate::errors::{EngineError, PhaseResultExt};

impl Wizard<'_> {
    /// Opens the ISR obligation. Without it the income form never loads.
    pub(super) async fn select_obligation(&mut self) -> Result<(), EngineError> {
        let phase = PhaseState::SelectingObligation;
        if !self
            .actions
            .click_key(&Scope::Page, "_select_obligation_isr")
            .await
            .in_phase(phase)?
        {
            return Err(EngineError::phase(phase, "ISR obligation control not found"));
        }
        info!("ISR obligation selected");
        self.settle().await
    }
}
