use action_locator::{ControlKind, Resolution};
use action_primitives::ActionError;
use cdp_adapter::Scope;
use tracing::{debug, info, warn};

use super::Wizard;
use crate::catalog::{ISR_LABELS, IVA_LABELS};
use crate::errors::{EngineError, PhaseResultExt};
use crate::values::format_amount;

impl Wizard<'_> {
    pub(super) async fn fill_isr_labels(&mut self) -> Result<(), EngineError> {
        self.fill_labels("ISR", &ISR_LABELS).await
    }

    pub(super) async fn fill_iva_labels(&mut self) -> Result<(), EngineError> {
        self.fill_labels("IVA", &IVA_LABELS).await
    }

    /// Fills every label with a present, nonzero value.
    /// Absent and zero values are skipped; a field miss only warns.
    async fn fill_labels(&mut self, section: &str, labels: &[&str]) -> Result<(), EngineError> {
        let mut filled = 0usize;
        let mut skipped = 0usize;
        let mut missed = 0usize;
        for label in labels {
            let Some(amount) = self.values.nonzero_amount(label) else {
                debug!(label = %label, "no value; skipped");
                skipped += 1;
                continue;
            };
            let text = format_amount(amount);
            match self.fill_labelled(label, &text).await {
                Ok(true) => filled += 1,
                Ok(false) => {
                    warn!(label = %label, value = %text, "field not found");
                    missed += 1;
                }
                Err(err) if err.is_miss() => {
                    warn!(label = %label, value = %text, error = %err, "field rejected value");
                    missed += 1;
                }
                Err(err) => return Err(err).in_phase(self.state),
            }
            self.pause(self.timings().field_pause).await?;
        }
        info!(section, filled, skipped, missed, "labels done");
        Ok(())
    }

    /// Mapping entry named after the label first, then the label text itself.
    async fn fill_labelled(&self, label: &str, text: &str) -> Result<bool, ActionError> {
        let page = Scope::Page;
        if self.actions.mapping().contains(label) {
            if let Resolution::Found(control) = self
                .actions
                .resolver()
                .resolve_key(&page, label, ControlKind::Any)
                .await?
            {
                let info = self.actions.dom().describe(control.node).await?;
                if info.tag == "select" {
                    self.actions.set_dropdown(control.node, text).await?;
                } else {
                    self.actions.set_text(control.node, label, text).await?;
                }
                info!(label = %label, value = %text, "field filled");
                return Ok(true);
            }
        }
        self.actions.set_text_label(&page, label, text).await
    }
}
