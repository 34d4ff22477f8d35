//! Submission gate and the final send.

use cdp_adapter::Scope;
use tracing::{error, info, warn};

use super::{PhaseState, Wizard};
use crate::errors::{EngineError, PhaseResultExt};
use crate::reconcile::{check_totals, ObservedTotals};

impl Wizard<'_> {
    /// Compares the portal summary with the workbook. On mismatch the run
    /// goes straight to `Terminal` and nothing is submitted.
    pub(super) async fn verify_totals(&mut self) -> Result<(), EngineError> {
        let observed = ObservedTotals {
            isr: self.summary_amount("_summary_isr_a_pagar").await?,
            iva: self.summary_amount("_summary_iva_a_pagar").await?,
            total: self.summary_amount("_summary_total_a_pagar").await?,
        };
        let verdict = check_totals(self.values, observed, self.settings.totals_tolerance);
        if verdict.passed() {
            info!(%verdict, "totals within tolerance");
            return Ok(());
        }
        error!(%verdict, "totals mismatch; declaration not submitted");
        self.finish();
        Err(EngineError::TotalsMismatch(verdict.to_string()))
    }

    async fn summary_amount(&self, key: &str) -> Result<f64, EngineError> {
        let amount = self
            .actions
            .read_amount_key(&Scope::Page, key)
            .await
            .in_phase(self.state)?;
        if amount.is_none() {
            warn!(key = %key, "summary figure not readable; using 0");
        }
        Ok(amount.unwrap_or(0.0))
    }

    pub(super) async fn submit(&mut self) -> Result<(), EngineError> {
        if !self
            .actions
            .click_key(&Scope::Page, "_btn_enviar_declaracion")
            .await
            .in_phase(PhaseState::Submitting)?
        {
            return Err(EngineError::SubmitUnavailable);
        }
        info!("declaration sent");
        self.settle().await
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures;
    use super::*;
    use crate::values::ExternalValueSet;
    use action_locator::FieldMapping;
    use cdp_adapter::memory::{Document, DomEvent, El};
    use cdp_adapter::MemoryDom;
    use tokio_util::sync::CancellationToken;

    fn summary(isr: &str, iva: &str, total: &str) -> MemoryDom {
        let mut doc = Document::new("https://pstcdypisr.clouda.sat.gob.mx/declaracion");
        doc.add(El::new("span").id("isr").text(isr));
        doc.add(El::new("span").id("iva").text(iva));
        doc.add(El::new("span").id("total").text(total));
        doc.add(El::button("Enviar declaración").id("send"));
        MemoryDom::new(doc)
    }

    fn mapping() -> FieldMapping {
        FieldMapping::default()
            .with("_summary_isr_a_pagar", &["#isr"])
            .unwrap()
            .with("_summary_iva_a_pagar", &["#iva"])
            .unwrap()
            .with("_summary_total_a_pagar", &["#total"])
            .unwrap()
            .with("_btn_enviar_declaracion", &["#send"])
            .unwrap()
    }

    fn values() -> ExternalValueSet {
        ExternalValueSet::default()
            .with_amount("ISR a cargo", 1200.0)
            .with_amount("IVA a cargo", 300.0)
    }

    #[tokio::test]
    async fn matching_totals_allow_submission() {
        let dom = summary("$1,200", "$300.40", "$1,500");
        let mapping = mapping();
        let values = values();
        let creds = fixtures::credentials();
        let mut wizard = Wizard::new(
            fixtures::actions(&dom, &mapping, CancellationToken::new()),
            &values,
            &creds,
            fixtures::settings(),
        );
        wizard.advance(PhaseState::VerifyingTotals).unwrap();
        wizard.verify_totals().await.unwrap();
        wizard.advance(PhaseState::Submitting).unwrap();
        wizard.submit().await.unwrap();

        let send = dom.with_doc(|d| d.by_id("send")).unwrap();
        assert!(dom.events().contains(&DomEvent::Clicked(send)));
    }

    #[tokio::test]
    async fn mismatch_halts_before_submit() {
        let dom = summary("$1,200", "$350", "");
        let mapping = mapping();
        let values = values();
        let creds = fixtures::credentials();
        let mut wizard = Wizard::new(
            fixtures::actions(&dom, &mapping, CancellationToken::new()),
            &values,
            &creds,
            fixtures::settings(),
        );
        wizard.advance(PhaseState::VerifyingTotals).unwrap();
        let err = wizard.verify_totals().await.unwrap_err();

        let EngineError::TotalsMismatch(message) = &err else {
            panic!("expected a totals mismatch, got {err:?}");
        };
        assert!(message.contains("IVA=300.00"));
        assert!(message.contains("IVA=350.00"));
        assert!(!err.is_retryable());
        assert_eq!(wizard.state(), PhaseState::Terminal);
        assert_eq!(wizard.reached(), PhaseState::VerifyingTotals);
        assert!(!dom
            .events()
            .iter()
            .any(|e| matches!(e, DomEvent::Clicked(_))));
    }

    #[tokio::test]
    async fn missing_submit_control_is_reported() {
        let dom = MemoryDom::new(Document::new("https://pstcdypisr.clouda.sat.gob.mx/"));
        let mapping = mapping();
        let values = values();
        let creds = fixtures::credentials();
        let mut wizard = Wizard::new(
            fixtures::actions(&dom, &mapping, CancellationToken::new()),
            &values,
            &creds,
            fixtures::settings(),
        );
        assert!(matches!(
            wizard.submit().await,
            Err(EngineError::SubmitUnavailable)
        ));
    }
}
