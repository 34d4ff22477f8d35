//! ISR income section
//!
//! Order on the form: copropiedad question, the copropiedad discounts dialog,
//! the pre-filled collected total, the two disclosure questions with their
//! dialogs and finally the total-percibidos dialog.

use action_locator::{first_success, heuristics, Attempt, ControlKind, SelectorStrategy};
use action_primitives::ActionError;
use cdp_adapter::{NodeId, Scope};
use futures::FutureExt;
use tracing::{info, warn};

use super::Wizard;
use crate::catalog::{
    ACTIVITY_CONCEPTS, COPROPIEDAD_DISCOUNTS_LABEL, DECREASE_CONCEPTS, INCREASE_CONCEPTS,
};
use crate::errors::{EngineError, PhaseResultExt};
use crate::reconcile::{expected_income, income_disclosures, Decision, DISCLOSURE_TOLERANCE};
use crate::values::format_amount;

const INCOME_TAB: &str = "#tab457maincontainer1";
const COPROPIEDAD_QUESTION: &str = "ingresos fueron obtenidos a través de copropiedad";
const COPROPIEDAD_FIELD: &str = "integrantes por copropiedad";
const DISCOUNTS_ROWS: [&str; 2] = ["Descuentos, devoluciones y bonificaciones", "Descuentos"];
const COLLECTED_TOTAL: &str = "Total de ingresos efectivamente cobrados";
const DECREASE_QUESTION: &str = "¿Tienes ingresos a disminuir";
const INCREASE_QUESTION: &str = "¿Tienes ingresos adicionales";
const DECREASE_ROW: &str = "Ingresos a disminuir";
const INCREASE_ROW: &str = "Ingresos adicionales";
const PERCEIVED_ROW: &str = "Total de ingresos percibidos";

impl Wizard<'_> {
    pub(super) async fn fill_income_section(&mut self) -> Result<(), EngineError> {
        let scope = self.income_scope().await?;

        self.answer(&scope, COPROPIEDAD_QUESTION, Decision::No).await?;
        self.capture_copropiedad_discounts(&scope).await?;

        let observed = self.read_collected_income(&scope).await?;
        let (decrease, increase) = match expected_income(self.values) {
            Some((label, expected)) => {
                let (decrease, increase) =
                    income_disclosures(expected, observed, DISCLOSURE_TOLERANCE);
                info!(
                    source = %label,
                    expected,
                    observed,
                    delta = decrease.delta,
                    decrease = ?decrease.decision,
                    increase = ?increase.decision,
                    "income reconciled"
                );
                (Some(decrease), Some(increase))
            }
            None => {
                warn!(observed, "no expected income in workbook; answering No to both disclosures");
                (None, None)
            }
        };

        let decrease_decision = decrease.map_or(Decision::No, |r| r.decision);
        self.answer(&scope, DECREASE_QUESTION, decrease_decision).await?;
        if let Some(result) = decrease.filter(|r| r.decision.is_yes()) {
            self.capture_disclosure(
                &scope,
                "_isr_ingresos_capturar_disminuir",
                DECREASE_ROW,
                &DECREASE_CONCEPTS,
                result.corrective_amount(),
            )
            .await?;
        }

        let increase_decision = increase.map_or(Decision::No, |r| r.decision);
        self.answer(&scope, INCREASE_QUESTION, increase_decision).await?;
        if let Some(result) = increase.filter(|r| r.decision.is_yes()) {
            self.capture_disclosure(
                &scope,
                "_isr_ingresos_capturar_adicionales",
                INCREASE_ROW,
                &INCREASE_CONCEPTS,
                result.corrective_amount(),
            )
            .await?;
        }

        self.capture_perceived_total(&scope).await
    }

    async fn income_scope(&self) -> Result<Scope, EngineError> {
        let found = self
            .actions
            .dom()
            .query(&Scope::Page, INCOME_TAB)
            .await
            .in_phase(self.state)?;
        Ok(found.first().copied().map_or(Scope::Page, Scope::Within))
    }

    /// Sets a Sí/No question. A missing question or option only warns.
    async fn answer(&self, scope: &Scope, question: &str, decision: Decision) -> Result<(), EngineError> {
        match self
            .actions
            .set_dropdown_label(scope, question, decision.label())
            .await
        {
            Ok(Some(_)) => info!(question = %question, answer = decision.label(), "question answered"),
            Ok(None) => warn!(question = %question, "question not found"),
            Err(err) if err.is_miss() => {
                warn!(question = %question, error = %err, "answer not accepted")
            }
            Err(err) => return Err(err).in_phase(self.state),
        }
        self.settle().await
    }

    async fn capture_copropiedad_discounts(&self, scope: &Scope) -> Result<(), EngineError> {
        let Some(opener) = self
            .find_capture(scope, "_isr_ingresos_capturar_descuentos", &DISCOUNTS_ROWS)
            .await?
        else {
            warn!("copropiedad discounts CAPTURAR not found");
            return Ok(());
        };
        let dialog = self.open_dialog(opener, "Descuentos").await?;
        let amount = format_amount(self.values.amount_or_zero(COPROPIEDAD_DISCOUNTS_LABEL));
        if !self
            .actions
            .set_text_label(&dialog, COPROPIEDAD_FIELD, &amount)
            .await
            .in_phase(self.state)?
        {
            warn!("copropiedad discounts field not found");
        }
        self.close_dialog(&dialog).await
    }

    /// Pre-filled total the portal computed from invoices. 0 when unreadable.
    async fn read_collected_income(&self, scope: &Scope) -> Result<f64, EngineError> {
        let actions = &self.actions;
        let resolver = actions.resolver();
        let dom = actions.dom();
        let read = |node: Option<NodeId>| async move {
            match node {
                Some(node) => actions.read_amount(node).await,
                None => Ok(None),
            }
        };

        let attempts: Vec<Attempt<'_, f64, ActionError>> = vec![
            async move { actions.read_amount_key(scope, "_isr_ingresos_total_cobrados").await }
                .boxed(),
            async move {
                let strategies = [SelectorStrategy::LabelIndirection(COLLECTED_TOTAL.to_string())];
                let found = resolver
                    .resolve(scope, "", &strategies, ControlKind::Input)
                    .await?;
                read(found.node()).await
            }
            .boxed(),
            async move {
                for label in heuristics::label_candidates(dom, scope, COLLECTED_TOTAL).await? {
                    let cell = dom.closest(label, "td, th").await?.unwrap_or(label);
                    for sibling in dom.following_siblings(cell).await? {
                        if let Some(input) = first_input(dom, Scope::Within(sibling)).await? {
                            return read(Some(input)).await;
                        }
                    }
                }
                Ok(None)
            }
            .boxed(),
            async move {
                for label in heuristics::label_candidates(dom, scope, COLLECTED_TOTAL).await? {
                    if let Some(row) = dom.closest(label, "tr").await? {
                        if let Some(input) = first_input(dom, Scope::Within(row)).await? {
                            return read(Some(input)).await;
                        }
                    }
                }
                Ok(None)
            }
            .boxed(),
            async move {
                let strategies = [SelectorStrategy::LabelProximity(COLLECTED_TOTAL.to_string())];
                let found = resolver
                    .resolve(scope, "", &strategies, ControlKind::Input)
                    .await?;
                read(found.node()).await
            }
            .boxed(),
        ];

        match first_success("collected-income", attempts)
            .await
            .in_phase(self.state)?
        {
            Some(won) => {
                info!(amount = won.value, candidate = won.index, "collected income read");
                Ok(won.value)
            }
            None => {
                warn!("collected income not readable; using 0");
                Ok(0.0)
            }
        }
    }

    /// Decrease or increase dialog with its single corrective line.
    async fn capture_disclosure(
        &self,
        scope: &Scope,
        key: &str,
        row: &str,
        concepts: &[&str],
        amount: u64,
    ) -> Result<(), EngineError> {
        let Some(opener) = self.find_capture(scope, key, &[row]).await? else {
            warn!(section = %row, "disclosure CAPTURAR not found");
            return Ok(());
        };
        let dialog = self.open_dialog(opener, row).await?;
        if !self.add_line(&dialog, concepts, amount as f64).await? {
            warn!(section = %row, amount, "disclosure line not saved");
        }
        self.close_dialog(&dialog).await
    }

    /// One line per present, nonzero activity amount, in whole pesos.
    async fn capture_perceived_total(&self, scope: &Scope) -> Result<(), EngineError> {
        let Some(opener) = self
            .find_capture(scope, "_isr_ingresos_capturar_total", &[PERCEIVED_ROW])
            .await?
        else {
            warn!("total percibidos CAPTURAR not found");
            return Ok(());
        };
        let dialog = self.open_dialog(opener, PERCEIVED_ROW).await?;
        for (label, concept) in ACTIVITY_CONCEPTS {
            let Some(amount) = self.values.nonzero_amount(label) else {
                continue;
            };
            if !self.add_line(&dialog, &[concept], amount.round()).await? {
                warn!(activity = %label, amount, "activity line not saved");
            }
        }
        self.close_dialog(&dialog).await
    }
}

async fn first_input(
    dom: &dyn cdp_adapter::DomPort,
    scope: Scope,
) -> Result<Option<NodeId>, cdp_adapter::AdapterError> {
    for node in dom.query(&scope, "input").await? {
        let info = dom.describe(node).await?;
        if info.visible && info.is_form_control() {
            return Ok(Some(node));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::super::popups::tests::{capture_dialog, saved_lines};
    use super::super::{fixtures, PhaseState};
    use super::*;
    use crate::values::{ExternalValueSet, Period};
    use action_locator::FieldMapping;
    use cdp_adapter::memory::{Document, El};
    use cdp_adapter::MemoryDom;
    use tokio_util::sync::CancellationToken;

    const YES_NO: &[(&str, &str)] = &[("No", "No"), ("Sí", "Sí")];

    fn question(text: &str, id: &str) -> El {
        El::row([El::new("span").text(text), El::select(id, YES_NO)])
    }

    /// Section row whose CAPTURAR shows `dialog`.
    fn capture_row(doc: &mut Document, table: NodeId, label: &str, dialog: NodeId) {
        let row = doc.append(
            table,
            El::new("tr").child(El::new("td").child(El::new("span").text(label))),
        );
        let cell = doc.append(row, El::new("td"));
        let button = doc.append(cell, El::button("CAPTURAR"));
        doc.on_click(button, move |d| d.show(dialog));
    }

    /// Income tab with a pre-filled collected total of `collected`.
    fn income_page(collected: &str) -> MemoryDom {
        let mut doc = Document::new("https://pstcdypisr.clouda.sat.gob.mx/declaracion");
        let discounts = doc.add(
            El::new("div")
                .attr("role", "dialog")
                .hidden()
                .children([
                    El::row([
                        El::new("span").text(COPROPIEDAD_DISCOUNTS_LABEL),
                        El::input("desc-amount"),
                    ]),
                    El::button("CERRAR").id("desc-close"),
                ]),
        );
        if let Some(close) = doc.by_id("desc-close") {
            doc.on_click(close, move |d| d.hide(discounts));
        }
        let decrease = capture_dialog(&mut doc, "dis", &DECREASE_CONCEPTS);
        let increase = capture_dialog(&mut doc, "adi", &INCREASE_CONCEPTS);
        let activities: Vec<&str> = ACTIVITY_CONCEPTS.iter().map(|(_, c)| *c).collect();
        let perceived = capture_dialog(&mut doc, "tot", &activities);

        let tab = doc.add(El::new("div").id("tab457maincontainer1"));
        let table = doc.append(tab, El::new("table"));
        doc.append(
            table,
            question("*¿Los ingresos fueron obtenidos a través de copropiedad?", "copropiedad"),
        );
        doc.append(
            table,
            El::row([
                El::new("span").text(COLLECTED_TOTAL),
                El::new("input")
                    .attr("type", "text")
                    .attr("readonly", "readonly")
                    .attr("value", collected),
            ]),
        );
        capture_row(&mut doc, table, "Descuentos, devoluciones y bonificaciones", discounts);
        doc.append(table, question("¿Tienes ingresos a disminuir?", "q-dis"));
        capture_row(&mut doc, table, "*Ingresos a disminuir", decrease);
        doc.append(table, question("¿Tienes ingresos adicionales?", "q-adi"));
        capture_row(&mut doc, table, "*Ingresos adicionales", increase);
        capture_row(
            &mut doc,
            table,
            "Total de ingresos percibidos por la actividad",
            perceived,
        );
        MemoryDom::new(doc)
    }

    fn selected(dom: &MemoryDom, id: &str) -> Option<String> {
        dom.with_doc(|d| d.by_id(id).and_then(|node| d.value_of(node)))
    }

    fn values() -> ExternalValueSet {
        ExternalValueSet::new(Period {
            year: Some(2025),
            month: Some(3),
            periodicidad: Some(1),
        })
        .with_amount("Base gravable del pago provisional", 1000.0)
        .with_amount("Actividad empresarial", 600.4)
        .with_amount("Actividad profesional (honorarios)", 408.1)
        .with_missing("Uso o goce temporal de bienes (arrendamiento)")
    }

    async fn run_income(dom: &MemoryDom, values: &ExternalValueSet) {
        let mapping = FieldMapping::default();
        let creds = fixtures::credentials();
        let mut wizard = Wizard::new(
            fixtures::actions(dom, &mapping, CancellationToken::new()),
            values,
            &creds,
            fixtures::settings(),
        );
        wizard.advance(PhaseState::FillingIncomeSection).unwrap();
        wizard.fill_income_section().await.unwrap();
    }

    #[tokio::test]
    async fn portal_above_workbook_discloses_a_decrease() {
        let dom = income_page("$1,008.50");
        let values = values();
        run_income(&dom, &values).await;

        assert_eq!(selected(&dom, "copropiedad").as_deref(), Some("No"));
        assert_eq!(selected(&dom, "desc-amount").as_deref(), Some("0"));
        assert_eq!(selected(&dom, "q-dis").as_deref(), Some("Sí"));
        assert_eq!(selected(&dom, "q-adi").as_deref(), Some("No"));
        assert_eq!(
            saved_lines(&dom, "dis").await,
            vec![format!("{} 8", DECREASE_CONCEPTS[0])]
        );
        assert!(saved_lines(&dom, "adi").await.is_empty());
        assert_eq!(
            saved_lines(&dom, "tot").await,
            vec![
                "Actividad empresarial 600".to_string(),
                "Servicios profesionales (Honorarios) 408".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn within_tolerance_answers_no_twice() {
        let dom = income_page("1000.40");
        let values = values();
        run_income(&dom, &values).await;

        assert_eq!(selected(&dom, "q-dis").as_deref(), Some("No"));
        assert_eq!(selected(&dom, "q-adi").as_deref(), Some("No"));
        assert!(saved_lines(&dom, "dis").await.is_empty());
        assert!(saved_lines(&dom, "adi").await.is_empty());
        assert_eq!(saved_lines(&dom, "tot").await.len(), 2);
    }

    #[tokio::test]
    async fn workbook_above_portal_discloses_an_increase() {
        let dom = income_page("990");
        let values = values();
        run_income(&dom, &values).await;

        assert_eq!(selected(&dom, "q-dis").as_deref(), Some("No"));
        assert_eq!(selected(&dom, "q-adi").as_deref(), Some("Sí"));
        assert_eq!(
            saved_lines(&dom, "adi").await,
            vec![format!("{} 10", INCREASE_CONCEPTS[0])]
        );
    }
}
