//! "Configuración de la declaración": open it, dismiss a saved draft, fill the period.

use action_locator::SelectorStrategy;
use cdp_adapter::{text_matches, NodeId, Scope};
use tracing::{info, warn};

use super::{PhaseState, Wizard};
use crate::errors::{EngineError, PhaseResultExt};

const DRAFT_MARKERS: [&str; 2] = ["formulario no concluido", "formularios no enviados"];
const DELETE_PROMPT: &str = "¿Deseas eliminar esta declaración?";
const DELETE_SELECTORS: [&str; 7] = [
    "[aria-label*='eliminar' i]",
    "[title*='eliminar' i]",
    "[class*='trash']",
    "[class*='eliminar']",
    "[class*='borrar']",
    "button:has(svg)",
    "a:has(svg)",
];
/// Ancestors of the draft marker searched for its delete control.
const DRAFT_CARD_LEVELS: usize = 4;
const FORM_MARKERS: &str = "select[id*='TipoDeclaracion'], [id*='EjercicioFiscal']";

impl Wizard<'_> {
    pub(super) async fn configure_period(&mut self) -> Result<(), EngineError> {
        let phase = PhaseState::ConfiguringPeriod;
        if !self
            .actions
            .click_key(&Scope::Page, "_nav_presentar_declaracion")
            .await
            .in_phase(phase)?
        {
            return Err(EngineError::phase(phase, "'Presentar declaración' not found"));
        }
        self.settle().await?;

        if self.draft_present().await? {
            self.dismiss_draft().await?;
        } else {
            info!("no saved draft");
        }

        let scope = self.form_scope().await?;
        self.actions
            .waiter()
            .visible(&scope, "select", self.timings().form_ready)
            .await
            .in_phase(phase)?;

        let period = &self.values.period;
        match period.year {
            Some(year) => {
                self.fill_period_field(&scope, "initial_ejercicio", &["Ejercicio"], &year.to_string())
                    .await?;
            }
            None => warn!("no fiscal year; Ejercicio left as shown"),
        }
        self.fill_period_field(
            &scope,
            "initial_periodicidad",
            &["Periodicidad"],
            period.periodicity_letter(),
        )
        .await?;
        match period.month_name() {
            Some(month) => {
                self.fill_period_field(&scope, "initial_periodo", &["Periodo", "Período"], month)
                    .await?;
            }
            None => warn!("no month; Periodo skipped"),
        }
        let tipo = self.values.declaration_type().to_string();
        self.fill_period_field(
            &scope,
            "initial_tipo_declaracion",
            &["Tipo de declaración"],
            &tipo,
        )
        .await?;
        Ok(())
    }

    async fn draft_present(&self) -> Result<bool, EngineError> {
        self.pause(self.timings().draft_initial).await?;
        let hit = self
            .actions
            .waiter()
            .text_appears(&DRAFT_MARKERS, self.timings().draft_check)
            .await
            .in_phase(self.state)?;
        Ok(hit.is_some())
    }

    async fn dismiss_draft(&mut self) -> Result<(), EngineError> {
        self.advance(PhaseState::DismissingDraft)?;
        let phase = PhaseState::DismissingDraft;
        info!("saved draft found; deleting it");

        match self.draft_delete_control().await.in_phase(phase)? {
            Some(trash) => {
                self.actions.click_node(trash).await.in_phase(phase)?;
                let prompt = self
                    .actions
                    .waiter()
                    .text_appears(&[DELETE_PROMPT], self.timings().draft_confirm)
                    .await
                    .in_phase(phase)?;
                if prompt.is_none() {
                    warn!("delete confirmation did not appear");
                } else if self
                    .actions
                    .click_any(&Scope::Page, "_popup_eliminar_si", &["button=\"Sí\""])
                    .await
                    .in_phase(phase)?
                {
                    info!("draft deleted");
                } else {
                    warn!("could not confirm draft deletion");
                }
                self.pause(self.timings().after_loading).await?;
            }
            None => warn!("draft delete control not found"),
        }

        self.advance(PhaseState::ConfiguringPeriod)
    }

    /// The delete control of the draft card, found by climbing from the marker
    /// text rather than taking the first delete-like control on the page.
    async fn draft_delete_control(&self) -> Result<Option<NodeId>, cdp_adapter::AdapterError> {
        let dom = self.actions.dom();
        let mapped: Vec<&str> = self
            .actions
            .mapping()
            .strategies("_draft_trash")
            .iter()
            .filter_map(|s| match s {
                SelectorStrategy::DirectSelector(sel) => Some(sel.as_str()),
                _ => None,
            })
            .collect();

        for marker in DRAFT_MARKERS {
            for anchor in dom.find_text(&Scope::Page, marker, false).await? {
                let mut current = dom.parent(anchor).await?;
                for _ in 0..DRAFT_CARD_LEVELS {
                    let Some(card) = current else {
                        break;
                    };
                    let within = Scope::Within(card);
                    for selector in mapped.iter().copied().chain(DELETE_SELECTORS) {
                        for node in dom.query(&within, selector).await? {
                            let info = dom.describe(node).await?;
                            if info.visible && !text_matches(info.label_text(), "iniciar", false) {
                                return Ok(Some(node));
                            }
                        }
                    }
                    current = dom.parent(card).await?;
                }
            }
        }
        Ok(None)
    }

    /// First iframe holding the declaration selects, else the page.
    async fn form_scope(&self) -> Result<Scope, EngineError> {
        let dom = self.actions.dom();
        for frame in dom.query(&Scope::Page, "iframe").await.in_phase(self.state)? {
            let scope = Scope::Within(frame);
            if !dom.query(&scope, FORM_MARKERS).await.in_phase(self.state)?.is_empty() {
                info!("declaration form is inside an iframe");
                return Ok(scope);
            }
        }
        Ok(Scope::Page)
    }

    /// Mapping key first, then the visible label text. A miss only warns.
    async fn fill_period_field(
        &self,
        scope: &Scope,
        key: &str,
        labels: &[&str],
        value: &str,
    ) -> Result<bool, EngineError> {
        let phase = self.state;
        let mut outcome = self.actions.set_dropdown_key(scope, key, value).await;
        for label in labels {
            if !matches!(outcome, Ok(None)) {
                break;
            }
            outcome = self.actions.set_dropdown_label(scope, label, value).await;
        }
        let filled = match outcome {
            Ok(Some(how)) => {
                info!(key = %key, value = %value, outcome = ?how, "period field set");
                true
            }
            Ok(None) => {
                warn!(key = %key, value = %value, "period field not found");
                false
            }
            Err(err) if err.is_miss() => {
                warn!(key = %key, value = %value, error = %err, "period option not available");
                false
            }
            Err(err) => return Err(err).in_phase(phase),
        };
        self.pause(self.timings().field_pause).await?;
        Ok(filled)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{fixtures, PhaseTimings};
    use super::*;
    use crate::values::{ExternalValueSet, Period};
    use action_locator::FieldMapping;
    use cdp_adapter::memory::{Document, DomEvent, El};
    use cdp_adapter::{DomPort, MemoryDom};
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    fn mapping() -> FieldMapping {
        FieldMapping::default()
            .with("_nav_presentar_declaracion", &["button=Presentar declaración"])
            .unwrap()
            .with("initial_ejercicio", &["select[id*='EjercicioFiscal']"])
            .unwrap()
            .with("initial_periodicidad", &["label=Periodicidad"])
            .unwrap()
            .with("initial_periodo", &["select[id*='Periodo']"])
            .unwrap()
            .with("initial_tipo_declaracion", &["select[id*='TipoDeclaracion']"])
            .unwrap()
    }

    fn form() -> El {
        El::new("div").id("configuracion").hidden().children([
            El::new("label").text("Ejercicio"),
            El::select("cmbEjercicioFiscal", &[("", "Selecciona"), ("2024", "2024"), ("2025", "2025")]),
            El::new("table").child(El::row([
                El::new("span").text("Periodicidad"),
                El::select("cmbPeriodicidad", &[("", "Selecciona"), ("M", "Mensual"), ("T", "Trimestral")]),
            ])),
            El::select("cmbPeriodo", &[("", "Selecciona"), ("1", "Enero"), ("3", "Marzo")]),
            El::select("cmbTipoDeclaracion", &[("", "Selecciona"), ("N", "Normal")]),
        ])
    }

    fn portal(with_draft: bool) -> MemoryDom {
        let mut doc = Document::new("https://pstcdypisr.clouda.sat.gob.mx/");
        let presentar = doc.add(El::button("Presentar declaración"));
        let form = doc.add(form());
        let draft = doc.add(
            El::new("div").class("card").hidden().children([
                El::new("h3").text("Formularios no enviados"),
                El::new("div").children([
                    El::button("INICIAR UNA NUEVA DECLARACIÓN"),
                    El::new("button")
                        .attr("aria-label", "Eliminar")
                        .id("trash")
                        .child(El::new("svg")),
                ]),
            ]),
        );
        let prompt = doc.add(
            El::new("div").attr("role", "dialog").hidden().children([
                El::new("p").text(DELETE_PROMPT),
                El::button("Sí").id("si"),
                El::button("No"),
            ]),
        );
        doc.on_click(presentar, move |d| {
            if with_draft {
                d.show(draft);
            } else {
                d.show(form);
            }
        });
        if let Some(trash) = doc.by_id("trash") {
            doc.on_click(trash, move |d| d.show(prompt));
        }
        if let Some(si) = doc.by_id("si") {
            doc.on_click(si, move |d| {
                d.remove(draft);
                d.hide(prompt);
                d.show(form);
            });
        }
        MemoryDom::new(doc)
    }

    fn values() -> ExternalValueSet {
        ExternalValueSet::new(Period {
            year: Some(2025),
            month: Some(3),
            periodicidad: Some(1),
        })
    }

    async fn selected(dom: &MemoryDom, id: &str) -> Option<String> {
        let node = dom.with_doc(|d| d.by_id(id))?;
        dom.describe(node).await.ok()?.value
    }

    #[tokio::test]
    async fn fills_period_in_order() {
        let dom = portal(false);
        let mapping = mapping();
        let values = values();
        let creds = fixtures::credentials();
        let mut wizard = Wizard::new(
            fixtures::actions(&dom, &mapping, CancellationToken::new()),
            &values,
            &creds,
            fixtures::settings(),
        );
        wizard.advance(PhaseState::LoggingIn).unwrap();
        wizard.advance(PhaseState::ConfiguringPeriod).unwrap();
        wizard.configure_period().await.unwrap();

        assert_eq!(selected(&dom, "cmbEjercicioFiscal").await.as_deref(), Some("2025"));
        assert_eq!(selected(&dom, "cmbPeriodicidad").await.as_deref(), Some("M"));
        assert_eq!(selected(&dom, "cmbPeriodo").await.as_deref(), Some("3"));
        assert_eq!(selected(&dom, "cmbTipoDeclaracion").await.as_deref(), Some("N"));

        let order: Vec<String> = dom
            .events()
            .into_iter()
            .filter_map(|e| match e {
                DomEvent::Selected(_, v) => Some(v),
                _ => None,
            })
            .collect();
        assert_eq!(order.first().map(String::as_str), Some("2025"));
        assert_eq!(wizard.state(), PhaseState::ConfiguringPeriod);
    }

    #[tokio::test]
    async fn deletes_the_draft_then_fills() {
        let dom = portal(true);
        let mapping = mapping();
        let values = values();
        let creds = fixtures::credentials();
        let mut wizard = Wizard::new(
            fixtures::actions(&dom, &mapping, CancellationToken::new()),
            &values,
            &creds,
            fixtures::settings(),
        );
        // Both controls are gone from the page once the draft is deleted.
        let (trash, si) = dom.with_doc(|d| (d.by_id("trash").unwrap(), d.by_id("si").unwrap()));
        wizard.advance(PhaseState::LoggingIn).unwrap();
        wizard.advance(PhaseState::ConfiguringPeriod).unwrap();
        wizard.configure_period().await.unwrap();

        assert_eq!(dom.with_doc(|d| d.by_id("trash")), None);
        let events = dom.events();
        assert!(events.contains(&DomEvent::Clicked(trash)));
        assert!(events.contains(&DomEvent::Clicked(si)));
        assert_eq!(selected(&dom, "cmbPeriodo").await.as_deref(), Some("3"));
        assert_eq!(wizard.state(), PhaseState::ConfiguringPeriod);
    }

    #[tokio::test(start_paused = true)]
    async fn absent_draft_adds_no_wait_beyond_the_first_check() {
        let dom = portal(false);
        let mapping = mapping();
        let values = values();
        let creds = fixtures::credentials();
        let timings = PhaseTimings::default();
        let settings = super::super::WizardSettings {
            timings,
            ..fixtures::settings()
        };
        let mut wizard = Wizard::new(
            fixtures::actions(&dom, &mapping, CancellationToken::new()),
            &values,
            &creds,
            settings,
        );
        wizard.advance(PhaseState::LoggingIn).unwrap();
        wizard.advance(PhaseState::ConfiguringPeriod).unwrap();

        let started = Instant::now();
        wizard.configure_period().await.unwrap();
        let elapsed = started.elapsed();

        let budget = timings.settle
            + timings.draft_initial
            + timings.draft_check.timeout
            + timings.draft_check.poll
            + timings.field_pause * 4;
        assert!(elapsed <= budget, "took {elapsed:?}, budget {budget:?}");
        assert!(elapsed >= timings.draft_check.timeout);
        let trash = dom.with_doc(|d| d.by_id("trash")).unwrap();
        assert!(!dom.events().contains(&DomEvent::Clicked(trash)));
    }

    #[tokio::test]
    async fn missing_presentar_is_fatal() {
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
        wizard.advance(PhaseState::LoggingIn).unwrap();
        wizard.advance(PhaseState::ConfiguringPeriod).unwrap();
        let err = wizard.configure_period().await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::PhaseFailed {
                phase: PhaseState::ConfiguringPeriod,
                ..
            }
        ));
    }
}
