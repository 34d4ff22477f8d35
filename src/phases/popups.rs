//! CAPTURAR dialogs of the income section
//!
//! Every capture dialog has the same shape: AGREGAR opens a line editor with
//! a Concepto list and an Importe input, GUARDAR stores the line (sometimes
//! behind an ACEPTAR confirmation) and CERRAR leaves the dialog.

use action_locator::{first_success, Attempt, ControlKind};
use action_primitives::ActionError;
use cdp_adapter::{NodeId, Scope};
use futures::FutureExt;
use tracing::{debug, info, warn};

use super::Wizard;
use crate::errors::{EngineError, PhaseResultExt};
use crate::values::format_amount;

pub(super) const CAPTURE: &str = "CAPTURAR";
const DIALOG: &str = "[role='dialog'], .modal";
const ADD_LINE: &str = "button=AGREGAR";
const SAVE: &str = "button=GUARDAR";
const ACCEPT: &str = "button=ACEPTAR";
pub(super) const CLOSE: &str = "button=CERRAR";

impl Wizard<'_> {
    /// CAPTURAR control for a section: the mapping key first, then the
    /// button in the row of each label, then the one nearest the label text.
    pub(super) async fn find_capture(
        &self,
        scope: &Scope,
        key: &str,
        row_labels: &[&str],
    ) -> Result<Option<NodeId>, EngineError> {
        let resolver = self.actions.resolver();
        let mut attempts: Vec<Attempt<'_, NodeId, ActionError>> = vec![async move {
            let found = resolver.resolve_key(scope, key, ControlKind::Any).await?;
            Ok::<_, ActionError>(found.node())
        }
        .boxed()];
        for &label in row_labels {
            attempts.push(
                async move {
                    Ok::<_, ActionError>(resolver.resolve_action_in_row(scope, CAPTURE, label).await?)
                }
                .boxed(),
            );
            // The question row usually precedes the section row with the same words.
            for occurrence in [1, 0] {
                attempts.push(
                    async move {
                        let found = resolver
                            .resolve_row_action(scope, CAPTURE, label, occurrence)
                            .await?;
                        Ok::<_, ActionError>(found)
                    }
                    .boxed(),
                );
            }
        }
        let won = first_success(key, attempts).await.in_phase(self.state)?;
        if let Some(won) = &won {
            debug!(key = %key, candidate = won.index, "CAPTURAR resolved");
        }
        Ok(won.map(|w| w.value))
    }

    /// Clicks `opener` and returns the dialog it brought up, or the page
    /// when no dialog container shows.
    pub(super) async fn open_dialog(&self, opener: NodeId, title: &str) -> Result<Scope, EngineError> {
        let phase = self.state;
        self.actions.click_node(opener).await.in_phase(phase)?;
        let shown = self
            .actions
            .waiter()
            .visible(&Scope::Page, DIALOG, self.timings().dialog_open)
            .await
            .in_phase(phase)?;
        if shown.is_none() {
            warn!(dialog = %title, "no dialog container appeared; using the page");
        }
        let scope = self.dialog_scope().await?;
        info!(dialog = %title, "dialog open");
        Ok(scope)
    }

    /// Innermost visible dialog.
    async fn dialog_scope(&self) -> Result<Scope, EngineError> {
        let dom = self.actions.dom();
        let mut last = None;
        for node in dom.query(&Scope::Page, DIALOG).await.in_phase(self.state)? {
            if dom.describe(node).await.in_phase(self.state)?.visible {
                last = Some(node);
            }
        }
        Ok(last.map_or(Scope::Page, Scope::Within))
    }

    /// AGREGAR, Concepto, Importe, GUARDAR and the optional ACEPTAR.
    ///
    /// `Ok(false)` when the line could not be filled; GUARDAR is then not pressed.
    pub(super) async fn add_line(
        &self,
        dialog: &Scope,
        concepts: &[&str],
        amount: f64,
    ) -> Result<bool, EngineError> {
        let phase = self.state;
        if !self
            .actions
            .click_selector(dialog, ADD_LINE)
            .await
            .in_phase(phase)?
        {
            warn!("AGREGAR not found; looking for an open line editor");
        }

        let concept = self.pick_concept(dialog, concepts).await?;
        let importe = format_amount(amount);
        let amount_set = self.enter_importe(dialog, &importe).await?;
        if concept.is_none() || !amount_set {
            warn!(
                concept = ?concept,
                importe = %importe,
                "line not filled; GUARDAR skipped"
            );
            return Ok(false);
        }

        if !self
            .actions
            .click_any(dialog, "_popup_guardar", &[SAVE])
            .await
            .in_phase(phase)?
        {
            warn!("GUARDAR not found");
            return Ok(false);
        }
        if let Some(ok) = self
            .actions
            .waiter()
            .visible(&Scope::Page, ACCEPT, self.timings().confirm_popup)
            .await
            .in_phase(phase)?
        {
            self.actions.click_node(ok).await.in_phase(phase)?;
            debug!("ACEPTAR confirmed");
        }
        info!(concept = ?concept, importe = %importe, "line saved");
        self.pause(self.timings().field_pause).await?;
        Ok(true)
    }

    pub(super) async fn close_dialog(&self, dialog: &Scope) -> Result<(), EngineError> {
        let closed = self
            .actions
            .click_any(dialog, "_popup_cerrar", &[CLOSE])
            .await
            .in_phase(self.state)?;
        if closed {
            self.pause(self.timings().after_loading).await
        } else {
            warn!("CERRAR not found in dialog");
            Ok(())
        }
    }

    /// Sets the Concepto list to the first spelling it offers.
    async fn pick_concept(
        &self,
        dialog: &Scope,
        concepts: &[&str],
    ) -> Result<Option<String>, EngineError> {
        let phase = self.state;
        let labelled = self
            .actions
            .resolver()
            .resolve_label(dialog, "Concepto", ControlKind::Select)
            .await
            .in_phase(phase)?;
        let control = match labelled {
            Some(node) => Some(node),
            None => self.first_visible(dialog, "select").await?,
        };
        let Some(control) = control else {
            return Ok(None);
        };
        for concept in concepts {
            match self.actions.set_dropdown(control, concept).await {
                Ok(outcome) => {
                    debug!(concept = %concept, outcome = ?outcome, "concept set");
                    return Ok(Some(concept.to_string()));
                }
                Err(err) if err.is_miss() => continue,
                Err(err) => return Err(err).in_phase(phase),
            }
        }
        Ok(None)
    }

    async fn enter_importe(&self, dialog: &Scope, importe: &str) -> Result<bool, EngineError> {
        let phase = self.state;
        let labelled = self
            .actions
            .resolver()
            .resolve_label(dialog, "Importe", ControlKind::Input)
            .await
            .in_phase(phase)?;
        let control = match labelled {
            Some(node) => Some(node),
            None => self.first_editable_amount(dialog).await?,
        };
        let Some(control) = control else {
            return Ok(false);
        };
        self.actions
            .set_text(control, "Importe", importe)
            .await
            .in_phase(phase)?;
        Ok(true)
    }

    async fn first_visible(&self, scope: &Scope, css: &str) -> Result<Option<NodeId>, EngineError> {
        let dom = self.actions.dom();
        for node in dom.query(scope, css).await.in_phase(self.state)? {
            if dom.describe(node).await.in_phase(self.state)?.visible {
                return Ok(Some(node));
            }
        }
        Ok(None)
    }

    async fn first_editable_amount(&self, scope: &Scope) -> Result<Option<NodeId>, EngineError> {
        let dom = self.actions.dom();
        for node in dom.query(scope, "input").await.in_phase(self.state)? {
            let info = dom.describe(node).await.in_phase(self.state)?;
            let amount_type = matches!(info.input_type().as_deref(), Some("text") | Some("number"));
            if info.visible
                && amount_type
                && info.attr("disabled").is_none()
                && info.attr("readonly").is_none()
            {
                return Ok(Some(node));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::super::fixtures;
    use super::super::PhaseState;
    use super::*;
    use crate::catalog::DECREASE_CONCEPTS;
    use crate::values::ExternalValueSet;
    use action_locator::FieldMapping;
    use cdp_adapter::memory::{Document, DomEvent, El};
    use cdp_adapter::{DomPort, MemoryDom};
    use tokio_util::sync::CancellationToken;

    /// Capture dialog whose line editor appears on AGREGAR and whose saved
    /// lines land in `#<id>-lines`.
    pub(crate) fn capture_dialog(doc: &mut Document, id: &str, concepts: &[&str]) -> NodeId {
        let options: Vec<(&str, &str)> = concepts.iter().map(|c| (*c, *c)).collect();
        let dialog = doc.add(
            El::new("div")
                .attr("role", "dialog")
                .id(id)
                .hidden()
                .children([
                    El::button("AGREGAR").id(&format!("{id}-add")),
                    El::new("table").id(&format!("{id}-lines")),
                    El::new("div").id(&format!("{id}-editor")).hidden().children([
                        El::row([
                            El::new("span").text("Concepto"),
                            El::select(&format!("{id}-concept"), &options),
                        ]),
                        El::row([El::new("span").text("Importe"), El::input(&format!("{id}-amount"))]),
                        El::button("GUARDAR").id(&format!("{id}-save")),
                    ]),
                    El::button("CERRAR").id(&format!("{id}-close")),
                ]),
        );
        let ids = |suffix: &str| format!("{id}-{suffix}");
        let (add, editor, save, close, lines, concept, amount) = (
            doc.by_id(&ids("add")),
            doc.by_id(&ids("editor")),
            doc.by_id(&ids("save")),
            doc.by_id(&ids("close")),
            doc.by_id(&ids("lines")),
            doc.by_id(&ids("concept")),
            doc.by_id(&ids("amount")),
        );
        if let (Some(add), Some(editor)) = (add, editor) {
            doc.on_click(add, move |d| d.show(editor));
        }
        if let (Some(save), Some(editor), Some(lines), Some(concept), Some(amount)) =
            (save, editor, lines, concept, amount)
        {
            doc.on_click(save, move |d| {
                let line = format!(
                    "{} {}",
                    d.value_of(concept).unwrap_or_default(),
                    d.value_of(amount).unwrap_or_default()
                );
                d.append(lines, El::new("tr").child(El::new("td").class("line").text(&line)));
                d.set_value(amount, "");
                d.hide(editor);
            });
        }
        if let Some(close) = close {
            doc.on_click(close, move |d| d.hide(dialog));
        }
        dialog
    }

    pub(crate) async fn saved_lines(dom: &MemoryDom, id: &str) -> Vec<String> {
        let mut out = Vec::new();
        for node in dom.query(&Scope::Page, &format!("#{id}-lines td.line")).await.unwrap() {
            out.push(dom.describe(node).await.unwrap().text);
        }
        out
    }

    #[tokio::test]
    async fn adds_a_line_with_the_accepted_spelling() {
        let mut doc = Document::new("https://pstcdypisr.clouda.sat.gob.mx/");
        // The portal currently ships only the unaccented spelling.
        let dialog = capture_dialog(&mut doc, "dis", &[DECREASE_CONCEPTS[1]]);
        let opener = doc.add(El::button("CAPTURAR"));
        doc.on_click(opener, move |d| d.show(dialog));
        let dom = MemoryDom::new(doc);
        let mapping = FieldMapping::default();
        let values = ExternalValueSet::default();
        let creds = fixtures::credentials();
        let mut wizard = Wizard::new(
            fixtures::actions(&dom, &mapping, CancellationToken::new()),
            &values,
            &creds,
            fixtures::settings(),
        );
        wizard.advance(PhaseState::FillingIncomeSection).unwrap();

        let scope = wizard.open_dialog(opener, "Ingresos a disminuir").await.unwrap();
        assert_eq!(scope, Scope::Within(dialog));
        assert!(wizard
            .add_line(&scope, &DECREASE_CONCEPTS, 8.0)
            .await
            .unwrap());
        wizard.close_dialog(&scope).await.unwrap();

        assert_eq!(
            saved_lines(&dom, "dis").await,
            vec![format!("{} 8", DECREASE_CONCEPTS[1])]
        );
        assert!(!dom.describe(dialog).await.unwrap().visible);
        assert!(dom
            .events()
            .iter()
            .any(|e| matches!(e, DomEvent::Filled(_, v) if v == "8")));
    }

    #[tokio::test]
    async fn unknown_concept_skips_guardar() {
        let mut doc = Document::new("https://pstcdypisr.clouda.sat.gob.mx/");
        let dialog = capture_dialog(&mut doc, "tot", &["Actividad empresarial"]);
        doc.show(dialog);
        let dom = MemoryDom::new(doc);
        let mapping = FieldMapping::default();
        let values = ExternalValueSet::default();
        let creds = fixtures::credentials();
        let wizard = Wizard::new(
            fixtures::actions(&dom, &mapping, CancellationToken::new()),
            &values,
            &creds,
            fixtures::settings(),
        );

        let saved = wizard
            .add_line(&Scope::Within(dialog), &["Uso o goce temporal de bienes"], 400.0)
            .await
            .unwrap();
        assert!(!saved);
        assert!(saved_lines(&dom, "tot").await.is_empty());
    }
}
