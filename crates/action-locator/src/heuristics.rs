//! Structural heuristics that find a control from nearby label text.
//!
//! Proximity walk, in order, from a label node:
//! 1. controls in the cells following the label's `td`/`th`
//! 2. the label's table row
//! 3. the label's own cell
//! 4. the nearest ancestor (up to [`MAX_ANCESTOR_LEVELS`]) holding exactly one control
//! 5. the label's parent
//!
//! The first visible control of the requested kind wins.

use cdp_adapter::{text_matches, AdapterError, DomPort, NodeId, Scope};

use crate::types::ControlKind;

pub const MAX_ANCESTOR_LEVELS: usize = 6;

/// Ancestor levels searched for a row action button.
pub const MAX_ACTION_LEVELS: usize = 9;

/// Rows carrying this marker are yes/no questions, not the section row.
pub const QUESTION_ROW_MARKER: &str = "¿Tienes";

const LABEL_EXCLUDED_TAGS: &[&str] = &["option", "select", "script", "style", "head", "title"];

/// Text nodes matching `text`, in document order, excluding list options.
pub async fn label_candidates(
    dom: &dyn DomPort,
    scope: &Scope,
    text: &str,
) -> Result<Vec<NodeId>, AdapterError> {
    let mut out = Vec::new();
    for node in dom.find_text(scope, text, false).await? {
        let info = dom.describe(node).await?;
        if LABEL_EXCLUDED_TAGS.contains(&info.tag.as_str()) {
            continue;
        }
        if dom.closest(node, "select").await?.is_some() {
            continue;
        }
        out.push(node);
    }
    Ok(out)
}

async fn first_visible(
    dom: &dyn DomPort,
    scope: &Scope,
    kind: ControlKind,
) -> Result<Option<NodeId>, AdapterError> {
    for node in dom.query(scope, kind.css()).await? {
        let info = dom.describe(node).await?;
        if info.visible && kind.accepts(&info) {
            return Ok(Some(node));
        }
    }
    Ok(None)
}

async fn accepted_controls(
    dom: &dyn DomPort,
    scope: &Scope,
    kind: ControlKind,
) -> Result<Vec<(NodeId, bool)>, AdapterError> {
    let mut out = Vec::new();
    for node in dom.query(scope, kind.css()).await? {
        let info = dom.describe(node).await?;
        if kind.accepts(&info) {
            out.push((node, info.visible));
        }
    }
    Ok(out)
}

async fn self_or_closest(
    dom: &dyn DomPort,
    node: NodeId,
    tags: &[&str],
) -> Result<Option<NodeId>, AdapterError> {
    let info = dom.describe(node).await?;
    if tags.contains(&info.tag.as_str()) {
        return Ok(Some(node));
    }
    dom.closest(node, &tags.join(", ")).await
}

/// Walks outward from `label` looking for a control of `kind`.
pub async fn control_near_label(
    dom: &dyn DomPort,
    label: NodeId,
    kind: ControlKind,
) -> Result<Option<NodeId>, AdapterError> {
    let cell = self_or_closest(dom, label, &["td", "th"]).await?;

    if let Some(cell) = cell {
        for sibling in dom.following_siblings(cell).await? {
            if let Some(found) = first_visible(dom, &Scope::Within(sibling), kind).await? {
                return Ok(Some(found));
            }
        }
    }

    if let Some(row) = self_or_closest(dom, label, &["tr"]).await? {
        if let Some(found) = first_visible(dom, &Scope::Within(row), kind).await? {
            return Ok(Some(found));
        }
    }

    if let Some(cell) = cell {
        if let Some(found) = first_visible(dom, &Scope::Within(cell), kind).await? {
            return Ok(Some(found));
        }
    }

    let mut current = dom.parent(label).await?;
    for _ in 0..MAX_ANCESTOR_LEVELS {
        let Some(ancestor) = current else {
            break;
        };
        let controls = accepted_controls(dom, &Scope::Within(ancestor), kind).await?;
        if let [(only, visible)] = controls.as_slice() {
            if *visible {
                return Ok(Some(*only));
            }
        }
        if controls.len() > 1 {
            break;
        }
        current = dom.parent(ancestor).await?;
    }

    if let Some(parent) = dom.parent(label).await? {
        return first_visible(dom, &Scope::Within(parent), kind).await;
    }
    Ok(None)
}

/// Control named by the `for` attribute of a `<label>` whose text contains `text`.
pub async fn control_for_label(
    dom: &dyn DomPort,
    scope: &Scope,
    text: &str,
    kind: ControlKind,
) -> Result<Option<NodeId>, AdapterError> {
    for label in dom.query(scope, "label[for]").await? {
        let info = dom.describe(label).await?;
        if !text_matches(&info.text, text, false) {
            continue;
        }
        let Some(target) = info.attr("for").filter(|id| !id.is_empty() && !id.contains('\'')) else {
            continue;
        };
        for node in dom.query(scope, &format!("[id='{target}']")).await? {
            let control = dom.describe(node).await?;
            if control.visible && kind.accepts(&control) {
                return Ok(Some(node));
            }
        }
    }
    Ok(None)
}

async fn action_buttons(
    dom: &dyn DomPort,
    scope: &Scope,
    action: &str,
) -> Result<Vec<NodeId>, AdapterError> {
    let mut out = Vec::new();
    for node in dom.query(scope, "a, button").await? {
        let info = dom.describe(node).await?;
        if text_matches(info.label_text(), action, false) {
            out.push(node);
        }
    }
    Ok(out)
}

async fn row_matches(
    dom: &dyn DomPort,
    button: NodeId,
    row_label: &str,
) -> Result<bool, AdapterError> {
    let Some(row) = dom.closest(button, "tr").await? else {
        return Ok(false);
    };
    let text = dom.describe(row).await?.text;
    Ok(text_matches(&text, row_label, false) && !text.contains(QUESTION_ROW_MARKER))
}

/// Of all `action` buttons in scope, the visible one whose table row mentions
/// `row_label` and is not a question row.
pub async fn action_in_row(
    dom: &dyn DomPort,
    scope: &Scope,
    action: &str,
    row_label: &str,
) -> Result<Option<NodeId>, AdapterError> {
    for button in action_buttons(dom, scope, action).await? {
        if dom.describe(button).await?.visible && row_matches(dom, button, row_label).await? {
            return Ok(Some(button));
        }
    }
    Ok(None)
}

/// The `action` button belonging to `label`.
///
/// Climbs from the label; the first ancestor holding exactly one such button
/// decides. When an ancestor holds several, the one whose row mentions
/// `row_label` is taken.
pub async fn action_near_label(
    dom: &dyn DomPort,
    label: NodeId,
    action: &str,
    row_label: &str,
) -> Result<Option<NodeId>, AdapterError> {
    let mut current = dom.parent(label).await?;
    for _ in 0..MAX_ACTION_LEVELS {
        let Some(container) = current else {
            break;
        };
        let buttons = action_buttons(dom, &Scope::Within(container), action).await?;
        let picked = match buttons.as_slice() {
            [] => None,
            [only] => Some(*only),
            many => {
                let mut hit = None;
                for button in many {
                    if row_matches(dom, *button, row_label).await? {
                        hit = Some(*button);
                        break;
                    }
                }
                hit
            }
        };
        if let Some(button) = picked {
            if dom.describe(button).await?.visible {
                return Ok(Some(button));
            }
        }
        current = dom.parent(container).await?;
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_adapter::memory::{Document, El};
    use cdp_adapter::MemoryDom;

    async fn label(dom: &MemoryDom, text: &str) -> NodeId {
        *label_candidates(dom, &Scope::Page, text)
            .await
            .unwrap()
            .last()
            .expect("label present")
    }

    async fn id_of(dom: &MemoryDom, node: Option<NodeId>) -> Option<String> {
        match node {
            Some(node) => dom.describe(node).await.unwrap().attr("id").map(str::to_string),
            None => None,
        }
    }

    #[tokio::test]
    async fn next_cell_beats_same_row() {
        let mut doc = Document::default();
        doc.add(El::new("table").child(El::row([
            El::input("left"),
            El::new("span").text("Ingresos"),
            El::input("right"),
        ])));
        let dom = MemoryDom::new(doc);
        let label = label(&dom, "Ingresos").await;
        let found = control_near_label(&dom, label, ControlKind::Input).await.unwrap();
        assert_eq!(id_of(&dom, found).await.as_deref(), Some("right"));
    }

    #[tokio::test]
    async fn falls_back_to_row_then_cell() {
        let mut doc = Document::default();
        doc.add(El::new("table").child(El::row([
            El::input("before"),
            El::new("span").text("Periodo"),
        ])));
        doc.add(El::new("table").child(El::row([El::new("div").children([
            El::new("span").text("Ejercicio"),
            El::select("ej", &[("2025", "2025")]),
        ])])));
        let dom = MemoryDom::new(doc);

        let periodo = label(&dom, "Periodo").await;
        let found = control_near_label(&dom, periodo, ControlKind::Input).await.unwrap();
        assert_eq!(id_of(&dom, found).await.as_deref(), Some("before"));

        let ejercicio = label(&dom, "Ejercicio").await;
        let found = control_near_label(&dom, ejercicio, ControlKind::Select).await.unwrap();
        assert_eq!(id_of(&dom, found).await.as_deref(), Some("ej"));
    }

    #[tokio::test]
    async fn ancestor_with_single_control_outside_tables() {
        let mut doc = Document::default();
        doc.add(El::new("div").children([
            El::new("div").child(El::new("p").child(El::new("b").text("Contraseña"))),
            El::new("div").child(El::new("input").id("pwd").attr("type", "password")),
            El::new("input").attr("type", "hidden").attr("name", "token"),
        ]));
        let dom = MemoryDom::new(doc);
        let label = label(&dom, "Contraseña").await;
        let found = control_near_label(&dom, label, ControlKind::Input).await.unwrap();
        assert_eq!(id_of(&dom, found).await.as_deref(), Some("pwd"));
    }

    #[tokio::test]
    async fn hidden_controls_are_skipped() {
        let mut doc = Document::default();
        doc.add(El::new("table").child(El::row([
            El::new("span").text("Monto"),
            El::input("ghost").hidden(),
        ])));
        let dom = MemoryDom::new(doc);
        let label = label(&dom, "Monto").await;
        assert_eq!(control_near_label(&dom, label, ControlKind::Input).await.unwrap(), None);
    }

    #[tokio::test]
    async fn label_for_attribute() {
        let mut doc = Document::default();
        doc.add(El::label_for("mes", "Periodo"));
        doc.add(El::select("mes", &[("1", "Enero")]));
        doc.add(El::label_for("nope", "Periodo fiscal"));
        let dom = MemoryDom::new(doc);
        let found = control_for_label(&dom, &Scope::Page, "periodo", ControlKind::Any)
            .await
            .unwrap();
        assert_eq!(id_of(&dom, found).await.as_deref(), Some("mes"));
    }

    fn capturar_table() -> Document {
        let mut doc = Document::default();
        doc.add(El::new("table").id("tab").children([
            El::row([
                El::new("span").text("Descuentos, devoluciones y bonificaciones"),
                El::new("a").id("cap-desc").text("CAPTURAR"),
            ]),
            El::row([
                El::new("span").text("¿Tienes ingresos a disminuir?"),
                El::new("a").id("cap-question").text("CAPTURAR"),
            ]),
            El::row([
                El::new("span").text("*Ingresos a disminuir"),
                El::new("a").id("cap-dism").text("CAPTURAR"),
            ]),
        ]));
        doc
    }

    #[tokio::test]
    async fn row_action_excludes_question_rows() {
        let dom = MemoryDom::new(capturar_table());
        let found = action_in_row(&dom, &Scope::Page, "CAPTURAR", "Ingresos a disminuir")
            .await
            .unwrap();
        assert_eq!(id_of(&dom, found).await.as_deref(), Some("cap-dism"));
    }

    #[tokio::test]
    async fn action_near_label_prefers_own_row() {
        let dom = MemoryDom::new(capturar_table());
        let label = label(&dom, "Descuentos").await;
        let found = action_near_label(&dom, label, "capturar", "Descuentos")
            .await
            .unwrap();
        assert_eq!(id_of(&dom, found).await.as_deref(), Some("cap-desc"));
    }
}
