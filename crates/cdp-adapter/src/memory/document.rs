use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use super::selector::{Combinator, Complex, Compound, SelectorList};
use crate::dom::{text_matches, NodeId, NodeInfo, OptionChoice};

/// Side effects observed on the in-memory document, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum DomEvent {
    Navigated(String),
    Clicked(NodeId),
    Filled(NodeId, String),
    Selected(NodeId, String),
    FilesSet(NodeId, Vec<PathBuf>),
}

pub type ClickHook = Box<dyn FnMut(&mut Document) + Send>;
pub type NavigateHook = Box<dyn FnMut(&mut Document, &str) + Send>;

#[derive(Clone, Debug, Default)]
pub(crate) struct Element {
    pub(crate) tag: String,
    pub(crate) attrs: BTreeMap<String, String>,
    pub(crate) text: String,
    pub(crate) value: Option<String>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) hidden: bool,
    pub(crate) detached: bool,
}

/// Declarative element description used to build fixtures.
#[derive(Clone, Debug, Default)]
pub struct El {
    tag: String,
    attrs: BTreeMap<String, String>,
    text: String,
    value: Option<String>,
    hidden: bool,
    children: Vec<El>,
}

impl El {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            ..Self::default()
        }
    }

    pub fn id(self, id: &str) -> Self {
        self.attr("id", id)
    }

    pub fn class(self, class: &str) -> Self {
        self.attr("class", class)
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn child(mut self, child: El) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = El>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn button(text: &str) -> Self {
        El::new("button").text(text)
    }

    pub fn input(id: &str) -> Self {
        El::new("input").id(id).attr("type", "text")
    }

    pub fn label_for(target: &str, text: &str) -> Self {
        El::new("label").attr("for", target).text(text)
    }

    /// `<select>` with `(value, label)` options.
    pub fn select(id: &str, options: &[(&str, &str)]) -> Self {
        El::new("select").id(id).children(
            options
                .iter()
                .map(|(value, label)| El::new("option").attr("value", value).text(label)),
        )
    }

    /// `<tr>` whose cells are given in order.
    pub fn row(cells: impl IntoIterator<Item = El>) -> Self {
        El::new("tr").children(cells.into_iter().map(|cell| El::new("td").child(cell)))
    }
}

/// Mutable in-memory page. Fixture hooks receive it on click and navigation.
pub struct Document {
    nodes: Vec<Element>,
    pub url: String,
    pub status: Option<u16>,
    pub(crate) closed: bool,
    events: Vec<DomEvent>,
    click_hooks: HashMap<NodeId, Vec<ClickHook>>,
    navigate_hook: Option<NavigateHook>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new("about:blank")
    }
}

impl Document {
    pub fn new(url: &str) -> Self {
        Self {
            nodes: vec![Element {
                tag: "body".to_string(),
                ..Element::default()
            }],
            url: url.to_string(),
            status: Some(200),
            closed: false,
            events: Vec::new(),
            click_hooks: HashMap::new(),
            navigate_hook: None,
        }
    }

    pub fn body(&self) -> NodeId {
        NodeId(0)
    }

    /// Appends `el` (and its subtree) under `parent`, returning the new node.
    pub fn append(&mut self, parent: NodeId, el: El) -> NodeId {
        let id = NodeId(self.nodes.len() as u64);
        let default_value = if el.tag == "select" {
            el.children
                .iter()
                .find(|c| c.tag == "option")
                .map(|c| c.attrs.get("value").cloned().unwrap_or_else(|| c.text.clone()))
        } else if matches!(el.tag.as_str(), "input" | "textarea") {
            Some(el.attrs.get("value").cloned().unwrap_or_default())
        } else {
            None
        };
        self.nodes.push(Element {
            tag: el.tag,
            attrs: el.attrs,
            text: el.text,
            value: el.value.or(default_value),
            children: Vec::new(),
            parent: Some(parent),
            hidden: el.hidden,
            detached: false,
        });
        if let Some(p) = self.nodes.get_mut(parent.0 as usize) {
            p.children.push(id);
        }
        for child in el.children {
            self.append(id, child);
        }
        id
    }

    /// Appends under `<body>`.
    pub fn add(&mut self, el: El) -> NodeId {
        self.append(self.body(), el)
    }

    pub fn by_id(&self, id: &str) -> Option<NodeId> {
        self.ids()
            .find(|n| self.node(*n).and_then(|e| e.attrs.get("id")).map(String::as_str) == Some(id))
    }

    pub fn show(&mut self, node: NodeId) {
        if let Some(el) = self.node_mut(node) {
            el.hidden = false;
        }
    }

    pub fn hide(&mut self, node: NodeId) {
        if let Some(el) = self.node_mut(node) {
            el.hidden = true;
        }
    }

    /// Detaches a subtree; existing handles into it become stale.
    pub fn remove(&mut self, node: NodeId) {
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if let Some(el) = self.node_mut(current) {
                el.detached = true;
                stack.extend(el.children.iter().copied());
            }
        }
    }

    pub fn set_text(&mut self, node: NodeId, text: &str) {
        if let Some(el) = self.node_mut(node) {
            el.text = text.to_string();
        }
    }

    pub fn set_value(&mut self, node: NodeId, value: &str) {
        if let Some(el) = self.node_mut(node) {
            el.value = Some(value.to_string());
        }
    }

    pub fn value_of(&self, node: NodeId) -> Option<String> {
        self.node(node).and_then(|el| el.value.clone())
    }

    pub fn on_click(&mut self, node: NodeId, hook: impl FnMut(&mut Document) + Send + 'static) {
        self.click_hooks.entry(node).or_default().push(Box::new(hook));
    }

    pub fn on_navigate(&mut self, hook: impl FnMut(&mut Document, &str) + Send + 'static) {
        self.navigate_hook = Some(Box::new(hook));
    }

    pub fn events(&self) -> &[DomEvent] {
        &self.events
    }

    pub(crate) fn record(&mut self, event: DomEvent) {
        self.events.push(event);
    }

    pub(crate) fn run_click_hooks(&mut self, node: NodeId) {
        if let Some(mut hooks) = self.click_hooks.remove(&node) {
            for hook in hooks.iter_mut() {
                hook(self);
            }
            let added = self.click_hooks.remove(&node);
            hooks.extend(added.into_iter().flatten());
            self.click_hooks.insert(node, hooks);
        }
    }

    pub(crate) fn run_navigate_hook(&mut self, url: &str) {
        self.url = url.to_string();
        if let Some(mut hook) = self.navigate_hook.take() {
            hook(self, url);
            if self.navigate_hook.is_none() {
                self.navigate_hook = Some(hook);
            }
        }
    }

    pub(crate) fn node(&self, node: NodeId) -> Option<&Element> {
        self.nodes.get(node.0 as usize).filter(|el| !el.detached)
    }

    fn node_mut(&mut self, node: NodeId) -> Option<&mut Element> {
        self.nodes.get_mut(node.0 as usize).filter(|el| !el.detached)
    }

    pub(crate) fn exists(&self, node: NodeId) -> bool {
        self.node(node).is_some()
    }

    fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.pre_order(self.body())
    }

    /// `root` and its attached descendants in document order.
    pub(crate) fn pre_order(&self, root: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut stack = vec![root];
        std::iter::from_fn(move || {
            while let Some(current) = stack.pop() {
                if let Some(el) = self.node(current) {
                    stack.extend(el.children.iter().rev().copied());
                    return Some(current);
                }
            }
            None
        })
    }

    pub(crate) fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        self.pre_order(root).skip(1).collect()
    }

    pub(crate) fn parent_of(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).and_then(|el| el.parent)
    }

    pub(crate) fn is_visible(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            match self.node(id) {
                Some(el) if !el.hidden => current = el.parent,
                _ => return false,
            }
        }
        true
    }

    /// Rendered text; hidden descendants do not contribute.
    pub fn text_of(&self, node: NodeId) -> String {
        let mut parts = Vec::new();
        self.collect_text(node, true, &mut parts);
        parts.join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn collect_text(&self, node: NodeId, is_root: bool, out: &mut Vec<String>) {
        let Some(el) = self.node(node) else {
            return;
        };
        if el.hidden && !is_root {
            return;
        }
        if matches!(el.tag.as_str(), "select" | "input" | "textarea") {
            if el.tag == "select" {
                out.push(self.select_label(node).unwrap_or_default());
            }
            return;
        }
        if !el.text.is_empty() {
            out.push(el.text.clone());
        }
        for child in &el.children {
            self.collect_text(*child, false, out);
        }
    }

    fn select_label(&self, node: NodeId) -> Option<String> {
        self.options_of(node)
            .into_iter()
            .find(|o| o.selected)
            .map(|o| o.label)
    }

    pub(crate) fn options_of(&self, node: NodeId) -> Vec<OptionChoice> {
        let Some(el) = self.node(node) else {
            return Vec::new();
        };
        let current = el.value.clone();
        el.children
            .iter()
            .filter_map(|child| self.node(*child).map(|c| (*child, c)))
            .filter(|(_, c)| c.tag == "option")
            .map(|(id, c)| {
                let value = c.attrs.get("value").cloned().unwrap_or_else(|| self.text_of(id));
                OptionChoice {
                    selected: current.as_deref() == Some(value.as_str()),
                    label: self.text_of(id),
                    value,
                }
            })
            .collect()
    }

    pub(crate) fn describe(&self, node: NodeId) -> Option<NodeInfo> {
        let el = self.node(node)?;
        Some(NodeInfo {
            id: Some(node),
            tag: el.tag.clone(),
            attrs: el.attrs.clone(),
            value: el.value.clone(),
            text: self.text_of(node),
            visible: self.is_visible(node),
        })
    }

    pub(crate) fn matches_list(&self, node: NodeId, list: &SelectorList) -> bool {
        list.0.iter().any(|complex| self.matches_complex(node, complex))
    }

    fn matches_complex(&self, node: NodeId, complex: &Complex) -> bool {
        self.matches_from(node, &complex.parts, complex.parts.len() - 1)
    }

    fn matches_from(&self, node: NodeId, parts: &[(Combinator, Compound)], idx: usize) -> bool {
        let (combinator, compound) = &parts[idx];
        if !self.matches_compound(node, compound) {
            return false;
        }
        if idx == 0 {
            return true;
        }
        match combinator {
            Combinator::Child => self
                .parent_of(node)
                .map(|p| self.matches_from(p, parts, idx - 1))
                .unwrap_or(false),
            Combinator::Descendant => {
                let mut current = self.parent_of(node);
                while let Some(ancestor) = current {
                    if self.matches_from(ancestor, parts, idx - 1) {
                        return true;
                    }
                    current = self.parent_of(ancestor);
                }
                false
            }
        }
    }

    fn matches_compound(&self, node: NodeId, compound: &Compound) -> bool {
        let Some(el) = self.node(node) else {
            return false;
        };
        if let Some(tag) = &compound.tag {
            if *tag != el.tag {
                return false;
            }
        }
        let attr = |name: &str| el.attrs.get(name).map(String::as_str);
        if compound.ids.iter().any(|id| attr("id") != Some(id.as_str())) {
            return false;
        }
        let classes: Vec<&str> = attr("class").unwrap_or_default().split_whitespace().collect();
        if compound.classes.iter().any(|c| !classes.contains(&c.as_str())) {
            return false;
        }
        if compound.attrs.iter().any(|test| !test.matches(attr(&test.name))) {
            return false;
        }
        compound.has.iter().all(|inner| {
            self.descendants(node)
                .into_iter()
                .any(|d| self.matches_list(d, inner))
        })
    }

    /// Innermost elements under `root` whose rendered text matches.
    pub(crate) fn find_text(&self, root: NodeId, needle: &str, exact: bool) -> Vec<NodeId> {
        let hits: Vec<NodeId> = self
            .pre_order(root)
            .filter(|n| text_matches(&self.text_of(*n), needle, exact))
            .collect();
        hits.iter()
            .copied()
            .filter(|candidate| {
                !hits
                    .iter()
                    .any(|other| other != candidate && self.is_ancestor(*candidate, *other))
            })
            .collect()
    }

    pub(crate) fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = self.parent_of(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent_of(id);
        }
        false
    }

    pub(crate) fn is_button(&self, node: NodeId) -> bool {
        self.describe(node)
            .map(|info| {
                matches!(info.tag.as_str(), "button" | "a")
                    || info.attr("role") == Some("button")
                    || matches!(info.input_type().as_deref(), Some("submit") | Some("button"))
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Document {
        let mut doc = Document::default();
        doc.add(
            El::new("table").id("grid").child(
                El::row([
                    El::new("span").text("Ejercicio"),
                    El::select("ej", &[("2024", "2024"), ("2025", "2025")]),
                ])
                .class("row first"),
            ),
        );
        doc.add(El::new("div").hidden().child(El::button("Fantasma")));
        doc
    }

    fn query(doc: &Document, sel: &str) -> Vec<NodeId> {
        let list = SelectorList::parse(sel).expect("selector");
        doc.pre_order(doc.body())
            .filter(|n| doc.matches_list(*n, &list))
            .collect()
    }

    #[test]
    fn select_defaults_to_first_option() {
        let doc = fixture();
        let select = doc.by_id("ej").expect("select");
        assert_eq!(doc.value_of(select).as_deref(), Some("2024"));
        assert_eq!(doc.options_of(select).len(), 2);
    }

    #[test]
    fn matches_descendant_child_and_has() {
        let doc = fixture();
        assert_eq!(query(&doc, "#grid tr.first > td > select").len(), 1);
        assert_eq!(query(&doc, "tr:has(select)").len(), 1);
        assert!(query(&doc, "table > select").is_empty());
        assert_eq!(query(&doc, "select[id^='e'], span").len(), 2);
    }

    #[test]
    fn innermost_text_match_and_visibility() {
        let doc = fixture();
        let hits = doc.find_text(doc.body(), "ejercicio", false);
        assert_eq!(hits.len(), 1);
        assert_eq!(doc.describe(hits[0]).map(|i| i.tag), Some("span".to_string()));
        let ghost = doc.find_text(doc.body(), "Fantasma", true);
        assert_eq!(ghost.len(), 1);
        assert!(!doc.is_visible(ghost[0]));
    }

    #[test]
    fn removed_nodes_become_stale() {
        let mut doc = fixture();
        let grid = doc.by_id("grid").expect("grid");
        doc.remove(grid);
        assert!(doc.by_id("ej").is_none());
        assert!(!doc.exists(grid));
    }
}
