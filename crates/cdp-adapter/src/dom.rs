//! DOM capability surface consumed by the locator and the action primitives.
//!
//! Both the Chromium-backed [`crate::page::CdpPage`] and the in-memory
//! [`crate::memory::MemoryDom`] implement [`DomPort`], so every heuristic above
//! this crate runs unchanged against a live portal or a scripted fixture.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AdapterError;

/// Opaque handle to an element observed through a [`DomPort`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Query root. `Within` an iframe element descends into its document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Scope {
    #[default]
    Page,
    Within(NodeId),
}

/// Snapshot of one element at the time it was described.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: Option<NodeId>,
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    /// Live `value` property for form controls.
    pub value: Option<String>,
    /// Rendered text of the element and its descendants, whitespace-collapsed.
    pub text: String,
    pub visible: bool,
}

impl NodeInfo {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn input_type(&self) -> Option<String> {
        if self.tag != "input" {
            return None;
        }
        Some(
            self.attr("type")
                .map(|t| t.to_ascii_lowercase())
                .unwrap_or_else(|| "text".to_string()),
        )
    }

    /// Form controls a value can be written into.
    pub fn is_form_control(&self) -> bool {
        matches!(self.tag.as_str(), "select" | "textarea")
            || self
                .input_type()
                .map(|t| !matches!(t.as_str(), "hidden" | "submit" | "button" | "reset" | "image"))
                .unwrap_or(false)
    }

    pub fn is_clickable(&self) -> bool {
        matches!(self.tag.as_str(), "button" | "a" | "option" | "label")
            || self.attr("role").map(|r| r == "button" || r == "option").unwrap_or(false)
            || self
                .input_type()
                .map(|t| matches!(t.as_str(), "submit" | "button" | "checkbox" | "radio"))
                .unwrap_or(false)
    }

    /// Visible text for buttons rendered as `<input value="...">`.
    pub fn label_text(&self) -> &str {
        if self.text.is_empty() {
            self.attr("value").unwrap_or_default()
        } else {
            &self.text
        }
    }
}

/// One `<option>` of a native list control.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionChoice {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

/// How a list control option is picked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectBy {
    Value(String),
    Label(String),
    /// Case-insensitive substring of the option label.
    LabelContains(String),
}

impl SelectBy {
    pub fn matches(&self, option: &OptionChoice) -> bool {
        match self {
            SelectBy::Value(v) => option.value == *v,
            SelectBy::Label(l) => option.label.trim() == l.trim(),
            SelectBy::LabelContains(needle) => option
                .label
                .to_lowercase()
                .contains(&needle.trim().to_lowercase()),
        }
    }
}

/// Parsed form of the selector strings accepted by [`DomPort::query`].
///
/// * `text=foo` / `text="foo"`: elements whose text contains / equals `foo`
/// * `button=foo` / `button="foo"`: buttons, links and submit inputs by text
/// * anything else is a CSS selector
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryKind {
    Css(String),
    Text { needle: String, exact: bool },
    Button { needle: String, exact: bool },
}

impl QueryKind {
    pub fn parse(selector: &str) -> Self {
        let selector = selector.trim();
        if let Some(rest) = selector.strip_prefix("text=") {
            let (needle, exact) = unquote(rest);
            return QueryKind::Text { needle, exact };
        }
        if let Some(rest) = selector.strip_prefix("button=") {
            let (needle, exact) = unquote(rest);
            return QueryKind::Button { needle, exact };
        }
        QueryKind::Css(selector.to_string())
    }
}

fn unquote(raw: &str) -> (String, bool) {
    let raw = raw.trim();
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        (raw[1..raw.len() - 1].to_string(), true)
    } else {
        (raw.to_string(), false)
    }
}

/// Case-insensitive text comparison shared by both port implementations.
pub fn text_matches(haystack: &str, needle: &str, exact: bool) -> bool {
    let haystack = haystack.trim().to_lowercase();
    let needle = needle.trim().to_lowercase();
    if exact {
        haystack == needle
    } else {
        haystack.contains(&needle)
    }
}

/// Minimal browser capability surface driven by the declaration engine.
///
/// Returned [`NodeId`]s stay valid until the page navigates. Describing or
/// acting on a stale handle yields a `TargetNotFound` error.
#[async_trait]
pub trait DomPort: Send + Sync {
    async fn navigate(&self, url: &str, deadline: Duration) -> Result<(), AdapterError>;
    async fn current_url(&self) -> Result<String, AdapterError>;
    async fn body_text(&self) -> Result<String, AdapterError>;
    /// HTTP status of the main document, when the browser exposes it.
    async fn last_status(&self) -> Result<Option<u16>, AdapterError>;

    /// Elements in document order matching `selector` (see [`QueryKind`]).
    async fn query(&self, scope: &Scope, selector: &str) -> Result<Vec<NodeId>, AdapterError>;
    /// Innermost elements whose text matches `needle`.
    async fn find_text(
        &self,
        scope: &Scope,
        needle: &str,
        exact: bool,
    ) -> Result<Vec<NodeId>, AdapterError>;
    async fn describe(&self, node: NodeId) -> Result<NodeInfo, AdapterError>;
    async fn parent(&self, node: NodeId) -> Result<Option<NodeId>, AdapterError>;
    /// Nearest ancestor (excluding `node`) matching a CSS selector.
    async fn closest(&self, node: NodeId, selector: &str) -> Result<Option<NodeId>, AdapterError>;
    async fn following_siblings(&self, node: NodeId) -> Result<Vec<NodeId>, AdapterError>;

    async fn options(&self, node: NodeId) -> Result<Vec<OptionChoice>, AdapterError>;
    /// Picks an option on a native list control. `Ok(false)` if nothing matched.
    async fn select(&self, node: NodeId, by: &SelectBy) -> Result<bool, AdapterError>;
    async fn click(&self, node: NodeId) -> Result<(), AdapterError>;
    /// Replaces the full contents of a text control.
    async fn fill(&self, node: NodeId, text: &str) -> Result<(), AdapterError>;
    async fn set_files(&self, node: NodeId, files: &[PathBuf]) -> Result<(), AdapterError>;

    /// Releases the page and the browser behind it.
    async fn close(&self) -> Result<(), AdapterError>;
}
