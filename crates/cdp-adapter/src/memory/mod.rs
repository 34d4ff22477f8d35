//! Scripted in-memory page implementing [`DomPort`].
//!
//! Fixtures build a [`Document`] from [`El`] trees and attach click or
//! navigation hooks that mutate it, standing in for portal-side behaviour
//! such as popups appearing after a selection.

mod document;
mod selector;

pub use document::{ClickHook, Document, DomEvent, El, NavigateHook};
pub use selector::SelectorList;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

use crate::dom::{DomPort, NodeId, NodeInfo, OptionChoice, QueryKind, Scope, SelectBy};
use crate::error::{AdapterError, AdapterErrorKind};

#[derive(Clone, Default)]
pub struct MemoryDom {
    doc: Arc<Mutex<Document>>,
}

impl MemoryDom {
    pub fn new(doc: Document) -> Self {
        Self {
            doc: Arc::new(Mutex::new(doc)),
        }
    }

    /// Runs `f` against the live document, e.g. to assert or reshape a fixture.
    pub fn with_doc<R>(&self, f: impl FnOnce(&mut Document) -> R) -> R {
        let mut doc = self.doc.lock();
        f(&mut doc)
    }

    pub fn events(&self) -> Vec<crate::memory::DomEvent> {
        self.doc.lock().events().to_vec()
    }

    pub fn is_closed(&self) -> bool {
        self.doc.lock().closed
    }

    fn guard(doc: &Document) -> Result<(), AdapterError> {
        if doc.closed {
            Err(AdapterError::new(AdapterErrorKind::CdpIo).with_hint("page closed"))
        } else {
            Ok(())
        }
    }

    fn root(doc: &Document, scope: &Scope) -> Result<NodeId, AdapterError> {
        match scope {
            Scope::Page => Ok(doc.body()),
            Scope::Within(node) if doc.exists(*node) => Ok(*node),
            Scope::Within(node) => Err(stale(*node)),
        }
    }

    fn live(doc: &Document, node: NodeId) -> Result<(), AdapterError> {
        if doc.exists(node) {
            Ok(())
        } else {
            Err(stale(node))
        }
    }
}

fn stale(node: NodeId) -> AdapterError {
    AdapterError::not_found(format!("node {} is no longer attached", node.0))
}

#[async_trait]
impl DomPort for MemoryDom {
    async fn navigate(&self, url: &str, _deadline: Duration) -> Result<(), AdapterError> {
        let mut doc = self.doc.lock();
        Self::guard(&doc)?;
        trace!(url, "memory navigate");
        doc.record(DomEvent::Navigated(url.to_string()));
        doc.run_navigate_hook(url);
        Ok(())
    }

    async fn current_url(&self) -> Result<String, AdapterError> {
        let doc = self.doc.lock();
        Self::guard(&doc)?;
        Ok(doc.url.clone())
    }

    async fn body_text(&self) -> Result<String, AdapterError> {
        let doc = self.doc.lock();
        Self::guard(&doc)?;
        Ok(doc.text_of(doc.body()))
    }

    async fn last_status(&self) -> Result<Option<u16>, AdapterError> {
        let doc = self.doc.lock();
        Self::guard(&doc)?;
        Ok(doc.status)
    }

    async fn query(&self, scope: &Scope, selector: &str) -> Result<Vec<NodeId>, AdapterError> {
        let doc = self.doc.lock();
        Self::guard(&doc)?;
        let root = Self::root(&doc, scope)?;
        let nodes = match QueryKind::parse(selector) {
            QueryKind::Css(css) => match SelectorList::parse(&css) {
                Ok(list) => doc
                    .descendants(root)
                    .into_iter()
                    .filter(|n| doc.matches_list(*n, &list))
                    .collect(),
                Err(reason) => {
                    trace!(selector = %css, %reason, "selector rejected");
                    Vec::new()
                }
            },
            QueryKind::Text { needle, exact } => doc.find_text(root, &needle, exact),
            QueryKind::Button { needle, exact } => doc
                .descendants(root)
                .into_iter()
                .filter(|n| doc.is_button(*n))
                .filter(|n| {
                    doc.describe(*n)
                        .map(|info| crate::dom::text_matches(info.label_text(), &needle, exact))
                        .unwrap_or(false)
                })
                .collect(),
        };
        Ok(nodes)
    }

    async fn find_text(
        &self,
        scope: &Scope,
        needle: &str,
        exact: bool,
    ) -> Result<Vec<NodeId>, AdapterError> {
        let doc = self.doc.lock();
        Self::guard(&doc)?;
        let root = Self::root(&doc, scope)?;
        Ok(doc.find_text(root, needle, exact))
    }

    async fn describe(&self, node: NodeId) -> Result<NodeInfo, AdapterError> {
        let doc = self.doc.lock();
        Self::guard(&doc)?;
        doc.describe(node).ok_or_else(|| stale(node))
    }

    async fn parent(&self, node: NodeId) -> Result<Option<NodeId>, AdapterError> {
        let doc = self.doc.lock();
        Self::guard(&doc)?;
        Self::live(&doc, node)?;
        Ok(doc.parent_of(node))
    }

    async fn closest(&self, node: NodeId, selector: &str) -> Result<Option<NodeId>, AdapterError> {
        let doc = self.doc.lock();
        Self::guard(&doc)?;
        Self::live(&doc, node)?;
        let Ok(list) = SelectorList::parse(selector) else {
            return Ok(None);
        };
        let mut current = doc.parent_of(node);
        while let Some(ancestor) = current {
            if doc.matches_list(ancestor, &list) {
                return Ok(Some(ancestor));
            }
            current = doc.parent_of(ancestor);
        }
        Ok(None)
    }

    async fn following_siblings(&self, node: NodeId) -> Result<Vec<NodeId>, AdapterError> {
        let doc = self.doc.lock();
        Self::guard(&doc)?;
        Self::live(&doc, node)?;
        let Some(parent) = doc.parent_of(node) else {
            return Ok(Vec::new());
        };
        let siblings = doc
            .node(parent)
            .map(|p| p.children.clone())
            .unwrap_or_default();
        Ok(siblings
            .into_iter()
            .skip_while(|s| *s != node)
            .skip(1)
            .filter(|s| doc.exists(*s))
            .collect())
    }

    async fn options(&self, node: NodeId) -> Result<Vec<OptionChoice>, AdapterError> {
        let doc = self.doc.lock();
        Self::guard(&doc)?;
        Self::live(&doc, node)?;
        Ok(doc.options_of(node))
    }

    async fn select(&self, node: NodeId, by: &SelectBy) -> Result<bool, AdapterError> {
        let mut doc = self.doc.lock();
        Self::guard(&doc)?;
        Self::live(&doc, node)?;
        let Some(choice) = doc.options_of(node).into_iter().find(|o| by.matches(o)) else {
            return Ok(false);
        };
        doc.set_value(node, &choice.value);
        doc.record(DomEvent::Selected(node, choice.value));
        Ok(true)
    }

    async fn click(&self, node: NodeId) -> Result<(), AdapterError> {
        let mut doc = self.doc.lock();
        Self::guard(&doc)?;
        Self::live(&doc, node)?;
        if !doc.is_visible(node) {
            return Err(AdapterError::not_found("element is not visible"));
        }
        let option_parent = doc
            .describe(node)
            .filter(|info| info.tag == "option")
            .and_then(|info| doc.parent_of(node).map(|p| (p, info)));
        if let Some((select, info)) = option_parent {
            let value = info.attr("value").map(str::to_string).unwrap_or(info.text);
            doc.set_value(select, &value);
            doc.record(DomEvent::Selected(select, value));
        }
        doc.record(DomEvent::Clicked(node));
        doc.run_click_hooks(node);
        Ok(())
    }

    async fn fill(&self, node: NodeId, text: &str) -> Result<(), AdapterError> {
        let mut doc = self.doc.lock();
        Self::guard(&doc)?;
        Self::live(&doc, node)?;
        doc.set_value(node, text);
        doc.record(DomEvent::Filled(node, text.to_string()));
        Ok(())
    }

    async fn set_files(&self, node: NodeId, files: &[PathBuf]) -> Result<(), AdapterError> {
        let mut doc = self.doc.lock();
        Self::guard(&doc)?;
        Self::live(&doc, node)?;
        let names: Vec<String> = files
            .iter()
            .filter_map(|f| f.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        doc.set_value(node, &names.join(", "));
        doc.record(DomEvent::FilesSet(node, files.to_vec()));
        Ok(())
    }

    async fn close(&self) -> Result<(), AdapterError> {
        self.doc.lock().closed = true;
        Ok(())
    }
}
