//! Core types for locator system

use cdp_adapter::{NodeId, NodeInfo};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::LocatorError;

/// One way of turning a logical field key into a control.
///
/// Mapping strings parse into these:
/// - `label=<text>`: [`LabelIndirection`](Self::LabelIndirection) then
///   [`LabelProximity`](Self::LabelProximity)
/// - `position=<container>|<selector>|<index>`: [`PositionalFallback`](Self::PositionalFallback)
/// - anything else: [`DirectSelector`](Self::DirectSelector)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectorStrategy {
    /// CSS, `text=<t>` or `button=<t>`, interpreted by the DOM port
    DirectSelector(String),

    /// Control found by walking outward from a text node matching the label
    LabelProximity(String),

    /// Control named by the `for` attribute of a matching `<label>`
    LabelIndirection(String),

    /// The `index`-th match of `selector` inside the first `container` match
    PositionalFallback {
        container: String,
        selector: String,
        index: usize,
    },
}

impl SelectorStrategy {
    /// Parse one mapping string into the strategies it stands for.
    pub fn parse(key: &str, raw: &str) -> Result<Vec<Self>, LocatorError> {
        let raw = raw.trim();
        let invalid = |reason: &str| LocatorError::InvalidStrategy {
            key: key.to_string(),
            reason: format!("{reason} in '{raw}'"),
        };

        if let Some(label) = raw.strip_prefix("label=") {
            let label = label.trim();
            if label.is_empty() {
                return Err(invalid("empty label"));
            }
            return Ok(vec![
                SelectorStrategy::LabelIndirection(label.to_string()),
                SelectorStrategy::LabelProximity(label.to_string()),
            ]);
        }

        if let Some(rest) = raw.strip_prefix("position=") {
            let parts: Vec<&str> = rest.split('|').map(str::trim).collect();
            let [container, selector, index] = parts.as_slice() else {
                return Err(invalid("expected container|selector|index"));
            };
            if container.is_empty() {
                return Err(invalid("positional fallback without container"));
            }
            if selector.is_empty() {
                return Err(invalid("positional fallback without selector"));
            }
            let index = index
                .parse::<usize>()
                .map_err(|_| invalid("non-numeric index"))?;
            return Ok(vec![SelectorStrategy::PositionalFallback {
                container: container.to_string(),
                selector: selector.to_string(),
                index,
            }]);
        }

        if raw.is_empty() {
            return Err(invalid("empty selector"));
        }
        Ok(vec![SelectorStrategy::DirectSelector(raw.to_string())])
    }

    /// Get strategy name as string
    pub fn name(&self) -> &'static str {
        match self {
            SelectorStrategy::DirectSelector(_) => "direct",
            SelectorStrategy::LabelProximity(_) => "label-proximity",
            SelectorStrategy::LabelIndirection(_) => "label-for",
            SelectorStrategy::PositionalFallback { .. } => "position",
        }
    }
}

/// Kind of control a label heuristic is looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ControlKind {
    #[default]
    Any,
    Input,
    Select,
    TextArea,
}

impl ControlKind {
    pub fn css(&self) -> &'static str {
        match self {
            ControlKind::Any => "input, select, textarea",
            ControlKind::Input => "input",
            ControlKind::Select => "select",
            ControlKind::TextArea => "textarea",
        }
    }

    pub fn accepts(&self, info: &NodeInfo) -> bool {
        let tag_ok = match self {
            ControlKind::Any => true,
            ControlKind::Input => info.tag == "input",
            ControlKind::Select => info.tag == "select",
            ControlKind::TextArea => info.tag == "textarea",
        };
        tag_ok && info.is_form_control()
    }
}

/// A control some strategy resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Control {
    pub node: NodeId,
    /// Position of the winning strategy in the list that was tried
    pub strategy_index: usize,
}

/// Outcome of a resolution. A miss is an ordinary result, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Found(Control),
    NotFound,
}

impl Resolution {
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Resolution::Found(control) => Some(control.node),
            Resolution::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Resolution::Found(_))
    }
}

/// Per-strategy wait budgets, chosen by key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitBudgets {
    pub login: Duration,
    pub initial: Duration,
    pub default: Duration,
    pub poll: Duration,
}

impl Default for WaitBudgets {
    fn default() -> Self {
        Self {
            login: Duration::from_millis(400),
            initial: Duration::from_millis(1000),
            default: Duration::from_millis(1000),
            poll: Duration::from_millis(100),
        }
    }
}

impl WaitBudgets {
    /// Every budget collapsed to a few milliseconds, for scripted pages.
    pub fn fast() -> Self {
        Self {
            login: Duration::from_millis(5),
            initial: Duration::from_millis(5),
            default: Duration::from_millis(5),
            poll: Duration::from_millis(1),
        }
    }

    pub fn for_key(&self, key: &str) -> Duration {
        if key.starts_with("_login_") {
            self.login
        } else if key.starts_with("initial_") {
            self.initial
        } else {
            self.default
        }
    }
}
