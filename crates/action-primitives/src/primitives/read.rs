//! Read primitive - displayed amount of a control

use action_locator::{ControlKind, Resolution};
use cdp_adapter::{NodeId, Scope};
use tracing::debug;

use super::Actions;
use crate::currency::parse_currency;
use crate::errors::ActionError;

impl<'a> Actions<'a> {
    /// Raw displayed text: the `value` attribute, the live value, then the
    /// rendered text, whichever is first non-empty.
    pub async fn read_raw(&self, node: NodeId) -> Result<String, ActionError> {
        let info = self.dom().describe(node).await?;
        let raw = [info.attr("value"), info.value.as_deref(), Some(info.text.as_str())]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|s| !s.is_empty())
            .unwrap_or_default()
            .to_string();
        Ok(raw)
    }

    /// Displayed amount of `node`. `None` when it shows no figure.
    pub async fn read_amount(&self, node: NodeId) -> Result<Option<f64>, ActionError> {
        let raw = self.read_raw(node).await?;
        let parsed = parse_currency(&raw);
        debug!(raw = %raw, parsed = ?parsed, "read displayed value");
        Ok(parsed)
    }

    /// Amount shown by the control `key` resolves to. `None` on a miss.
    pub async fn read_amount_key(
        &self,
        scope: &Scope,
        key: &str,
    ) -> Result<Option<f64>, ActionError> {
        match self
            .resolver()
            .resolve_key(scope, key, ControlKind::Any)
            .await?
        {
            Resolution::Found(control) => self.read_amount(control.node).await,
            Resolution::NotFound => Ok(None),
        }
    }
}
