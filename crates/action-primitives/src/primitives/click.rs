//! Click primitive

use action_locator::{ControlKind, Resolution};
use cdp_adapter::{NodeId, Scope};
use tracing::{debug, info};

use super::Actions;
use crate::errors::ActionError;

impl<'a> Actions<'a> {
    /// Resolves `key` and clicks it. `Ok(false)` when no strategy resolved.
    pub async fn click_key(&self, scope: &Scope, key: &str) -> Result<bool, ActionError> {
        match self
            .resolver()
            .resolve_key(scope, key, ControlKind::Any)
            .await?
        {
            Resolution::Found(control) => {
                self.click_node(control.node).await?;
                info!(key = %key, strategy = control.strategy_index, "clicked");
                Ok(true)
            }
            Resolution::NotFound => {
                debug!(key = %key, "click target not resolved");
                Ok(false)
            }
        }
    }

    /// Clicks the first visible match of an ad hoc selector.
    pub async fn click_selector(&self, scope: &Scope, selector: &str) -> Result<bool, ActionError> {
        match self.resolver().resolve_selector(scope, selector).await? {
            Some(node) => {
                self.click_node(node).await?;
                debug!(selector = %selector, "clicked");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Clicks an already resolved control.
    pub async fn click_node(&self, node: NodeId) -> Result<(), ActionError> {
        if self.cancel_token().is_cancelled() {
            return Err(ActionError::Interrupted("run cancelled".to_string()));
        }
        self.dom().click(node).await?;
        Ok(())
    }

    /// Key first, then each fallback selector, until one click lands.
    pub async fn click_any(
        &self,
        scope: &Scope,
        key: &str,
        fallbacks: &[&str],
    ) -> Result<bool, ActionError> {
        if self.click_key(scope, key).await? {
            return Ok(true);
        }
        for selector in fallbacks {
            if self.click_selector(scope, selector).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
