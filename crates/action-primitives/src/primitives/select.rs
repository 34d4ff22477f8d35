//! Select primitive - set a dropdown to a target value
//!
//! Layers, in order:
//! 1. already showing the target: nothing to do
//! 2. set by option value
//! 3. set by option label
//! 4. open the control and click the matching option
//! 5. value, then label, once more

use action_locator::{ControlKind, Resolution};
use cdp_adapter::{text_matches, AdapterError, NodeId, Scope, SelectBy};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::Actions;
use crate::errors::ActionError;

/// Which layer put the dropdown on its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropdownOutcome {
    AlreadySet,
    ByValue,
    ByLabel,
    ByOptionClick,
    ByRetry,
}

impl<'a> Actions<'a> {
    /// Resolves `key` (as a list control) and sets it to `target`.
    ///
    /// `Ok(None)` when the control itself cannot be resolved.
    pub async fn set_dropdown_key(
        &self,
        scope: &Scope,
        key: &str,
        target: &str,
    ) -> Result<Option<DropdownOutcome>, ActionError> {
        match self
            .resolver()
            .resolve_key(scope, key, ControlKind::Select)
            .await?
        {
            Resolution::Found(control) => {
                let outcome = self.set_dropdown(control.node, target).await?;
                info!(key = %key, target = %target, outcome = ?outcome, "dropdown set");
                Ok(Some(outcome))
            }
            Resolution::NotFound => Ok(None),
        }
    }

    /// Dropdown next to `label` text, for questions without a mapping entry.
    pub async fn set_dropdown_label(
        &self,
        scope: &Scope,
        label: &str,
        target: &str,
    ) -> Result<Option<DropdownOutcome>, ActionError> {
        match self
            .resolver()
            .resolve_label(scope, label, ControlKind::Select)
            .await?
        {
            Some(node) => {
                let outcome = self.set_dropdown(node, target).await?;
                info!(label = %label, target = %target, outcome = ?outcome, "dropdown set");
                Ok(Some(outcome))
            }
            None => Ok(None),
        }
    }

    pub async fn set_dropdown(
        &self,
        node: NodeId,
        target: &str,
    ) -> Result<DropdownOutcome, ActionError> {
        let started = Instant::now();
        if self.already_set(node, target).await? {
            debug!(target = %target, "dropdown already on target");
            return Ok(DropdownOutcome::AlreadySet);
        }

        let by_value = SelectBy::Value(target.to_string());
        let by_label = SelectBy::Label(target.to_string());

        if self.try_select(node, &by_value).await? {
            return Ok(DropdownOutcome::ByValue);
        }
        if self.try_select(node, &by_label).await? {
            return Ok(DropdownOutcome::ByLabel);
        }

        debug!(target = %target, "opening dropdown to pick option");
        if self.open_and_pick(node, target).await? {
            return Ok(DropdownOutcome::ByOptionClick);
        }

        if self.try_select(node, &by_value).await? || self.try_select(node, &by_label).await? {
            return Ok(DropdownOutcome::ByRetry);
        }

        warn!(
            target = %target,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "no dropdown layer matched"
        );
        Err(ActionError::OptionNotFound(target.to_string()))
    }

    async fn already_set(&self, node: NodeId, target: &str) -> Result<bool, ActionError> {
        let info = self.dom().describe(node).await?;
        if info.value.as_deref().map(str::trim) == Some(target.trim()) {
            return Ok(true);
        }
        let options = miss_as(self.dom().options(node).await, Vec::new())?;
        Ok(options.iter().any(|o| {
            o.selected
                && (SelectBy::Value(target.to_string()).matches(o)
                    || SelectBy::Label(target.to_string()).matches(o))
        }))
    }

    async fn try_select(&self, node: NodeId, by: &SelectBy) -> Result<bool, ActionError> {
        let selected = miss_as(self.dom().select(node, by).await, false)?;
        Ok(selected && self.confirm(node, by).await?)
    }

    /// Re-reads the control; a select call that did not stick is a miss.
    async fn confirm(&self, node: NodeId, by: &SelectBy) -> Result<bool, ActionError> {
        let options = miss_as(self.dom().options(node).await, Vec::new())?;
        if options.is_empty() {
            return Ok(true);
        }
        Ok(options.iter().any(|o| o.selected && by.matches(o)))
    }

    async fn open_and_pick(&self, node: NodeId, target: &str) -> Result<bool, ActionError> {
        if let Err(err) = self.dom().click(node).await {
            if !err.is_miss() {
                return Err(err.into());
            }
        }
        self.pause(self.timings.option_open).await?;

        let native = self.dom().query(&Scope::Within(node), "option").await?;
        let candidates = if native.is_empty() {
            self.dom().query(&Scope::Page, "[role='option']").await?
        } else {
            native
        };

        for option in candidates {
            let info = self.dom().describe(option).await?;
            let value_hit = info.attr("value").map(str::trim) == Some(target.trim());
            if !(value_hit || text_matches(&info.text, target, false)) {
                continue;
            }
            match self.dom().click(option).await {
                Ok(()) => return Ok(true),
                Err(err) if err.is_miss() => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(false)
    }
}

fn miss_as<T>(result: Result<T, AdapterError>, fallback: T) -> Result<T, ActionError> {
    match result {
        Ok(value) => Ok(value),
        Err(err) if err.is_miss() => Ok(fallback),
        Err(err) => Err(err.into()),
    }
}
