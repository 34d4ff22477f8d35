//! Field resolver with per-strategy bounded waits

use cdp_adapter::{AdapterError, DomPort, NodeId, Scope};
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::errors::LocatorError;
use crate::heuristics;
use crate::mapping::FieldMapping;
use crate::types::{Control, ControlKind, Resolution, SelectorStrategy, WaitBudgets};

/// Resolves logical keys against one page.
///
/// Borrowed for the duration of a phase; the page itself is owned by the
/// session supervisor.
#[derive(Clone)]
pub struct Resolver<'a> {
    dom: &'a dyn DomPort,
    mapping: &'a FieldMapping,
    budgets: WaitBudgets,
    cancel: CancellationToken,
}

impl<'a> Resolver<'a> {
    pub fn new(dom: &'a dyn DomPort, mapping: &'a FieldMapping, cancel: CancellationToken) -> Self {
        Self {
            dom,
            mapping,
            budgets: WaitBudgets::default(),
            cancel,
        }
    }

    pub fn with_budgets(mut self, budgets: WaitBudgets) -> Self {
        self.budgets = budgets;
        self
    }

    pub fn dom(&self) -> &'a dyn DomPort {
        self.dom
    }

    pub fn mapping(&self) -> &'a FieldMapping {
        self.mapping
    }

    pub fn budgets(&self) -> WaitBudgets {
        self.budgets
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Tries `strategies` in order, each with the wait budget implied by `key`.
    pub async fn resolve(
        &self,
        scope: &Scope,
        key: &str,
        strategies: &[SelectorStrategy],
        kind: ControlKind,
    ) -> Result<Resolution, LocatorError> {
        let budget = self.budgets.for_key(key);
        for (index, strategy) in strategies.iter().enumerate() {
            trace!(key = %key, index, strategy = strategy.name(), "trying strategy");
            let found = self
                .wait_for(budget, || self.try_strategy(scope, strategy, kind).boxed())
                .await?;
            if let Some(node) = found {
                debug!(key = %key, index, strategy = strategy.name(), "resolved field");
                return Ok(Resolution::Found(Control {
                    node,
                    strategy_index: index,
                }));
            }
        }
        debug!(key = %key, tried = strategies.len(), "no strategy resolved");
        Ok(Resolution::NotFound)
    }

    /// Resolves a key through its mapping entry. Unmapped keys miss.
    pub async fn resolve_key(
        &self,
        scope: &Scope,
        key: &str,
        kind: ControlKind,
    ) -> Result<Resolution, LocatorError> {
        self.resolve(scope, key, self.mapping.strategies(key), kind)
            .await
    }

    /// One ad hoc selector with the default budget.
    pub async fn resolve_selector(
        &self,
        scope: &Scope,
        selector: &str,
    ) -> Result<Option<NodeId>, LocatorError> {
        let strategy = SelectorStrategy::DirectSelector(selector.to_string());
        let out = self
            .wait_for(self.budgets.default, || {
                self.try_strategy(scope, &strategy, ControlKind::Any).boxed()
            })
            .await?;
        Ok(out)
    }

    /// Label indirection, then label proximity, for a label not in the mapping.
    pub async fn resolve_label(
        &self,
        scope: &Scope,
        label: &str,
        kind: ControlKind,
    ) -> Result<Option<NodeId>, LocatorError> {
        let strategies = [
            SelectorStrategy::LabelIndirection(label.to_string()),
            SelectorStrategy::LabelProximity(label.to_string()),
        ];
        Ok(self.resolve(scope, "", &strategies, kind).await?.node())
    }

    /// Every attached match of the first direct strategy of `key` that matches
    /// anything, visible or not. Used for inputs the page keeps hidden.
    pub async fn resolve_all(&self, scope: &Scope, key: &str) -> Result<Vec<NodeId>, LocatorError> {
        let budget = self.budgets.for_key(key);
        for strategy in self.mapping.strategies(key) {
            let SelectorStrategy::DirectSelector(selector) = strategy else {
                continue;
            };
            let found = self
                .wait_for(budget, || {
                    async move {
                        let nodes = self.dom.query(scope, selector).await?;
                        Ok::<_, AdapterError>((!nodes.is_empty()).then_some(nodes))
                    }
                    .boxed()
                })
                .await?;
            if let Some(nodes) = found {
                return Ok(nodes);
            }
        }
        Ok(Vec::new())
    }

    /// The `action` button (e.g. CAPTURAR) belonging to the `occurrence`-th
    /// text match of `label`.
    pub async fn resolve_row_action(
        &self,
        scope: &Scope,
        action: &str,
        label: &str,
        occurrence: usize,
    ) -> Result<Option<NodeId>, LocatorError> {
        let out = self
            .wait_for(self.budgets.default, || {
                async move {
                    let labels = self.dom.find_text(scope, label, false).await?;
                    let Some(anchor) = labels.get(occurrence) else {
                        return Ok(None);
                    };
                    heuristics::action_near_label(self.dom, *anchor, action, label).await
                }
                .boxed()
            })
            .await?;
        Ok(out)
    }

    /// The `action` button whose row mentions `row_label`, excluding question rows.
    pub async fn resolve_action_in_row(
        &self,
        scope: &Scope,
        action: &str,
        row_label: &str,
    ) -> Result<Option<NodeId>, LocatorError> {
        let out = self
            .wait_for(self.budgets.default, || {
                heuristics::action_in_row(self.dom, scope, action, row_label).boxed()
            })
            .await?;
        Ok(out)
    }

    /// Cancellable sleep for callers pacing their own steps.
    pub async fn pause(&self, delay: std::time::Duration) -> Result<(), LocatorError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(LocatorError::Cancelled),
            _ = sleep(delay) => Ok(()),
        }
    }

    /// Polls `attempt` until it yields or `budget` elapses. Stale-handle and
    /// missing-option errors count as "not yet".
    async fn wait_for<'p, T, F>(
        &self,
        budget: std::time::Duration,
        mut attempt: F,
    ) -> Result<Option<T>, LocatorError>
    where
        F: FnMut() -> BoxFuture<'p, Result<Option<T>, AdapterError>>,
    {
        let started = Instant::now();
        loop {
            if self.cancel.is_cancelled() {
                return Err(LocatorError::Cancelled);
            }
            match attempt().await {
                Ok(Some(found)) => return Ok(Some(found)),
                Ok(None) => {}
                Err(err) if err.is_miss() => trace!(error = %err, "strategy missed"),
                Err(err) => return Err(LocatorError::Driver(err)),
            }
            if started.elapsed() >= budget {
                return Ok(None);
            }
            self.pause(self.budgets.poll).await?;
        }
    }

    async fn try_strategy(
        &self,
        scope: &Scope,
        strategy: &SelectorStrategy,
        kind: ControlKind,
    ) -> Result<Option<NodeId>, AdapterError> {
        match strategy {
            SelectorStrategy::DirectSelector(selector) => {
                for node in self.dom.query(scope, selector).await? {
                    if self.dom.describe(node).await?.visible {
                        return Ok(Some(node));
                    }
                }
                Ok(None)
            }
            SelectorStrategy::LabelIndirection(label) => {
                heuristics::control_for_label(self.dom, scope, label, kind).await
            }
            SelectorStrategy::LabelProximity(label) => {
                let labels = heuristics::label_candidates(self.dom, scope, label).await?;
                for anchor in labels.into_iter().rev() {
                    if let Some(found) = heuristics::control_near_label(self.dom, anchor, kind).await? {
                        return Ok(Some(found));
                    }
                }
                Ok(None)
            }
            SelectorStrategy::PositionalFallback {
                container,
                selector,
                index,
            } => {
                let Some(root) = self.dom.query(scope, container).await?.first().copied() else {
                    return Ok(None);
                };
                let nodes = self.dom.query(&Scope::Within(root), selector).await?;
                match nodes.get(*index) {
                    Some(node) if self.dom.describe(*node).await?.visible => Ok(Some(*node)),
                    _ => Ok(None),
                }
            }
        }
    }
}
