//! Text primitive - replace the contents of a text control

use action_locator::{ControlKind, Resolution};
use cdp_adapter::{NodeId, Scope};
use tracing::{debug, info};

use super::Actions;
use crate::errors::ActionError;

impl<'a> Actions<'a> {
    /// Resolves `key` and replaces its contents with `text`.
    /// `Ok(false)` when the control cannot be resolved.
    pub async fn set_text_key(
        &self,
        scope: &Scope,
        key: &str,
        text: &str,
    ) -> Result<bool, ActionError> {
        match self
            .resolver()
            .resolve_key(scope, key, ControlKind::Any)
            .await?
        {
            Resolution::Found(control) => {
                self.set_text(control.node, key, text).await?;
                info!(key = %key, strategy = control.strategy_index, "text set");
                Ok(true)
            }
            Resolution::NotFound => Ok(false),
        }
    }

    /// Text control next to `label`. `Ok(false)` when none is found.
    pub async fn set_text_label(
        &self,
        scope: &Scope,
        label: &str,
        text: &str,
    ) -> Result<bool, ActionError> {
        match self
            .resolver()
            .resolve_label(scope, label, ControlKind::Input)
            .await?
        {
            Some(node) => {
                self.set_text(node, label, text).await?;
                info!(label = %label, value = %text, "text set");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Focus, settle, then replace the full contents.
    pub async fn set_text(&self, node: NodeId, key: &str, text: &str) -> Result<(), ActionError> {
        if let Err(err) = self.dom().click(node).await {
            if !err.is_miss() {
                return Err(err.into());
            }
            debug!(key = %key, "focus click missed, filling anyway");
        }
        self.pause(self.timings.settle_for(key)).await?;
        self.dom().fill(node, text).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::ActionTimings;
    use action_locator::{FieldMapping, Resolver, WaitBudgets};
    use cdp_adapter::memory::{Document, El};
    use cdp_adapter::{DomPort, MemoryDom};
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn replaces_existing_contents() {
        let mut doc = Document::default();
        let pwd = doc.add(
            El::new("input")
                .id("privateKeyPassword")
                .attr("type", "password")
                .value("old"),
        );
        doc.add(El::new("table").child(El::row([
            El::new("span").text("Integrantes por copropiedad"),
            El::input("cop"),
        ])));
        let dom = MemoryDom::new(doc);
        let mapping = FieldMapping::default()
            .with("_login_password_input", &["#privateKeyPassword"])
            .unwrap();
        let resolver = Resolver::new(&dom, &mapping, CancellationToken::new())
            .with_budgets(WaitBudgets::fast());
        let actions = Actions::new(resolver).with_timings(ActionTimings::fast());

        assert!(actions
            .set_text_key(&Scope::Page, "_login_password_input", "secreto")
            .await
            .unwrap());
        assert_eq!(dom.describe(pwd).await.unwrap().value.as_deref(), Some("secreto"));

        assert!(actions
            .set_text_label(&Scope::Page, "integrantes por copropiedad", "0")
            .await
            .unwrap());
        assert!(!actions
            .set_text_label(&Scope::Page, "Sin etiqueta", "1")
            .await
            .unwrap());
    }
}
