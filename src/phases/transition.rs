//! SIGUIENTE, the pre-fill loading screen and its CERRAR pop-up.

use action_primitives::ActionError;
use cdp_adapter::Scope;
use std::future::Future;
use tracing::{info, warn};

use super::{PhaseState, Wizard};
use crate::errors::{EngineError, PhaseResultExt};

const LOADING_TEXT: &str = "Cargando información";
const PREFILL_CLOSE: &str = "button=CERRAR";

impl Wizard<'_> {
    /// Every step here only warns: the portal sometimes skips the pop-up.
    pub(super) async fn transition_to_detail(&mut self) -> Result<(), EngineError> {
        let phase = PhaseState::TransitioningToDetail;
        let timings = *self.timings();
        let page = Scope::Page;

        if !self
            .actions
            .click_key(&page, "_btn_siguiente")
            .await
            .in_phase(phase)?
        {
            warn!("SIGUIENTE not found after the configuration form");
        }
        self.pause(timings.after_next).await?;

        let waiter = self.actions.waiter();
        if waiter
            .text_disappears(LOADING_TEXT, timings.loading)
            .await
            .in_phase(phase)?
        {
            info!("pre-fill data loaded");
        } else {
            warn!(
                timeout_s = timings.loading.timeout.as_secs(),
                "still loading; continuing"
            );
        }
        self.pause(timings.after_loading).await?;

        let popup = waiter
            .visible(&page, PREFILL_CLOSE, timings.prefill_popup)
            .await
            .in_phase(phase)?;
        if popup.is_none() {
            warn!("pre-fill pop-up did not appear");
        }

        let mut closed = false;
        if let Some(button) = popup {
            closed = self
                .bounded(async { self.actions.click_node(button).await.map(|()| true) })
                .await?;
        }
        if !closed {
            closed = self
                .bounded(self.actions.click_any(&page, "_popup_cerrar", &[PREFILL_CLOSE]))
                .await?;
        }
        if closed {
            info!("pre-fill pop-up closed");
            self.pause(timings.after_popup).await?;
        } else {
            warn!("could not close the pre-fill pop-up");
        }
        Ok(())
    }

    /// One click attempt under the pop-up click budget. Misses and timeouts are `false`.
    async fn bounded<F>(&self, click: F) -> Result<bool, EngineError>
    where
        F: Future<Output = Result<bool, ActionError>>,
    {
        match tokio::time::timeout(self.timings().popup_click, click).await {
            Ok(Ok(clicked)) => Ok(clicked),
            Ok(Err(err)) if err.is_miss() => Ok(false),
            Ok(Err(err)) => Err(err).in_phase(self.state),
            Err(_) => Ok(false),
        }
    }
}
