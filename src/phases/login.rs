//! e.firma login

use action_locator::{first_success, Attempt};
use action_primitives::{ActionError, FileOutcome, UrlWait};
use cdp_adapter::{NodeId, Scope};
use futures::FutureExt;
use tracing::{info, warn};

use super::faults::login_fault;
use super::{PhaseState, Wizard};
use crate::errors::{EngineError, PhaseResultExt};

const AUTHENTICATED_HOST: &str = "clouda.sat.gob.mx";
const POST_LOGIN_MARKERS: [&str; 3] = ["Presentar declaración", "Cerrar Sesión", "Bienvenido"];
const SUBMIT_CONTROLS: &str = "input[type='submit'], button[type='submit']";

impl Wizard<'_> {
    pub(super) async fn login(&mut self) -> Result<(), EngineError> {
        let phase = PhaseState::LoggingIn;
        let page = Scope::Page;
        let timings = *self.timings();

        info!(url = %self.settings.portal_url, "opening SAT portal");
        self.actions
            .dom()
            .navigate(&self.settings.portal_url, timings.navigation)
            .await
            .in_phase(phase)?;
        self.check_remote_fault().await?;

        if !self
            .actions
            .click_key(&page, "_login_e_firma_button")
            .await
            .in_phase(phase)?
        {
            return Err(EngineError::phase(phase, "e.firma button not found"));
        }
        self.actions
            .waiter()
            .visible(&page, "input[type='file'], input[type='password']", timings.login_form)
            .await
            .in_phase(phase)?;

        let creds = self.credentials;
        let files = self
            .actions
            .set_file_pair(
                &page,
                "_login_cer_file_input",
                "_login_key_file_input",
                &creds.cer_path,
                &creds.key_path,
            )
            .await
            .in_phase(phase)?;
        if files == FileOutcome::PrimaryOnly {
            warn!("only the .cer input was found; .key may need manual selection");
        }

        if !self
            .actions
            .set_text_key(&page, "_login_password_input", &creds.password)
            .await
            .in_phase(phase)?
        {
            return Err(EngineError::phase(phase, "password field not found"));
        }
        info!("password filled");

        self.press_enviar().await?;

        let outcome = self
            .actions
            .waiter()
            .url_contains(AUTHENTICATED_HOST, timings.post_login_url, login_fault)
            .await
            .in_phase(phase)?;
        match outcome {
            UrlWait::Reached(url) => info!(%url, "authenticated"),
            UrlWait::Stopped(reason) => return Err(EngineError::RemoteFault(reason)),
            UrlWait::TimedOut(url) => warn!(%url, "post-login redirect not observed"),
        }

        match self
            .actions
            .waiter()
            .text_appears(&POST_LOGIN_MARKERS, timings.post_login_marker)
            .await
            .in_phase(phase)?
        {
            Some(marker) => info!(%marker, "post-login page ready"),
            None => warn!("no post-login marker shown"),
        }
        self.check_remote_fault().await
    }

    async fn press_enviar(&self) -> Result<(), EngineError> {
        let page = Scope::Page;
        let actions = &self.actions;
        let click = |selector: &'static str| {
            async move {
                let clicked = actions.click_selector(&page, selector).await?;
                Ok::<_, ActionError>(clicked.then_some(()))
            }
            .boxed()
        };
        let attempts: Vec<Attempt<'_, (), ActionError>> = vec![
            async move {
                let clicked = actions.click_key(&page, "_login_enviar_button").await?;
                Ok::<_, ActionError>(clicked.then_some(()))
            }
            .boxed(),
            click("button=Enviar"),
            click("input[type='submit'][value='Enviar']"),
            click("input[value*='Enviar']"),
            async move {
                // The first submit on the e.firma form is often "Contraseña".
                let nodes = actions.dom().query(&page, SUBMIT_CONTROLS).await?;
                match nodes.get(1).copied() {
                    Some(second) => click_if_visible(actions, second).await,
                    None => Ok(None),
                }
            }
            .boxed(),
        ];
        match first_success("login-enviar", attempts)
            .await
            .in_phase(PhaseState::LoggingIn)?
        {
            Some(won) => {
                info!(candidate = won.index, "Enviar pressed");
                Ok(())
            }
            None => Err(EngineError::phase(
                PhaseState::LoggingIn,
                "Enviar button not found on e.firma form",
            )),
        }
    }
}

async fn click_if_visible(
    actions: &action_primitives::Actions<'_>,
    node: NodeId,
) -> Result<Option<()>, ActionError> {
    if !actions.dom().describe(node).await?.visible {
        return Ok(None);
    }
    actions.click_node(node).await?;
    Ok(Some(()))
}
