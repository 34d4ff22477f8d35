//! Browser session launch.

use async_trait::async_trait;
use cdp_adapter::{CdpConfig, CdpPage, ChromiumTransport, DomPort};
use std::sync::Arc;
use tracing::info;

use crate::errors::EngineError;

/// Opens one fresh page per attempt. The supervisor owns what it returns.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn DomPort>, EngineError>;
}

/// Launches Chromium through the DevTools transport.
pub struct ChromeLauncher {
    cdp: CdpConfig,
}

impl ChromeLauncher {
    pub fn new(cdp: CdpConfig) -> Self {
        Self { cdp }
    }
}

#[async_trait]
impl SessionLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn DomPort>, EngineError> {
        if self.cdp.websocket_url.is_none() && self.cdp.executable.as_os_str().is_empty() {
            return Err(EngineError::Prerequisite(
                "no Chrome/Chromium executable found; set chrome_path or SAT_CHROME".to_string(),
            ));
        }
        info!(
            executable = %self.cdp.executable.display(),
            headless = self.cdp.headless,
            "launching browser"
        );
        let transport = Arc::new(ChromiumTransport::new(self.cdp.clone()));
        let page = CdpPage::open(transport).await?;
        Ok(Box::new(page))
    }
}
