//! Server-fault detection on the portal page

use tracing::{error, trace};

use super::Wizard;
use crate::errors::{EngineError, PhaseResultExt};

/// Body phrases, matched case-insensitively, that mean the portal is failing.
pub const FAULT_PHRASES: [&str; 12] = [
    "500",
    "internal server error",
    "error del servidor",
    "servidor no disponible",
    "no disponible",
    "service unavailable",
    "unavailable",
    "error http",
    "mantenimiento",
    "maintenance",
    "try again later",
    "intente más tarde",
];

/// Narrower set polled while waiting for the post-login redirect.
const LOGIN_FAULT_PHRASES: [&str; 3] = ["500", "internal server error", "error: http 500"];

/// HTTP status of 400 or above, else the first fault phrase in `body`.
pub fn detect_fault(body: &str, status: Option<u16>) -> Option<String> {
    if let Some(code) = status.filter(|c| *c >= 400) {
        return Some(format!("HTTP {code}"));
    }
    let lower = body.to_lowercase();
    FAULT_PHRASES
        .iter()
        .find(|phrase| lower.contains(*phrase))
        .map(|phrase| format!("page shows '{phrase}'"))
}

pub fn login_fault(body: &str) -> Option<String> {
    let lower = body.to_lowercase();
    LOGIN_FAULT_PHRASES
        .iter()
        .find(|phrase| lower.contains(*phrase))
        .map(|phrase| format!("server error after login: '{phrase}'"))
}

impl Wizard<'_> {
    pub(super) async fn check_remote_fault(&self) -> Result<(), EngineError> {
        let dom = self.actions.dom();
        let phase = self.state;
        let status = dom.last_status().await.in_phase(phase)?;
        let body = dom.body_text().await.in_phase(phase)?;
        match detect_fault(&body, status) {
            Some(reason) => {
                error!(phase = ?phase, %reason, "SAT server fault");
                Err(EngineError::RemoteFault(reason))
            }
            None => {
                trace!(phase = ?phase, "no server fault");
                Ok(())
            }
        }
    }
}
