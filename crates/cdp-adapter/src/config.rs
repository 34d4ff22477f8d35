use crate::detect_chrome_executable;
use serde::{Deserialize, Serialize};
use std::{
    env,
    path::{Path, PathBuf},
};

/// How the declaration browser is launched or attached to.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CdpConfig {
    /// Empty lets chromiumoxide pick its own default.
    pub executable: PathBuf,
    /// Dedicated profile so the portal never shares cookies with a daily browser.
    pub user_data_dir: PathBuf,
    pub headless: bool,
    /// Per-command reply deadline.
    pub default_deadline_ms: u64,
    pub launch_timeout_ms: u64,
    /// Attach to an already running browser instead of launching one.
    pub websocket_url: Option<String>,
}

impl Default for CdpConfig {
    fn default() -> Self {
        Self {
            executable: default_chrome_path(),
            user_data_dir: default_profile_dir(),
            headless: resolve_headless_default(),
            default_deadline_ms: 30_000,
            launch_timeout_ms: 20_000,
            websocket_url: None,
        }
    }
}

impl CdpConfig {
    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = path.into();
        self
    }

    pub fn headless(mut self, flag: bool) -> Self {
        self.headless = flag;
        self
    }

    pub fn with_profile_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.user_data_dir = dir.into();
        self
    }
}

fn resolve_headless_default() -> bool {
    // The portal is usually watched by an operator, so headful unless asked otherwise.
    match env::var("SAT_HEADLESS") {
        Ok(value) => {
            let lower = value.to_ascii_lowercase();
            matches!(lower.as_str(), "1" | "true" | "yes" | "on")
        }
        Err(_) => false,
    }
}

fn default_chrome_path() -> PathBuf {
    detect_chrome_executable().unwrap_or_default()
}

fn default_profile_dir() -> PathBuf {
    if let Ok(path) = env::var("SAT_CHROME_PROFILE") {
        return PathBuf::from(path);
    }

    Path::new("./.sat-declaration-profile").into()
}
