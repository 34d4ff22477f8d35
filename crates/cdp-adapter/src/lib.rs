//! Browser adapter for the declaration engine.
//!
//! [`dom::DomPort`] is the surface the locator and primitives drive. It is
//! implemented by [`page::CdpPage`] over a Chromium DevTools connection and by
//! [`memory::MemoryDom`] for scripted fixtures.

pub mod config;
pub mod dom;
pub mod error;
pub mod memory;
pub mod page;
pub mod transport;

pub use config::CdpConfig;
pub use dom::{text_matches, DomPort, NodeId, NodeInfo, OptionChoice, QueryKind, Scope, SelectBy};
pub use error::{AdapterError, AdapterErrorKind};
pub use memory::MemoryDom;
pub use page::CdpPage;
pub use transport::{CdpTransport, ChromiumTransport, CommandTarget};

use std::{env, path::PathBuf};
use which::which;

/// Locates a Chrome/Chromium binary: `SAT_CHROME`, then `PATH`, then the
/// usual install locations unless `SAT_SKIP_OS_PATHS` is set.
pub fn detect_chrome_executable() -> Option<PathBuf> {
    if let Ok(raw) = env::var("SAT_CHROME") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            let candidate = PathBuf::from(trimmed);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    for name in chrome_executable_names() {
        if let Ok(path) = which(name) {
            return Some(path);
        }
    }

    let skip_defaults = env::var("SAT_SKIP_OS_PATHS")
        .map(|value| !value.trim().is_empty())
        .unwrap_or(false);

    if !skip_defaults {
        for candidate in os_specific_chrome_paths() {
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    None
}

fn chrome_executable_names() -> &'static [&'static str] {
    #[cfg(target_os = "windows")]
    {
        &["chrome.exe", "chromium.exe", "msedge.exe"]
    }

    #[cfg(not(target_os = "windows"))]
    {
        &[
            "google-chrome-stable",
            "google-chrome",
            "chromium",
            "chromium-browser",
        ]
    }
}

fn os_specific_chrome_paths() -> Vec<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let mut paths = Vec::new();
        for key in ["PROGRAMFILES", "PROGRAMFILES(X86)", "LOCALAPPDATA"] {
            if let Ok(value) = env::var(key) {
                let root = PathBuf::from(value.trim());
                paths.push(root.join("Google/Chrome/Application/chrome.exe"));
                paths.push(root.join("Microsoft/Edge/Application/msedge.exe"));
            }
        }
        paths
    }

    #[cfg(target_os = "macos")]
    {
        vec![PathBuf::from(
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        )]
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        vec![
            PathBuf::from("/usr/bin/google-chrome-stable"),
            PathBuf::from("/usr/bin/google-chrome"),
            PathBuf::from("/usr/bin/chromium-browser"),
            PathBuf::from("/usr/bin/chromium"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::{chrome_executable_names, detect_chrome_executable};
    use std::{env, fs};
    use tempfile::tempdir;

    fn restore(key: &str, value: Option<String>) {
        match value {
            Some(value) => env::set_var(key, value),
            None => env::remove_var(key),
        }
    }

    // Both cases mutate process env, so they run as one test.
    #[test]
    fn detects_from_env_then_path() {
        let dir = tempdir().unwrap();
        let explicit = dir.path().join("my-chrome");
        fs::write(&explicit, b"").unwrap();
        let original_chrome = env::var("SAT_CHROME").ok();
        let original_path = env::var("PATH").ok();
        let original_skip = env::var("SAT_SKIP_OS_PATHS").ok();

        env::set_var("SAT_CHROME", explicit.to_string_lossy().to_string());
        let from_env = detect_chrome_executable();

        let name = chrome_executable_names()[0];
        let on_path = dir.path().join(name);
        fs::write(&on_path, b"").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&on_path, fs::Permissions::from_mode(0o755)).unwrap();
        }
        env::set_var("SAT_CHROME", "");
        env::set_var("SAT_SKIP_OS_PATHS", "1");
        env::set_var("PATH", dir.path());
        let from_path = detect_chrome_executable();

        restore("SAT_CHROME", original_chrome);
        restore("PATH", original_path);
        restore("SAT_SKIP_OS_PATHS", original_skip);

        assert_eq!(from_env, Some(explicit));
        assert_eq!(from_path, Some(on_path));
    }
}
