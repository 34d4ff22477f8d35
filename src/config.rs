//! Configuration file
//!
//! JSON, looked up at the explicit `--config`, then `./config/config.json`,
//! then `<config dir>/sat-declaration/config.json`; defaults otherwise.
//! Root-level `test_*` keys are aliases for the `test` block.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use url::Url;

pub const DEFAULT_PORTAL_URL: &str = "https://pstcdypisr.clouda.sat.gob.mx/";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub db_connection_string: Option<String>,
    /// Root folder of `<company>/<branch>/` credential directories.
    pub fiel_certificate_base_path: Option<PathBuf>,
    pub sat_portal_url: String,
    pub totals_tolerance_pesos: f64,
    pub log_file: Option<PathBuf>,
    pub mapping_path: Option<PathBuf>,
    pub retry_wait_seconds: u64,
    pub headless: Option<bool>,
    pub chrome_path: Option<PathBuf>,
    /// JSON catalog of e.firma file names keyed by `company/branch`.
    pub credentials_catalog: Option<PathBuf>,
    pub test: TestSettings,

    pub test_cer_path: Option<PathBuf>,
    pub test_key_path: Option<PathBuf>,
    pub test_password: Option<String>,
    pub test_rfc: Option<String>,
    pub test_year: Option<i32>,
    pub test_month: Option<u32>,
    pub test_periodicidad: Option<u32>,
    pub test_workbook_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_connection_string: None,
            fiel_certificate_base_path: None,
            sat_portal_url: DEFAULT_PORTAL_URL.to_string(),
            totals_tolerance_pesos: 1.0,
            log_file: None,
            mapping_path: None,
            retry_wait_seconds: 60,
            headless: None,
            chrome_path: None,
            credentials_catalog: None,
            test: TestSettings::default(),
            test_cer_path: None,
            test_key_path: None,
            test_password: None,
            test_rfc: None,
            test_year: None,
            test_month: None,
            test_periodicidad: None,
            test_workbook_path: None,
        }
    }
}

/// Local credentials and synthetic period for the dry-run modes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestSettings {
    pub cer_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    pub password: Option<String>,
    pub rfc: Option<String>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub periodicidad: Option<u32>,
    pub workbook_path: Option<PathBuf>,
}

impl AppConfig {
    /// The `test` block with root-level `test_*` aliases taking precedence.
    pub fn test_settings(&self) -> TestSettings {
        let t = &self.test;
        TestSettings {
            cer_path: self.test_cer_path.clone().or_else(|| t.cer_path.clone()),
            key_path: self.test_key_path.clone().or_else(|| t.key_path.clone()),
            password: self.test_password.clone().or_else(|| t.password.clone()),
            rfc: self.test_rfc.clone().or_else(|| t.rfc.clone()),
            year: self.test_year.or(t.year),
            month: self.test_month.or(t.month),
            periodicidad: self.test_periodicidad.or(t.periodicidad),
            workbook_path: self
                .test_workbook_path
                .clone()
                .or_else(|| t.workbook_path.clone()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.sat_portal_url)
            .with_context(|| format!("sat_portal_url is not a valid URL: {}", self.sat_portal_url))?;
        if !self.totals_tolerance_pesos.is_finite() || self.totals_tolerance_pesos < 0.0 {
            bail!(
                "totals_tolerance_pesos must be a non-negative number, got {}",
                self.totals_tolerance_pesos
            );
        }
        Ok(())
    }
}

pub struct LoadedConfig {
    pub config: AppConfig,
    /// File the configuration was read from, if any.
    pub path: Option<PathBuf>,
}

pub fn load_config(config_path: Option<&Path>) -> Result<LoadedConfig> {
    let path = match config_path {
        Some(path) => {
            if !path.exists() {
                bail!("config file not found: {}", path.display());
            }
            Some(path.to_path_buf())
        }
        None => default_locations().into_iter().find(|p| p.exists()),
    };

    let Some(path) = path else {
        warn!("config file not found, using defaults");
        return Ok(LoadedConfig {
            config: AppConfig::default(),
            path: None,
        });
    };

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: AppConfig = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    config.validate()?;

    if config.db_connection_string.is_some() {
        warn!("db_connection_string is set but unused; credentials come from credentials_catalog");
    }
    info!("Loaded configuration from: {}", path.display());
    Ok(LoadedConfig {
        config,
        path: Some(path),
    })
}

fn default_locations() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("config/config.json")];
    if let Some(mut dir) = dirs::config_dir() {
        dir.push("sat-declaration");
        dir.push("config.json");
        paths.push(dir);
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_portal() {
        let config = AppConfig::default();
        assert_eq!(config.sat_portal_url, DEFAULT_PORTAL_URL);
        assert_eq!(config.totals_tolerance_pesos, 1.0);
        assert_eq!(config.retry_wait_seconds, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn root_aliases_override_test_block() {
        let config: AppConfig = serde_json::from_str(
            r#"{
                "test": { "cer_path": "/a.cer", "key_path": "/a.key", "year": 2024, "month": 2 },
                "test_key_path": "/b.key",
                "test_month": 5,
                "unknown_key": true
            }"#,
        )
        .unwrap();
        let test = config.test_settings();
        assert_eq!(test.cer_path, Some(PathBuf::from("/a.cer")));
        assert_eq!(test.key_path, Some(PathBuf::from("/b.key")));
        assert_eq!(test.year, Some(2024));
        assert_eq!(test.month, Some(5));
        assert_eq!(test.periodicidad, None);
    }

    #[test]
    fn explicit_path_is_read_and_validated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "totals_tolerance_pesos": 2, "retry_wait_seconds": 5 }"#).unwrap();
        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.config.totals_tolerance_pesos, 2.0);
        assert_eq!(loaded.config.retry_wait_seconds, 5);
        assert_eq!(loaded.path, Some(path.clone()));

        std::fs::write(&path, r#"{ "totals_tolerance_pesos": -1 }"#).unwrap();
        assert!(load_config(Some(&path)).is_err());
        assert!(load_config(Some(&dir.path().join("absent.json"))).is_err());
    }

    #[test]
    #[serial]
    fn falls_back_to_defaults_without_files() {
        let dir = TempDir::new().unwrap();
        let previous = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let loaded = load_config(None);
        std::env::set_current_dir(previous).unwrap();
        let loaded = loaded.unwrap();
        assert_eq!(loaded.config.sat_portal_url, DEFAULT_PORTAL_URL);
    }

    #[test]
    fn shipped_example_parses() {
        let example = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/config.example.json");
        let loaded = load_config(Some(&example)).unwrap();
        let test = loaded.config.test_settings();
        assert_eq!(test.year, Some(2025));
        assert_eq!(test.periodicidad, Some(1));
        assert!(loaded.config.credentials_catalog.is_some());
    }
}
