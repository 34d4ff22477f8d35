use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

use super::{CredentialSource, Credentials};
use crate::config::TestSettings;
use crate::errors::EngineError;

/// Credentials from the config `test` block, for the dry-run modes.
pub struct TestCredentialSource {
    settings: TestSettings,
}

impl TestCredentialSource {
    pub fn new(settings: TestSettings) -> Self {
        Self { settings }
    }
}

impl CredentialSource for TestCredentialSource {
    fn credentials(&self, _company_id: &str, _branch_id: &str) -> Result<Credentials, EngineError> {
        let (Some(cer), Some(key)) = (&self.settings.cer_path, &self.settings.key_path) else {
            return Err(EngineError::Prerequisite(
                "test mode requires test.cer_path and test.key_path (or test_cer_path / test_key_path)"
                    .to_string(),
            ));
        };
        let creds = Credentials {
            cer_path: absolute(cer),
            key_path: absolute(key),
            password: self.settings.password.clone().unwrap_or_default(),
            rfc: self.settings.rfc.clone().unwrap_or_default(),
        };
        creds.validate()?;
        info!(cer = %creds.cer_path.display(), "using test credentials");
        Ok(creds)
    }
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    cer: String,
    key: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    rfc: String,
}

/// JSON catalog keyed by `company/branch`, holding file names relative to
/// `<base>/<company>/<branch>/`.
pub struct CatalogCredentialSource {
    base_path: PathBuf,
    entries: BTreeMap<String, CatalogEntry>,
}

impl CatalogCredentialSource {
    pub fn from_file(catalog: &Path, base_path: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let raw = std::fs::read_to_string(catalog).map_err(|err| {
            EngineError::Prerequisite(format!(
                "cannot read credentials catalog {}: {err}",
                catalog.display()
            ))
        })?;
        Self::from_json(&raw, base_path)
    }

    pub fn from_json(raw: &str, base_path: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let entries = serde_json::from_str(raw).map_err(|err| {
            EngineError::Prerequisite(format!("invalid credentials catalog: {err}"))
        })?;
        Ok(Self {
            base_path: base_path.into(),
            entries,
        })
    }
}

impl CredentialSource for CatalogCredentialSource {
    fn credentials(&self, company_id: &str, branch_id: &str) -> Result<Credentials, EngineError> {
        let key = format!("{company_id}/{branch_id}");
        let entry = self.entries.get(&key).ok_or_else(|| {
            EngineError::Prerequisite(format!("no e.firma data for company {company_id}, branch {branch_id}"))
        })?;
        let folder = self.base_path.join(company_id).join(branch_id);
        let creds = Credentials {
            cer_path: absolute(&folder.join(&entry.cer)),
            key_path: absolute(&folder.join(&entry.key)),
            password: entry.password.clone(),
            rfc: entry.rfc.clone(),
        };
        creds.validate()?;
        info!(company = company_id, branch = branch_id, rfc = %creds.rfc, "e.firma resolved");
        Ok(creds)
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn catalog_joins_base_company_and_branch() {
        let dir = TempDir::new().unwrap();
        let folder = dir.path().join("12").join("1");
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(folder.join("empresa.cer"), b"c").unwrap();
        std::fs::write(folder.join("empresa.key"), b"k").unwrap();

        let source = CatalogCredentialSource::from_json(
            r#"{ "12/1": { "cer": "empresa.cer", "key": "empresa.key", "password": "pw", "rfc": "EKU9003173C9" } }"#,
            dir.path(),
        )
        .unwrap();
        let creds = source.credentials("12", "1").unwrap();
        assert!(creds.cer_path.ends_with("12/1/empresa.cer"));
        assert_eq!(creds.password, "pw");

        assert!(matches!(
            source.credentials("12", "2"),
            Err(EngineError::Prerequisite(_))
        ));
    }

    #[test]
    fn test_block_requires_paths() {
        let source = TestCredentialSource::new(TestSettings::default());
        assert!(matches!(
            source.credentials("", ""),
            Err(EngineError::Prerequisite(_))
        ));
    }
}
