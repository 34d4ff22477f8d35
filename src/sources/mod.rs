//! External collaborators: where figures and e.firma credentials come from.

mod credentials;
mod csv;
mod static_values;

pub use self::credentials::{CatalogCredentialSource, TestCredentialSource};
pub use self::csv::CsvValueSource;
pub use self::static_values::StaticValueSource;

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::errors::EngineError;
use crate::values::ExternalValueSet;

/// Produces the figures for one declaration.
pub trait ValueSource: Send + Sync {
    fn load(&self) -> Result<ExternalValueSet, EngineError>;
}

/// Looks up the e.firma of a company branch.
pub trait CredentialSource: Send + Sync {
    fn credentials(&self, company_id: &str, branch_id: &str) -> Result<Credentials, EngineError>;
}

/// e.firma: certificate, private key and its passphrase.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub cer_path: PathBuf,
    pub key_path: PathBuf,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub rfc: String,
}

impl Credentials {
    /// Both credential files must exist before a browser is opened.
    pub fn validate(&self) -> Result<(), EngineError> {
        require_file("certificate", &self.cer_path)?;
        require_file("key", &self.key_path)?;
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("cer_path", &self.cer_path)
            .field("key_path", &self.key_path)
            .field("password", &"***")
            .field("rfc", &self.rfc)
            .finish()
    }
}

fn require_file(what: &str, path: &Path) -> Result<(), EngineError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(EngineError::Prerequisite(format!(
            "{what} file not found: {}",
            path.display()
        )))
    }
}
