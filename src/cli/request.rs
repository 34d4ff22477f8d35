//! Turns parsed arguments plus configuration into a [`RunRequest`].

use action_locator::{FieldMapping, WaitBudgets};
use action_primitives::ActionTimings;
use cdp_adapter::{detect_chrome_executable, CdpConfig};
use chrono::Datelike;
use std::time::Duration;
use tracing::info;

use super::commands::Commands;
use super::env::CliArgs;
use crate::config::{AppConfig, TestSettings};
use crate::errors::EngineError;
use crate::phases::{PhaseTimings, WizardSettings};
use crate::sources::{
    CatalogCredentialSource, CredentialSource, Credentials, CsvValueSource, StaticValueSource,
    TestCredentialSource, ValueSource,
};
use crate::supervisor::RunRequest;
use crate::values::ExternalValueSet;

/// Loads figures and credentials for the chosen command. Nothing has been
/// launched yet: failures are a usage error or a missing prerequisite.
pub fn build_request(
    cli: &CliArgs,
    config: &AppConfig,
    mapping: FieldMapping,
) -> Result<RunRequest, EngineError> {
    let test = config.test_settings();
    let (values, credentials) = match &cli.command {
        Commands::Run(args) => {
            let values = CsvValueSource::new(&args.workbook).load()?;
            (values, catalog_credentials(config, &args.company_id, &args.branch_id)?)
        }
        Commands::TestLogin | Commands::TestInitialForm => {
            (test_period(&test)?, test_credentials(&test)?)
        }
        Commands::TestPhase3(args) | Commands::TestFull(args) => {
            let Some(workbook) = args.workbook.as_ref().or(test.workbook_path.as_ref()) else {
                return Err(EngineError::Usage(format!(
                    "{} requires --workbook or test.workbook_path in the config",
                    cli.command.name()
                )));
            };
            if !workbook.is_file() {
                return Err(EngineError::Usage(format!(
                    "workbook not found: {}",
                    workbook.display()
                )));
            }
            let values = with_test_period(CsvValueSource::new(workbook).load()?, &test);
            (values, test_credentials(&test)?)
        }
    };
    info!(
        command = cli.command.name(),
        period = %values.period,
        figures = values.len(),
        "run request ready"
    );

    Ok(RunRequest {
        mode: cli.command.mode(),
        values,
        credentials,
        mapping,
        settings: WizardSettings {
            portal_url: config.sat_portal_url.clone(),
            totals_tolerance: config.totals_tolerance_pesos,
            timings: PhaseTimings::default(),
        },
        retry_wait: Duration::from_secs(config.retry_wait_seconds),
        budgets: WaitBudgets::default(),
        action_timings: ActionTimings::default(),
    })
}

/// Browser settings: `--headless` wins over the config, which wins over
/// `SAT_HEADLESS`.
pub fn cdp_config(cli: &CliArgs, config: &AppConfig) -> CdpConfig {
    let mut cdp = CdpConfig::default();
    if let Some(path) = config.chrome_path.clone().or_else(detect_chrome_executable) {
        cdp = cdp.with_executable(path);
    }
    let headless = cli.headless || config.headless.unwrap_or(cdp.headless);
    cdp.headless(headless)
}

fn catalog_credentials(
    config: &AppConfig,
    company_id: &str,
    branch_id: &str,
) -> Result<Credentials, EngineError> {
    let (Some(catalog), Some(base)) = (&config.credentials_catalog, &config.fiel_certificate_base_path)
    else {
        return Err(EngineError::Prerequisite(
            "run requires credentials_catalog and fiel_certificate_base_path in the config"
                .to_string(),
        ));
    };
    CatalogCredentialSource::from_file(catalog, base.as_path())?.credentials(company_id, branch_id)
}

fn test_credentials(test: &TestSettings) -> Result<Credentials, EngineError> {
    TestCredentialSource::new(test.clone()).credentials("test", "test")
}

fn test_period(test: &TestSettings) -> Result<ExternalValueSet, EngineError> {
    let year = test.year.unwrap_or_else(|| chrono::Local::now().year());
    let month = test.month.unwrap_or(1);
    let periodicidad = test.periodicidad.unwrap_or(1);
    if !(1..=12).contains(&month) {
        return Err(EngineError::Prerequisite(format!(
            "test month must be 1..=12, got {month}"
        )));
    }
    StaticValueSource::period(year, month, periodicidad).load()
}

/// Fills period fields the workbook did not carry from the test settings.
fn with_test_period(mut values: ExternalValueSet, test: &TestSettings) -> ExternalValueSet {
    let period = &mut values.period;
    if period.year.is_none() {
        period.year = Some(test.year.unwrap_or_else(|| chrono::Local::now().year()));
    }
    if period.month.is_none() {
        period.month = Some(test.month.unwrap_or(1));
    }
    if period.periodicidad.is_none() {
        period.periodicidad = test.periodicidad;
    }
    values
}
