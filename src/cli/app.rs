use clap::error::ErrorKind;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::env::CliArgs;
use super::request::{build_request, cdp_config};
use super::runtime::{init_logging, spawn_interrupt_handler, EXIT_USAGE, INTERRUPT_GRACE};
use crate::config::{load_config, LoadedConfig};
use crate::errors::EngineError;
use crate::mapping::load_mapping;
use crate::session::ChromeLauncher;
use crate::supervisor::Supervisor;

const EXIT_FAILURE: i32 = 1;

/// Runs the command line and returns the process exit code.
pub async fn run() -> i32 {
    let cli = match CliArgs::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => EXIT_USAGE,
            };
            let _ = err.print();
            return code;
        }
    };

    // The log file comes from the config, so logging starts after it loads.
    let LoadedConfig { config, path } = match load_config(cli.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("FAIL: {err:#}");
            return EXIT_USAGE;
        }
    };
    let _guard = match init_logging(&cli.log_level, cli.debug, config.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("FAIL: {err:#}");
            return EXIT_USAGE;
        }
    };

    info!(
        "Starting sat-declaration v{} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH")
    );
    match &path {
        Some(path) => info!(path = %path.display(), "configuration loaded"),
        None => info!("no configuration file; using defaults"),
    }

    let mapping = match load_mapping(cli.mapping.as_deref(), config.mapping_path.as_deref()) {
        Ok(mapping) => mapping,
        Err(err) => {
            error!("{err:#}");
            eprintln!("FAIL: {err:#}");
            return EXIT_USAGE;
        }
    };

    let request = match build_request(&cli, &config, mapping) {
        Ok(request) => request,
        Err(err) => {
            error!(error = %err, "run request incomplete; browser not started");
            eprintln!("FAIL: {err}");
            return match err {
                EngineError::Usage(_) => EXIT_USAGE,
                _ => EXIT_FAILURE,
            };
        }
    };

    let cancel = CancellationToken::new();
    let interrupt = spawn_interrupt_handler(cancel.clone(), INTERRUPT_GRACE);
    let supervisor = Supervisor::new(ChromeLauncher::new(cdp_config(&cli, &config)), cancel);
    let outcome = supervisor.run(&request).await;
    interrupt.abort();

    info!(
        command = cli.command.name(),
        success = outcome.success,
        attempts = outcome.attempts,
        reached = ?outcome.reached,
        "run finished"
    );
    eprintln!("{outcome}");
    outcome.exit_code()
}
