use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Usage or configuration error.
pub const EXIT_USAGE: i32 = 2;
const EXIT_INTERRUPTED: i32 = 130;

/// Time teardown gets after Ctrl+C before the process exits anyway.
pub const INTERRUPT_GRACE: Duration = Duration::from_secs(10);

/// Console logs go to stderr, stdout stays free. With a log file the same
/// events are also appended there; keep the guard alive until exit.
pub fn init_logging(level: &str, debug: bool, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let console = fmt::layer().with_writer(std::io::stderr).with_filter(filter());
    let (file, guard) = match log_file {
        Some(path) => {
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            std::fs::create_dir_all(dir)
                .with_context(|| format!("cannot create log directory {}", dir.display()))?;
            let name = path
                .file_name()
                .with_context(|| format!("log_file has no file name: {}", path.display()))?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .context("logging already initialised")?;
    Ok(guard)
}

/// First Ctrl+C cancels the run so the supervisor can log out. If the
/// teardown outlives `grace` the process exits with 130 regardless.
pub fn spawn_interrupt_handler(cancel: CancellationToken, grace: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            warn!("cannot listen for Ctrl+C");
            return;
        }
        eprintln!("Ctrl+C: exiting.");
        cancel.cancel();
        tokio::time::sleep(grace).await;
        warn!("teardown did not finish in time");
        std::process::exit(EXIT_INTERRUPTED);
    })
}
