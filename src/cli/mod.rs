//! Command line front end
//!
//! Parses arguments, sets up logging, assembles a [`RunRequest`] from the
//! configuration and hands it to the supervisor. Exit codes: 0 success,
//! 1 run failure, 2 usage or configuration error, 130 interrupted.
//!
//! [`RunRequest`]: crate::supervisor::RunRequest

mod app;
mod commands;
mod env;
mod request;
mod runtime;

pub use app::run;
pub use commands::{Commands, RunArgs, WorkbookArgs};
pub use env::CliArgs;
pub use request::build_request;
pub use runtime::{init_logging, spawn_interrupt_handler, EXIT_USAGE, INTERRUPT_GRACE};
