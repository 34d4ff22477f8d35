use clap::Parser;
use std::path::PathBuf;

use super::commands::Commands;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_HASH"),
    ", built ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(author, version, long_version = LONG_VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct CliArgs {
    /// Configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Field mapping file, overrides `mapping_path` from the config
    #[arg(short, long, value_name = "FILE", global = true)]
    pub mapping: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Enable debug mode
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Run the browser without a window
    #[arg(long, global = true)]
    pub headless: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::RunMode;

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = CliArgs::try_parse_from([
            "sat-declaration",
            "test-phase3",
            "--workbook",
            "202503_impuestos.csv",
            "--headless",
            "-d",
        ])
        .unwrap();
        assert_eq!(cli.command.mode(), RunMode::TestPhase3);
        assert_eq!(cli.command.name(), "test-phase3");
        assert!(cli.headless);
        assert!(cli.debug);
        assert_eq!(cli.log_level, "info");
        match cli.command {
            Commands::TestPhase3(args) => {
                assert_eq!(args.workbook, Some(PathBuf::from("202503_impuestos.csv")))
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn run_takes_company_and_branch() {
        let cli = CliArgs::try_parse_from([
            "sat-declaration",
            "--config",
            "config/config.json",
            "run",
            "--workbook",
            "w.csv",
            "--company-id",
            "7",
            "--branch-id",
            "1",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("config/config.json")));
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!((args.company_id.as_str(), args.branch_id.as_str()), ("7", "1"));
    }
}
