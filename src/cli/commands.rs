use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::supervisor::RunMode;

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// File the provisional declaration of one company branch
    Run(RunArgs),

    /// Log in with the test e.firma and stop
    TestLogin,

    /// Log in and fill the initial form with the test period
    TestInitialForm,

    /// Run up to the income section with test credentials
    TestPhase3(WorkbookArgs),

    /// Run the whole wizard with test credentials
    TestFull(WorkbookArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Workbook export (`label,amount` CSV) with the period figures
    #[arg(long, value_name = "FILE")]
    pub workbook: PathBuf,

    /// Company id in the credentials catalog
    #[arg(long)]
    pub company_id: String,

    /// Branch id in the credentials catalog
    #[arg(long)]
    pub branch_id: String,
}

#[derive(Args, Debug, Clone, Default)]
pub struct WorkbookArgs {
    /// Workbook export, overrides `test.workbook_path` from the config
    #[arg(long, value_name = "FILE")]
    pub workbook: Option<PathBuf>,
}

impl Commands {
    pub fn mode(&self) -> RunMode {
        match self {
            Commands::Run(_) => RunMode::Full,
            Commands::TestLogin => RunMode::TestLogin,
            Commands::TestInitialForm => RunMode::TestInitialForm,
            Commands::TestPhase3(_) => RunMode::TestPhase3,
            Commands::TestFull(_) => RunMode::TestFull,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Commands::Run(_) => "run",
            Commands::TestLogin => "test-login",
            Commands::TestInitialForm => "test-initial-form",
            Commands::TestPhase3(_) => "test-phase3",
            Commands::TestFull(_) => "test-full",
        }
    }
}
