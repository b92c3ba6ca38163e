//! Command implementations for the region processor CLI
//!
//! Each command lives in its own module:
//! - `process`: runs the staged pipeline for one or more dataset groups
//! - `inspect`: joins a dataset group in memory and reports on it

pub mod inspect;
pub mod process;
pub mod shared;

use crate::cli::args::{Args, Commands};
use anyhow::{bail, Result};

/// Dispatch to the subcommand handler
pub async fn run(args: Args) -> Result<()> {
    match args.command {
        Some(Commands::Process(process_args)) => {
            process::run_process(process_args).await?;
        }
        Some(Commands::Inspect(inspect_args)) => {
            inspect::run_inspect(inspect_args).await?;
        }
        None => bail!("no command given; run with --help for usage"),
    }
    Ok(())
}
