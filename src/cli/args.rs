//! Command-line argument definitions for the region processor
//!
//! Defines the CLI interface using the clap derive API.

use crate::config::{NormalizationStrategy, OutputFormat, OutputLayout, OutputMode};
use crate::error::{RegionError, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::str::FromStr;

/// CLI arguments for the regional indicator processor
///
/// Joins regional statistics tables, repairs missing values along the
/// region hierarchy, derives composite indicators and writes one output
/// unit per region.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "region-processor",
    version,
    about = "Derive composite regional indicators and split them into per-region units",
    long_about = "Processes cleaned regional statistics tables (country, municipality, district, \
                  neighbourhood) through a staged pipeline: join, hierarchical imputation, \
                  normalisation, composite scoring and partitioning into one output unit per \
                  region. Every stage writes its result under the data directory and is skipped \
                  on later runs unless --force is given."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Run the pipeline for one or more dataset groups
    Process(ProcessArgs),
    /// Load and join a dataset group and report on it without writing
    Inspect(InspectArgs),
}

/// Arguments for the process command
#[derive(Debug, Clone, Parser)]
pub struct ProcessArgs {
    /// Data directory holding `cleaned/` and the stage outputs
    #[arg(
        short = 'd',
        long = "data-dir",
        value_name = "PATH",
        help = "Data directory (default: ./data or the config file's data_dir)"
    )]
    pub data_dir: Option<PathBuf>,

    /// Dataset group to process, as a comma-separated list of identifiers
    ///
    /// Repeat the flag to process several independent groups concurrently.
    /// Without it the identifiers from the configuration form one group.
    #[arg(
        short = 'g',
        long = "group",
        value_name = "IDS",
        help = "Comma-separated identifiers joined into one dataset (repeatable)"
    )]
    pub groups: Vec<IdentifierGroup>,

    /// Path to configuration file
    ///
    /// TOML configuration file. If not specified, looks for
    /// <config dir>/region-processor/config.toml
    #[arg(
        short = 'c',
        long = "config",
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    pub config_file: Option<PathBuf>,

    #[arg(long = "strategy", value_enum, help = "Normalisation strategy")]
    pub strategy: Option<NormalizationStrategy>,

    #[arg(long = "mode", value_enum, help = "Content of each output unit")]
    pub mode: Option<OutputMode>,

    #[arg(long = "layout", value_enum, help = "Arrangement of output unit files")]
    pub layout: Option<OutputLayout>,

    #[arg(long = "format", value_enum, help = "File format of output units")]
    pub format: Option<OutputFormat>,

    /// Recompute stages whose output already exists
    #[arg(long = "force", help = "Recompute every stage even if its output exists")]
    pub force: bool,

    /// Number of dataset groups processed concurrently
    #[arg(
        short = 'j',
        long = "workers",
        value_name = "COUNT",
        help = "Number of dataset groups processed concurrently"
    )]
    pub workers: Option<usize>,

    /// Logging verbosity level
    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help = "Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)"
    )]
    pub verbose: u8,

    /// Suppress output (quiet mode)
    #[arg(
        short = 'q',
        long = "quiet",
        help = "Suppress output except errors",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,

    #[arg(
        long = "output-format",
        value_enum,
        default_value = "human",
        help = "Output format for the run summary"
    )]
    pub output_format: ReportFormat,
}

/// Arguments for the inspect command
#[derive(Debug, Clone, Parser)]
pub struct InspectArgs {
    #[arg(
        short = 'd',
        long = "data-dir",
        value_name = "PATH",
        help = "Data directory (default: ./data or the config file's data_dir)"
    )]
    pub data_dir: Option<PathBuf>,

    #[arg(
        short = 'g',
        long = "group",
        value_name = "IDS",
        help = "Comma-separated identifiers to join (default: configured identifiers)"
    )]
    pub group: Option<IdentifierGroup>,

    #[arg(
        short = 'c',
        long = "config",
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    pub config_file: Option<PathBuf>,

    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help = "Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)"
    )]
    pub verbose: u8,

    #[arg(
        long = "output-format",
        value_enum,
        default_value = "human",
        help = "Output format for the report"
    )]
    pub output_format: ReportFormat,
}

/// Output format for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable output
    Human,
    /// JSON format for scripting
    Json,
}

/// Wrapper for parsing comma-separated identifier lists
#[derive(Debug, Clone, PartialEq)]
pub struct IdentifierGroup {
    pub identifiers: Vec<String>,
}

impl FromStr for IdentifierGroup {
    type Err = RegionError;

    fn from_str(s: &str) -> Result<Self> {
        let identifiers: Vec<String> = s
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if identifiers.is_empty() {
            return Err(RegionError::configuration("identifier group cannot be empty"));
        }
        if let Some(bad) = identifiers
            .iter()
            .find(|id| id.contains(['/', '\\']) || id.starts_with('.'))
        {
            return Err(RegionError::configuration(format!(
                "invalid dataset identifier '{}'",
                bad
            )));
        }

        Ok(IdentifierGroup { identifiers })
    }
}

/// Map verbosity flags to a tracing level name
pub fn log_level(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

impl ProcessArgs {
    pub fn get_log_level(&self) -> &'static str {
        log_level(self.verbose, self.quiet)
    }

    /// Check if we should show progress bars (not in quiet mode)
    pub fn show_progress(&self) -> bool {
        !self.quiet
    }
}

impl InspectArgs {
    pub fn get_log_level(&self) -> &'static str {
        log_level(self.verbose, false)
    }
}
