//! Shared components for CLI commands
//!
//! Logging setup, layered configuration loading, progress bars and the run
//! summary used by the command implementations.

use crate::cli::args::ProcessArgs;
use crate::config::PipelineConfig;
use crate::models::ProcessingStats;
use anyhow::{Context, Result};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Summary of a process run across all dataset groups
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Statistics of the groups that completed
    pub groups: Vec<ProcessingStats>,
    /// Groups that failed, with their error message
    pub failures: Vec<(String, String)>,
    /// Total size of the split outputs in bytes
    pub output_bytes: u64,
    pub elapsed_ms: u128,
}

impl RunSummary {
    pub fn units_written(&self) -> usize {
        self.groups.iter().map(|g| g.units_written).sum()
    }

    pub fn integrity_failures(&self) -> usize {
        self.groups.iter().map(|g| g.integrity_failures).sum()
    }

    /// Format a size in human-readable form
    pub fn format_size(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", bytes, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Print the colored human summary to stdout
    pub fn print(&self) {
        println!("\n{}", "Processing Summary".bright_green().bold());
        println!(
            "  {} {}ms",
            "Time elapsed:".bright_cyan(),
            self.elapsed_ms.to_string().bright_white()
        );
        for group in &self.groups {
            let skipped = if group.stages_skipped.is_empty() {
                String::new()
            } else {
                format!(" (skipped: {})", group.stages_skipped.join(", "))
            };
            println!(
                "  {} {} regions, {} units{}",
                format!("{}:", group.dataset).bright_cyan(),
                group.rows_loaded.to_string().bright_white(),
                group.units_written.to_string().bright_white().bold(),
                skipped.dimmed()
            );
            if !group.degenerate_columns.is_empty() {
                println!(
                    "    {} {}",
                    "Degenerate columns:".yellow(),
                    group.degenerate_columns.join(", ")
                );
            }
            if group.integrity_failures > 0 {
                println!(
                    "    {} {}",
                    "Refused subtrees:".bright_red(),
                    group.integrity_failures.to_string().bright_red().bold()
                );
            }
        }
        for (key, message) in &self.failures {
            println!(
                "  {} {}",
                format!("{} failed:", key).bright_red(),
                message
            );
        }
        println!(
            "  {} {}",
            "Output size:".bright_cyan(),
            Self::format_size(self.output_bytes).bright_white()
        );
    }
}

/// Set up structured logging on stderr
pub fn setup_logging(log_level: &str, quiet: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("region_processor={}", log_level)));

    // try_init: a subscriber may already be installed (tests, embedding)
    let result = if quiet {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_timer(fmt::time::uptime())
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };

    if result.is_ok() {
        debug!("Logging initialized at level: {}", log_level);
    }
}

/// Load configuration: file (explicit or default location), then defaults
pub fn load_base_configuration(config_file: Option<&Path>) -> Result<PipelineConfig> {
    match config_file {
        Some(path) => info!("Using config file: {}", path.display()),
        None => match PipelineConfig::default_config_path().filter(|p| p.exists()) {
            Some(path) => info!("Using config file: {}", path.display()),
            None => info!("No config file found, using defaults"),
        },
    }

    PipelineConfig::load_layered(config_file).context("failed to load configuration")
}

/// Load configuration using the layered approach (file -> args)
pub fn load_configuration(args: &ProcessArgs) -> Result<PipelineConfig> {
    let mut config = load_base_configuration(args.config_file.as_deref())?;
    apply_cli_overrides(&mut config, args);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Apply CLI argument overrides to configuration
pub fn apply_cli_overrides(config: &mut PipelineConfig, args: &ProcessArgs) {
    if let Some(data_dir) = &args.data_dir {
        config.data_dir = data_dir.clone();
    }
    if let Some(strategy) = args.strategy {
        config.normalization_strategy = strategy;
    }
    if let Some(mode) = args.mode {
        config.output_mode = mode;
    }
    if let Some(layout) = args.layout {
        config.output_layout = layout;
    }
    if let Some(format) = args.format {
        config.output_format = format;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if args.force {
        config.force = true;
    }
}

/// Identifier groups to process: the CLI groups, else the configured one
pub fn identifier_groups(config: &PipelineConfig, args: &ProcessArgs) -> Vec<Vec<String>> {
    if args.groups.is_empty() {
        vec![config.identifiers.clone()]
    } else {
        args.groups.iter().map(|g| g.identifiers.clone()).collect()
    }
}

/// Total size of the files below a directory
pub fn directory_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable output entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}

/// Sum of the output sizes of completed groups
pub fn output_size(outputs: &[PathBuf]) -> u64 {
    outputs.iter().map(|p| directory_size(p)).sum()
}

/// Create a progress bar with appropriate styling
pub fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(message.to_string());
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::{Args, Commands};
    use clap::Parser;
    use std::fs;
    use tempfile::TempDir;

    fn process_args(argv: &[&str]) -> ProcessArgs {
        let mut full = vec!["region-processor", "process"];
        full.extend_from_slice(argv);
        match Args::parse_from(full).command {
            Some(Commands::Process(args)) => args,
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_format_size() {
        assert_eq!(RunSummary::format_size(500), "500 B");
        assert_eq!(RunSummary::format_size(1536), "1.50 KB");
        assert_eq!(RunSummary::format_size(1048576), "1.00 MB");
        assert_eq!(RunSummary::format_size(1073741824), "1.00 GB");
    }

    #[test]
    fn test_cli_overrides_take_precedence() {
        let args = process_args(&["-d", "/srv/data", "--workers", "3", "--strategy", "rank", "--force"]);
        let mut config = PipelineConfig::default();
        apply_cli_overrides(&mut config, &args);

        assert_eq!(config.data_dir, PathBuf::from("/srv/data"));
        assert_eq!(config.workers, 3);
        assert_eq!(
            config.normalization_strategy,
            crate::config::NormalizationStrategy::Rank
        );
        assert!(config.force);
    }

    #[test]
    fn test_identifier_groups_default_to_config() {
        let config = PipelineConfig::default();
        let groups = identifier_groups(&config, &process_args(&[]));
        assert_eq!(groups, vec![config.identifiers.clone()]);

        let groups = identifier_groups(&config, &process_args(&["-g", "A,B", "-g", "C"]));
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_load_configuration_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "identifiers = [\"X\"]\nroot_unit_name = \"index\"\n").unwrap();

        let args = process_args(&["-c", path.to_str().unwrap()]);
        let config = load_configuration(&args).unwrap();
        assert_eq!(config.identifiers, vec!["X"]);
        assert_eq!(config.root_unit_name, "index");
    }

    #[test]
    fn test_directory_size() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("a/b")).unwrap();
        fs::write(temp_dir.path().join("a/one.csv"), "12345").unwrap();
        fs::write(temp_dir.path().join("a/b/two.csv"), "123").unwrap();
        assert_eq!(directory_size(temp_dir.path()), 8);
        assert_eq!(output_size(&[temp_dir.path().join("a/b")]), 3);
    }
}
