//! Inspect command implementation
//!
//! Loads and joins a dataset group in memory, without writing any stage
//! output, and reports region counts per level, rows that break the
//! hierarchy ordering and the share of missing values per indicator.

use super::shared::{load_base_configuration, setup_logging};
use crate::cli::args::{InspectArgs, ReportFormat};
use crate::config::PipelineConfig;
use crate::hierarchy::{DetachedRegion, Hierarchy};
use crate::models::RegionTable;
use crate::processor::loader::{available_identifiers, Loader};
use anyhow::{Context, Result};
use colored::*;
use serde::Serialize;
use tokio::task;
use tracing::info;

/// Missing values of one indicator column
#[derive(Debug, Clone, Serialize)]
pub struct ColumnReport {
    pub column: String,
    pub missing: usize,
    pub missing_ratio: f64,
}

/// Result of inspecting one dataset group
#[derive(Debug, Clone, Serialize)]
pub struct InspectReport {
    pub dataset: String,
    pub identifiers: Vec<String>,
    pub available: Vec<String>,
    pub rows: usize,
    pub regions_per_level: Vec<(String, usize)>,
    pub detached: Vec<DetachedRegion>,
    pub columns: Vec<ColumnReport>,
}

/// Inspect command runner
pub async fn run_inspect(args: InspectArgs) -> Result<InspectReport> {
    setup_logging(args.get_log_level(), false);

    let mut config = load_base_configuration(args.config_file.as_deref())?;
    if let Some(data_dir) = &args.data_dir {
        config.data_dir = data_dir.clone();
    }
    if let Some(group) = &args.group {
        config.identifiers = group.identifiers.clone();
    }
    config.validate().context("invalid configuration")?;

    let report = task::spawn_blocking(move || build_report(&config))
        .await
        .context("inspect worker failed")??;

    match args.output_format {
        ReportFormat::Human => print_report(&report),
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(report)
}

/// Load, join and summarise a dataset group
pub fn build_report(config: &PipelineConfig) -> Result<InspectReport> {
    let key = PipelineConfig::group_key(&config.identifiers);
    info!("Inspecting {}", key);

    let loader = Loader::new(config)?;
    let frame = loader
        .load_joined(&key, &config.identifiers)
        .with_context(|| format!("failed to load dataset group {}", key))?;
    let table = RegionTable::new(
        &key,
        frame,
        Hierarchy::new(config.hierarchy_levels.iter().cloned()),
    )?;

    let rows = table.height();
    let columns = table
        .indicator_columns()
        .into_iter()
        .map(|column| {
            let missing = table.missing_count(&column)?;
            Ok(ColumnReport {
                missing_ratio: if rows == 0 {
                    0.0
                } else {
                    missing as f64 / rows as f64
                },
                column,
                missing,
            })
        })
        .collect::<crate::Result<Vec<_>>>()?;

    Ok(InspectReport {
        dataset: key,
        identifiers: config.identifiers.clone(),
        available: available_identifiers(&config.data_dir),
        rows,
        regions_per_level: config
            .hierarchy_levels
            .iter()
            .cloned()
            .zip(table.tree().count_by_depth())
            .collect(),
        detached: table.tree().detached().to_vec(),
        columns,
    })
}

fn print_report(report: &InspectReport) {
    println!("\n{}", format!("Dataset {}", report.dataset).bright_green().bold());
    println!(
        "  {} {}",
        "Regions:".bright_cyan(),
        report.rows.to_string().bright_white().bold()
    );
    for (level, count) in &report.regions_per_level {
        println!("    {:<16} {}", level, count);
    }

    if report.detached.is_empty() {
        println!("  {} none", "Ordering violations:".bright_cyan());
    } else {
        println!(
            "  {} {}",
            "Ordering violations:".bright_red(),
            report.detached.len().to_string().bright_red().bold()
        );
        for detached in &report.detached {
            println!(
                "    row {} {}: {}",
                detached.row, detached.code, detached.reason
            );
        }
    }

    println!("  {}", "Missing values:".bright_cyan());
    for column in &report.columns {
        let line = format!(
            "    {:<36} {:>6} ({:.1}%)",
            column.column,
            column.missing,
            column.missing_ratio * 100.0
        );
        if column.missing == 0 {
            println!("{}", line.dimmed());
        } else {
            println!("{}", line);
        }
    }
}
