//! Unit and stage file writing
//!
//! Writes stage tables and partition units as CSV or Parquet, and the
//! `manifest.json` describing the units of a split directory.

use crate::config::{OutputFormat, OutputLayout, OutputMode, PipelineConfig};
use crate::constants::MANIFEST_FILE_NAME;
use crate::error::Result;
use crate::models::{RegionTable, RegionUnit};

use indicatif::{ProgressBar, ProgressStyle};
use polars::prelude::*;
use serde::Serialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Unit count above which a progress bar is shown
const PROGRESS_THRESHOLD: usize = 500;

/// Write a frame as CSV with a header row
pub fn write_csv(path: &Path, frame: &DataFrame) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut frame = frame.clone();
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut frame)?;
    Ok(())
}

/// Write a frame as Snappy-compressed Parquet
pub fn write_parquet(path: &Path, frame: &DataFrame) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut frame = frame.clone();
    let file = File::create(path)?;
    ParquetWriter::new(file)
        .with_compression(ParquetCompression::Snappy)
        .finish(&mut frame)?;
    Ok(())
}

/// Write a stage table to `path` via a temporary sibling, so an interrupted
/// run never leaves a partial stage file behind.
pub fn write_stage_csv(path: &Path, frame: &DataFrame) -> Result<()> {
    let partial = path.with_extension("csv.partial");
    write_csv(&partial, frame)?;
    fs::rename(&partial, path)?;
    debug!("Wrote stage file {}", path.display());
    Ok(())
}

/// One manifest entry
#[derive(Debug, Clone, Serialize)]
pub struct ManifestEntry {
    pub code: String,
    pub name: String,
    pub level: String,
    /// Relative to the split directory
    pub path: PathBuf,
    pub rows: usize,
    pub children: Vec<String>,
}

/// Index of the units in a split directory
#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub dataset: String,
    pub mode: OutputMode,
    pub layout: OutputLayout,
    pub format: OutputFormat,
    pub levels: Vec<String>,
    pub units: Vec<ManifestEntry>,
}

/// Writes partition units into a split directory
#[derive(Debug, Clone)]
pub struct UnitWriter {
    output_dir: PathBuf,
    mode: OutputMode,
    layout: OutputLayout,
    format: OutputFormat,
}

impl UnitWriter {
    pub fn new(output_dir: impl Into<PathBuf>, config: &PipelineConfig) -> Self {
        Self {
            output_dir: output_dir.into(),
            mode: config.output_mode,
            layout: config.output_layout,
            format: config.output_format,
        }
    }

    /// Path of a unit file relative to the output directory
    pub fn unit_path(&self, unit: &RegionUnit) -> PathBuf {
        let file_name = format!("{}.{}", unit.code, self.format.extension());
        match self.layout {
            OutputLayout::Flat => PathBuf::from(file_name),
            OutputLayout::Nested => {
                let mut path: PathBuf = unit.ancestors.iter().collect();
                path.push(file_name);
                path
            }
        }
    }

    /// Write every unit and the manifest; returns the number of unit files
    pub fn write_units(&self, table: &RegionTable, units: &[RegionUnit]) -> Result<usize> {
        fs::create_dir_all(&self.output_dir)?;

        let progress = if units.len() > PROGRESS_THRESHOLD {
            let bar = ProgressBar::new(units.len() as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} units")
            {
                bar.set_style(style.progress_chars("#>-"));
            }
            Some(bar)
        } else {
            None
        };

        let mut entries = Vec::with_capacity(units.len());
        for unit in units {
            let relative = self.unit_path(unit);
            let indices: Vec<IdxSize> = unit.rows.iter().map(|&r| r as IdxSize).collect();
            let rows = table
                .frame()
                .take(&IdxCa::from_vec("rows".into(), indices))?;

            let path = self.output_dir.join(&relative);
            match self.format {
                OutputFormat::Csv => write_csv(&path, &rows)?,
                OutputFormat::Parquet => write_parquet(&path, &rows)?,
            }

            entries.push(ManifestEntry {
                code: unit.code.clone(),
                name: unit.name.clone(),
                level: unit.level.clone(),
                path: relative,
                rows: rows.height(),
                children: unit.child_units.clone(),
            });
            if let Some(bar) = &progress {
                bar.inc(1);
            }
        }
        if let Some(bar) = progress {
            bar.finish_and_clear();
        }

        let manifest = Manifest {
            dataset: table.dataset().to_string(),
            mode: self.mode,
            layout: self.layout,
            format: self.format,
            levels: table.tree().hierarchy().levels().to_vec(),
            units: entries,
        };
        self.write_manifest(&manifest)?;

        info!(
            "Wrote {} units to {}",
            units.len(),
            self.output_dir.display()
        );
        Ok(units.len())
    }

    fn write_manifest(&self, manifest: &Manifest) -> Result<PathBuf> {
        let path = self.output_dir.join(MANIFEST_FILE_NAME);
        let file = File::create(&path)?;
        serde_json::to_writer_pretty(file, manifest)?;
        debug!("Wrote manifest {}", path.display());
        Ok(path)
    }
}
