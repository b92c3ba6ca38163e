//! Main processing engine with modular architecture.
//!
//! Orchestrates the staged regional indicator pipeline for one dataset
//! group: load and join the cleaned tables, impute, normalise and score the
//! indicators, then partition the regions into output units. Each stage
//! writes its result under the data directory and is skipped on later runs
//! unless forced.

pub mod composites;
pub mod imputation;
pub mod loader;
pub mod normalization;
pub mod partition;
pub mod writer;

#[cfg(test)]
pub mod tests;

use self::composites::{active_composites, score};
use self::imputation::impute_columns;
use self::loader::{read_region_csv, Loader};
use self::normalization::{normalize_columns, standardize_columns};
use self::partition::split;
use self::writer::{write_stage_csv, UnitWriter};

use crate::config::PipelineConfig;
use crate::constants::{CLEANED_DIR, JOINED_DIR, PREPROCESSED_DIR, SPLIT_DIR};
use crate::error::{RegionError, Result};
use crate::hierarchy::Hierarchy;
use crate::models::{ImputationSummary, NormalizationSummary, ProcessingStats, RegionTable};
use crate::schema::coerce_region_frame;

use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use tokio::task;
use tracing::{info, info_span, warn};

/// Summary of the in-memory preparation (impute, normalise, score)
#[derive(Debug, Clone, Default)]
pub struct Preparation {
    pub imputation: ImputationSummary,
    pub normalization: NormalizationSummary,
    pub composites: Vec<String>,
}

/// Processor for one dataset group
#[derive(Debug, Clone)]
pub struct RegionProcessor {
    identifiers: Vec<String>,
    key: String,
    config: PipelineConfig,
}

impl RegionProcessor {
    /// Create a processor for the configured identifiers under `data_dir`
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let config = PipelineConfig::default().with_data_dir(data_dir);
        Self::from_config(config)
    }

    /// Create a processor from a full configuration
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        let cleaned = config.data_dir.join(CLEANED_DIR);
        if !cleaned.exists() {
            return Err(RegionError::DatasetNotFound { path: cleaned });
        }

        let identifiers = config.identifiers.clone();
        Ok(Self {
            key: PipelineConfig::group_key(&identifiers),
            identifiers,
            config,
        })
    }

    /// Configure the processor, keeping its data directory
    pub fn with_config(mut self, config: PipelineConfig) -> Result<Self> {
        let config = config.with_data_dir(self.config.data_dir.clone());
        config.validate()?;
        self.identifiers = config.identifiers.clone();
        self.key = PipelineConfig::group_key(&self.identifiers);
        self.config = config;
        Ok(self)
    }

    /// Name of the joined dataset, e.g. `84583NED_84718NED`
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn joined_path(&self) -> PathBuf {
        self.config
            .data_dir
            .join(JOINED_DIR)
            .join(format!("{}.csv", self.key))
    }

    pub fn preprocessed_path(&self) -> PathBuf {
        self.config
            .data_dir
            .join(PREPROCESSED_DIR)
            .join(format!("{}.csv", self.key))
    }

    pub fn split_dir(&self) -> PathBuf {
        self.config.data_dir.join(SPLIT_DIR).join(&self.key)
    }

    fn hierarchy(&self) -> Hierarchy {
        Hierarchy::new(self.config.hierarchy_levels.iter().cloned())
    }

    /// Run every stage on a blocking worker thread
    pub async fn process(&self) -> Result<ProcessingStats> {
        let processor = self.clone();
        task::spawn_blocking(move || processor.process_blocking())
            .await
            .map_err(|e| RegionError::ProcessingInterrupted {
                reason: format!("worker for {} failed: {}", self.key, e),
            })?
    }

    /// Run every stage on the current thread
    pub fn process_blocking(&self) -> Result<ProcessingStats> {
        let span = info_span!("dataset", key = %self.key);
        let _guard = span.enter();
        let start_time = Instant::now();

        let mut stats = ProcessingStats {
            dataset: self.key.clone(),
            output_path: self.split_dir(),
            ..Default::default()
        };

        let split_dir = self.split_dir();
        if split_dir.exists() && !self.config.force {
            info!("Split output {} exists, skipping", split_dir.display());
            stats.stages_skipped.push(SPLIT_DIR.to_string());
        } else {
            let table = self.preprocessed(&mut stats)?;
            self.split_stage(&table, &mut stats)?;
        }

        stats.processing_time_ms = start_time.elapsed().as_millis();
        info!(
            "Finished {} in {}ms ({} units, {} refused subtrees)",
            self.key, stats.processing_time_ms, stats.units_written, stats.integrity_failures
        );
        Ok(stats)
    }

    /// The joined table, loaded from disk when the stage already ran
    pub fn joined(&self, stats: &mut ProcessingStats) -> Result<RegionTable> {
        let path = self.joined_path();
        let table = if path.exists() && !self.config.force {
            info!("Joined table {} exists, reloading", path.display());
            stats.stages_skipped.push(JOINED_DIR.to_string());
            let frame = coerce_region_frame(&read_region_csv(&path)?)?;
            RegionTable::new(&self.key, frame, self.hierarchy())?
        } else {
            let loader = Loader::new(&self.config)?;
            let frame = loader.load_joined(&self.key, &self.identifiers)?;
            let table = RegionTable::new(&self.key, frame, self.hierarchy())?;
            write_stage_csv(&path, table.frame())?;
            info!("Joined {} regions into {}", table.height(), path.display());
            table
        };

        stats.rows_loaded = table.height();
        stats.regions_per_level = self
            .config
            .hierarchy_levels
            .iter()
            .cloned()
            .zip(table.tree().count_by_depth())
            .collect();
        Ok(table)
    }

    /// The preprocessed (scored) table, loaded from disk when the stage
    /// already ran
    pub fn preprocessed(&self, stats: &mut ProcessingStats) -> Result<RegionTable> {
        let path = self.preprocessed_path();
        if path.exists() && !self.config.force {
            info!("Preprocessed table {} exists, reloading", path.display());
            stats.stages_skipped.push(PREPROCESSED_DIR.to_string());
            let frame = coerce_region_frame(&read_region_csv(&path)?)?;
            let table = RegionTable::new(&self.key, frame, self.hierarchy())?;
            stats.rows_loaded = table.height();
            stats.composites = table.indicator_columns();
            return Ok(table);
        }

        let joined = self.joined(stats)?;
        let (scored, preparation) = self.prepare(&joined)?;
        write_stage_csv(&path, scored.frame())?;

        stats.cells_imputed = preparation.imputation.total_filled();
        stats.degenerate_columns = preparation.normalization.degenerate;
        stats.composites = preparation.composites;
        Ok(scored)
    }

    /// Impute, normalise and score a joined table in memory
    pub fn prepare(&self, joined: &RegionTable) -> Result<(RegionTable, Preparation)> {
        let specs = active_composites(joined, &self.config.composites)?;

        let mut imputed_columns: Vec<String> = Vec::new();
        let mut normalized_columns: Vec<String> = Vec::new();
        for spec in &specs {
            for input in spec.rule.inputs() {
                if !imputed_columns.iter().any(|c| c == input) {
                    imputed_columns.push(input.to_string());
                }
                if !spec.rule.is_flag() && !normalized_columns.iter().any(|c| c == input) {
                    normalized_columns.push(input.to_string());
                }
            }
        }

        let (imputed, imputation) = impute_columns(joined, &imputed_columns)?;
        let (normalized, normalization) =
            normalize_columns(&imputed, &normalized_columns, &self.config)?;
        let mut scored = score(&normalized, &imputed, &specs, &self.config)?;

        let ratios: Vec<String> = specs
            .iter()
            .filter(|s| !s.rule.is_flag())
            .map(|s| s.name.clone())
            .collect();
        if self.config.standardize_composites {
            scored = standardize_columns(&scored, &ratios)?;
        }

        let preparation = Preparation {
            imputation,
            normalization,
            composites: specs.iter().map(|s| s.name.clone()).collect(),
        };
        Ok((scored, preparation))
    }

    fn split_stage(&self, table: &RegionTable, stats: &mut ProcessingStats) -> Result<()> {
        let split_dir = self.split_dir();
        let partial = split_dir.with_extension("partial");
        if partial.exists() {
            fs::remove_dir_all(&partial)?;
        }

        let plan = split(table.tree(), self.config.output_mode, &self.config.root_unit_name);
        let writer = UnitWriter::new(&partial, &self.config);
        stats.units_written = writer.write_units(table, &plan.units)?;
        stats.integrity_failures = plan.failures.len();
        if !plan.failures.is_empty() {
            warn!(
                "{} subtrees of {} were refused and have no units",
                plan.failures.len(),
                self.key
            );
        }

        if split_dir.exists() {
            fs::remove_dir_all(&split_dir)?;
        }
        fs::rename(&partial, &split_dir)?;
        Ok(())
    }
}
