//! Core data structures and types for regional indicator processing.
//!
//! Defines the region table threaded through the pipeline stages and the
//! statistics each stage reports.

use crate::constants::IDENTITY_COLUMNS;
use crate::error::{RegionError, Result};
use crate::hierarchy::{Hierarchy, RegionTree};
use polars::prelude::*;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// A region table: one row per region, pre-ordered by hierarchy, with the
/// region tree reconstructed from that order.
///
/// Stages never reorder rows, so the tree is shared between a table and
/// every table derived from it.
#[derive(Debug, Clone)]
pub struct RegionTable {
    dataset: String,
    frame: DataFrame,
    tree: Arc<RegionTree>,
}

impl RegionTable {
    /// Wrap a frame, building its region tree
    pub fn new(dataset: impl Into<String>, frame: DataFrame, hierarchy: Hierarchy) -> Result<Self> {
        let dataset = dataset.into();
        let tree = RegionTree::from_frame(&dataset, &frame, hierarchy)?;
        Ok(Self {
            dataset,
            frame,
            tree: Arc::new(tree),
        })
    }

    /// Derive a table with new column content but the same rows
    pub fn with_frame(&self, frame: DataFrame) -> Result<Self> {
        self.derive("transform", frame)
    }

    /// Derive a table for a named stage; a stage may not add or drop rows
    pub fn derive(&self, stage: &str, frame: DataFrame) -> Result<Self> {
        if frame.height() != self.frame.height() {
            return Err(RegionError::RowCountChanged {
                dataset: self.dataset.clone(),
                stage: stage.to_string(),
                expected: self.frame.height(),
                actual: frame.height(),
            });
        }
        Ok(Self {
            dataset: self.dataset.clone(),
            frame,
            tree: Arc::clone(&self.tree),
        })
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn tree(&self) -> &RegionTree {
        &self.tree
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.frame.get_column_index(name).is_some()
    }

    /// Column names that are not identity columns
    pub fn indicator_columns(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .filter(|name| !IDENTITY_COLUMNS.contains(&name.as_str()))
            .collect()
    }

    /// Values of a numeric column as `f64`, with nulls and NaN as `None`
    pub fn numeric_values(&self, name: &str) -> Result<Vec<Option<f64>>> {
        let column = self
            .frame
            .column(name)
            .map_err(|_| RegionError::schema(&self.dataset, name))?;
        let cast = column.cast(&DataType::Float64)?;
        Ok(cast
            .f64()?
            .into_iter()
            .map(|v| v.filter(|x| !x.is_nan()))
            .collect())
    }

    /// Count of missing (null or NaN) values in a numeric column
    pub fn missing_count(&self, name: &str) -> Result<usize> {
        Ok(self
            .numeric_values(name)?
            .iter()
            .filter(|v| v.is_none())
            .count())
    }

    /// Derive a table with one numeric column replaced (or appended)
    pub fn with_numeric_column(&self, name: &str, values: Vec<Option<f64>>) -> Result<Self> {
        let mut frame = self.frame.clone();
        frame.with_column(Column::new(name.into(), values))?;
        self.derive(&format!("update of {}", name), frame)
    }
}

/// Imputation stage summary
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImputationSummary {
    /// Cells filled from an ancestor, per column
    pub filled: Vec<(String, usize)>,
}

impl ImputationSummary {
    pub fn total_filled(&self) -> usize {
        self.filled.iter().map(|(_, n)| n).sum()
    }
}

/// Normalisation stage summary
#[derive(Debug, Clone, Default, Serialize)]
pub struct NormalizationSummary {
    pub columns: Vec<String>,
    /// Columns whose min-max range collapsed and were filled with a constant
    pub degenerate: Vec<String>,
}

/// One output unit: the rows emitted for one region
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionUnit {
    /// Region code, or the root unit name
    pub code: String,
    pub name: String,
    /// Level name of the region the unit belongs to
    pub level: String,
    /// Codes of the enclosing regions, outermost first (excluding `code`)
    pub ancestors: Vec<String>,
    /// Table rows in the unit, in table order
    pub rows: Vec<usize>,
    /// Codes of child regions that have a unit of their own
    pub child_units: Vec<String>,
}

/// Processing statistics for one dataset group
#[derive(Debug, Default, Clone, Serialize)]
pub struct ProcessingStats {
    pub dataset: String,
    pub rows_loaded: usize,
    pub regions_per_level: Vec<(String, usize)>,
    pub cells_imputed: usize,
    pub degenerate_columns: Vec<String>,
    pub composites: Vec<String>,
    pub units_written: usize,
    pub integrity_failures: usize,
    pub stages_skipped: Vec<String>,
    pub output_path: PathBuf,
    pub processing_time_ms: u128,
}
