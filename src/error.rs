//! Error handling for the regional indicator pipeline.
//!
//! Covers the pipeline's failure taxonomy (schema, imputation, degenerate
//! ranges, data integrity and partition integrity) together with the I/O,
//! Polars and configuration failures surrounding it.

use std::path::PathBuf;
use thiserror::Error;

/// A composite input that was still missing (or produced a non-finite score)
/// when the scorer reached it.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegrityViolation {
    pub code: String,
    pub column: String,
}

#[derive(Error, Debug)]
pub enum RegionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    ConfigFile(#[from] toml::de::Error),

    #[error("Dataset not found at path: {path}")]
    DatasetNotFound { path: PathBuf },

    #[error("Schema error in dataset {dataset}: required column '{column}' is absent")]
    Schema { dataset: String, column: String },

    #[error("Unknown region type '{value}' at row {row} of dataset {dataset}")]
    UnknownRegionType {
        dataset: String,
        row: usize,
        value: String,
    },

    #[error("Imputation failed for column '{column}': no ancestor value for region {path}")]
    Imputation { column: String, path: String },

    #[error("Degenerate range in column '{column}': every value equals {value}")]
    DegenerateRange { column: String, value: f64 },

    #[error(
        "Data integrity failure in dataset {dataset}: {} missing or non-finite composite inputs ({})",
        .violations.len(),
        summarize_violations(.violations)
    )]
    DataIntegrity {
        dataset: String,
        violations: Vec<IntegrityViolation>,
    },

    #[error("Partition integrity violated at region {code} (row {row}): {reason}")]
    PartitionIntegrity {
        code: String,
        row: usize,
        reason: String,
    },

    #[error("Stage {stage} of dataset {dataset} changed the row count from {expected} to {actual}")]
    RowCountChanged {
        dataset: String,
        stage: String,
        expected: usize,
        actual: usize,
    },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Processing interrupted: {reason}")]
    ProcessingInterrupted { reason: String },
}

impl RegionError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a schema error for a missing column
    pub fn schema(dataset: impl Into<String>, column: impl Into<String>) -> Self {
        Self::Schema {
            dataset: dataset.into(),
            column: column.into(),
        }
    }

    /// Errors that stop the whole run rather than one dataset group
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            RegionError::Configuration { .. } | RegionError::ProcessingInterrupted { .. }
        )
    }
}

fn summarize_violations(violations: &[IntegrityViolation]) -> String {
    const SHOWN: usize = 5;
    let mut parts: Vec<String> = violations
        .iter()
        .take(SHOWN)
        .map(|v| format!("{}/{}", v.code, v.column))
        .collect();
    if violations.len() > SHOWN {
        parts.push(format!("and {} more", violations.len() - SHOWN));
    }
    parts.join(", ")
}

pub type Result<T> = std::result::Result<T, RegionError>;
