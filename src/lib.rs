//! Region Processor Library
//!
//! Turns cleaned regional statistics tables (country, municipality, district,
//! neighbourhood rows in hierarchy pre-order) into composite regional
//! indicators, split into one output unit per region.
//!
//! The pipeline runs in stages, each persisted under the data directory:
//! - joining the cleaned tables of a dataset group on their region identity
//! - filling missing values from the nearest ancestor region
//! - rescaling indicators (min-max, rank or z-score)
//! - scoring configured composite indicators
//! - partitioning the result into per-region units

pub mod config;
pub mod constants;
pub mod error;
pub mod hierarchy;
pub mod models;
pub mod processor;
pub mod schema;

// CLI modules
pub mod cli {
    pub mod args;
    pub mod commands;
}

// Re-export commonly used types
pub use config::PipelineConfig;
pub use error::{RegionError, Result};
pub use hierarchy::{Hierarchy, RegionTree};
pub use models::{ProcessingStats, RegionTable, RegionUnit};
pub use processor::RegionProcessor;
