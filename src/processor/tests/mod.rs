//! Integration tests for the processor module
//!
//! Tests the complete staged pipeline over small cleaned tables written to
//! temporary data directories.

pub mod error_handling;

use crate::config::PipelineConfig;
use crate::constants::CLEANED_DIR;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Core indicators: one country, a municipality with two districts and one
/// without, districts with one or two neighbourhoods, and missing cells at
/// every level below the country.
pub const CORE_TABLE: &str = "\
type,code,name,house_worth,urbanity_raw,density,distance_to_school
country,NL00,Nederland,300,3,500,0.7
municipality,GM01,Groningen,,1,3500,0.5
district,WK0101,Centrum,250,1,,0.3
neighbourhood,BU010101,Binnenstad,,,,
neighbourhood,BU010102,Schildersbuurt,200,2,4000,0.4
district,WK0102,Oost,,5,1200,
neighbourhood,BU010201,Noorderplantsoen,180,,900,0.9
municipality,GM02,Delfzijl,150,4,,1.2
";

/// Proximity indicators for the same regions
pub const PROXIMITY_TABLE: &str = "\
type,code,name,distance_to_general_practitioner,distance_to_general_practice,distance_to_hospital,distance_to_library
country,NL00,Nederland,1.0,5.0,7.0,1.5
municipality,GM01,Groningen,0.8,,3.0,0.9
district,WK0101,Centrum,0.5,2.0,,0.4
neighbourhood,BU010101,Binnenstad,0.4,1.8,2.2,
neighbourhood,BU010102,Schildersbuurt,,2.5,2.9,0.7
district,WK0102,Oost,1.1,4.0,3.5,6.5
neighbourhood,BU010201,Noorderplantsoen,1.3,,4.1,
municipality,GM02,Delfzijl,2.0,9.0,25.0,8.0
";

pub const CORE_ID: &str = "core";
pub const PROXIMITY_ID: &str = "proximity";

/// Write a cleaned table into `<data_dir>/cleaned/<identifier>.csv`
pub fn write_cleaned(data_dir: &Path, identifier: &str, content: &str) {
    let cleaned = data_dir.join(CLEANED_DIR);
    fs::create_dir_all(&cleaned).unwrap();
    fs::write(cleaned.join(format!("{}.csv", identifier)), content).unwrap();
}

/// Data directory holding both fixture tables
pub fn fixture_data_dir() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    write_cleaned(temp_dir.path(), CORE_ID, CORE_TABLE);
    write_cleaned(temp_dir.path(), PROXIMITY_ID, PROXIMITY_TABLE);
    temp_dir
}

/// Configuration joining both fixture tables
pub fn fixture_config(data_dir: &Path) -> PipelineConfig {
    PipelineConfig::default()
        .with_data_dir(data_dir)
        .with_identifiers([CORE_ID, PROXIMITY_ID])
}
