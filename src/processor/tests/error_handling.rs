//! Error handling integration tests

use super::{fixture_config, fixture_data_dir, write_cleaned, CORE_ID, CORE_TABLE};
use crate::config::PipelineConfig;
use crate::constants::{CLEANED_DIR, PREPROCESSED_DIR};
use crate::error::RegionError;
use crate::processor::RegionProcessor;
use tempfile::TempDir;

#[tokio::test]
async fn test_nonexistent_data_dir() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nonexistent");

    match RegionProcessor::new(&missing) {
        Err(RegionError::DatasetNotFound { path }) => {
            assert_eq!(path, missing.join(CLEANED_DIR));
        }
        other => panic!("Expected DatasetNotFound error, got {:?}", other.map(|p| p.key().to_string())),
    }
}

#[tokio::test]
async fn test_missing_identifier_table() {
    let temp_dir = fixture_data_dir();
    let config = fixture_config(temp_dir.path()).with_identifiers([CORE_ID, "84718NED"]);
    let processor = RegionProcessor::from_config(config).unwrap();

    match processor.process().await {
        Err(RegionError::DatasetNotFound { path }) => {
            assert!(path.ends_with("84718NED.csv"));
        }
        other => panic!("Expected DatasetNotFound error, got {:?}", other),
    }
    // Nothing was written for the failed group
    assert!(!processor.joined_path().exists());
}

#[tokio::test]
async fn test_missing_required_composite_input() {
    let temp_dir = fixture_data_dir();
    let config = fixture_config(temp_dir.path()).with_identifiers([CORE_ID]);
    let processor = RegionProcessor::from_config(config).unwrap();

    // healthcare needs the proximity table
    match processor.process().await {
        Err(RegionError::Schema { dataset, column }) => {
            assert_eq!(dataset, CORE_ID);
            assert_eq!(column, "distance_to_general_practitioner");
        }
        other => panic!("Expected Schema error, got {:?}", other),
    }
    assert!(!processor.preprocessed_path().exists());
}

#[tokio::test]
async fn test_missing_country_value_fails_imputation() {
    let temp_dir = TempDir::new().unwrap();
    let table = CORE_TABLE.replace("country,NL00,Nederland,300", "country,NL00,Nederland,");
    write_cleaned(temp_dir.path(), CORE_ID, &table);

    let config = PipelineConfig::default()
        .with_data_dir(temp_dir.path())
        .with_identifiers([CORE_ID])
        .with_composites(vec![crate::config::CompositeSpec::required(
            "price",
            crate::config::CompositeRule::Invert {
                input: "house_worth".to_string(),
            },
        )]);
    let processor = RegionProcessor::from_config(config).unwrap();

    match processor.process().await {
        Err(RegionError::Imputation { column, path }) => {
            assert_eq!(column, "house_worth");
            assert_eq!(path, "NL00");
        }
        other => panic!("Expected Imputation error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_region_type() {
    let temp_dir = TempDir::new().unwrap();
    let table = CORE_TABLE.replace("municipality,GM02", "province,PV20");
    write_cleaned(temp_dir.path(), CORE_ID, &table);

    let config = PipelineConfig::default()
        .with_data_dir(temp_dir.path())
        .with_identifiers([CORE_ID]);
    let processor = RegionProcessor::from_config(config).unwrap();

    match processor.process().await {
        Err(RegionError::UnknownRegionType { row, value, .. }) => {
            assert_eq!(row, 7);
            assert_eq!(value, "province");
        }
        other => panic!("Expected UnknownRegionType error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_detached_subtree_refused_siblings_written() {
    let temp_dir = TempDir::new().unwrap();
    // A neighbourhood directly below a municipality has no district parent
    let table = format!(
        "{}neighbourhood,BU999901,Los,120,2,800,1.0\n",
        CORE_TABLE
    );
    write_cleaned(temp_dir.path(), CORE_ID, &table);

    let config = PipelineConfig::default()
        .with_data_dir(temp_dir.path())
        .with_identifiers([CORE_ID])
        .with_composites(vec![crate::config::CompositeSpec::required(
            "price",
            crate::config::CompositeRule::Invert {
                input: "house_worth".to_string(),
            },
        )]);
    let processor = RegionProcessor::from_config(config).unwrap();
    let stats = processor.process().await.unwrap();

    assert_eq!(stats.integrity_failures, 1);
    assert_eq!(stats.units_written, 6);
    assert!(processor.split_dir().join("NL00/GM01/WK0101.csv").exists());
    assert!(!processor.split_dir().join("BU999901.csv").exists());
}

#[tokio::test]
async fn test_invalid_configuration_is_rejected() {
    let temp_dir = fixture_data_dir();
    let mut config = fixture_config(temp_dir.path());
    config.amenity_threshold_km = -1.0;

    let result = RegionProcessor::from_config(config);
    assert!(matches!(result, Err(RegionError::Configuration { .. })));
}

#[tokio::test]
async fn test_strict_ranges_abort_before_writing() {
    let temp_dir = TempDir::new().unwrap();
    let table = "\
type,code,name,house_worth
country,NL00,Nederland,100
municipality,GM01,Een,100
";
    write_cleaned(temp_dir.path(), CORE_ID, table);

    let mut config = PipelineConfig::default()
        .with_data_dir(temp_dir.path())
        .with_identifiers([CORE_ID])
        .with_composites(vec![crate::config::CompositeSpec::required(
            "price",
            crate::config::CompositeRule::Invert {
                input: "house_worth".to_string(),
            },
        )]);
    config.strict_ranges = true;
    let processor = RegionProcessor::from_config(config.clone()).unwrap();

    assert!(matches!(
        processor.process().await,
        Err(RegionError::DegenerateRange { .. })
    ));
    assert!(!temp_dir.path().join(PREPROCESSED_DIR).exists());

    // Recovered with a warning when not strict
    config.strict_ranges = false;
    let processor = RegionProcessor::from_config(config.with_force()).unwrap();
    let stats = processor.process().await.unwrap();
    assert_eq!(stats.degenerate_columns, vec!["house_worth"]);
}
