//! Dataset loading and joining
//!
//! Reads cleaned CSV tables, applies the schema mapping and full-outer-joins
//! successive tables on region type and code while keeping the hierarchy
//! pre-order of the left table.

use crate::config::PipelineConfig;
use crate::constants::{CLEANED_DIR, REQUIRED_IDENTITY_COLUMNS};
use crate::error::{RegionError, Result};
use crate::schema::{require_columns, SchemaMapper};

use glob::glob;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const LEFT_ORDER: &str = "__left_order";
const RIGHT_ORDER: &str = "__right_order";
const RIGHT_SUFFIX: &str = "_right";

/// Read a region CSV file with every column as a string; typing is left to
/// the schema layer so region codes keep their leading zeros.
pub fn read_region_csv(path: &Path) -> Result<DataFrame> {
    if !path.exists() {
        return Err(RegionError::DatasetNotFound {
            path: path.to_path_buf(),
        });
    }

    let options = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0));
    let frame = options
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    debug!(
        "Read {} rows x {} columns from {}",
        frame.height(),
        frame.width(),
        path.display()
    );
    Ok(frame)
}

/// Identifiers of every cleaned table present under `data_dir`
pub fn available_identifiers(data_dir: &Path) -> Vec<String> {
    let pattern = data_dir.join(CLEANED_DIR).join("*.csv");
    let Some(pattern) = pattern.to_str() else {
        return Vec::new();
    };

    let mut identifiers: Vec<String> = match glob(pattern) {
        Ok(paths) => paths
            .filter_map(|entry| entry.ok())
            .filter_map(|path| {
                path.file_stem()
                    .and_then(|stem| stem.to_str())
                    .map(str::to_string)
            })
            .collect(),
        Err(e) => {
            warn!("Invalid cleaned-table pattern {}: {}", pattern, e);
            Vec::new()
        }
    };
    identifiers.sort();
    identifiers
}

/// Loads cleaned tables and joins them into one region table
pub struct Loader {
    data_dir: PathBuf,
    mapper: SchemaMapper,
}

impl Loader {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            data_dir: config.data_dir.clone(),
            mapper: SchemaMapper::new(&config.schema_mapping)?,
        })
    }

    /// Path of the cleaned table for an identifier
    pub fn cleaned_path(&self, identifier: &str) -> PathBuf {
        self.data_dir
            .join(CLEANED_DIR)
            .join(format!("{}.csv", identifier))
    }

    /// Load one cleaned table in canonical form
    pub fn load(&self, identifier: &str) -> Result<DataFrame> {
        let path = self.cleaned_path(identifier);
        if !path.exists() {
            let available = available_identifiers(&self.data_dir);
            if !available.is_empty() {
                warn!(
                    "Dataset {} not found; available: {}",
                    identifier,
                    available.join(", ")
                );
            }
            return Err(RegionError::DatasetNotFound { path });
        }

        let raw = read_region_csv(&path)?;
        let frame = self.mapper.apply(identifier, &raw)?;
        require_columns(identifier, &frame, REQUIRED_IDENTITY_COLUMNS)?;

        info!(
            "Loaded {}: {} regions, {} columns",
            identifier,
            frame.height(),
            frame.width()
        );
        Ok(frame)
    }

    /// Load every identifier and join them left to right
    pub fn load_joined(&self, key: &str, identifiers: &[String]) -> Result<DataFrame> {
        let frames = identifiers
            .iter()
            .map(|identifier| self.load(identifier))
            .collect::<Result<Vec<_>>>()?;
        outer_join(key, frames)
    }
}

/// Full-outer-join frames left to right on region type and code
pub fn outer_join(dataset: &str, frames: Vec<DataFrame>) -> Result<DataFrame> {
    let mut frames = frames.into_iter();
    let Some(mut joined) = frames.next() else {
        return Err(RegionError::configuration(format!(
            "dataset {} has no input tables",
            dataset
        )));
    };
    for right in frames {
        joined = join_pair(dataset, joined, right)?;
    }
    Ok(joined)
}

fn join_pair(dataset: &str, left: DataFrame, right: DataFrame) -> Result<DataFrame> {
    let has = |frame: &DataFrame, name: &str| frame.get_column_index(name).is_some();

    // Names may be blank, so only type and code identify a region
    for required in REQUIRED_IDENTITY_COLUMNS {
        if !(has(&left, *required) && has(&right, *required)) {
            return Err(RegionError::schema(dataset, *required));
        }
    }

    let shared: Vec<String> = right
        .get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .filter(|name| !REQUIRED_IDENTITY_COLUMNS.contains(&name.as_str()) && has(&left, name))
        .collect();

    debug!(
        "Joining {} on [{}], coalescing {} shared columns",
        dataset,
        REQUIRED_IDENTITY_COLUMNS.join(", "),
        shared.len()
    );

    let key_exprs: Vec<Expr> = REQUIRED_IDENTITY_COLUMNS.iter().map(|k| col(*k)).collect();
    let joined = left
        .lazy()
        .with_row_index(LEFT_ORDER, None)
        .join(
            right.lazy().with_row_index(RIGHT_ORDER, None),
            key_exprs.clone(),
            key_exprs,
            JoinArgs::new(JoinType::Full).with_coalesce(JoinCoalesce::CoalesceColumns),
        )
        .with_columns(
            shared
                .iter()
                .map(|name| {
                    col(name.as_str())
                        .fill_null(col(format!("{}{}", name, RIGHT_SUFFIX)))
                        .alias(name.as_str())
                })
                .collect::<Vec<_>>(),
        )
        .collect()?;

    let left_order: Vec<Option<IdxSize>> = joined
        .column(LEFT_ORDER)?
        .as_materialized_series()
        .idx()?
        .into_iter()
        .collect();
    let right_order: Vec<Option<IdxSize>> = joined
        .column(RIGHT_ORDER)?
        .as_materialized_series()
        .idx()?
        .into_iter()
        .collect();

    let right_only = left_order.iter().filter(|l| l.is_none()).count();
    if right_only > 0 {
        warn!(
            "Dataset {}: {} regions only present in the right table were placed after their nearest preceding shared region",
            dataset, right_only
        );
    }

    let order = hierarchy_order(&left_order, &right_order);
    let joined = joined.take(&IdxCa::from_vec("order".into(), order))?;

    let mut dropped: Vec<String> = vec![LEFT_ORDER.to_string(), RIGHT_ORDER.to_string()];
    dropped.extend(shared.iter().map(|name| format!("{}{}", name, RIGHT_SUFFIX)));
    Ok(joined.drop_many(dropped))
}

/// Row permutation that keeps the left table's order and slots every
/// right-only row in directly after the nearest region that precedes it in
/// the right table and is present in both. Right-only rows with no such
/// region go last. Ties keep right-table order.
fn hierarchy_order(left: &[Option<IdxSize>], right: &[Option<IdxSize>]) -> Vec<IdxSize> {
    let mut by_right: Vec<(IdxSize, usize)> = right
        .iter()
        .enumerate()
        .filter_map(|(row, r)| r.map(|r| (r, row)))
        .collect();
    by_right.sort_unstable();

    let mut anchors: Vec<Option<IdxSize>> = vec![None; left.len()];
    let mut last_shared = None;
    for &(_, row) in &by_right {
        match left[row] {
            Some(l) => last_shared = Some(l),
            None => anchors[row] = last_shared,
        }
    }

    // (appended, left position, after anchor, right position)
    let key = |row: usize| match (left[row], anchors[row]) {
        (Some(l), _) => (false, l, false, 0),
        (None, Some(anchor)) => (false, anchor, true, right[row].unwrap_or_default()),
        (None, None) => (true, 0, false, right[row].unwrap_or_default()),
    };

    let mut rows: Vec<usize> = (0..left.len()).collect();
    rows.sort_by_key(|&row| key(row));
    rows.into_iter().map(|row| row as IdxSize).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchemaMapping;
    use crate::hierarchy::tests::default_hierarchy;
    use crate::models::RegionTable;
    use std::fs;
    use tempfile::TempDir;

    fn strings(frame: &DataFrame, name: &str) -> Vec<Option<String>> {
        frame
            .column(name)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect()
    }

    #[test]
    fn test_join_keeps_left_order_and_places_right_only_rows() {
        let left = df!(
            "type" => ["country", "municipality", "district", "municipality"],
            "code" => ["NL00", "GM01", "WK0101", "GM02"],
            "house_worth" => [Some(250.0), Some(200.0), None, Some(300.0)]
        )
        .unwrap();
        let right = df!(
            "type" => ["municipality", "country", "district", "municipality"],
            "code" => ["GM02", "NL00", "WK0101", "GM03"],
            "house_worth" => [Some(999.0), Some(999.0), Some(180.0), Some(100.0)],
            "distance_to_school" => [0.5, 0.7, 0.4, 0.9]
        )
        .unwrap();

        let joined = outer_join("test", vec![left, right]).unwrap();
        assert_eq!(joined.height(), 5);
        // GM03 follows WK0101, the last shared region before it on the right
        assert_eq!(
            strings(&joined, "code"),
            vec![
                Some("NL00".to_string()),
                Some("GM01".to_string()),
                Some("WK0101".to_string()),
                Some("GM03".to_string()),
                Some("GM02".to_string()),
            ]
        );

        // Left wins, right fills nulls
        let worth: Vec<Option<f64>> = joined
            .column("house_worth")
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(
            worth,
            vec![Some(250.0), Some(200.0), Some(180.0), Some(100.0), Some(300.0)]
        );

        let school = joined.column("distance_to_school").unwrap().f64().unwrap();
        assert_eq!(school.get(1), None);
        assert_eq!(school.get(0), Some(0.7));

        assert!(joined.column(LEFT_ORDER).is_err());
        assert!(joined.column("house_worth_right").is_err());
    }

    #[test]
    fn test_join_matches_regions_with_blank_names() {
        let left = df!(
            "type" => ["country", "municipality", "municipality"],
            "code" => ["NL00", "GM01", "GM02"],
            "name" => [Some("Nederland"), None, Some("Twee")],
            "house_worth" => [250.0, 200.0, 300.0]
        )
        .unwrap();
        let right = df!(
            "type" => ["country", "municipality", "municipality"],
            "code" => ["NL00", "GM01", "GM02"],
            "name" => [Some("Nederland"), None, None],
            "density" => [1.0, 2.0, 3.0]
        )
        .unwrap();

        let joined = outer_join("test", vec![left, right]).unwrap();
        assert_eq!(joined.height(), 3);
        assert_eq!(
            strings(&joined, "name"),
            vec![Some("Nederland".to_string()), None, Some("Twee".to_string())]
        );

        let worth = joined.column("house_worth").unwrap().f64().unwrap();
        let density = joined.column("density").unwrap().f64().unwrap();
        assert_eq!((worth.get(1), density.get(1)), (Some(200.0), Some(2.0)));
        assert!(joined.column("name_right").is_err());

        let table = RegionTable::new("test", joined, default_hierarchy()).unwrap();
        assert!(table.tree().detached().is_empty());
    }

    #[test]
    fn test_right_only_child_stays_under_its_parent() {
        let left = df!(
            "type" => ["country", "municipality", "district", "municipality"],
            "code" => ["NL00", "GM01", "WK0101", "GM02"],
            "house_worth" => [250.0, 200.0, 180.0, 300.0]
        )
        .unwrap();
        let right = df!(
            "type" => ["country", "municipality", "district", "district", "municipality"],
            "code" => ["NL00", "GM01", "WK0101", "WK0102", "GM02"],
            "density" => [1.0, 2.0, 3.0, 4.0, 5.0]
        )
        .unwrap();

        let joined = outer_join("test", vec![left, right]).unwrap();
        let table = RegionTable::new("test", joined, default_hierarchy()).unwrap();
        let tree = table.tree();

        assert_eq!(tree.len(), 5);
        assert_eq!(tree.path_string(3), "NL00 > GM01 > WK0102");
        assert_eq!(tree.node(4).code, "GM02");
        assert!(tree.node(4).children.is_empty());
    }

    #[test]
    fn test_hierarchy_order_without_shared_predecessor_goes_last() {
        // Rows 0 and 2 are shared; row 1 follows row 0 on the right, row 3
        // precedes every shared row
        let left = [Some(1), None, Some(0), None];
        let right = [Some(2), Some(3), Some(1), Some(0)];
        assert_eq!(hierarchy_order(&left, &right), vec![2, 0, 1, 3]);
    }

    #[test]
    fn test_join_requires_shared_code() {
        let left = df!("type" => ["country"], "code" => ["NL00"]).unwrap();
        let right = df!("type" => ["country"], "density" => [1.0]).unwrap();
        let result = outer_join("test", vec![left, right]);
        assert!(matches!(result, Err(RegionError::Schema { column, .. }) if column == "code"));
    }

    #[test]
    fn test_load_applies_mapping() {
        let temp_dir = TempDir::new().unwrap();
        let cleaned = temp_dir.path().join(CLEANED_DIR);
        fs::create_dir_all(&cleaned).unwrap();
        fs::write(
            cleaned.join("84583NED.csv"),
            "SoortRegio_2,Codering_3,WijkenEnBuurten,GemiddeldeWoningwaarde_35\n\
             Land     ,NL00      ,Nederland,230\n\
             Gemeente ,GM0014    ,Groningen,\n",
        )
        .unwrap();

        let config = PipelineConfig::default()
            .with_data_dir(temp_dir.path())
            .with_schema_mapping(SchemaMapping::cbs());
        let loader = Loader::new(&config).unwrap();
        let frame = loader.load("84583NED").unwrap();

        assert_eq!(
            strings(&frame, "type"),
            vec![Some("country".to_string()), Some("municipality".to_string())]
        );
        assert_eq!(frame.column("house_worth").unwrap().null_count(), 1);
        assert_eq!(available_identifiers(temp_dir.path()), vec!["84583NED"]);
    }

    #[test]
    fn test_load_missing_dataset() {
        let temp_dir = TempDir::new().unwrap();
        let config = PipelineConfig::default().with_data_dir(temp_dir.path());
        let loader = Loader::new(&config).unwrap();

        match loader.load("84718NED") {
            Err(RegionError::DatasetNotFound { path }) => {
                assert!(path.ends_with("cleaned/84718NED.csv"));
            }
            other => panic!("Expected DatasetNotFound, got {:?}", other.map(|f| f.height())),
        }
    }
}
