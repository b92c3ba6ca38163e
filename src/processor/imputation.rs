//! Hierarchical imputation
//!
//! Fills a missing indicator value with the value of the nearest ancestor
//! region that has one. Parents always precede their children in row order,
//! so a single pass that reads the parent's already-filled value resolves the
//! whole chain.

use crate::error::{RegionError, Result};
use crate::hierarchy::RegionTree;
use crate::models::{ImputationSummary, RegionTable};
use tracing::{debug, info};

/// Fill missing values top-down along the region tree.
///
/// Returns the filled column and the number of cells that were filled. A
/// missing value with no ancestor to inherit from is an imputation error
/// naming the region's hierarchy path.
pub fn fill_values(
    tree: &RegionTree,
    column: &str,
    values: &[Option<f64>],
) -> Result<(Vec<f64>, usize)> {
    let mut filled: Vec<f64> = Vec::with_capacity(values.len());
    let mut count = 0;

    for (row, value) in values.iter().enumerate() {
        let resolved = match value {
            Some(v) => *v,
            None => {
                let parent = tree.node(row).parent.ok_or_else(|| RegionError::Imputation {
                    column: column.to_string(),
                    path: tree.path_string(row),
                })?;
                count += 1;
                filled[parent]
            }
        };
        filled.push(resolved);
    }

    Ok((filled, count))
}

/// Impute one column of a region table
pub fn fill_top_down(table: &RegionTable, column: &str) -> Result<(RegionTable, usize)> {
    let values = table.numeric_values(column)?;
    let (filled, count) = fill_values(table.tree(), column, &values)?;
    debug!("Imputed {} cells of '{}'", count, column);
    let table = table.with_numeric_column(column, filled.into_iter().map(Some).collect())?;
    Ok((table, count))
}

/// Impute every listed column, in order
pub fn impute_columns(
    table: &RegionTable,
    columns: &[String],
) -> Result<(RegionTable, ImputationSummary)> {
    let mut current = table.clone();
    let mut summary = ImputationSummary::default();

    for column in columns {
        let (next, count) = fill_top_down(&current, column)?;
        summary.filled.push((column.clone(), count));
        current = next;
    }

    info!(
        "Imputation filled {} cells across {} columns",
        summary.total_filled(),
        columns.len()
    );
    Ok((current, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::tests::{default_hierarchy, tree_of};
    use polars::prelude::*;

    #[test]
    fn test_fill_from_nearest_ancestor() {
        let tree = tree_of(&[
            ("country", "NL00"),
            ("municipality", "GM01"),
            ("district", "WK0101"),
            ("neighbourhood", "BU010101"),
            ("district", "WK0102"),
            ("municipality", "GM02"),
        ]);
        let values = [Some(10.0), None, Some(3.0), None, None, Some(7.0)];

        let (filled, count) = fill_values(&tree, "house_worth", &values).unwrap();
        assert_eq!(filled, vec![10.0, 10.0, 3.0, 3.0, 10.0, 7.0]);
        assert_eq!(count, 3);
    }

    #[test]
    fn test_chain_of_missing_values_resolves_to_top() {
        let tree = tree_of(&[
            ("country", "NL00"),
            ("municipality", "GM01"),
            ("district", "WK0101"),
            ("neighbourhood", "BU010101"),
        ]);
        let values = [Some(0.5), None, None, None];
        let (filled, _) = fill_values(&tree, "density", &values).unwrap();
        assert_eq!(filled, vec![0.5; 4]);
    }

    #[test]
    fn test_missing_root_value_is_an_error() {
        let tree = tree_of(&[("country", "NL00"), ("municipality", "GM01")]);
        let values = [None, Some(1.0)];

        match fill_values(&tree, "distance_to_school", &values) {
            Err(RegionError::Imputation { column, path }) => {
                assert_eq!(column, "distance_to_school");
                assert_eq!(path, "NL00");
            }
            other => panic!("Expected Imputation error, got {:?}", other),
        }
    }

    #[test]
    fn test_detached_region_cannot_inherit() {
        let tree = tree_of(&[
            ("country", "NL00"),
            ("municipality", "GM01"),
            ("neighbourhood", "BU9999"),
        ]);
        let values = [Some(1.0), Some(2.0), None];
        let result = fill_values(&tree, "theft", &values);
        assert!(matches!(result, Err(RegionError::Imputation { path, .. }) if path == "BU9999"));
    }

    #[test]
    fn test_impute_columns_on_table() {
        let frame = df!(
            "type" => ["country", "municipality", "district"],
            "code" => ["NL00", "GM01", "WK0101"],
            "house_worth" => [Some(250.0), None, None],
            "density" => [Some(1.0), Some(2.0), None]
        )
        .unwrap();
        let table = RegionTable::new("test", frame, default_hierarchy()).unwrap();

        let columns = vec!["house_worth".to_string(), "density".to_string()];
        let (imputed, summary) = impute_columns(&table, &columns).unwrap();

        assert_eq!(summary.total_filled(), 3);
        assert_eq!(imputed.missing_count("house_worth").unwrap(), 0);
        assert_eq!(
            imputed.numeric_values("density").unwrap(),
            vec![Some(1.0), Some(2.0), Some(2.0)]
        );
    }
}
