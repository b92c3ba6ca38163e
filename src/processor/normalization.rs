//! Indicator normalisation
//!
//! Rescales indicator columns to `[0, 1]` with min-max or rank scaling, and
//! optionally standardises composite columns to z-scores.

use crate::config::{NormalizationStrategy, PipelineConfig};
use crate::error::{RegionError, Result};
use crate::models::{NormalizationSummary, RegionTable};
use tracing::{debug, info, warn};

/// Outcome of min-max scaling a single column
#[derive(Debug, Clone, PartialEq)]
pub enum MinMaxOutcome {
    Scaled(Vec<Option<f64>>),
    /// Every present value equals this one
    Degenerate(f64),
    /// No value present
    Empty,
}

/// `(v - min) / (max - min)` over present values; missing values stay missing
pub fn min_max_scale(values: &[Option<f64>]) -> MinMaxOutcome {
    let present = values.iter().flatten().copied();
    let Some((min, max)) = present.fold(None, |acc: Option<(f64, f64)>, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    }) else {
        return MinMaxOutcome::Empty;
    };

    let range = max - min;
    if range == 0.0 {
        return MinMaxOutcome::Degenerate(min);
    }
    MinMaxOutcome::Scaled(values.iter().map(|v| v.map(|x| (x - min) / range)).collect())
}

/// Index of each value's first occurrence in ascending order, divided by the
/// number of present values. Ties share the lowest rank.
pub fn rank_scale(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut present: Vec<(usize, f64)> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|x| (i, x)))
        .collect();
    present.sort_by(|a, b| a.1.total_cmp(&b.1));

    let n = present.len() as f64;
    let mut ranked = vec![None; values.len()];
    let mut first = 0;
    for (position, &(row, value)) in present.iter().enumerate() {
        if position > 0 && present[position - 1].1 != value {
            first = position;
        }
        ranked[row] = Some(first as f64 / n);
    }
    ranked
}

/// Z-score with the population standard deviation. A zero deviation yields
/// zeros; the flag reports it.
pub fn standardize(values: &[Option<f64>]) -> (Vec<Option<f64>>, bool) {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return (values.to_vec(), false);
    }

    let n = present.len() as f64;
    let mean = present.iter().sum::<f64>() / n;
    let variance = present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();

    if std == 0.0 {
        return (values.iter().map(|v| v.map(|_| 0.0)).collect(), true);
    }
    (
        values.iter().map(|v| v.map(|x| (x - mean) / std)).collect(),
        false,
    )
}

/// Normalise one column. Returns the new table and whether the column's
/// range was degenerate.
pub fn normalize_column(
    table: &RegionTable,
    column: &str,
    config: &PipelineConfig,
) -> Result<(RegionTable, bool)> {
    let values = table.numeric_values(column)?;
    let strategy = config.strategy_for(column);

    let (scaled, degenerate) = match strategy {
        NormalizationStrategy::Rank => (rank_scale(&values), false),
        NormalizationStrategy::MinMax => match min_max_scale(&values) {
            MinMaxOutcome::Scaled(scaled) => (scaled, false),
            MinMaxOutcome::Empty => {
                debug!("Column '{}' has no values, leaving it unscaled", column);
                return Ok((table.clone(), false));
            }
            MinMaxOutcome::Degenerate(value) => {
                if config.strict_ranges {
                    return Err(RegionError::DegenerateRange {
                        column: column.to_string(),
                        value,
                    });
                }
                warn!(
                    "Column '{}' has a degenerate range (every value is {}), filling with {}",
                    column, value, config.degenerate_fill
                );
                let filled = values
                    .iter()
                    .map(|v| v.map(|_| config.degenerate_fill))
                    .collect();
                (filled, true)
            }
        },
    };

    debug!("Normalised '{}' with {:?}", column, strategy);
    Ok((table.with_numeric_column(column, scaled)?, degenerate))
}

/// Normalise every listed column
pub fn normalize_columns(
    table: &RegionTable,
    columns: &[String],
    config: &PipelineConfig,
) -> Result<(RegionTable, NormalizationSummary)> {
    let mut current = table.clone();
    let mut summary = NormalizationSummary::default();

    for column in columns {
        let (next, degenerate) = normalize_column(&current, column, config)?;
        summary.columns.push(column.clone());
        if degenerate {
            summary.degenerate.push(column.clone());
        }
        current = next;
    }

    info!(
        "Normalised {} columns ({} degenerate)",
        summary.columns.len(),
        summary.degenerate.len()
    );
    Ok((current, summary))
}

/// Replace each listed column with its z-scores
pub fn standardize_columns(table: &RegionTable, columns: &[String]) -> Result<RegionTable> {
    let mut current = table.clone();
    for column in columns {
        let (values, constant) = standardize(&current.numeric_values(column)?);
        if constant {
            warn!(
                "Column '{}' has zero standard deviation, standardised to 0",
                column
            );
        }
        current = current.with_numeric_column(column, values)?;
    }
    Ok(current)
}
