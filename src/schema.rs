//! Schema mapping and column coercion.
//!
//! Applies the declarative source → canonical column mapping to raw tables,
//! normalises identity columns (trimmed strings, translated region types)
//! and casts indicator columns to `f64`.

use crate::config::SchemaMapping;
use crate::constants::{IDENTITY_COLUMNS, TYPE_COLUMN};
use crate::error::{RegionError, Result};
use polars::prelude::*;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

enum Matcher {
    Literal(String),
    Pattern(Regex),
}

impl Matcher {
    fn matches(&self, column: &str) -> bool {
        match self {
            Matcher::Literal(name) => name == column,
            Matcher::Pattern(regex) => regex.is_match(column),
        }
    }
}

/// Compiled form of a [`SchemaMapping`]
pub struct SchemaMapper {
    rules: Vec<(Matcher, String)>,
    keep_unmapped: bool,
    type_translations: BTreeMap<String, String>,
    trim_whitespace: bool,
}

impl SchemaMapper {
    /// Compile the mapping; invalid patterns are configuration errors
    pub fn new(mapping: &SchemaMapping) -> Result<Self> {
        let rules = mapping
            .rules
            .iter()
            .map(|rule| {
                let matcher = if rule.pattern {
                    let regex = Regex::new(&format!("^(?:{})$", rule.source)).map_err(|e| {
                        RegionError::configuration(format!(
                            "invalid column pattern '{}': {}",
                            rule.source, e
                        ))
                    })?;
                    Matcher::Pattern(regex)
                } else {
                    Matcher::Literal(rule.source.clone())
                };
                Ok((matcher, rule.target.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            rules,
            keep_unmapped: mapping.keep_unmapped,
            type_translations: mapping.type_translations.clone(),
            trim_whitespace: mapping.trim_whitespace,
        })
    }

    /// Canonical name for a source column, `None` when it is dropped
    pub fn target_for<'a>(&'a self, column: &'a str) -> Option<&'a str> {
        self.rules
            .iter()
            .find(|(matcher, _)| matcher.matches(column))
            .map(|(_, target)| target.as_str())
            .or(if self.keep_unmapped { Some(column) } else { None })
    }

    /// Rename, select and coerce the columns of a raw table
    pub fn apply(&self, dataset: &str, frame: &DataFrame) -> Result<DataFrame> {
        let mut seen = HashSet::new();
        let mut columns: Vec<Column> = Vec::with_capacity(frame.width());

        for column in frame.get_columns() {
            let source = column.name().as_str();
            let Some(target) = self.target_for(source) else {
                continue;
            };
            if !seen.insert(target.to_string()) {
                warn!(
                    "Dataset {}: column '{}' maps onto '{}' which is already present, dropping it",
                    dataset, source, target
                );
                continue;
            }
            if source != target {
                debug!("Dataset {}: renaming '{}' to '{}'", dataset, source, target);
            }

            let series = column
                .as_materialized_series()
                .clone()
                .with_name(target.into());
            let series = if IDENTITY_COLUMNS.contains(&target) {
                self.identity_series(&series)?
            } else {
                series.cast(&DataType::Float64)?
            };
            columns.push(series.into());
        }

        Ok(DataFrame::new(columns)?)
    }

    fn identity_series(&self, series: &Series) -> Result<Series> {
        let translate = series.name().as_str() == TYPE_COLUMN;
        let strings = series.cast(&DataType::String)?;
        let cleaned: StringChunked = strings
            .str()?
            .into_iter()
            .map(|value| {
                value.and_then(|s| {
                    let s = if self.trim_whitespace { s.trim() } else { s };
                    if s.is_empty() {
                        return None;
                    }
                    let s = if translate {
                        self.type_translations
                            .get(s)
                            .map(String::as_str)
                            .unwrap_or(s)
                    } else {
                        s
                    };
                    Some(s.to_string())
                })
            })
            .collect();
        Ok(cleaned.with_name(series.name().clone()).into_series())
    }
}

/// Type a table read back from a stage file: identity columns as strings,
/// `true`/`false` columns as booleans and every other column as `f64`
pub fn coerce_region_frame(frame: &DataFrame) -> Result<DataFrame> {
    let columns = frame
        .get_columns()
        .iter()
        .map(|column| {
            if IDENTITY_COLUMNS.contains(&column.name().as_str()) {
                return Ok(column.cast(&DataType::String)?);
            }
            if column.dtype() == &DataType::String {
                if let Some(flags) = parse_flags(column)? {
                    return Ok(flags);
                }
            }
            Ok(column.cast(&DataType::Float64)?)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(DataFrame::new(columns)?)
}

fn parse_flags(column: &Column) -> Result<Option<Column>> {
    let values = column.str()?;
    if values.null_count() == values.len() {
        return Ok(None);
    }

    let mut flags = Vec::with_capacity(values.len());
    for value in values.into_iter() {
        match value.map(str::trim) {
            None | Some("") => flags.push(None),
            Some(v) if v.eq_ignore_ascii_case("true") => flags.push(Some(true)),
            Some(v) if v.eq_ignore_ascii_case("false") => flags.push(Some(false)),
            Some(_) => return Ok(None),
        }
    }
    Ok(Some(Column::new(column.name().clone(), flags)))
}

/// Fail with a schema error naming the first absent column
pub fn require_columns<S: AsRef<str>>(dataset: &str, frame: &DataFrame, columns: &[S]) -> Result<()> {
    for column in columns {
        let column = column.as_ref();
        if frame.get_column_index(column).is_none() {
            return Err(RegionError::schema(dataset, column));
        }
    }
    Ok(())
}
