//! Composite indicator scoring
//!
//! Derives the configured composite indicators from normalised (and, for
//! amenity flags, raw) indicator columns. The scored table keeps only the
//! identity columns and the composites.

use crate::config::{CompositeRule, CompositeSpec, PipelineConfig};
use crate::constants::IDENTITY_COLUMNS;
use crate::error::{IntegrityViolation, RegionError, Result};
use crate::models::RegionTable;
use polars::prelude::*;
use tracing::{debug, info};

/// Value of one composite for one region
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Score {
    Ratio(f64),
    Flag(bool),
}

/// Composites whose inputs are all present in the table.
///
/// An optional composite with an absent input is skipped; a required one is
/// a schema error.
pub fn active_composites<'a>(
    table: &RegionTable,
    specs: &'a [CompositeSpec],
) -> Result<Vec<&'a CompositeSpec>> {
    let mut active = Vec::with_capacity(specs.len());
    for spec in specs {
        match spec.rule.inputs().into_iter().find(|c| !table.has_column(c)) {
            None => active.push(spec),
            Some(missing) if spec.required => {
                return Err(RegionError::schema(table.dataset(), missing));
            }
            Some(missing) => {
                info!(
                    "Skipping optional composite '{}': column '{}' is absent",
                    spec.name, missing
                );
            }
        }
    }
    Ok(active)
}

/// Evaluate a rule over its input values, in `inputs()` order
pub fn evaluate(rule: &CompositeRule, inputs: &[f64], default_threshold_km: f64) -> Score {
    match rule {
        CompositeRule::Identity { .. } => Score::Ratio(inputs[0]),
        CompositeRule::Invert { .. } => Score::Ratio(1.0 - inputs[0]),
        CompositeRule::Product { .. } => Score::Ratio(inputs.iter().product()),
        CompositeRule::InvertedMean { .. } => {
            Score::Ratio(1.0 - inputs.iter().sum::<f64>() / inputs.len() as f64)
        }
        CompositeRule::WeightedMinimum { terms } => {
            let penalty = terms
                .iter()
                .zip(inputs)
                .map(|(term, value)| term.weight * value.powf(term.exponent))
                .fold(f64::INFINITY, f64::min);
            Score::Ratio((1.0 - penalty).clamp(0.0, 1.0))
        }
        CompositeRule::Threshold { threshold_km, .. } => {
            Score::Flag(inputs[0] < threshold_km.unwrap_or(default_threshold_km))
        }
    }
}

/// Score every active composite.
///
/// Ratio rules read `normalized`; threshold rules read `raw`, which must have
/// the same rows. Every missing input or non-finite result across all
/// composites is collected into one data integrity error.
pub fn score(
    normalized: &RegionTable,
    raw: &RegionTable,
    specs: &[&CompositeSpec],
    config: &PipelineConfig,
) -> Result<RegionTable> {
    let tree = normalized.tree();
    let mut violations = Vec::new();
    let mut outputs: Vec<Column> = Vec::with_capacity(specs.len());

    for spec in specs {
        let source = if spec.rule.is_flag() { raw } else { normalized };
        let inputs = spec
            .rule
            .inputs()
            .into_iter()
            .map(|column| Ok((column, source.numeric_values(column)?)))
            .collect::<Result<Vec<_>>>()?;

        let mut ratios: Vec<Option<f64>> = Vec::new();
        let mut flags: Vec<Option<bool>> = Vec::new();
        let mut row_inputs = Vec::with_capacity(inputs.len());

        for row in 0..normalized.height() {
            row_inputs.clear();
            for (column, values) in &inputs {
                match values[row] {
                    Some(v) => row_inputs.push(v),
                    None => violations.push(IntegrityViolation {
                        code: tree.node(row).code.clone(),
                        column: column.to_string(),
                    }),
                }
            }

            let result = if row_inputs.len() == inputs.len() {
                Some(evaluate(&spec.rule, &row_inputs, config.amenity_threshold_km))
            } else {
                None
            };

            match result {
                Some(Score::Ratio(v)) if !v.is_finite() => {
                    violations.push(IntegrityViolation {
                        code: tree.node(row).code.clone(),
                        column: spec.name.clone(),
                    });
                    ratios.push(None);
                }
                Some(Score::Ratio(v)) => ratios.push(Some(v)),
                Some(Score::Flag(f)) => flags.push(Some(f)),
                None => {
                    ratios.push(None);
                    flags.push(None);
                }
            }
        }

        let column = if spec.rule.is_flag() {
            Column::new(spec.name.as_str().into(), flags)
        } else {
            Column::new(spec.name.as_str().into(), ratios)
        };
        debug!("Scored composite '{}'", spec.name);
        outputs.push(column);
    }

    if !violations.is_empty() {
        return Err(RegionError::DataIntegrity {
            dataset: normalized.dataset().to_string(),
            violations,
        });
    }

    let mut columns: Vec<Column> = IDENTITY_COLUMNS
        .iter()
        .filter(|name| !specs.iter().any(|s| s.name == **name))
        .filter_map(|name| normalized.frame().column(name).ok().cloned())
        .collect();
    columns.extend(outputs);

    info!(
        "Scored {} composites for {} regions",
        specs.len(),
        normalized.height()
    );
    normalized.derive("scoring", DataFrame::new(columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_composites, WeightedTerm};
    use crate::hierarchy::tests::default_hierarchy;

    fn healthcare() -> CompositeRule {
        CompositeRule::WeightedMinimum {
            terms: vec![
                WeightedTerm::new("a", 4.0, 1.0),
                WeightedTerm::new("b", 2.0, 1.0),
                WeightedTerm::new("c", 1.0, 1.0),
            ],
        }
    }

    #[test]
    fn test_weighted_minimum() {
        // min(4 * 0.1, 2 * 0.5, 1 * 0.9) = 0.4
        match evaluate(&healthcare(), &[0.1, 0.5, 0.9], 5.0) {
            Score::Ratio(v) => assert!((v - 0.6).abs() < 1e-12),
            other => panic!("unexpected {:?}", other),
        }
        // Penalty above one clamps to zero
        assert_eq!(evaluate(&healthcare(), &[1.0, 1.0, 1.0], 5.0), Score::Ratio(0.0));
    }

    #[test]
    fn test_ratio_rules() {
        let invert = CompositeRule::Invert { input: "x".into() };
        assert_eq!(evaluate(&invert, &[0.25], 5.0), Score::Ratio(0.75));

        let product = CompositeRule::Product {
            inputs: vec!["x".into(), "y".into()],
        };
        assert_eq!(evaluate(&product, &[0.5, 0.5], 5.0), Score::Ratio(0.25));

        let mean = CompositeRule::InvertedMean {
            inputs: vec!["x".into(), "y".into()],
        };
        assert_eq!(evaluate(&mean, &[0.0, 0.5], 5.0), Score::Ratio(0.75));
    }

    #[test]
    fn test_threshold_uses_rule_or_default() {
        let default = CompositeRule::Threshold {
            input: "d".into(),
            threshold_km: None,
        };
        assert_eq!(evaluate(&default, &[4.9], 5.0), Score::Flag(true));
        assert_eq!(evaluate(&default, &[5.0], 5.0), Score::Flag(false));

        let explicit = CompositeRule::Threshold {
            input: "d".into(),
            threshold_km: Some(1.0),
        };
        assert_eq!(evaluate(&explicit, &[1.5], 5.0), Score::Flag(false));
    }

    fn scored_fixture(house_worth: Vec<Option<f64>>) -> RegionTable {
        let frame = df!(
            "type" => ["country", "municipality", "municipality"],
            "code" => ["NL00", "GM01", "GM02"],
            "name" => ["Nederland", "Een", "Twee"],
            "house_worth" => house_worth,
            "distance_to_library" => [1.0, 6.0, 2.0]
        )
        .unwrap();
        RegionTable::new("test", frame, default_hierarchy()).unwrap()
    }

    #[test]
    fn test_score_keeps_identity_and_composites_only() {
        let table = scored_fixture(vec![Some(0.0), Some(0.5), Some(1.0)]);
        let policy = default_composites();
        let specs: Vec<&CompositeSpec> = policy
            .iter()
            .filter(|s| s.name == "price" || s.name == "library")
            .collect();

        let scored = score(&table, &table, &specs, &PipelineConfig::default()).unwrap();
        let names: Vec<String> = scored
            .frame()
            .get_column_names()
            .into_iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(names, vec!["type", "code", "name", "price", "library"]);
        assert_eq!(
            scored.numeric_values("price").unwrap(),
            vec![Some(1.0), Some(0.5), Some(0.0)]
        );
        let library: Vec<Option<bool>> = scored
            .frame()
            .column("library")
            .unwrap()
            .bool()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(library, vec![Some(true), Some(false), Some(true)]);
    }

    #[test]
    fn test_missing_input_is_integrity_failure() {
        let table = scored_fixture(vec![Some(0.0), None, None]);
        let policy = default_composites();
        let specs: Vec<&CompositeSpec> = policy.iter().filter(|s| s.name == "price").collect();

        match score(&table, &table, &specs, &PipelineConfig::default()) {
            Err(RegionError::DataIntegrity { violations, .. }) => {
                assert_eq!(violations.len(), 2);
                assert_eq!(violations[0].code, "GM01");
                assert_eq!(violations[0].column, "house_worth");
            }
            other => panic!("Expected DataIntegrity, got {:?}", other.map(|t| t.height())),
        }
    }

    #[test]
    fn test_active_composites_skips_optional_and_rejects_required() {
        let table = scored_fixture(vec![Some(0.0), Some(0.5), Some(1.0)]);
        let policy = vec![
            CompositeSpec::optional(
                "safety",
                CompositeRule::InvertedMean {
                    inputs: vec!["theft".into()],
                },
            ),
            CompositeSpec::required(
                "price",
                CompositeRule::Invert {
                    input: "house_worth".into(),
                },
            ),
        ];
        let active = active_composites(&table, &policy).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "price");

        let required = vec![CompositeSpec::required(
            "education",
            CompositeRule::Invert {
                input: "distance_to_school".into(),
            },
        )];
        assert!(matches!(
            active_composites(&table, &required),
            Err(RegionError::Schema { column, .. }) if column == "distance_to_school"
        ));
    }
}
