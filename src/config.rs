//! Configuration management and validation.
//!
//! Provides the pipeline configuration: which datasets to join, the region
//! hierarchy, the normalisation strategy, the composite indicator policy,
//! the schema mapping applied to raw tables and the output shape.

use crate::constants::{
    self, composites, indicators, APP_DIR_NAME, CBS_TYPE_TRANSLATIONS, CONFIG_FILE_NAME,
    DEFAULT_AMENITY_THRESHOLD_KM, DEFAULT_DATA_DIR, DEFAULT_DEGENERATE_FILL,
    DEFAULT_HIERARCHY_LEVELS, DEFAULT_IDENTIFIERS, DEFAULT_ROOT_UNIT_NAME, GROUP_KEY_SEPARATOR,
};
use crate::error::{RegionError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

/// How indicator columns are rescaled before scoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NormalizationStrategy {
    /// `(v - min) / (max - min)`
    #[value(name = "minmax")]
    MinMax,
    /// Normalised rank of the first occurrence of each distinct value
    Rank,
}

/// What each output unit contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// The immediate child rows of the region
    Children,
    /// The region's own row followed by its whole subtree
    Subtree,
}

/// How unit files are arranged on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputLayout {
    /// One directory per region, mirroring the hierarchy
    Nested,
    /// Every unit side by side as `<code>.<ext>`
    Flat,
}

/// File format of the output units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    Parquet,
}

impl OutputFormat {
    /// File extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Parquet => "parquet",
        }
    }
}

/// One penalised input of a weighted minimum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedTerm {
    pub column: String,
    #[serde(default = "default_one")]
    pub weight: f64,
    #[serde(default = "default_one")]
    pub exponent: f64,
}

impl WeightedTerm {
    pub fn new(column: impl Into<String>, weight: f64, exponent: f64) -> Self {
        Self {
            column: column.into(),
            weight,
            exponent,
        }
    }
}

/// Formula deriving a composite indicator from normalised raw columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompositeRule {
    /// `v`
    Identity { input: String },
    /// `1 - v`
    Invert { input: String },
    /// `v1 * v2 * ...`
    Product { inputs: Vec<String> },
    /// `1 - mean(v1, v2, ...)`
    InvertedMean { inputs: Vec<String> },
    /// `clamp(1 - min(w_i * v_i ^ e_i), 0, 1)`
    WeightedMinimum { terms: Vec<WeightedTerm> },
    /// `raw_km < threshold`; the input is never normalised
    Threshold {
        input: String,
        #[serde(default)]
        threshold_km: Option<f64>,
    },
}

impl CompositeRule {
    /// Raw columns consumed by this rule
    pub fn inputs(&self) -> Vec<&str> {
        match self {
            CompositeRule::Identity { input }
            | CompositeRule::Invert { input }
            | CompositeRule::Threshold { input, .. } => vec![input.as_str()],
            CompositeRule::Product { inputs } | CompositeRule::InvertedMean { inputs } => {
                inputs.iter().map(String::as_str).collect()
            }
            CompositeRule::WeightedMinimum { terms } => {
                terms.iter().map(|t| t.column.as_str()).collect()
            }
        }
    }

    /// Boolean flags compare raw values and skip normalisation
    pub fn is_flag(&self) -> bool {
        matches!(self, CompositeRule::Threshold { .. })
    }
}

/// A named composite indicator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeSpec {
    pub name: String,
    #[serde(flatten)]
    pub rule: CompositeRule,
    /// Required composites fail the run when an input is absent; optional
    /// ones are skipped.
    #[serde(default = "default_true")]
    pub required: bool,
}

impl CompositeSpec {
    pub fn required(name: impl Into<String>, rule: CompositeRule) -> Self {
        Self {
            name: name.into(),
            rule,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, rule: CompositeRule) -> Self {
        Self {
            name: name.into(),
            rule,
            required: false,
        }
    }
}

/// Maps a source column (literal name or regex) onto a canonical column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRule {
    pub source: String,
    pub target: String,
    /// Treat `source` as an anchored regular expression
    #[serde(default)]
    pub pattern: bool,
}

impl ColumnRule {
    pub fn literal(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            pattern: false,
        }
    }

    pub fn pattern(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            pattern: true,
        }
    }
}

/// Declarative mapping from raw table columns to the canonical schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaMapping {
    pub rules: Vec<ColumnRule>,
    /// Keep columns no rule matches (under their own name)
    pub keep_unmapped: bool,
    /// Region type label → hierarchy level name
    pub type_translations: BTreeMap<String, String>,
    /// Strip surrounding whitespace from identity columns
    pub trim_whitespace: bool,
}

impl SchemaMapping {
    /// Mapping that keeps every column as it is
    pub fn identity() -> Self {
        Self {
            rules: Vec::new(),
            keep_unmapped: true,
            type_translations: BTreeMap::new(),
            trim_whitespace: true,
        }
    }

    /// Column names of the CBS "Kerncijfers wijken en buurten" and
    /// "Nabijheid voorzieningen" tables. The numeric suffixes change between
    /// releases, hence the patterns.
    pub fn cbs() -> Self {
        let rules = vec![
            ColumnRule::literal("SoortRegio_2", constants::TYPE_COLUMN),
            ColumnRule::literal("WijkenEnBuurten", constants::NAME_COLUMN),
            ColumnRule::literal("Codering_3", constants::CODE_COLUMN),
            ColumnRule::pattern(r"GemiddeldeWoningwaarde_\d+", indicators::HOUSE_WORTH),
            ColumnRule::pattern(r"Bevolkingsdichtheid_\d+", indicators::DENSITY),
            ColumnRule::pattern(r"MateVanStedelijkheid_\d+", indicators::URBANITY_RAW),
            ColumnRule::pattern(
                r"AfstandTotHuisartsenpraktijk_\d+",
                indicators::DISTANCE_TO_GENERAL_PRACTITIONER,
            ),
            ColumnRule::pattern(
                r"AfstandTotHuisartsenpost_\d+",
                indicators::DISTANCE_TO_GENERAL_PRACTICE,
            ),
            ColumnRule::pattern(r"AfstandTotZiekenhuis_\d+", indicators::DISTANCE_TO_HOSPITAL),
            ColumnRule::pattern(r"AfstandTotSchool_\d+", indicators::DISTANCE_TO_SCHOOL),
            ColumnRule::pattern(r"TotaalDiefstalUitWoningSchuurED_\d+", indicators::THEFT),
            ColumnRule::pattern(
                r"VernielingMisdrijfTegenOpenbareOrde_\d+",
                indicators::DESTRUCTION,
            ),
            ColumnRule::pattern(r"GeweldsEnSeksueleMisdrijven_\d+", indicators::VIOLENCE),
            ColumnRule::pattern(r"AfstandTotApotheek_\d+", indicators::DISTANCE_TO_PHARMACY),
            ColumnRule::pattern(
                r"AfstandTotGroteSupermarkt_\d+",
                indicators::DISTANCE_TO_GROCERY_STORE,
            ),
            ColumnRule::pattern(
                r"AfstandTotKinderdagverblijf_\d+",
                indicators::DISTANCE_TO_DAYCARE,
            ),
            ColumnRule::pattern(r"AfstandTotBibliotheek_\d+", indicators::DISTANCE_TO_LIBRARY),
        ];

        let type_translations = CBS_TYPE_TRANSLATIONS
            .iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect();

        Self {
            rules,
            keep_unmapped: true,
            type_translations,
            trim_whitespace: true,
        }
    }
}

impl Default for SchemaMapping {
    fn default() -> Self {
        Self::cbs()
    }
}

/// The documented default composite policy
pub fn default_composites() -> Vec<CompositeSpec> {
    let flag = |name: &str, column: &str| {
        CompositeSpec::optional(
            name,
            CompositeRule::Threshold {
                input: column.to_string(),
                threshold_km: None,
            },
        )
    };

    vec![
        CompositeSpec::required(
            composites::PRICE,
            CompositeRule::Invert {
                input: indicators::HOUSE_WORTH.to_string(),
            },
        ),
        CompositeSpec::required(
            composites::URBANITY,
            CompositeRule::Product {
                inputs: vec![
                    indicators::URBANITY_RAW.to_string(),
                    indicators::DENSITY.to_string(),
                ],
            },
        ),
        CompositeSpec::required(
            composites::HEALTHCARE,
            CompositeRule::WeightedMinimum {
                terms: vec![
                    WeightedTerm::new(indicators::DISTANCE_TO_GENERAL_PRACTITIONER, 4.0, 1.0),
                    WeightedTerm::new(indicators::DISTANCE_TO_GENERAL_PRACTICE, 2.0, 1.0),
                    WeightedTerm::new(indicators::DISTANCE_TO_HOSPITAL, 1.0, 1.0),
                ],
            },
        ),
        CompositeSpec::required(
            composites::EDUCATION,
            CompositeRule::Invert {
                input: indicators::DISTANCE_TO_SCHOOL.to_string(),
            },
        ),
        CompositeSpec::optional(
            composites::SAFETY,
            CompositeRule::InvertedMean {
                inputs: vec![
                    indicators::THEFT.to_string(),
                    indicators::DESTRUCTION.to_string(),
                    indicators::VIOLENCE.to_string(),
                ],
            },
        ),
        flag(composites::PHARMACY, indicators::DISTANCE_TO_PHARMACY),
        flag(composites::GROCERY_STORE, indicators::DISTANCE_TO_GROCERY_STORE),
        flag(composites::DAYCARE, indicators::DISTANCE_TO_DAYCARE),
        flag(composites::LIBRARY, indicators::DISTANCE_TO_LIBRARY),
    ]
}

/// Global configuration for the regional indicator pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root of the staged layout (`cleaned/`, `joined/`, ...)
    pub data_dir: PathBuf,

    /// Source dataset keys, joined left to right
    pub identifiers: Vec<String>,

    /// Region levels, coarsest first
    pub hierarchy_levels: Vec<String>,

    /// Default rescaling strategy
    pub normalization_strategy: NormalizationStrategy,

    /// Per-column strategy overrides
    pub column_strategies: BTreeMap<String, NormalizationStrategy>,

    /// Composite indicator policy
    pub composites: Vec<CompositeSpec>,

    /// Threshold for amenity flags without an explicit one
    pub amenity_threshold_km: f64,

    /// Value written to a min-max column whose range collapses
    pub degenerate_fill: f64,

    /// Fail instead of filling degenerate ranges
    pub strict_ranges: bool,

    /// Z-score every ratio composite after scoring
    pub standardize_composites: bool,

    /// Content of each output unit
    pub output_mode: OutputMode,

    /// Arrangement of unit files
    pub output_layout: OutputLayout,

    /// Format of unit files
    pub output_format: OutputFormat,

    /// Unit holding the top-level regions in `children` mode
    pub root_unit_name: String,

    /// Raw column → canonical column mapping
    pub schema_mapping: SchemaMapping,

    /// Recompute stages whose output already exists
    pub force: bool,

    /// Dataset groups processed concurrently
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            identifiers: DEFAULT_IDENTIFIERS.iter().map(|s| s.to_string()).collect(),
            hierarchy_levels: DEFAULT_HIERARCHY_LEVELS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            normalization_strategy: NormalizationStrategy::MinMax,
            column_strategies: BTreeMap::new(),
            composites: default_composites(),
            amenity_threshold_km: DEFAULT_AMENITY_THRESHOLD_KM,
            degenerate_fill: DEFAULT_DEGENERATE_FILL,
            strict_ranges: false,
            standardize_composites: false,
            output_mode: OutputMode::Children,
            output_layout: OutputLayout::Nested,
            output_format: OutputFormat::Csv,
            root_unit_name: DEFAULT_ROOT_UNIT_NAME.to_string(),
            schema_mapping: SchemaMapping::default(),
            force: false,
            workers: num_cpus::get().max(1),
        }
    }
}

impl PipelineConfig {
    /// Load a configuration file (TOML); absent keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RegionError::configuration(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        let text = std::fs::read_to_string(path)?;
        let config: PipelineConfig = toml::from_str(&text)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// `<user config dir>/region-processor/config.toml`
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Explicit file, else the default file when present, else defaults
    pub fn load_layered(config_file: Option<&Path>) -> Result<Self> {
        match config_file {
            Some(path) => Self::from_file(path),
            None => match Self::default_config_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path),
                None => Ok(Self::default()),
            },
        }
    }

    /// Set the data directory
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// Set the dataset identifiers to join
    pub fn with_identifiers<I, S>(mut self, identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identifiers = identifiers.into_iter().map(Into::into).collect();
        self
    }

    /// Set the default normalisation strategy
    pub fn with_strategy(mut self, strategy: NormalizationStrategy) -> Self {
        self.normalization_strategy = strategy;
        self
    }

    /// Replace the composite policy
    pub fn with_composites(mut self, composites: Vec<CompositeSpec>) -> Self {
        self.composites = composites;
        self
    }

    /// Set the output mode
    pub fn with_output_mode(mut self, mode: OutputMode) -> Self {
        self.output_mode = mode;
        self
    }

    /// Set the output layout
    pub fn with_output_layout(mut self, layout: OutputLayout) -> Self {
        self.output_layout = layout;
        self
    }

    /// Replace the schema mapping
    pub fn with_schema_mapping(mut self, mapping: SchemaMapping) -> Self {
        self.schema_mapping = mapping;
        self
    }

    /// Enable force recomputation
    pub fn with_force(mut self) -> Self {
        self.force = true;
        self
    }

    /// Strategy for one column
    pub fn strategy_for(&self, column: &str) -> NormalizationStrategy {
        self.column_strategies
            .get(column)
            .copied()
            .unwrap_or(self.normalization_strategy)
    }

    /// Key naming the joined dataset of an identifier group
    pub fn group_key(identifiers: &[String]) -> String {
        identifiers.join(GROUP_KEY_SEPARATOR)
    }

    /// Reject configurations the pipeline cannot run
    pub fn validate(&self) -> Result<()> {
        if self.identifiers.is_empty() {
            return Err(RegionError::configuration("no dataset identifiers given"));
        }
        if self.hierarchy_levels.is_empty() {
            return Err(RegionError::configuration("hierarchy_levels is empty"));
        }

        let mut seen = HashSet::new();
        for level in &self.hierarchy_levels {
            if !seen.insert(level.as_str()) {
                return Err(RegionError::configuration(format!(
                    "hierarchy level '{}' listed twice",
                    level
                )));
            }
        }

        if !self.amenity_threshold_km.is_finite() || self.amenity_threshold_km <= 0.0 {
            return Err(RegionError::configuration(format!(
                "amenity_threshold_km must be positive, got {}",
                self.amenity_threshold_km
            )));
        }
        if !self.degenerate_fill.is_finite() {
            return Err(RegionError::configuration("degenerate_fill must be finite"));
        }
        if self.workers == 0 {
            return Err(RegionError::configuration("workers must be at least 1"));
        }
        if self.root_unit_name.trim().is_empty() {
            return Err(RegionError::configuration("root_unit_name is empty"));
        }

        let mut names = HashSet::new();
        for composite in &self.composites {
            if !names.insert(composite.name.as_str()) {
                return Err(RegionError::configuration(format!(
                    "composite '{}' defined twice",
                    composite.name
                )));
            }
            if composite.rule.inputs().is_empty() {
                return Err(RegionError::configuration(format!(
                    "composite '{}' has no inputs",
                    composite.name
                )));
            }
            match &composite.rule {
                CompositeRule::WeightedMinimum { terms } => {
                    if let Some(term) = terms
                        .iter()
                        .find(|t| !(t.weight.is_finite() && t.weight > 0.0 && t.exponent.is_finite()))
                    {
                        return Err(RegionError::configuration(format!(
                            "composite '{}': term '{}' needs a positive weight and finite exponent",
                            composite.name, term.column
                        )));
                    }
                }
                CompositeRule::Threshold {
                    threshold_km: Some(threshold),
                    ..
                } if !threshold.is_finite() || *threshold <= 0.0 => {
                    return Err(RegionError::configuration(format!(
                        "composite '{}': threshold must be positive",
                        composite.name
                    )));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

fn default_one() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.hierarchy_levels.len(), 4);
        assert_eq!(config.amenity_threshold_km, 5.0);
        assert_eq!(config.normalization_strategy, NormalizationStrategy::MinMax);
    }

    #[test]
    fn test_group_key_joins_identifiers() {
        let ids = vec!["84583NED".to_string(), "84718NED".to_string()];
        assert_eq!(PipelineConfig::group_key(&ids), "84583NED_84718NED");
    }

    #[test]
    fn test_toml_partial_override() {
        let text = r#"
            identifiers = ["A", "B"]
            normalization_strategy = "rank"
            output_layout = "flat"

            [column_strategies]
            distance_to_school = "minmax"

            [[composites]]
            name = "healthcare"
            kind = "weighted_minimum"
            terms = [
                { column = "distance_to_general_practitioner", weight = 1.0, exponent = 1.0 },
                { column = "distance_to_general_practice", weight = 1.0, exponent = 2.0 },
                { column = "distance_to_hospital", exponent = 3.0 },
            ]

            [[composites]]
            name = "library"
            kind = "threshold"
            input = "distance_to_library"
            threshold_km = 2.5
            required = false
        "#;

        let config: PipelineConfig = toml::from_str(text).unwrap();
        assert_eq!(config.identifiers, vec!["A", "B"]);
        assert_eq!(config.normalization_strategy, NormalizationStrategy::Rank);
        assert_eq!(config.output_layout, OutputLayout::Flat);
        assert_eq!(config.strategy_for("distance_to_school"), NormalizationStrategy::MinMax);
        assert_eq!(config.strategy_for("house_worth"), NormalizationStrategy::Rank);
        assert_eq!(config.composites.len(), 2);

        match &config.composites[0].rule {
            CompositeRule::WeightedMinimum { terms } => {
                assert_eq!(terms[1].exponent, 2.0);
                assert_eq!(terms[2].weight, 1.0);
                assert_eq!(terms[2].exponent, 3.0);
            }
            other => panic!("unexpected rule {:?}", other),
        }
        assert!(config.composites[0].required);
        assert!(!config.composites[1].required);
        assert!(config.composites[1].rule.is_flag());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let config = PipelineConfig::default().with_identifiers(Vec::<String>::new());
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.hierarchy_levels.push("country".to_string());
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.amenity_threshold_km = 0.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.composites.push(config.composites[0].clone());
        assert!(config.validate().is_err());

        let config = PipelineConfig::default().with_composites(vec![CompositeSpec::required(
            "healthcare",
            CompositeRule::WeightedMinimum {
                terms: vec![WeightedTerm::new("distance_to_hospital", 0.0, 1.0)],
            },
        )]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rule_inputs() {
        let policy = default_composites();
        let healthcare = policy
            .iter()
            .find(|c| c.name == composites::HEALTHCARE)
            .unwrap();
        assert_eq!(healthcare.rule.inputs().len(), 3);
        assert!(!healthcare.rule.is_flag());

        let flags = policy.iter().filter(|c| c.rule.is_flag()).count();
        assert_eq!(flags, 4);
    }
}
