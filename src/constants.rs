//! Application constants for the region processor
//!
//! Canonical column names, the default region hierarchy, on-disk stage
//! layout and the default values used throughout the pipeline.

// =============================================================================
// Identity Columns
// =============================================================================

/// Region level discriminator (`country|municipality|district|neighbourhood`)
pub const TYPE_COLUMN: &str = "type";

/// Region code, unique within its level
pub const CODE_COLUMN: &str = "code";

/// Display name of the region
pub const NAME_COLUMN: &str = "name";

/// Columns that identify a region rather than measure it
pub const IDENTITY_COLUMNS: &[&str] = &[TYPE_COLUMN, CODE_COLUMN, NAME_COLUMN];

/// Columns every loaded table must provide
pub const REQUIRED_IDENTITY_COLUMNS: &[&str] = &[TYPE_COLUMN, CODE_COLUMN];

// =============================================================================
// Region Hierarchy
// =============================================================================

/// Default hierarchy, coarsest level first
pub const DEFAULT_HIERARCHY_LEVELS: &[&str] = &["country", "municipality", "district", "neighbourhood"];

/// Translations of CBS region type labels to hierarchy level names
pub const CBS_TYPE_TRANSLATIONS: &[(&str, &str)] = &[
    ("Land", "country"),
    ("Gemeente", "municipality"),
    ("Wijk", "district"),
    ("Buurt", "neighbourhood"),
];

// =============================================================================
// Canonical Indicator Columns
// =============================================================================

pub mod indicators {
    pub const HOUSE_WORTH: &str = "house_worth";
    pub const DENSITY: &str = "density";
    pub const URBANITY_RAW: &str = "urbanity_raw";
    pub const DISTANCE_TO_GENERAL_PRACTITIONER: &str = "distance_to_general_practitioner";
    pub const DISTANCE_TO_GENERAL_PRACTICE: &str = "distance_to_general_practice";
    pub const DISTANCE_TO_HOSPITAL: &str = "distance_to_hospital";
    pub const DISTANCE_TO_SCHOOL: &str = "distance_to_school";
    pub const THEFT: &str = "theft";
    pub const DESTRUCTION: &str = "destruction";
    pub const VIOLENCE: &str = "violence";
    pub const DISTANCE_TO_PHARMACY: &str = "distance_to_pharmacy";
    pub const DISTANCE_TO_GROCERY_STORE: &str = "distance_to_grocery_store";
    pub const DISTANCE_TO_DAYCARE: &str = "distance_to_daycare";
    pub const DISTANCE_TO_LIBRARY: &str = "distance_to_library";
}

/// Default composite indicator names
pub mod composites {
    pub const PRICE: &str = "price";
    pub const URBANITY: &str = "urbanity";
    pub const SAFETY: &str = "safety";
    pub const HEALTHCARE: &str = "healthcare";
    pub const EDUCATION: &str = "education";
    pub const PHARMACY: &str = "pharmacy";
    pub const GROCERY_STORE: &str = "grocery_store";
    pub const DAYCARE: &str = "daycare";
    pub const LIBRARY: &str = "library";
}

// =============================================================================
// Stage Layout
// =============================================================================

/// Cleaned input tables, one `<identifier>.csv` per dataset
pub const CLEANED_DIR: &str = "cleaned";

/// Outer-joined tables
pub const JOINED_DIR: &str = "joined";

/// Imputed, normalised and scored tables
pub const PREPROCESSED_DIR: &str = "preprocessed";

/// Per-region output units
pub const SPLIT_DIR: &str = "split";

/// Manifest written next to the split units
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Separator between identifiers in a dataset group key
pub const GROUP_KEY_SEPARATOR: &str = "_";

// =============================================================================
// Defaults
// =============================================================================

/// Default data directory
pub const DEFAULT_DATA_DIR: &str = "data";

/// Default CBS dataset identifiers (Kerncijfers wijken en buurten, Nabijheid voorzieningen)
pub const DEFAULT_IDENTIFIERS: &[&str] = &["84583NED", "84718NED"];

/// Amenity flags are set when the facility lies closer than this
pub const DEFAULT_AMENITY_THRESHOLD_KM: f64 = 5.0;

/// Value assigned to a min-max column whose range collapses to a point
pub const DEFAULT_DEGENERATE_FILL: f64 = 0.0;

/// Name of the unit holding the top-level regions
pub const DEFAULT_ROOT_UNIT_NAME: &str = "root";

/// Config file looked up when no `--config` is given
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Application directory name under the user config directory
pub const APP_DIR_NAME: &str = "region-processor";
