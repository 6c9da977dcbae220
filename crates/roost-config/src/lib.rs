use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use toml_edit::DocumentMut;

pub const ROOST_DIR_NAME: &str = ".roost";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_LOG_LEVEL: &str = "info";

pub const DEFAULT_WEIGHT_TOWN: f64 = 6.0;
pub const DEFAULT_WEIGHT_HOUSE_TYPE: f64 = 15.0;
pub const DEFAULT_WEIGHT_ORIENTATION: f64 = 10.0;
pub const DEFAULT_WEIGHT_TAGS: f64 = 3.0;
pub const DEFAULT_TIME_DECAY_FACTOR: f64 = 0.95;
pub const DEFAULT_TIME_WEIGHT_FLOOR: f64 = 0.1;
pub const DEFAULT_LIKE_WINDOW: u32 = 5;
pub const DEFAULT_VIEW_WINDOW: u32 = 30;
pub const DEFAULT_LIKE_REFRESH_THRESHOLD: u32 = 1;
pub const DEFAULT_VIEW_REFRESH_THRESHOLD: u32 = 5;
pub const DEFAULT_MAX_RECOMMENDATIONS: u32 = 1000;
pub const DEFAULT_SAMPLE_MULTIPLIER: u32 = 10;
pub const DEFAULT_TOP_TAG_COUNT: u32 = 3;
pub const DEFAULT_TAG_COMBINATION_BONUS: f64 = 1.5;
pub const DEFAULT_MIN_SCORE: f64 = 0.1;
pub const DEFAULT_LIKE_SCORE: f64 = 15.0;
pub const DEFAULT_VIEW_SCORE: f64 = 1.0;
pub const DEFAULT_PRICE_RANGES: [u32; 5] = [8_000, 12_000, 20_000, 30_000, 40_000];
pub const DEFAULT_COMMUNITY_LIMIT: u32 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RoostConfig {
    #[serde(default)]
    pub recommend: RecommendConfig,
    #[serde(default)]
    pub statistics: StatisticsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DimensionWeights {
    #[serde(default = "default_weight_town")]
    pub town: f64,
    #[serde(default = "default_weight_house_type")]
    pub house_type: f64,
    #[serde(default = "default_weight_orientation")]
    pub orientation: f64,
    #[serde(default = "default_weight_tags")]
    pub tags: f64,
}

impl Default for DimensionWeights {
    fn default() -> Self {
        Self {
            town: DEFAULT_WEIGHT_TOWN,
            house_type: DEFAULT_WEIGHT_HOUSE_TYPE,
            orientation: DEFAULT_WEIGHT_ORIENTATION,
            tags: DEFAULT_WEIGHT_TAGS,
        }
    }
}

/// Tunables of the recommendation pipeline. Passed by value into the
/// service so tests can override any of them locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecommendConfig {
    #[serde(default = "default_time_decay_factor")]
    pub time_decay_factor: f64,
    #[serde(default = "default_time_weight_floor")]
    pub time_weight_floor: f64,
    #[serde(default = "default_like_window")]
    pub like_window: u32,
    #[serde(default = "default_view_window")]
    pub view_window: u32,
    #[serde(default = "default_like_refresh_threshold")]
    pub like_refresh_threshold: u32,
    #[serde(default = "default_view_refresh_threshold")]
    pub view_refresh_threshold: u32,
    #[serde(default = "default_max_recommendations")]
    pub max_recommendations: u32,
    #[serde(default = "default_sample_multiplier")]
    pub sample_multiplier: u32,
    #[serde(default = "default_top_tag_count")]
    pub top_tag_count: u32,
    #[serde(default = "default_tag_combination_bonus")]
    pub tag_combination_bonus: f64,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default = "default_like_score")]
    pub like_score: f64,
    #[serde(default = "default_view_score")]
    pub view_score: f64,
    #[serde(default)]
    pub weights: DimensionWeights,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            time_decay_factor: DEFAULT_TIME_DECAY_FACTOR,
            time_weight_floor: DEFAULT_TIME_WEIGHT_FLOOR,
            like_window: DEFAULT_LIKE_WINDOW,
            view_window: DEFAULT_VIEW_WINDOW,
            like_refresh_threshold: DEFAULT_LIKE_REFRESH_THRESHOLD,
            view_refresh_threshold: DEFAULT_VIEW_REFRESH_THRESHOLD,
            max_recommendations: DEFAULT_MAX_RECOMMENDATIONS,
            sample_multiplier: DEFAULT_SAMPLE_MULTIPLIER,
            top_tag_count: DEFAULT_TOP_TAG_COUNT,
            tag_combination_bonus: DEFAULT_TAG_COMBINATION_BONUS,
            min_score: DEFAULT_MIN_SCORE,
            like_score: DEFAULT_LIKE_SCORE,
            view_score: DEFAULT_VIEW_SCORE,
            weights: DimensionWeights::default(),
        }
    }
}

/// Listing statistics. `price_ranges` are the ascending unit-price
/// boundaries used to bucket the price distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatisticsConfig {
    #[serde(default = "default_price_ranges")]
    pub price_ranges: Vec<u32>,
    #[serde(default = "default_community_limit")]
    pub community_limit: u32,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            price_ranges: default_price_ranges(),
            community_limit: DEFAULT_COMMUNITY_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigWarning {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("failed to serialize config TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("failed to edit config TOML: {0}")]
    TomlEdit(#[from] toml_edit::TomlError),
    #[error("invalid config key '{0}', expected <section>.<key>")]
    InvalidKey(String),
}

pub fn roost_dir(workspace_root: impl AsRef<Path>) -> PathBuf {
    workspace_root.as_ref().join(ROOST_DIR_NAME)
}

pub fn config_path(workspace_root: impl AsRef<Path>) -> PathBuf {
    roost_dir(workspace_root).join(CONFIG_FILE_NAME)
}

/// Values are returned as written; run `validate_config` and
/// `normalize_config` before use.
pub fn load_workspace_config(workspace_root: impl AsRef<Path>) -> Result<RoostConfig, ConfigError> {
    let path = config_path(workspace_root);
    if !path.exists() {
        return Ok(RoostConfig::default());
    }

    let raw = fs::read_to_string(path)?;
    let parsed: RoostConfig = toml::from_str(&raw)?;
    Ok(parsed)
}

pub fn ensure_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<RoostConfig, ConfigError> {
    let workspace_root = workspace_root.as_ref();
    fs::create_dir_all(roost_dir(workspace_root))?;

    let path = config_path(workspace_root);
    if path.exists() {
        return load_workspace_config(workspace_root);
    }

    let config = RoostConfig::default();
    let content = toml::to_string_pretty(&config)?;
    fs::write(path, content)?;

    Ok(config)
}

/// Sets one dotted key (for example `recommend.view_window` or
/// `recommend.weights.town`) in the workspace config file, leaving the
/// rest of the document untouched. The edit is only written when the
/// resulting document still loads.
pub fn set_config_value(
    workspace_root: impl AsRef<Path>,
    key: &str,
    raw_value: &str,
) -> Result<RoostConfig, ConfigError> {
    let workspace_root = workspace_root.as_ref();
    let segments = key.split('.').map(str::trim).collect::<Vec<_>>();
    if segments.len() < 2 || segments.iter().any(|segment| segment.is_empty()) {
        return Err(ConfigError::InvalidKey(key.to_owned()));
    }

    fs::create_dir_all(roost_dir(workspace_root))?;
    let path = config_path(workspace_root);
    let existing = if path.exists() {
        fs::read_to_string(&path)?
    } else {
        toml::to_string_pretty(&RoostConfig::default())?
    };

    let mut document = existing.parse::<DocumentMut>()?;
    let Some((leaf, parents)) = segments.split_last() else {
        return Err(ConfigError::InvalidKey(key.to_owned()));
    };

    let mut table = document.as_table_mut();
    for segment in parents {
        table = table
            .entry(segment)
            .or_insert(toml_edit::table())
            .as_table_mut()
            .ok_or_else(|| ConfigError::InvalidKey(key.to_owned()))?;
    }
    table.insert(leaf, toml_edit::value(parse_edit_value(raw_value)));

    let rendered = document.to_string();
    let parsed: RoostConfig = toml::from_str(&rendered)?;
    fs::write(path, rendered)?;

    Ok(parsed)
}

pub fn validate_config(config: &RoostConfig) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();
    let recommend = &config.recommend;

    if !(recommend.time_decay_factor > 0.0 && recommend.time_decay_factor <= 1.0) {
        warnings.push(ConfigWarning {
            code: "decay_factor_out_of_range",
            message: format!(
                "recommend.time_decay_factor={} is outside (0, 1]; using {DEFAULT_TIME_DECAY_FACTOR}",
                recommend.time_decay_factor
            ),
        });
    }
    if !(0.0..=1.0).contains(&recommend.time_weight_floor) {
        warnings.push(ConfigWarning {
            code: "time_weight_floor_out_of_range",
            message: format!(
                "recommend.time_weight_floor={} is outside [0, 1]; using {DEFAULT_TIME_WEIGHT_FLOOR}",
                recommend.time_weight_floor
            ),
        });
    }

    let weights = [
        ("town", recommend.weights.town),
        ("house_type", recommend.weights.house_type),
        ("orientation", recommend.weights.orientation),
        ("tags", recommend.weights.tags),
    ];
    for (name, weight) in weights {
        if weight < 0.0 {
            warnings.push(ConfigWarning {
                code: "negative_weight",
                message: format!("recommend.weights.{name}={weight} is negative; using 0"),
            });
        }
    }

    if recommend.like_window == 0 && recommend.view_window == 0 {
        warnings.push(ConfigWarning {
            code: "empty_behavior_window",
            message: "recommend.like_window and recommend.view_window are both 0; recommendations can never be personalized".to_owned(),
        });
    }
    if recommend.max_recommendations == 0 {
        warnings.push(ConfigWarning {
            code: "zero_max_recommendations",
            message: format!(
                "recommend.max_recommendations=0; using {DEFAULT_MAX_RECOMMENDATIONS}"
            ),
        });
    }
    if recommend.min_score < 0.0 {
        warnings.push(ConfigWarning {
            code: "negative_min_score",
            message: format!(
                "recommend.min_score={} is negative; using {DEFAULT_MIN_SCORE}",
                recommend.min_score
            ),
        });
    }

    let thresholds = [
        ("like_refresh_threshold", recommend.like_refresh_threshold),
        ("view_refresh_threshold", recommend.view_refresh_threshold),
    ];
    for (name, threshold) in thresholds {
        if threshold == 0 {
            warnings.push(ConfigWarning {
                code: "zero_refresh_threshold",
                message: format!(
                    "recommend.{name}=0 would regenerate on every first-page read; using 1"
                ),
            });
        }
    }

    let statistics = &config.statistics;
    if !price_ranges_are_valid(&statistics.price_ranges) {
        warnings.push(ConfigWarning {
            code: "price_ranges_invalid",
            message: format!(
                "statistics.price_ranges={:?} must be non-empty and strictly ascending; using {:?}",
                statistics.price_ranges, DEFAULT_PRICE_RANGES
            ),
        });
    }
    if statistics.community_limit == 0 {
        warnings.push(ConfigWarning {
            code: "zero_community_limit",
            message: format!("statistics.community_limit=0; using {DEFAULT_COMMUNITY_LIMIT}"),
        });
    }

    warnings
}

pub fn price_ranges_are_valid(ranges: &[u32]) -> bool {
    !ranges.is_empty() && ranges.windows(2).all(|pair| pair[0] < pair[1])
}

pub fn normalize_config(mut config: RoostConfig) -> RoostConfig {
    let recommend = &mut config.recommend;
    if !(recommend.time_decay_factor > 0.0 && recommend.time_decay_factor <= 1.0) {
        recommend.time_decay_factor = DEFAULT_TIME_DECAY_FACTOR;
    }
    if !(0.0..=1.0).contains(&recommend.time_weight_floor) {
        recommend.time_weight_floor = DEFAULT_TIME_WEIGHT_FLOOR;
    }
    recommend.weights.town = recommend.weights.town.max(0.0);
    recommend.weights.house_type = recommend.weights.house_type.max(0.0);
    recommend.weights.orientation = recommend.weights.orientation.max(0.0);
    recommend.weights.tags = recommend.weights.tags.max(0.0);
    if recommend.max_recommendations == 0 {
        recommend.max_recommendations = DEFAULT_MAX_RECOMMENDATIONS;
    }
    recommend.sample_multiplier = recommend.sample_multiplier.max(1);
    if recommend.min_score < 0.0 {
        recommend.min_score = DEFAULT_MIN_SCORE;
    }
    recommend.like_refresh_threshold = recommend.like_refresh_threshold.max(1);
    recommend.view_refresh_threshold = recommend.view_refresh_threshold.max(1);

    let statistics = &mut config.statistics;
    if !price_ranges_are_valid(&statistics.price_ranges) {
        statistics.price_ranges = default_price_ranges();
    }
    if statistics.community_limit == 0 {
        statistics.community_limit = DEFAULT_COMMUNITY_LIMIT;
    }

    let level = config.logging.level.trim();
    if level.is_empty() {
        config.logging.level = default_log_level();
    } else {
        config.logging.level = level.to_ascii_lowercase();
    }

    config
}

fn parse_edit_value(raw: &str) -> toml_edit::Value {
    raw.trim()
        .parse::<toml_edit::Value>()
        .unwrap_or_else(|_| toml_edit::Value::from(raw.trim()))
}

fn default_weight_town() -> f64 {
    DEFAULT_WEIGHT_TOWN
}

fn default_weight_house_type() -> f64 {
    DEFAULT_WEIGHT_HOUSE_TYPE
}

fn default_weight_orientation() -> f64 {
    DEFAULT_WEIGHT_ORIENTATION
}

fn default_weight_tags() -> f64 {
    DEFAULT_WEIGHT_TAGS
}

fn default_time_decay_factor() -> f64 {
    DEFAULT_TIME_DECAY_FACTOR
}

fn default_time_weight_floor() -> f64 {
    DEFAULT_TIME_WEIGHT_FLOOR
}

fn default_like_window() -> u32 {
    DEFAULT_LIKE_WINDOW
}

fn default_view_window() -> u32 {
    DEFAULT_VIEW_WINDOW
}

fn default_like_refresh_threshold() -> u32 {
    DEFAULT_LIKE_REFRESH_THRESHOLD
}

fn default_view_refresh_threshold() -> u32 {
    DEFAULT_VIEW_REFRESH_THRESHOLD
}

fn default_max_recommendations() -> u32 {
    DEFAULT_MAX_RECOMMENDATIONS
}

fn default_sample_multiplier() -> u32 {
    DEFAULT_SAMPLE_MULTIPLIER
}

fn default_top_tag_count() -> u32 {
    DEFAULT_TOP_TAG_COUNT
}

fn default_tag_combination_bonus() -> f64 {
    DEFAULT_TAG_COMBINATION_BONUS
}

fn default_min_score() -> f64 {
    DEFAULT_MIN_SCORE
}

fn default_like_score() -> f64 {
    DEFAULT_LIKE_SCORE
}

fn default_view_score() -> f64 {
    DEFAULT_VIEW_SCORE
}

fn default_price_ranges() -> Vec<u32> {
    DEFAULT_PRICE_RANGES.to_vec()
}

fn default_community_limit() -> u32 {
    DEFAULT_COMMUNITY_LIMIT
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_owned()
}
