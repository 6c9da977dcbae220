use std::collections::BTreeMap;

use roost_config::RecommendConfig;
use roost_core::{ListingId, format_timestamp_millis};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{PreferenceVector, RecommendError};

pub const MODEL_ALGORITHM: &str = "multiDimensionContentScoring";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelWeights {
    pub town: f64,
    pub house_type: f64,
    pub orientation: f64,
    pub tags: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedWeight {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionModels {
    pub town_model: Vec<NamedWeight>,
    pub house_type_model: Vec<NamedWeight>,
    pub orientation_model: Vec<NamedWeight>,
    pub tags_model: Vec<NamedWeight>,
}

/// Parameters and profile summary stored alongside each snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub algorithm: String,
    pub weights: ModelWeights,
    pub time_decay_factor: f64,
    pub view_records_count: u32,
    pub like_records_count: u32,
    pub view_new_records_count: u32,
    pub like_new_records_count: u32,
    pub tag_combination_bonus: f64,
    pub total: u32,
    pub create_time: String,
    pub auto_generated: bool,
    pub total_recommended: usize,
    pub model_info: DimensionModels,
}

pub fn build_model_info(
    preferences: &PreferenceVector,
    config: &RecommendConfig,
    total_recommended: usize,
    now_ms: i64,
    auto_generated: bool,
) -> ModelInfo {
    ModelInfo {
        algorithm: MODEL_ALGORITHM.to_owned(),
        weights: ModelWeights {
            town: config.weights.town,
            house_type: config.weights.house_type,
            orientation: config.weights.orientation,
            tags: config.weights.tags,
        },
        time_decay_factor: config.time_decay_factor,
        view_records_count: config.view_window,
        like_records_count: config.like_window,
        view_new_records_count: config.view_refresh_threshold,
        like_new_records_count: config.like_refresh_threshold,
        tag_combination_bonus: config.tag_combination_bonus,
        total: config.max_recommendations,
        create_time: format_timestamp_millis(now_ms),
        auto_generated,
        total_recommended,
        model_info: DimensionModels {
            town_model: named_weights(&preferences.town),
            house_type_model: named_weights(&preferences.house_type),
            orientation_model: named_weights(&preferences.orientation),
            tags_model: named_weights(&preferences.tags),
        },
    }
}

fn named_weights(dimension: &BTreeMap<String, f64>) -> Vec<NamedWeight> {
    PreferenceVector::ranked(dimension)
        .into_iter()
        .map(|(name, value)| NamedWeight {
            name: name.to_owned(),
            value: round2(value),
        })
        .collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Decodes snapshot content into its ordered id list. Anything other than
/// a JSON array of strings or numbers is corrupt.
pub fn parse_snapshot_content(content: Option<&str>) -> Result<Vec<ListingId>, RecommendError> {
    let raw = content.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(RecommendError::InvalidInput(
            "snapshot content is empty".to_owned(),
        ));
    }

    let Value::Array(items) = serde_json::from_str::<Value>(raw)? else {
        return Err(RecommendError::InvalidInput(
            "snapshot content is not a JSON array".to_owned(),
        ));
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::String(id) => Ok(id),
            Value::Number(id) => Ok(id.to_string()),
            other => Err(RecommendError::InvalidInput(format!(
                "snapshot content holds a non-id element: {other}"
            ))),
        })
        .collect()
}
