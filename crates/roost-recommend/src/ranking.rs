use std::cmp::Ordering;
use std::collections::BTreeMap;

use roost_config::RecommendConfig;
use roost_core::{ListingCandidate, ListingId, non_empty, tag_set};
use serde::Serialize;

use crate::PreferenceVector;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredListing {
    pub house_id: ListingId,
    pub score: f64,
}

pub fn score_candidate(
    candidate: &ListingCandidate,
    preferences: &PreferenceVector,
    config: &RecommendConfig,
) -> f64 {
    let weights = &config.weights;
    let mut score = 0.0;

    score += single_value_match(&preferences.town, candidate.town.as_deref()) * weights.town;
    score += single_value_match(&preferences.house_type, candidate.house_type.as_deref())
        * weights.house_type;
    score += single_value_match(&preferences.orientation, candidate.orientation.as_deref())
        * weights.orientation;
    score += tag_match(&preferences.tags, candidate.tags.as_deref(), config) * weights.tags;

    score.max(config.min_score)
}

fn single_value_match(preferences: &BTreeMap<String, f64>, value: Option<&str>) -> f64 {
    non_empty(value)
        .and_then(|value| preferences.get(value))
        .copied()
        .unwrap_or(0.0)
}

fn tag_match(
    preferences: &BTreeMap<String, f64>,
    tags: Option<&str>,
    config: &RecommendConfig,
) -> f64 {
    let Some(tags) = tags else {
        return 0.0;
    };

    let mut tag_score = 0.0;
    let mut matched = 0usize;
    for tag in tag_set(tags) {
        if let Some(weight) = preferences.get(&tag) {
            tag_score += weight;
            matched += 1;
        }
    }
    if matched > 1 {
        tag_score += (matched - 1) as f64 * config.tag_combination_bonus;
    }
    tag_score
}

pub fn score_candidates(
    candidates: &[ListingCandidate],
    preferences: &PreferenceVector,
    config: &RecommendConfig,
) -> Vec<ScoredListing> {
    candidates
        .iter()
        .map(|candidate| ScoredListing {
            house_id: candidate.house_id.clone(),
            score: score_candidate(candidate, preferences, config),
        })
        .collect()
}

/// Ids of the `top_n` best listings, score descending then id ascending.
pub fn rank(mut scored: Vec<ScoredListing>, top_n: usize) -> Vec<ListingId> {
    scored.sort_by(|left, right| {
        right
            .score
            .partial_cmp(&left.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| left.house_id.cmp(&right.house_id))
    });
    scored.truncate(top_n);
    scored.into_iter().map(|entry| entry.house_id).collect()
}
