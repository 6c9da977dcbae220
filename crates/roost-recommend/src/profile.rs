use std::cmp::Ordering;
use std::collections::BTreeMap;

use roost_config::RecommendConfig;
use roost_core::{BehaviorEvent, non_empty, split_tags, whole_days_between};
use serde::Serialize;

use crate::BehaviorWindow;

/// Accumulated, time-decayed weights over the four matchable listing
/// dimensions. Only categories that occurred in the behavior window appear
/// as keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PreferenceVector {
    pub town: BTreeMap<String, f64>,
    pub house_type: BTreeMap<String, f64>,
    pub orientation: BTreeMap<String, f64>,
    pub tags: BTreeMap<String, f64>,
}

impl PreferenceVector {
    pub fn is_empty(&self) -> bool {
        self.town.is_empty()
            && self.house_type.is_empty()
            && self.orientation.is_empty()
            && self.tags.is_empty()
    }

    /// Entries of `dimension` by descending weight, name ascending on ties.
    pub fn ranked(dimension: &BTreeMap<String, f64>) -> Vec<(&str, f64)> {
        let mut entries = dimension
            .iter()
            .map(|(name, weight)| (name.as_str(), *weight))
            .collect::<Vec<_>>();
        entries.sort_by(|left, right| {
            right
                .1
                .partial_cmp(&left.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| left.0.cmp(right.0))
        });
        entries
    }

    fn accumulate(&mut self, event: &BehaviorEvent, effective_score: f64) {
        add(&mut self.town, event.town.as_deref(), effective_score);
        add(&mut self.house_type, event.house_type.as_deref(), effective_score);
        add(&mut self.orientation, event.orientation.as_deref(), effective_score);
        if let Some(tags) = event.tags.as_deref() {
            for tag in split_tags(tags) {
                *self.tags.entry(tag).or_insert(0.0) += effective_score;
            }
        }
    }
}

fn add(dimension: &mut BTreeMap<String, f64>, value: Option<&str>, effective_score: f64) {
    if let Some(value) = non_empty(value) {
        *dimension.entry(value.to_owned()).or_insert(0.0) += effective_score;
    }
}

/// Decay multiplier for an event `days_old` whole days before the newest
/// event in the window.
pub fn time_weight(days_old: i64, config: &RecommendConfig) -> f64 {
    if days_old <= 0 {
        return 1.0;
    }
    let exponent = i32::try_from(days_old).unwrap_or(i32::MAX);
    config
        .time_decay_factor
        .powi(exponent)
        .max(config.time_weight_floor)
}

pub fn build_preferences(window: &BehaviorWindow, config: &RecommendConfig) -> PreferenceVector {
    let mut preferences = PreferenceVector::default();
    let Some(latest_time) = window.events().map(|event| event.create_time).max() else {
        return preferences;
    };

    for event in window.events() {
        let days_old = whole_days_between(latest_time, event.create_time);
        let effective_score = event.effective_base_score() * time_weight(days_old, config);
        // Negative stored scores would break the non-negative weight invariant.
        if effective_score <= 0.0 {
            continue;
        }
        preferences.accumulate(event, effective_score);
    }

    preferences
}

#[cfg(test)]
mod tests {
    use roost_config::RecommendConfig;
    use roost_core::{BehaviorEvent, BehaviorKind, DAY_MS};

    use super::{PreferenceVector, build_preferences, time_weight};
    use crate::BehaviorWindow;

    fn event(kind: BehaviorKind, score: Option<f64>, create_time: i64) -> BehaviorEvent {
        BehaviorEvent {
            house_id: "h-1".to_owned(),
            town: Some("Downtown".to_owned()),
            house_type: Some("2B1L".to_owned()),
            orientation: None,
            tags: Some("Garden; Pool ;;".to_owned()),
            score,
            create_time,
            behavior_type: kind,
        }
    }

    #[test]
    fn time_weight_is_one_at_latest_and_never_below_floor() {
        let config = RecommendConfig::default();
        assert_eq!(time_weight(0, &config), 1.0);
        assert_eq!(time_weight(-3, &config), 1.0);

        let mut previous = 1.0;
        for days in 1..200 {
            let weight = time_weight(days, &config);
            assert!(weight <= previous, "day {days} increased the weight");
            assert!(weight >= 0.1, "day {days} fell under the floor");
            previous = weight;
        }
        assert_eq!(time_weight(10_000, &config), 0.1);
        assert!((time_weight(1, &config) - 0.95).abs() < 1e-12);
    }

    #[test]
    fn empty_window_builds_empty_vector() {
        let preferences = build_preferences(&BehaviorWindow::default(), &RecommendConfig::default());
        assert!(preferences.is_empty());
        assert!(preferences.town.is_empty());
        assert!(preferences.tags.is_empty());
    }

    #[test]
    fn decay_is_relative_to_newest_event_not_wall_clock() {
        let latest = 1_000 * DAY_MS;
        let window = BehaviorWindow {
            likes: vec![event(BehaviorKind::Like, Some(10.0), latest)],
            views: vec![event(BehaviorKind::View, None, latest - 2 * DAY_MS - 5)],
        };

        let preferences = build_preferences(&window, &RecommendConfig::default());
        let expected = 10.0 + 0.95_f64.powi(2);
        assert!((preferences.town["Downtown"] - expected).abs() < 1e-9);
        assert!((preferences.tags["Garden"] - expected).abs() < 1e-9);
        assert!((preferences.tags["Pool"] - expected).abs() < 1e-9);
        assert_eq!(preferences.tags.len(), 2);
        assert!(preferences.orientation.is_empty());
    }

    #[test]
    fn zero_score_counts_as_neutral_weight() {
        let window = BehaviorWindow {
            likes: Vec::new(),
            views: vec![event(BehaviorKind::View, Some(0.0), 0)],
        };
        let preferences = build_preferences(&window, &RecommendConfig::default());
        assert_eq!(preferences.house_type["2B1L"], 1.0);
    }

    #[test]
    fn ranked_orders_by_weight_then_name() {
        let mut preferences = PreferenceVector::default();
        preferences.tags.insert("Pool".to_owned(), 2.0);
        preferences.tags.insert("Garden".to_owned(), 2.0);
        preferences.tags.insert("Metro".to_owned(), 5.0);

        let ranked = PreferenceVector::ranked(&preferences.tags);
        let names = ranked.iter().map(|(name, _)| *name).collect::<Vec<_>>();
        assert_eq!(names, vec!["Metro", "Garden", "Pool"]);
    }
}
