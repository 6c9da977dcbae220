use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, NaiveTime};
use serde::{Deserialize, Serialize};

pub type ListingId = String;
pub type UserId = i64;

pub const TAG_SEPARATOR: char = ';';
pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorKind {
    View,
    Like,
}

impl BehaviorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Like => "like",
        }
    }
}

impl std::str::FromStr for BehaviorKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "view" => Ok(Self::View),
            "like" => Ok(Self::Like),
            other => Err(format!(
                "invalid behavior kind '{other}', expected one of: view, like"
            )),
        }
    }
}

/// A house listing as stored by the listing catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub house_id: ListingId,
    pub title: String,
    #[serde(default)]
    pub community: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub town: Option<String>,
    #[serde(default)]
    pub house_type: Option<String>,
    #[serde(default)]
    pub orientation: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub total_price: Option<f64>,
    #[serde(default)]
    pub floor_area: Option<f64>,
    /// Price per square metre.
    #[serde(default)]
    pub unit_price: Option<f64>,
    #[serde(default)]
    pub floor_type: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub created_at: i64,
}

impl Listing {
    pub fn candidate(&self) -> ListingCandidate {
        ListingCandidate {
            house_id: self.house_id.clone(),
            town: self.town.clone(),
            house_type: self.house_type.clone(),
            orientation: self.orientation.clone(),
            tags: self.tags.clone(),
        }
    }
}

/// The matchable dimensions of a listing, as seen by the recommender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingCandidate {
    pub house_id: ListingId,
    pub town: Option<String>,
    pub house_type: Option<String>,
    pub orientation: Option<String>,
    pub tags: Option<String>,
}

/// One view or like, projected onto the listing dimensions it touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorEvent {
    pub house_id: ListingId,
    pub town: Option<String>,
    pub house_type: Option<String>,
    pub orientation: Option<String>,
    pub tags: Option<String>,
    pub score: Option<f64>,
    pub create_time: i64,
    pub behavior_type: BehaviorKind,
}

impl BehaviorEvent {
    /// Stored score, with null and zero both meaning the neutral weight.
    pub fn effective_base_score(&self) -> f64 {
        match self.score {
            Some(score) if score != 0.0 => score,
            _ => 1.0,
        }
    }
}

/// Splits a `;`-delimited tag field, trimming tokens and dropping empty ones.
pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(TAG_SEPARATOR)
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_owned)
        .collect()
}

pub fn tag_set(raw: &str) -> BTreeSet<String> {
    split_tags(raw).into_iter().collect()
}

pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

pub fn current_unix_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or(0)
}

/// Whole days from `earlier` to `later`, truncated toward zero.
pub fn whole_days_between(later_ms: i64, earlier_ms: i64) -> i64 {
    later_ms.saturating_sub(earlier_ms) / DAY_MS
}

/// `[start, end)` of the UTC calendar day containing `timestamp_ms`.
pub fn utc_day_bounds(timestamp_ms: i64) -> (i64, i64) {
    let Some(moment) = DateTime::from_timestamp_millis(timestamp_ms) else {
        let start = timestamp_ms - timestamp_ms.rem_euclid(DAY_MS);
        return (start, start + DAY_MS);
    };
    let start = moment
        .date_naive()
        .and_time(NaiveTime::MIN)
        .and_utc()
        .timestamp_millis();
    (start, start + DAY_MS)
}

pub fn format_timestamp_millis(timestamp_ms: i64) -> String {
    DateTime::from_timestamp_millis(timestamp_ms)
        .map(|moment| moment.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(score: Option<f64>) -> BehaviorEvent {
        BehaviorEvent {
            house_id: "h-1".to_owned(),
            town: None,
            house_type: None,
            orientation: None,
            tags: None,
            score,
            create_time: 0,
            behavior_type: BehaviorKind::View,
        }
    }

    #[test]
    fn split_tags_trims_and_drops_empty_tokens() {
        assert_eq!(split_tags("A; B ;;C"), vec!["A", "B", "C"]);
        assert!(split_tags(" ; ;").is_empty());
        assert_eq!(tag_set("Pool;Pool; Garden").len(), 2);
    }

    #[test]
    fn missing_or_zero_score_falls_back_to_neutral_weight() {
        assert_eq!(event(None).effective_base_score(), 1.0);
        assert_eq!(event(Some(0.0)).effective_base_score(), 1.0);
        assert_eq!(event(Some(15.0)).effective_base_score(), 15.0);
    }

    #[test]
    fn whole_days_truncate_partial_days() {
        assert_eq!(whole_days_between(DAY_MS * 2 + 5, 0), 2);
        assert_eq!(whole_days_between(DAY_MS - 1, 0), 0);
        assert_eq!(whole_days_between(0, DAY_MS), -1);
    }

    #[test]
    fn day_bounds_cover_the_utc_day() {
        let noon = 1_700_000_000_000;
        let (start, end) = utc_day_bounds(noon);
        assert!(start <= noon && noon < end);
        assert_eq!(end - start, DAY_MS);
        assert_eq!(start % DAY_MS, 0);
    }

    #[test]
    fn behavior_kind_parses_known_values() {
        assert_eq!("like".parse::<BehaviorKind>(), Ok(BehaviorKind::Like));
        assert!("share".parse::<BehaviorKind>().is_err());
    }
}
