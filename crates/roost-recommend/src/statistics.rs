use std::collections::BTreeMap;

use roost_config::{StatisticsConfig, price_ranges_are_valid};
use roost_store::{GroupColumn, GroupStatistics, ListingFilter, PriceCount, Store};
use serde::Serialize;

use crate::RecommendError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatisticsDimension {
    Orientation,
    Town,
    Tags,
    HouseType,
    FloorType,
    Community,
    Price,
}

impl StatisticsDimension {
    pub const ALL: [Self; 7] = [
        Self::Orientation,
        Self::Town,
        Self::Tags,
        Self::HouseType,
        Self::FloorType,
        Self::Community,
        Self::Price,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Orientation => "orientation",
            Self::Town => "town",
            Self::Tags => "tags",
            Self::HouseType => "house_type",
            Self::FloorType => "floor_type",
            Self::Community => "community",
            Self::Price => "price",
        }
    }

    fn group_column(self) -> Option<GroupColumn> {
        match self {
            Self::Orientation => Some(GroupColumn::Orientation),
            Self::Town => Some(GroupColumn::Town),
            Self::Tags => Some(GroupColumn::Tags),
            Self::HouseType => Some(GroupColumn::HouseType),
            Self::FloorType => Some(GroupColumn::FloorType),
            Self::Community => Some(GroupColumn::Community),
            Self::Price => None,
        }
    }
}

impl std::str::FromStr for StatisticsDimension {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|dimension| dimension.as_str() == normalized)
            .ok_or_else(|| {
                let expected = Self::ALL.map(Self::as_str).join(", ");
                format!("invalid statistics dimension '{value}', expected one of: {expected}")
            })
    }
}

/// One row of a statistics report. Price buckets carry only a count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsEntry {
    pub name: Option<String>,
    pub value: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
}

impl From<GroupStatistics> for StatisticsEntry {
    fn from(group: GroupStatistics) -> Self {
        Self {
            name: group.name,
            value: group.count,
            avg: group.avg_unit_price.map(round2),
            max: group.max_unit_price,
            min: group.min_unit_price,
        }
    }
}

/// Ascending unit-price boundaries. `n` boundaries make `n + 1` buckets:
/// below the first, one per adjacent pair, and at or above the last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceBuckets {
    bounds: Vec<u32>,
}

impl PriceBuckets {
    pub fn new(bounds: &[u32]) -> Result<Self, RecommendError> {
        if !price_ranges_are_valid(bounds) {
            return Err(RecommendError::InvalidInput(format!(
                "price ranges {bounds:?} must be non-empty and strictly ascending"
            )));
        }
        Ok(Self {
            bounds: bounds.to_vec(),
        })
    }

    pub fn bucket_of(&self, price: f64) -> usize {
        self.bounds.partition_point(|bound| f64::from(*bound) <= price)
    }

    pub fn label(&self, bucket: usize) -> String {
        let last = self.bounds.len() - 1;
        match bucket {
            0 => format!("under {}", format_price(self.bounds[0])),
            bucket if bucket > last => format!("{} and above", format_price(self.bounds[last])),
            bucket => format!(
                "{}-{}",
                format_price(self.bounds[bucket - 1]),
                format_price(self.bounds[bucket])
            ),
        }
    }

    /// Sums exact-price counts into buckets, cheapest bucket first. Empty
    /// buckets are left out.
    pub fn distribute(&self, counts: &[PriceCount]) -> Vec<StatisticsEntry> {
        let mut totals = BTreeMap::<usize, u64>::new();
        for entry in counts {
            *totals.entry(self.bucket_of(entry.unit_price)).or_default() += entry.count;
        }

        totals
            .into_iter()
            .map(|(bucket, value)| StatisticsEntry {
                name: Some(self.label(bucket)),
                value,
                avg: None,
                max: None,
                min: None,
            })
            .collect()
    }
}

/// Prices below ten thousand render in thousands (`8K`); larger ones in
/// ten-thousands with at most one decimal (`1.2W`, `3W`).
pub fn format_price(price: u32) -> String {
    if price < 10_000 {
        return format!("{}K", price / 1_000);
    }
    if price % 10_000 == 0 {
        format!("{}W", price / 10_000)
    } else {
        format!("{:.1}W", f64::from(price) / 10_000.0)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub struct StatisticsService<'a, S: Store + ?Sized> {
    store: &'a S,
    config: &'a StatisticsConfig,
}

impl<'a, S: Store + ?Sized> StatisticsService<'a, S> {
    pub fn new(store: &'a S, config: &'a StatisticsConfig) -> Self {
        Self { store, config }
    }

    pub fn statistics(
        &self,
        dimension: StatisticsDimension,
        filter: &ListingFilter,
    ) -> Result<Vec<StatisticsEntry>, RecommendError> {
        let Some(column) = dimension.group_column() else {
            let buckets = PriceBuckets::new(&self.config.price_ranges)?;
            let counts = self.store.count_listings_by_unit_price(filter)?;
            return Ok(buckets.distribute(&counts));
        };

        let limit = (column == GroupColumn::Community).then_some(self.config.community_limit);
        let groups = self.store.group_listing_statistics(column, filter, limit)?;
        tracing::debug!(
            dimension = dimension.as_str(),
            groups = groups.len(),
            "computed listing statistics"
        );
        Ok(groups.into_iter().map(StatisticsEntry::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use roost_config::{DEFAULT_PRICE_RANGES, StatisticsConfig};
    use roost_store::{ListingFilter, PriceCount, Store};

    use super::{PriceBuckets, StatisticsDimension, StatisticsService, format_price};
    use crate::RecommendError;
    use crate::test_support::{FailingStore, T0, listing, open_temp_store};

    fn default_buckets() -> PriceBuckets {
        PriceBuckets::new(&DEFAULT_PRICE_RANGES).expect("default ranges are valid")
    }

    fn names(entries: &[super::StatisticsEntry]) -> Vec<&str> {
        entries
            .iter()
            .map(|entry| entry.name.as_deref().unwrap_or_default())
            .collect()
    }

    #[test]
    fn prices_format_in_thousands_and_ten_thousands() {
        assert_eq!(format_price(8_000), "8K");
        assert_eq!(format_price(9_500), "9K");
        assert_eq!(format_price(12_000), "1.2W");
        assert_eq!(format_price(20_000), "2W");
        assert_eq!(format_price(45_000), "4.5W");
    }

    #[test]
    fn bucket_boundaries_are_lower_inclusive() {
        let buckets = default_buckets();
        assert_eq!(buckets.bucket_of(7_999.9), 0);
        assert_eq!(buckets.bucket_of(8_000.0), 1);
        assert_eq!(buckets.bucket_of(39_999.0), 4);
        assert_eq!(buckets.bucket_of(40_000.0), 5);

        assert_eq!(buckets.label(0), "under 8K");
        assert_eq!(buckets.label(1), "8K-1.2W");
        assert_eq!(buckets.label(4), "3W-4W");
        assert_eq!(buckets.label(5), "4W and above");
    }

    #[test]
    fn distribute_sums_counts_cheapest_bucket_first() {
        let counts = [
            PriceCount { unit_price: 41_000.0, count: 1 },
            PriceCount { unit_price: 9_000.0, count: 2 },
            PriceCount { unit_price: 5_000.0, count: 4 },
            PriceCount { unit_price: 11_999.0, count: 3 },
        ];

        let entries = default_buckets().distribute(&counts);

        assert_eq!(names(&entries), vec!["under 8K", "8K-1.2W", "4W and above"]);
        let values = entries.iter().map(|entry| entry.value).collect::<Vec<_>>();
        assert_eq!(values, vec![4, 5, 1]);
        assert!(entries.iter().all(|entry| entry.avg.is_none()));
    }

    #[test]
    fn invalid_bounds_are_rejected() {
        assert!(matches!(
            PriceBuckets::new(&[]),
            Err(RecommendError::InvalidInput(_))
        ));
        assert!(matches!(
            PriceBuckets::new(&[10_000, 10_000]),
            Err(RecommendError::InvalidInput(_))
        ));

        let single = PriceBuckets::new(&[10_000]).expect("single bound");
        assert_eq!(single.label(0), "under 1W");
        assert_eq!(single.label(1), "1W and above");
    }

    #[test]
    fn dimensions_parse_with_either_separator() {
        assert_eq!(
            "house-type".parse::<StatisticsDimension>(),
            Ok(StatisticsDimension::HouseType)
        );
        assert_eq!(
            " Floor_Type ".parse::<StatisticsDimension>(),
            Ok(StatisticsDimension::FloorType)
        );
        assert!("decoration".parse::<StatisticsDimension>().is_err());
    }

    #[test]
    fn service_reports_groups_and_price_buckets() {
        let (_temp, store) = open_temp_store();
        for (house_id, town, price) in [
            ("h-1", "Downtown", 10_000.0),
            ("h-2", "Downtown", 10_005.0),
            ("h-3", "Uptown", 45_000.0),
        ] {
            let mut record = listing(house_id, town, "", T0);
            record.unit_price = Some(price);
            store.upsert_listing(&record).expect("upsert");
        }
        let config = StatisticsConfig::default();
        let service = StatisticsService::new(&store, &config);

        let towns = service
            .statistics(StatisticsDimension::Town, &ListingFilter::default())
            .expect("town statistics");
        assert_eq!(names(&towns), vec!["Downtown", "Uptown"]);
        assert_eq!(towns[0].value, 2);
        assert_eq!(towns[0].avg, Some(10_002.5));

        let prices = service
            .statistics(StatisticsDimension::Price, &ListingFilter::default())
            .expect("price statistics");
        assert_eq!(names(&prices), vec!["8K-1.2W", "4W and above"]);
        assert_eq!(prices[0].value, 2);
    }

    #[test]
    fn community_statistics_honor_configured_limit() {
        let (_temp, store) = open_temp_store();
        for (index, community) in ["Maple", "Maple", "Birch", "Cedar"].iter().enumerate() {
            let mut record = listing(&format!("h-{index}"), "Downtown", "", T0);
            record.community = Some((*community).to_owned());
            store.upsert_listing(&record).expect("upsert");
        }
        let config = StatisticsConfig {
            community_limit: 1,
            ..StatisticsConfig::default()
        };

        let communities = StatisticsService::new(&store, &config)
            .statistics(StatisticsDimension::Community, &ListingFilter::default())
            .expect("community statistics");
        assert_eq!(names(&communities), vec!["Maple"]);
    }

    #[test]
    fn storage_errors_propagate() {
        let config = StatisticsConfig::default();
        let err = StatisticsService::new(&FailingStore, &config)
            .statistics(StatisticsDimension::Orientation, &ListingFilter::default())
            .expect_err("store is offline");
        assert!(matches!(err, RecommendError::Store(_)));
    }
}
