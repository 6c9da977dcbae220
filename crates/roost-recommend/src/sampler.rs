use std::collections::HashSet;

use roost_config::RecommendConfig;
use roost_core::ListingCandidate;
use roost_store::{Store, StoreError};

use crate::{CANDIDATE_QUERY_RECOVERY, PreferenceVector};

/// Orientations treated as geometrically next to `orientation`.
pub fn adjacent_orientations(orientation: &str) -> &'static [&'static str] {
    match orientation.trim() {
        "South" => &["Southeast", "Southwest", "North-South"],
        "North" => &["Northeast", "Northwest", "North-South"],
        "East" => &["Southeast", "Northeast", "East-West"],
        "West" => &["Southwest", "Northwest", "East-West"],
        "Southeast" => &["South", "East", "Southwest"],
        "Southwest" => &["South", "West", "Northwest"],
        "Northeast" => &["North", "East", "Northwest"],
        "Northwest" => &["North", "West", "Southwest"],
        "North-South" => &["South", "North", "Southeast", "Southwest"],
        "East-West" => &["East", "West", "Southeast", "Northwest"],
        _ => &[],
    }
}

/// Assembles a bounded, duplicate-free candidate pool for one user from
/// similarity-directed listing queries, topped up with recent listings.
pub struct CandidateSampler<'a, S: Store + ?Sized> {
    store: &'a S,
    config: &'a RecommendConfig,
}

impl<'a, S: Store + ?Sized> CandidateSampler<'a, S> {
    pub fn new(store: &'a S, config: &'a RecommendConfig) -> Self {
        Self { store, config }
    }

    pub fn sample_size(&self, top_n: u32) -> u32 {
        top_n.saturating_mul(self.config.sample_multiplier.max(1))
    }

    pub fn sample(&self, preferences: &PreferenceVector, top_n: u32) -> Vec<ListingCandidate> {
        let limit = self.sample_size(top_n);
        if limit == 0 {
            return Vec::new();
        }

        let mut pool = CandidatePool::new(limit as usize);
        let budget = (limit / 4).max(1);

        self.town_stage(&mut pool, preferences, budget);
        self.house_type_stage(&mut pool, preferences, budget);
        self.orientation_stage(&mut pool, preferences, budget);
        self.tag_stage(&mut pool, preferences, budget);
        let similar = pool.len();
        self.backfill(&mut pool, limit);

        tracing::debug!(
            limit,
            similar,
            backfilled = pool.len() - similar,
            "sampled recommendation candidates"
        );
        pool.into_candidates()
    }

    fn town_stage(&self, pool: &mut CandidatePool, preferences: &PreferenceVector, budget: u32) {
        let mut stage = Stage::new(budget);
        let per_query = (budget / 2).max(1);
        for (town, _) in PreferenceVector::ranked(&preferences.town) {
            if stage.done(pool) {
                break;
            }
            let found = self.query("town", self.store.find_listings_by_town(town, per_query));
            stage.absorb(pool, found);
        }
    }

    fn house_type_stage(
        &self,
        pool: &mut CandidatePool,
        preferences: &PreferenceVector,
        budget: u32,
    ) {
        let mut stage = Stage::new(budget);
        for (house_type, _) in PreferenceVector::ranked(&preferences.house_type) {
            if stage.done(pool) {
                break;
            }
            let found = self.query(
                "house_type",
                self.store.find_listings_by_house_type(house_type, budget),
            );
            stage.absorb(pool, found);
        }
    }

    fn orientation_stage(
        &self,
        pool: &mut CandidatePool,
        preferences: &PreferenceVector,
        budget: u32,
    ) {
        let mut stage = Stage::new(budget);
        let exact_limit = (budget / 3).max(1);
        let adjacent_limit = (budget / 6).max(1);
        for (orientation, _) in PreferenceVector::ranked(&preferences.orientation) {
            if stage.done(pool) {
                break;
            }
            let found = self.query(
                "orientation",
                self.store.find_listings_by_orientation(orientation, exact_limit),
            );
            stage.absorb(pool, found);

            for adjacent in adjacent_orientations(orientation) {
                if stage.done(pool) {
                    break;
                }
                let found = self.query(
                    "orientation",
                    self.store.find_listings_by_orientation(adjacent, adjacent_limit),
                );
                stage.absorb(pool, found);
            }
        }
    }

    fn tag_stage(&self, pool: &mut CandidatePool, preferences: &PreferenceVector, budget: u32) {
        let mut stage = Stage::new(budget);
        let per_query = (budget / 3).max(1);
        let top_tags = PreferenceVector::ranked(&preferences.tags)
            .into_iter()
            .take(self.config.top_tag_count as usize);
        for (tag, _) in top_tags {
            if stage.done(pool) {
                break;
            }
            let found = self.query("tags", self.store.find_listings_by_tag_fuzzy(tag, per_query));
            stage.absorb(pool, found);
        }
    }

    fn backfill(&self, pool: &mut CandidatePool, limit: u32) {
        if pool.is_full() {
            return;
        }
        // Every id already pooled may come back, so over-fetch by the pool size.
        let fetch = limit.saturating_add(pool.len() as u32);
        let found = self.query("recent", self.store.find_recent_listings(fetch));
        for candidate in found {
            if pool.is_full() {
                break;
            }
            pool.offer(candidate);
        }
    }

    fn query(
        &self,
        dimension: &'static str,
        result: Result<Vec<ListingCandidate>, StoreError>,
    ) -> Vec<ListingCandidate> {
        result.unwrap_or_else(|err| {
            tracing::warn!(
                dimension,
                recovery = CANDIDATE_QUERY_RECOVERY.as_str(),
                error = %err,
                "candidate query failed"
            );
            Vec::new()
        })
    }
}

struct CandidatePool {
    limit: usize,
    seen: HashSet<String>,
    candidates: Vec<ListingCandidate>,
}

impl CandidatePool {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            seen: HashSet::new(),
            candidates: Vec::new(),
        }
    }

    fn len(&self) -> usize {
        self.candidates.len()
    }

    fn is_full(&self) -> bool {
        self.candidates.len() >= self.limit
    }

    fn offer(&mut self, candidate: ListingCandidate) -> bool {
        if self.is_full() || !self.seen.insert(candidate.house_id.clone()) {
            return false;
        }
        self.candidates.push(candidate);
        true
    }

    fn into_candidates(self) -> Vec<ListingCandidate> {
        self.candidates
    }
}

/// Per-stage budget; only newly pooled ids count against it.
struct Stage {
    budget: usize,
    added: usize,
}

impl Stage {
    fn new(budget: u32) -> Self {
        Self {
            budget: budget as usize,
            added: 0,
        }
    }

    fn done(&self, pool: &CandidatePool) -> bool {
        self.added >= self.budget || pool.is_full()
    }

    fn absorb(&mut self, pool: &mut CandidatePool, found: Vec<ListingCandidate>) {
        for candidate in found {
            if self.done(pool) {
                break;
            }
            if pool.offer(candidate) {
                self.added += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use roost_config::RecommendConfig;
    use roost_store::Store;

    use super::{CandidateSampler, adjacent_orientations};
    use crate::PreferenceVector;
    use crate::test_support::{FailingStore, T0, listing, open_temp_store};

    fn config(sample_multiplier: u32) -> RecommendConfig {
        RecommendConfig {
            sample_multiplier,
            ..RecommendConfig::default()
        }
    }

    #[test]
    fn pool_never_contains_duplicate_ids() {
        let (_temp, store) = open_temp_store();
        for index in 0..40 {
            let mut item = listing(&format!("h-{index:02}"), "Downtown", "Garden;Pool", T0 + index);
            item.house_type = Some("2B1L".to_owned());
            item.orientation = Some(if index % 2 == 0 { "South" } else { "Southeast" }.to_owned());
            store.upsert_listing(&item).expect("upsert listing");
        }

        let mut preferences = PreferenceVector::default();
        preferences.town.insert("Downtown".to_owned(), 10.0);
        preferences.house_type.insert("2B1L".to_owned(), 5.0);
        preferences.orientation.insert("South".to_owned(), 3.0);
        preferences.tags.insert("Garden".to_owned(), 4.0);
        preferences.tags.insert("Pool".to_owned(), 2.0);

        let config = config(10);
        let sampler = CandidateSampler::new(&store, &config);
        let pool = sampler.sample(&preferences, 3);

        assert_eq!(pool.len(), 30);
        let unique = pool
            .iter()
            .map(|candidate| candidate.house_id.as_str())
            .collect::<HashSet<_>>();
        assert_eq!(unique.len(), pool.len());
    }

    #[test]
    fn similarity_stages_run_before_backfill() {
        let (_temp, store) = open_temp_store();
        store
            .upsert_listing(&listing("h-old-match", "Harbor", "", T0))
            .expect("upsert match");
        for index in 1..=10 {
            store
                .upsert_listing(&listing(&format!("h-new-{index:02}"), "Uptown", "", T0 + index))
                .expect("upsert filler");
        }

        let mut preferences = PreferenceVector::default();
        preferences.town.insert("Harbor".to_owned(), 1.0);

        let config = config(4);
        let sampler = CandidateSampler::new(&store, &config);
        let pool = sampler.sample(&preferences, 1);

        assert_eq!(pool.len(), 4);
        assert_eq!(pool[0].house_id, "h-old-match");
        assert_eq!(pool[1].house_id, "h-new-10");
    }

    #[test]
    fn only_the_heaviest_tags_are_queried() {
        let (_temp, store) = open_temp_store();
        for index in 1..=4 {
            let house_id = format!("h-T{index}");
            let tag = format!("Tag{index}");
            store
                .upsert_listing(&listing(&house_id, "", &tag, T0 + index))
                .expect("upsert tagged");
        }
        for index in 0..40 {
            store
                .upsert_listing(&listing(&format!("f-{index:02}"), "", "", T0 + 100 + index))
                .expect("upsert filler");
        }

        let mut preferences = PreferenceVector::default();
        for (tag, weight) in [("Tag1", 4.0), ("Tag2", 3.0), ("Tag3", 2.0), ("Tag4", 1.0)] {
            preferences.tags.insert(tag.to_owned(), weight);
        }

        // sample size 40, stage budget 10: a fourth tag query would still fit
        let config = config(40);
        assert_eq!(config.top_tag_count, 3);
        let pool = CandidateSampler::new(&store, &config).sample(&preferences, 1);
        let ids = pool
            .iter()
            .map(|candidate| candidate.house_id.as_str())
            .collect::<Vec<_>>();

        assert_eq!(ids.len(), 40);
        assert_eq!(&ids[..3], &["h-T1", "h-T2", "h-T3"]);
        assert!(!ids.contains(&"h-T4"));
        assert_eq!(ids[3], "f-39");
    }

    #[test]
    fn each_similarity_stage_stops_at_its_budget() {
        let (_temp, store) = open_temp_store();
        let mut preferences = PreferenceVector::default();
        for index in 0..8 {
            let town = format!("Town{index}");
            store
                .upsert_listing(&listing(&format!("t-{index}"), &town, "", T0 + index))
                .expect("upsert");
            preferences.town.insert(town, f64::from(8 - index as i32));
        }

        // sample size 8, stage budget 2
        let config = config(8);
        let pool = CandidateSampler::new(&store, &config).sample(&preferences, 1);
        let ids = pool
            .iter()
            .map(|candidate| candidate.house_id.as_str())
            .collect::<Vec<_>>();

        assert_eq!(
            ids,
            vec!["t-0", "t-1", "t-7", "t-6", "t-5", "t-4", "t-3", "t-2"]
        );
    }

    #[test]
    fn adjacent_orientations_widen_the_pool() {
        let (_temp, store) = open_temp_store();
        let mut south = listing("h-south", "", "", T0);
        south.orientation = Some("South".to_owned());
        let mut southwest = listing("h-southwest", "", "", T0 + 1);
        southwest.orientation = Some("Southwest".to_owned());
        let mut north = listing("h-north", "", "", T0 + 2);
        north.orientation = Some("North".to_owned());
        for item in [&south, &southwest, &north] {
            store.upsert_listing(item).expect("upsert");
        }

        let mut preferences = PreferenceVector::default();
        preferences.orientation.insert("South".to_owned(), 1.0);

        // sample size 40, stage budget 10: room for everything similar
        let config = config(40);
        let sampler = CandidateSampler::new(&store, &config);
        let pool = sampler.sample(&preferences, 1);
        let ids = pool
            .iter()
            .map(|candidate| candidate.house_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["h-south", "h-southwest", "h-north"]);

        assert!(adjacent_orientations("South").contains(&"North-South"));
        assert!(adjacent_orientations("Upside").is_empty());
    }

    #[test]
    fn empty_preferences_fall_back_to_recent_listings() {
        let (_temp, store) = open_temp_store();
        for index in 0..5 {
            store
                .upsert_listing(&listing(&format!("h-{index}"), "Downtown", "", T0 + index))
                .expect("upsert");
        }

        let config = config(10);
        let sampler = CandidateSampler::new(&store, &config);
        let pool = sampler.sample(&PreferenceVector::default(), 2);
        assert_eq!(pool.len(), 5);
        assert_eq!(pool[0].house_id, "h-4");
    }

    #[test]
    fn zero_top_n_and_failed_queries_yield_empty_pool() {
        let config = RecommendConfig::default();
        let mut preferences = PreferenceVector::default();
        preferences.town.insert("Downtown".to_owned(), 1.0);

        let sampler = CandidateSampler::new(&FailingStore, &config);
        assert!(sampler.sample(&preferences, 10).is_empty());
        assert!(sampler.sample(&preferences, 0).is_empty());
    }
}
