use roost_config::RecommendConfig;
use roost_core::{Listing, ListingId, UserId, current_unix_timestamp_millis};
use roost_store::{NewSnapshot, SnapshotRecord, Store};
use serde::Serialize;

use crate::{
    CandidateSampler, ModelInfo, PreferenceVector, RecommendError, StalenessDecision,
    build_model_info, build_preferences, evaluate_staleness, parse_snapshot_content, rank,
    read_behavior_window, score_candidates,
};

#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationRequest {
    pub user_id: UserId,
    pub user_name: Option<String>,
    pub page_num: u32,
    pub page_size: u32,
    pub now_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationPage {
    pub listings: Vec<Listing>,
    /// Length of the whole snapshot, not of this page.
    pub total: usize,
    pub snapshot_id: Option<i64>,
    pub regenerated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staleness: Option<StalenessDecision>,
}

impl RecommendationPage {
    fn empty() -> Self {
        Self {
            listings: Vec::new(),
            total: 0,
            snapshot_id: None,
            regenerated: false,
            staleness: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedRecommendations {
    pub house_ids: Vec<ListingId>,
    pub preferences: PreferenceVector,
    pub behavior_count: usize,
    pub candidate_count: usize,
}

/// Runs the recommendation pipeline against a store and serves paged
/// results from persisted snapshots.
pub struct RecommendService<'a, S: Store + ?Sized> {
    store: &'a S,
    config: &'a RecommendConfig,
}

impl<'a, S: Store + ?Sized> RecommendService<'a, S> {
    pub fn new(store: &'a S, config: &'a RecommendConfig) -> Self {
        Self { store, config }
    }

    /// Behavior window -> preferences -> candidate pool -> scores -> top ids.
    /// Storage failures along the way shrink the result instead of failing.
    pub fn generate(&self, user_id: UserId, top_n: u32) -> GeneratedRecommendations {
        let window = read_behavior_window(self.store, user_id, self.config);
        let preferences = build_preferences(&window, self.config);
        let candidates = CandidateSampler::new(self.store, self.config).sample(&preferences, top_n);
        let scored = score_candidates(&candidates, &preferences, self.config);
        let house_ids = rank(scored, top_n as usize);

        tracing::debug!(
            user_id,
            behaviors = window.len(),
            candidates = candidates.len(),
            recommended = house_ids.len(),
            "generated recommendations"
        );

        GeneratedRecommendations {
            house_ids,
            preferences,
            behavior_count: window.len(),
            candidate_count: candidates.len(),
        }
    }

    pub fn save_snapshot(
        &self,
        user_id: UserId,
        user_name: Option<&str>,
        house_ids: &[ListingId],
        model_info: &ModelInfo,
        now_ms: Option<i64>,
    ) -> Result<SnapshotRecord, RecommendError> {
        if house_ids.is_empty() {
            return Err(RecommendError::InvalidInput(
                "recommendation list must not be empty".to_owned(),
            ));
        }

        let max = self.config.max_recommendations.max(1) as usize;
        let house_ids = if house_ids.len() > max {
            tracing::warn!(
                user_id,
                requested = house_ids.len(),
                max,
                "truncating recommendation list"
            );
            &house_ids[..max]
        } else {
            house_ids
        };

        let content = serde_json::to_string(house_ids)?;
        let model_info = serde_json::to_string(model_info)?;
        let create_time = now_ms.unwrap_or_else(current_unix_timestamp_millis);
        let user_name = user_name.map(str::to_owned);

        let id = self.store.insert_snapshot(&NewSnapshot {
            user_id,
            user_name: user_name.clone(),
            model_info: model_info.clone(),
            content: content.clone(),
            create_time: Some(create_time),
        })?;
        tracing::info!(
            user_id,
            snapshot_id = id,
            recommended = house_ids.len(),
            "saved recommendation snapshot"
        );

        Ok(SnapshotRecord {
            id,
            user_id,
            user_name,
            model_info: Some(model_info),
            content: Some(content),
            create_time: Some(create_time),
        })
    }

    pub fn staleness(&self, user_id: UserId) -> StalenessDecision {
        evaluate_staleness(self.store, user_id, self.config)
    }

    pub fn should_generate(&self, user_id: UserId) -> bool {
        self.staleness(user_id).should_generate()
    }

    /// Regenerates unconditionally. Returns the new snapshot, or `None`
    /// when the pipeline found nothing or saving failed.
    pub fn refresh(
        &self,
        user_id: UserId,
        user_name: Option<&str>,
        now_ms: Option<i64>,
    ) -> Option<SnapshotRecord> {
        match self.regenerate(user_id, user_name, now_ms) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!(user_id, error = %err, "recommendation refresh failed");
                None
            }
        }
    }

    fn regenerate(
        &self,
        user_id: UserId,
        user_name: Option<&str>,
        now_ms: Option<i64>,
    ) -> Result<Option<SnapshotRecord>, RecommendError> {
        let now_ms = now_ms.unwrap_or_else(current_unix_timestamp_millis);
        let generated = self.generate(user_id, self.config.max_recommendations);
        if generated.house_ids.is_empty() {
            tracing::info!(user_id, "pipeline produced no recommendations");
            return Ok(None);
        }

        let model_info = build_model_info(
            &generated.preferences,
            self.config,
            generated.house_ids.len(),
            now_ms,
            true,
        );
        self.save_snapshot(
            user_id,
            user_name,
            &generated.house_ids,
            &model_info,
            Some(now_ms),
        )
        .map(Some)
    }

    /// One page of the user's feed. Only page 1 may regenerate; every
    /// failure degrades to a smaller or empty page.
    pub fn recommendations(&self, request: &RecommendationRequest) -> RecommendationPage {
        let user_id = request.user_id;
        let page_num = request.page_num.max(1);
        let page_size = request.page_size.max(1);

        let mut regenerated = None;
        let mut staleness = None;
        if page_num == 1 {
            let decision = self.staleness(user_id);
            if decision.should_generate() {
                tracing::debug!(
                    user_id,
                    reason = decision.as_str(),
                    "regenerating recommendations"
                );
                regenerated = self.refresh(user_id, request.user_name.as_deref(), request.now_ms);
            }
            staleness = Some(decision);
        }

        let was_regenerated = regenerated.is_some();
        let snapshot = match regenerated {
            Some(snapshot) => snapshot,
            None => match self.store.find_latest_snapshot(user_id) {
                Ok(Some(snapshot)) => snapshot,
                Ok(None) => {
                    return RecommendationPage {
                        staleness,
                        ..RecommendationPage::empty()
                    };
                }
                Err(err) => {
                    tracing::warn!(user_id, error = %err, "failed to load latest snapshot");
                    return RecommendationPage {
                        staleness,
                        ..RecommendationPage::empty()
                    };
                }
            },
        };

        let house_ids = match parse_snapshot_content(snapshot.content.as_deref()) {
            Ok(house_ids) => house_ids,
            Err(err) => {
                tracing::error!(
                    user_id,
                    snapshot_id = snapshot.id,
                    error = %err,
                    "corrupt recommendation snapshot, deleting it"
                );
                if let Err(err) = self.store.delete_snapshot(snapshot.id) {
                    tracing::warn!(
                        snapshot_id = snapshot.id,
                        error = %err,
                        "failed to delete corrupt snapshot"
                    );
                }
                return RecommendationPage {
                    staleness,
                    ..RecommendationPage::empty()
                };
            }
        };

        let start = (page_num as usize - 1).saturating_mul(page_size as usize);
        let listings = house_ids
            .iter()
            .skip(start)
            .take(page_size as usize)
            .filter_map(|house_id| self.resolve(house_id))
            .collect();

        RecommendationPage {
            listings,
            total: house_ids.len(),
            snapshot_id: Some(snapshot.id),
            regenerated: was_regenerated,
            staleness,
        }
    }

    fn resolve(&self, house_id: &str) -> Option<Listing> {
        match self.store.find_listing_by_id(house_id) {
            Ok(Some(listing)) => Some(listing),
            Ok(None) => {
                tracing::warn!(house_id, "recommended listing no longer exists");
                None
            }
            Err(err) => {
                tracing::warn!(house_id, error = %err, "failed to resolve recommended listing");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use roost_config::RecommendConfig;
    use roost_store::{NewSnapshot, SqliteStore, Store};

    use super::{RecommendService, RecommendationRequest};
    use crate::test_support::{FailingStore, T0, behavior, listing, open_temp_store};
    use crate::{RecommendError, StalenessDecision, build_model_info, score_candidates};

    fn request(user_id: i64, page_num: u32, page_size: u32) -> RecommendationRequest {
        RecommendationRequest {
            user_id,
            user_name: Some("alice".to_owned()),
            page_num,
            page_size,
            now_ms: Some(T0 + 1_000),
        }
    }

    fn insert_snapshot(
        store: &SqliteStore,
        user_id: i64,
        content: &str,
        create_time: Option<i64>,
    ) -> i64 {
        store
            .insert_snapshot(&NewSnapshot {
                user_id,
                user_name: None,
                model_info: "{}".to_owned(),
                content: content.to_owned(),
                create_time,
            })
            .expect("insert snapshot")
    }

    fn seed_downtown(store: &SqliteStore) {
        let liked = listing("h-liked", "Downtown", "Garden;Pool", T0);
        store.upsert_listing(&liked).expect("upsert liked");
        store
            .upsert_listing(&listing("h-a", "Downtown", "Garden;Pool;Gym", T0 + 1))
            .expect("upsert a");
        store
            .upsert_listing(&listing("h-b", "Downtown", "", T0 + 2))
            .expect("upsert b");
        store
            .upsert_listing(&listing("h-c", "Uptown", "Attic", T0 + 3))
            .expect("upsert c");
        store
            .insert_like(&behavior(1, &liked, 10.0, T0))
            .expect("insert like");
    }

    #[test]
    fn single_like_profile_scores_and_ranks_candidates() {
        let (_temp, store) = open_temp_store();
        seed_downtown(&store);
        let config = RecommendConfig::default();
        let service = RecommendService::new(&store, &config);

        let generated = service.generate(1, 10);
        assert_eq!(generated.preferences.town.get("Downtown"), Some(&10.0));
        assert_eq!(generated.preferences.tags.get("Garden"), Some(&10.0));
        assert_eq!(generated.preferences.tags.get("Pool"), Some(&10.0));
        assert_eq!(generated.behavior_count, 1);
        assert_eq!(generated.house_ids, vec!["h-a", "h-liked", "h-b", "h-c"]);

        let a = store.find_listing_by_id("h-a").expect("get").expect("exists");
        let b = store.find_listing_by_id("h-b").expect("get").expect("exists");
        let scored = score_candidates(
            &[a.candidate(), b.candidate()],
            &generated.preferences,
            &config,
        );
        assert!((scored[0].score - 124.5).abs() < 1e-9);
        assert!((scored[1].score - 60.0).abs() < 1e-9);
    }

    #[test]
    fn first_page_without_snapshot_generates_and_serves_it() {
        let (_temp, store) = open_temp_store();
        seed_downtown(&store);
        let config = RecommendConfig::default();
        let service = RecommendService::new(&store, &config);

        let page = service.recommendations(&request(1, 1, 2));
        assert!(page.regenerated);
        assert_eq!(page.staleness, Some(StalenessDecision::NoSnapshot));
        assert_eq!(page.total, 4);
        let ids = page
            .listings
            .iter()
            .map(|listing| listing.house_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["h-a", "h-liked"]);

        let latest = store
            .find_latest_snapshot(1)
            .expect("latest")
            .expect("snapshot saved");
        assert_eq!(Some(latest.id), page.snapshot_id);
        assert_eq!(latest.user_name.as_deref(), Some("alice"));
        assert_eq!(latest.create_time, Some(T0 + 1_000));
        let model_info: serde_json::Value =
            serde_json::from_str(latest.model_info.as_deref().expect("model info")).expect("json");
        assert_eq!(model_info["autoGenerated"], true);
        assert_eq!(model_info["modelInfo"]["townModel"][0]["value"], 10.0);

        // the fresh snapshot is reused on the next read
        let again = service.recommendations(&request(1, 1, 2));
        assert!(!again.regenerated);
        assert_eq!(again.snapshot_id, page.snapshot_id);
    }

    #[test]
    fn corrupt_snapshot_is_purged_and_reads_empty() {
        let (_temp, store) = open_temp_store();
        let config = RecommendConfig::default();
        let service = RecommendService::new(&store, &config);
        insert_snapshot(&store, 1, "not-json", Some(T0));

        let page = service.recommendations(&request(1, 1, 10));
        assert!(page.listings.is_empty());
        assert_eq!(page.total, 0);
        assert!(store.find_latest_snapshot(1).expect("latest").is_none());
    }

    #[test]
    fn five_new_views_regenerate_on_first_page_only() {
        let (_temp, store) = open_temp_store();
        let house = listing("h-1", "Downtown", "Garden", T0);
        store.upsert_listing(&house).expect("upsert");
        let config = RecommendConfig::default();
        let service = RecommendService::new(&store, &config);
        let old = insert_snapshot(&store, 1, "[\"h-1\"]", Some(T0));
        for offset in 1..=5 {
            store
                .insert_view(&behavior(1, &house, 1.0, T0 + offset))
                .expect("insert view");
        }

        let second_page = service.recommendations(&request(1, 2, 10));
        assert!(!second_page.regenerated);
        assert_eq!(second_page.snapshot_id, Some(old));
        assert!(second_page.staleness.is_none());

        let first_page = service.recommendations(&request(1, 1, 10));
        assert!(first_page.regenerated);
        assert_ne!(first_page.snapshot_id, Some(old));
        assert!(matches!(
            first_page.staleness,
            Some(StalenessDecision::NewActivity { new_views: 5, new_likes: 0, .. })
        ));
    }

    #[test]
    fn later_pages_never_create_snapshots() {
        let (_temp, store) = open_temp_store();
        seed_downtown(&store);
        let config = RecommendConfig::default();
        let service = RecommendService::new(&store, &config);

        let page = service.recommendations(&request(1, 2, 10));
        assert_eq!(page.total, 0);
        assert!(page.snapshot_id.is_none());
        assert!(store.find_latest_snapshot(1).expect("latest").is_none());
    }

    #[test]
    fn unresolved_ids_are_dropped_but_counted() {
        let (_temp, store) = open_temp_store();
        for house_id in ["h-1", "h-2", "h-3"] {
            store
                .upsert_listing(&listing(house_id, "Downtown", "", T0))
                .expect("upsert");
        }
        let config = RecommendConfig::default();
        let service = RecommendService::new(&store, &config);
        insert_snapshot(&store, 1, "[\"h-1\", \"gone\", \"h-2\", \"h-3\"]", Some(T0 + 5_000));

        let page = service.recommendations(&request(1, 1, 3));
        assert!(!page.regenerated);
        assert_eq!(page.total, 4);
        let ids = page
            .listings
            .iter()
            .map(|listing| listing.house_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["h-1", "h-2"]);

        let tail = service.recommendations(&request(1, 2, 3));
        assert_eq!(tail.listings.len(), 1);
        assert_eq!(tail.listings[0].house_id, "h-3");
        assert!(service.recommendations(&request(1, 9, 3)).listings.is_empty());
    }

    #[test]
    fn empty_pipeline_falls_back_to_previous_snapshot() {
        let (_temp, store) = open_temp_store();
        let config = RecommendConfig::default();
        let service = RecommendService::new(&store, &config);
        let old = insert_snapshot(&store, 1, "[\"h-1\"]", None);

        let page = service.recommendations(&request(1, 1, 10));
        assert!(!page.regenerated);
        assert_eq!(
            page.staleness,
            Some(StalenessDecision::MissingTimestamp { snapshot_id: old })
        );
        assert_eq!(page.snapshot_id, Some(old));
        assert_eq!(page.total, 1);
        assert!(page.listings.is_empty());
    }

    #[test]
    fn failing_store_never_surfaces_errors() {
        let config = RecommendConfig::default();
        let service = RecommendService::new(&FailingStore, &config);

        assert!(service.should_generate(1));
        assert!(service.generate(1, 10).house_ids.is_empty());
        assert!(service.refresh(1, None, None).is_none());

        let page = service.recommendations(&request(1, 1, 10));
        assert_eq!(page.total, 0);
        assert!(page.listings.is_empty());
        assert_eq!(page.staleness, Some(StalenessDecision::CheckFailed));
    }

    #[test]
    fn explicit_save_rejects_empty_and_truncates_long_lists() {
        let (_temp, store) = open_temp_store();
        let config = RecommendConfig {
            max_recommendations: 2,
            ..RecommendConfig::default()
        };
        let service = RecommendService::new(&store, &config);
        let model_info = build_model_info(&Default::default(), &config, 0, T0, false);

        let err = service
            .save_snapshot(1, None, &[], &model_info, Some(T0))
            .expect_err("empty list is rejected");
        assert!(matches!(err, RecommendError::InvalidInput(_)));

        let ids = ["h-1", "h-2", "h-3"].map(str::to_owned);
        let saved = service
            .save_snapshot(1, Some("alice"), &ids, &model_info, Some(T0))
            .expect("save");
        assert_eq!(saved.content.as_deref(), Some("[\"h-1\",\"h-2\"]"));
        let stored = store.get_snapshot(saved.id).expect("get").expect("exists");
        assert_eq!(stored, saved);
    }

    #[test]
    fn refresh_ignores_staleness_gate() {
        let (_temp, store) = open_temp_store();
        seed_downtown(&store);
        let config = RecommendConfig::default();
        let service = RecommendService::new(&store, &config);
        let first = service.refresh(1, None, Some(T0 + 10)).expect("first refresh");
        assert!(!service.should_generate(1));

        let second = service.refresh(1, None, Some(T0 + 20)).expect("second refresh");
        assert!(second.id > first.id);
        assert_eq!(
            store.find_latest_snapshot(1).expect("latest").map(|record| record.id),
            Some(second.id)
        );
    }
}
