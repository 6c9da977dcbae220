use roost_config::RecommendConfig;
use roost_core::{Listing, UserId, current_unix_timestamp_millis, utc_day_bounds};
use roost_store::{NewBehavior, Store};
use serde::Serialize;

use crate::RecommendError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityRequest {
    pub user_id: UserId,
    pub user_name: Option<String>,
    pub house_id: String,
    pub now_ms: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ViewOutcome {
    Recorded { view_id: i64 },
    AlreadyRecorded { view_id: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LikeOutcome {
    Liked { like_id: i64 },
    Unliked { like_id: i64 },
}

/// Records the views and likes the recommender learns from.
pub struct ActivityService<'a, S: Store + ?Sized> {
    store: &'a S,
    config: &'a RecommendConfig,
}

impl<'a, S: Store + ?Sized> ActivityService<'a, S> {
    pub fn new(store: &'a S, config: &'a RecommendConfig) -> Self {
        Self { store, config }
    }

    /// At most one view per user, listing and UTC day.
    pub fn record_view(&self, request: &ActivityRequest) -> Result<ViewOutcome, RecommendError> {
        let listing = self.listing(&request.house_id)?;
        let now_ms = request.now_ms.unwrap_or_else(current_unix_timestamp_millis);
        let (day_start, day_end) = utc_day_bounds(now_ms);

        if let Some(view_id) = self.store.find_view_id_between(
            request.user_id,
            &listing.house_id,
            day_start,
            day_end,
        )? {
            return Ok(ViewOutcome::AlreadyRecorded { view_id });
        }

        let view_id = self.store.insert_view(&behavior(
            request,
            &listing,
            self.config.view_score,
            now_ms,
        ))?;
        tracing::debug!(
            user_id = request.user_id,
            house_id = %listing.house_id,
            view_id,
            "recorded view"
        );
        Ok(ViewOutcome::Recorded { view_id })
    }

    pub fn toggle_like(&self, request: &ActivityRequest) -> Result<LikeOutcome, RecommendError> {
        let listing = self.listing(&request.house_id)?;

        if let Some(like_id) = self.store.find_like_id(request.user_id, &listing.house_id)? {
            self.store.delete_like(like_id)?;
            tracing::debug!(user_id = request.user_id, like_id, "removed like");
            return Ok(LikeOutcome::Unliked { like_id });
        }

        let now_ms = request.now_ms.unwrap_or_else(current_unix_timestamp_millis);
        let like_id = self.store.insert_like(&behavior(
            request,
            &listing,
            self.config.like_score,
            now_ms,
        ))?;
        tracing::debug!(user_id = request.user_id, like_id, "recorded like");
        Ok(LikeOutcome::Liked { like_id })
    }

    fn listing(&self, house_id: &str) -> Result<Listing, RecommendError> {
        let house_id = house_id.trim();
        if house_id.is_empty() {
            return Err(RecommendError::InvalidInput(
                "house id must not be empty".to_owned(),
            ));
        }
        self.store
            .find_listing_by_id(house_id)?
            .ok_or_else(|| RecommendError::ListingNotFound(house_id.to_owned()))
    }
}

fn behavior(request: &ActivityRequest, listing: &Listing, score: f64, now_ms: i64) -> NewBehavior {
    NewBehavior {
        user_id: request.user_id,
        user_name: request.user_name.clone(),
        house_id: listing.house_id.clone(),
        house_title: Some(listing.title.clone()),
        town: listing.town.clone(),
        house_type: listing.house_type.clone(),
        orientation: listing.orientation.clone(),
        tags: listing.tags.clone(),
        score: Some(score),
        create_time: now_ms,
    }
}
