use roost_config::RecommendConfig;
use roost_core::{BehaviorEvent, UserId};
use roost_store::Store;

use crate::BEHAVIOR_READ_RECOVERY;

/// The bounded slice of a user's history the profiler works from. Both
/// lists are newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BehaviorWindow {
    pub likes: Vec<BehaviorEvent>,
    pub views: Vec<BehaviorEvent>,
}

impl BehaviorWindow {
    pub fn is_empty(&self) -> bool {
        self.likes.is_empty() && self.views.is_empty()
    }

    pub fn len(&self) -> usize {
        self.likes.len() + self.views.len()
    }

    /// Likes followed by views.
    pub fn events(&self) -> impl Iterator<Item = &BehaviorEvent> {
        self.likes.iter().chain(self.views.iter())
    }
}

pub fn read_behavior_window<S: Store + ?Sized>(
    store: &S,
    user_id: UserId,
    config: &RecommendConfig,
) -> BehaviorWindow {
    let likes = degrade(
        store.find_recent_likes(user_id, config.like_window),
        user_id,
        "likes",
    );
    let views = degrade(
        store.find_recent_views(user_id, config.view_window),
        user_id,
        "views",
    );

    BehaviorWindow { likes, views }
}

fn degrade(
    result: Result<Vec<BehaviorEvent>, roost_store::StoreError>,
    user_id: UserId,
    source: &'static str,
) -> Vec<BehaviorEvent> {
    match result {
        Ok(events) => events,
        Err(err) => {
            tracing::warn!(
                user_id,
                source,
                recovery = BEHAVIOR_READ_RECOVERY.as_str(),
                error = %err,
                "failed to read behavior window"
            );
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use roost_config::RecommendConfig;
    use roost_store::Store;

    use super::read_behavior_window;
    use crate::test_support::{FailingStore, T0, behavior, listing, open_temp_store};

    #[test]
    fn window_is_bounded_per_kind_and_newest_first() {
        let (_temp, store) = open_temp_store();
        let house = listing("h-1", "Downtown", "Garden", T0);
        store.upsert_listing(&house).expect("upsert listing");
        for offset in 0..8 {
            store
                .insert_like(&behavior(7, &house, 15.0, T0 + offset))
                .expect("insert like");
            store
                .insert_view(&behavior(7, &house, 1.0, T0 + offset))
                .expect("insert view");
        }

        let config = RecommendConfig {
            like_window: 5,
            view_window: 3,
            ..RecommendConfig::default()
        };
        let window = read_behavior_window(&store, 7, &config);

        assert_eq!(window.likes.len(), 5);
        assert_eq!(window.views.len(), 3);
        assert_eq!(window.len(), 8);
        assert_eq!(window.likes[0].create_time, T0 + 7);
        assert!(
            window
                .views
                .windows(2)
                .all(|pair| pair[0].create_time >= pair[1].create_time)
        );
    }

    #[test]
    fn unknown_user_reads_as_empty() {
        let (_temp, store) = open_temp_store();
        let window = read_behavior_window(&store, 404, &RecommendConfig::default());
        assert!(window.is_empty());
    }

    #[test]
    fn storage_failure_degrades_to_empty_window() {
        let window = read_behavior_window(&FailingStore, 7, &RecommendConfig::default());
        assert!(window.is_empty());
        assert_eq!(window.events().count(), 0);
    }
}
