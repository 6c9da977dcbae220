use roost_config::RecommendConfig;
use roost_core::UserId;
use roost_store::{Store, StoreError};
use serde::Serialize;

use crate::STALENESS_CHECK_RECOVERY;

/// Outcome of the regeneration check for a user's latest snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StalenessDecision {
    NoSnapshot,
    MissingTimestamp {
        snapshot_id: i64,
    },
    NewActivity {
        snapshot_id: i64,
        new_views: usize,
        new_likes: usize,
    },
    Fresh {
        snapshot_id: i64,
        new_views: usize,
        new_likes: usize,
    },
    CheckFailed,
}

impl StalenessDecision {
    pub fn should_generate(&self) -> bool {
        !matches!(self, Self::Fresh { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoSnapshot => "no_snapshot",
            Self::MissingTimestamp { .. } => "missing_timestamp",
            Self::NewActivity { .. } => "new_activity",
            Self::Fresh { .. } => "fresh",
            Self::CheckFailed => "check_failed",
        }
    }
}

// Either threshold alone triggers regeneration.
pub fn evaluate_staleness<S: Store + ?Sized>(
    store: &S,
    user_id: UserId,
    config: &RecommendConfig,
) -> StalenessDecision {
    match check(store, user_id, config) {
        Ok(decision) => decision,
        Err(err) => {
            tracing::warn!(
                user_id,
                recovery = STALENESS_CHECK_RECOVERY.as_str(),
                error = %err,
                "staleness check failed"
            );
            StalenessDecision::CheckFailed
        }
    }
}

fn check<S: Store + ?Sized>(
    store: &S,
    user_id: UserId,
    config: &RecommendConfig,
) -> Result<StalenessDecision, StoreError> {
    let Some(snapshot) = store.find_latest_snapshot(user_id)? else {
        return Ok(StalenessDecision::NoSnapshot);
    };
    let Some(created_at) = snapshot.create_time else {
        return Ok(StalenessDecision::MissingTimestamp {
            snapshot_id: snapshot.id,
        });
    };

    let new_views = store.find_views_after(user_id, created_at)?.len();
    let new_likes = store.find_likes_after(user_id, created_at)?.len();

    let stale = new_views >= config.view_refresh_threshold as usize
        || new_likes >= config.like_refresh_threshold as usize;
    Ok(if stale {
        StalenessDecision::NewActivity {
            snapshot_id: snapshot.id,
            new_views,
            new_likes,
        }
    } else {
        StalenessDecision::Fresh {
            snapshot_id: snapshot.id,
            new_views,
            new_likes,
        }
    })
}
