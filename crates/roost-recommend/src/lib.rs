use thiserror::Error;

mod activity;
mod behavior;
mod profile;
mod ranking;
mod sampler;
mod service;
mod snapshot;
mod staleness;
mod statistics;

pub use activity::{ActivityRequest, ActivityService, LikeOutcome, ViewOutcome};
pub use behavior::{BehaviorWindow, read_behavior_window};
pub use profile::{PreferenceVector, build_preferences, time_weight};
pub use ranking::{ScoredListing, rank, score_candidate, score_candidates};
pub use sampler::{CandidateSampler, adjacent_orientations};
pub use service::{
    GeneratedRecommendations, RecommendService, RecommendationPage, RecommendationRequest,
};
pub use snapshot::{
    DimensionModels, ModelInfo, ModelWeights, NamedWeight, build_model_info,
    parse_snapshot_content,
};
pub use staleness::{StalenessDecision, evaluate_staleness};
pub use statistics::{
    PriceBuckets, StatisticsDimension, StatisticsEntry, StatisticsService, format_price,
};

#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("listing not found: {0}")]
    ListingNotFound(String),
    #[error("store error: {0}")]
    Store(#[from] roost_store::StoreError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// How an operation recovers when storage fails underneath it. Reading
/// behavior degrades to "nothing to personalize"; the staleness check
/// degrades to "regenerate".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryPolicy {
    DegradeToEmpty,
    AssumeStale,
}

impl RecoveryPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DegradeToEmpty => "degrade_to_empty",
            Self::AssumeStale => "assume_stale",
        }
    }
}

pub const BEHAVIOR_READ_RECOVERY: RecoveryPolicy = RecoveryPolicy::DegradeToEmpty;
pub const CANDIDATE_QUERY_RECOVERY: RecoveryPolicy = RecoveryPolicy::DegradeToEmpty;
pub const STALENESS_CHECK_RECOVERY: RecoveryPolicy = RecoveryPolicy::AssumeStale;
