//! Periodic recomputation of post trending scores.

mod job;
mod score;

pub use job::{PostStore, TickOutcome, TickReport, TrendingJob};
pub use score::{
    age_hours, trending_score, EngagementSnapshot, BOOKMARK_WEIGHT, COMMENT_WEIGHT, LIKE_WEIGHT,
    REPOST_WEIGHT,
};
