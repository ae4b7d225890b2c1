//! Trending score for a single post.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

pub const COMMENT_WEIGHT: f64 = 25.0;
pub const LIKE_WEIGHT: f64 = 10.0;
pub const REPOST_WEIGHT: f64 = 40.0;
pub const BOOKMARK_WEIGHT: f64 = 30.0;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;
const AGE_OFFSET_HOURS: f64 = 2.0;
const DECAY_EXPONENT: f64 = 1.5;

/// A post together with the users behind each of its live engagement edges.
#[derive(Debug, Clone, PartialEq)]
pub struct EngagementSnapshot {
    pub post_id: i64,
    pub author_id: i64,
    pub created_at: DateTime<Utc>,
    pub commenters: Vec<i64>,
    pub likers: Vec<i64>,
    pub reposters: Vec<i64>,
    pub bookmarkers: Vec<i64>,
}

impl EngagementSnapshot {
    #[must_use]
    pub fn new(post_id: i64, author_id: i64, created_at: DateTime<Utc>) -> Self {
        Self {
            post_id,
            author_id,
            created_at,
            commenters: Vec::new(),
            likers: Vec::new(),
            reposters: Vec::new(),
            bookmarkers: Vec::new(),
        }
    }

    /// Weighted engagement, ignoring anything the author did on their own post.
    ///
    /// Commenters are counted once each; every other edge counts individually.
    #[must_use]
    pub fn weighted_engagement(&self) -> f64 {
        let author = self.author_id;
        let others = |ids: &[i64]| ids.iter().filter(|&&id| id != author).count() as f64;

        let distinct_commenters = self
            .commenters
            .iter()
            .filter(|&&id| id != author)
            .collect::<HashSet<_>>()
            .len() as f64;

        distinct_commenters * COMMENT_WEIGHT
            + others(&self.likers) * LIKE_WEIGHT
            + others(&self.reposters) * REPOST_WEIGHT
            + others(&self.bookmarkers) * BOOKMARK_WEIGHT
    }
}

/// Hours between `created_at` and `now`. A post from the future has age 0.
#[must_use]
pub fn age_hours(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let millis = (now - created_at).num_milliseconds().max(0);
    millis as f64 / MILLIS_PER_HOUR
}

/// Compute the trending score of a post at `now`.
#[must_use]
pub fn trending_score(snapshot: &EngagementSnapshot, now: DateTime<Utc>) -> f64 {
    let weighted = snapshot.weighted_engagement();
    if weighted == 0.0 {
        return 0.0;
    }

    let hours = age_hours(snapshot.created_at, now);
    (weighted * 1000.0) / (hours + AGE_OFFSET_HOURS).powf(DECAY_EXPONENT)
}
