//! Batch recompute job.
//!
//! Each tick samples the clock once, loads every live post with its engagement,
//! and writes the new scores back one post at a time in id order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::score::{trending_score, EngagementSnapshot};
use crate::clock::Clock;
use crate::db::{self, Database};

/// Where the job reads engagement from and writes scores to.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Every live post with its live engagement, in ascending post id order.
    async fn fetch_posts_with_engagement(&self) -> Result<Vec<EngagementSnapshot>>;

    async fn update_score(&self, post_id: i64, score: f64) -> Result<()>;
}

#[async_trait]
impl PostStore for Database {
    async fn fetch_posts_with_engagement(&self) -> Result<Vec<EngagementSnapshot>> {
        db::fetch_engagement_snapshots(self.pool()).await
    }

    async fn update_score(&self, post_id: i64, score: f64) -> Result<()> {
        db::set_trending_score(self.pool(), post_id, score).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub posts_scored: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Completed(TickReport),
    /// Another tick was still running.
    Skipped,
}

pub struct TrendingJob {
    store: Arc<dyn PostStore>,
    clock: Arc<dyn Clock>,
    running: Mutex<()>,
}

impl TrendingJob {
    #[must_use]
    pub fn new(store: Arc<dyn PostStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            running: Mutex::new(()),
        }
    }

    /// Recompute every live post's score once.
    ///
    /// A write failure stops the tick; posts already written keep their new
    /// score and the rest are picked up by the next tick.
    ///
    /// # Errors
    ///
    /// Returns an error if fetching posts or writing a score fails.
    pub async fn run_once(&self) -> Result<TickOutcome> {
        let Ok(_guard) = self.running.try_lock() else {
            return Ok(TickOutcome::Skipped);
        };

        let started = Instant::now();
        let now = self.clock.now();
        let posts = self.store.fetch_posts_with_engagement().await?;

        for post in &posts {
            let score = trending_score(post, now);
            debug!(post_id = post.post_id, score, "Scored post");
            self.store.update_score(post.post_id, score).await?;
        }

        Ok(TickOutcome::Completed(TickReport {
            posts_scored: posts.len(),
            elapsed: started.elapsed(),
        }))
    }

    async fn tick(&self) {
        match self.run_once().await {
            Ok(TickOutcome::Completed(report)) => {
                info!(
                    posts_scored = report.posts_scored,
                    elapsed_ms = report.elapsed.as_millis(),
                    "Trending scores recomputed"
                );
            }
            Ok(TickOutcome::Skipped) => {
                warn!("Previous trending tick still running, skipping");
            }
            Err(e) => {
                error!("Trending recompute failed: {e:#}");
            }
        }
    }

    /// Run immediately, then every `interval` until `shutdown` is cancelled.
    pub async fn run(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) {
        info!(interval_secs = interval.as_secs(), "Starting trending job");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                () = shutdown.cancelled() => {
                    info!("Trending job shutting down");
                    break;
                }
            }
        }
    }
}
