use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::storage::{DatabaseError, Feed, FeedStore};

/// Picks the next feed to poll and claims it.
///
/// Feeds are served least-recently-claimed first, never-claimed feeds ahead of
/// everything else. The claim is written before the feed is handed out, so a
/// feed whose fetch keeps failing waits its turn like every other feed instead
/// of being retried on every tick.
#[derive(Clone)]
pub struct FeedSelector {
    store: Arc<dyn FeedStore>,
}

impl FeedSelector {
    pub fn new(store: Arc<dyn FeedStore>) -> Self {
        Self { store }
    }

    /// Claim the stalest feed as of now. `Ok(None)` means the registry is empty.
    pub async fn select_next(&self) -> Result<Option<Feed>, DatabaseError> {
        self.select_next_at(Utc::now()).await
    }

    /// Claim the stalest feed, stamping it with `now`
    pub async fn select_next_at(&self, now: DateTime<Utc>) -> Result<Option<Feed>, DatabaseError> {
        let feed = self.store.claim_next_feed(now.timestamp_millis()).await?;
        if let Some(feed) = &feed {
            tracing::debug!(feed_id = feed.id, url = %feed.url, "Claimed feed");
        }
        Ok(feed)
    }
}
