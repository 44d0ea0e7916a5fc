//! The narrow persistence interface the aggregation loop runs against.
//!
//! The loop only rotates through feeds and appends posts, so it depends on
//! [`FeedStore`] rather than on [`Database`] directly.

use async_trait::async_trait;

use super::schema::Database;
use super::types::{DatabaseError, Feed, NewPost, Post};

#[async_trait]
pub trait FeedStore: Send + Sync {
    /// The feed with the earliest `last_fetched_at`, never-fetched feeds first
    async fn next_feed_to_fetch(&self) -> Result<Option<Feed>, DatabaseError>;

    /// Stamp `feed_id` as fetched at `fetched_at` (epoch ms)
    async fn mark_feed_fetched(&self, feed_id: i64, fetched_at: i64) -> Result<(), DatabaseError>;

    /// Select the stalest feed and stamp it before returning it.
    ///
    /// Stores that can do both in one statement should override this.
    async fn claim_next_feed(&self, fetched_at: i64) -> Result<Option<Feed>, DatabaseError> {
        let Some(mut feed) = self.next_feed_to_fetch().await? else {
            return Ok(None);
        };
        self.mark_feed_fetched(feed.id, fetched_at).await?;
        feed.last_fetched_at = Some(fetched_at);
        Ok(Some(feed))
    }

    /// Insert a post. An already-stored link must surface as
    /// [`DatabaseError::UniqueViolation`].
    async fn create_post(&self, post: &NewPost) -> Result<Post, DatabaseError>;
}

#[async_trait]
impl FeedStore for Database {
    async fn next_feed_to_fetch(&self) -> Result<Option<Feed>, DatabaseError> {
        Database::next_feed_to_fetch(self).await
    }

    async fn mark_feed_fetched(&self, feed_id: i64, fetched_at: i64) -> Result<(), DatabaseError> {
        Database::mark_feed_fetched(self, feed_id, fetched_at).await
    }

    async fn claim_next_feed(&self, fetched_at: i64) -> Result<Option<Feed>, DatabaseError> {
        Database::claim_next_feed(self, fetched_at).await
    }

    async fn create_post(&self, post: &NewPost) -> Result<Post, DatabaseError> {
        Database::create_post(self, post).await
    }
}
