use super::schema::{now_millis, Database};
use super::types::{DatabaseError, Feed, FeedWithOwner};

const FEED_COLUMNS: &str = "id, name, url, user_id, last_fetched_at, created_at";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Register a feed owned by `user_id`.
    ///
    /// Feed URLs are unique; registering the same URL twice yields
    /// `DatabaseError::UniqueViolation`.
    pub async fn create_feed(
        &self,
        name: &str,
        url: &str,
        user_id: i64,
    ) -> Result<Feed, DatabaseError> {
        let now = now_millis();
        sqlx::query_as(&format!(
            r#"
            INSERT INTO feeds (name, url, user_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING {FEED_COLUMNS}
        "#
        ))
        .bind(name)
        .bind(url)
        .bind(user_id)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// All feeds with their owner's name, ordered by feed name
    pub async fn get_feeds(&self) -> Result<Vec<FeedWithOwner>, DatabaseError> {
        let feeds = sqlx::query_as(
            r#"
            SELECT f.id, f.name, f.url, u.name AS owner_name, f.last_fetched_at
            FROM feeds f
            JOIN users u ON u.id = f.user_id
            ORDER BY f.name, f.id
        "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(feeds)
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>, DatabaseError> {
        let feed = sqlx::query_as(&format!("SELECT {FEED_COLUMNS} FROM feeds WHERE url = ?"))
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(feed)
    }

    // ========================================================================
    // Rotation
    // ========================================================================

    /// The stalest feed: never-fetched feeds first, then oldest `last_fetched_at`.
    /// Ties are broken by ascending id so the order is stable for a given store.
    pub async fn next_feed_to_fetch(&self) -> Result<Option<Feed>, DatabaseError> {
        let feed = sqlx::query_as(&format!(
            r#"
            SELECT {FEED_COLUMNS} FROM feeds
            ORDER BY last_fetched_at ASC NULLS FIRST, id ASC
            LIMIT 1
        "#
        ))
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(feed)
    }

    /// Record that `feed_id` was claimed for fetching at `fetched_at` (epoch ms)
    pub async fn mark_feed_fetched(&self, feed_id: i64, fetched_at: i64) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE feeds SET last_fetched_at = ?, updated_at = ? WHERE id = ?")
            .bind(fetched_at)
            .bind(fetched_at)
            .bind(feed_id)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }

    /// Pick the stalest feed and stamp it in one statement.
    ///
    /// Same ordering as [`Database::next_feed_to_fetch`]; the returned row
    /// already carries the new `last_fetched_at`.
    pub async fn claim_next_feed(&self, fetched_at: i64) -> Result<Option<Feed>, DatabaseError> {
        let feed = sqlx::query_as(&format!(
            r#"
            UPDATE feeds SET last_fetched_at = ?, updated_at = ?
            WHERE id = (
                SELECT id FROM feeds
                ORDER BY last_fetched_at ASC NULLS FIRST, id ASC
                LIMIT 1
            )
            RETURNING {FEED_COLUMNS}
        "#
        ))
        .bind(fetched_at)
        .bind(fetched_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(feed)
    }
}
