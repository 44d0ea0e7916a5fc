use super::schema::{now_millis, Database};
use super::types::{DatabaseError, NewPost, Post, PostWithFeed};

/// Upper bound on rows returned by a single browse query
const MAX_BROWSE_LIMIT: u32 = 1_000;

impl Database {
    // ========================================================================
    // Post Operations
    // ========================================================================

    /// Insert a single post.
    ///
    /// A post whose link is already stored (for any feed) fails with
    /// `DatabaseError::UniqueViolation`; nothing is written in that case.
    pub async fn create_post(&self, post: &NewPost) -> Result<Post, DatabaseError> {
        let now = now_millis();
        sqlx::query_as(
            r#"
            INSERT INTO posts (feed_id, title, url, description, published_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id, feed_id, title, url, description, published_at, created_at
        "#,
        )
        .bind(post.feed_id)
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.description)
        .bind(post.published_at)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// All posts of one feed in insertion order
    #[cfg(test)]
    pub(crate) async fn get_posts_for_feed(&self, feed_id: i64) -> Result<Vec<Post>, DatabaseError> {
        let posts = sqlx::query_as(
            r#"
            SELECT id, feed_id, title, url, description, published_at, created_at
            FROM posts WHERE feed_id = ?
            ORDER BY id
        "#,
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(posts)
    }

    /// Newest posts from the feeds `user_id` follows.
    ///
    /// Ordered by publication time, newest first; posts without a publication
    /// time sort after dated ones. `limit` is capped at 1000.
    pub async fn get_posts_for_user(
        &self,
        user_id: i64,
        limit: u32,
    ) -> Result<Vec<PostWithFeed>, DatabaseError> {
        let safe_limit = i64::from(limit.min(MAX_BROWSE_LIMIT));
        let posts = sqlx::query_as(
            r#"
            SELECT p.id, p.feed_id, f.name AS feed_name, p.title, p.url,
                   p.description, p.published_at, p.created_at
            FROM posts p
            JOIN feeds f ON f.id = p.feed_id
            JOIN feed_follows ff ON ff.feed_id = p.feed_id
            WHERE ff.user_id = ?
            ORDER BY p.published_at DESC NULLS LAST, p.id DESC
            LIMIT ?
        "#,
        )
        .bind(user_id)
        .bind(safe_limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, DatabaseError, NewPost};
    use pretty_assertions::assert_eq;

    async fn setup() -> (Database, i64, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.create_user("reader").await.unwrap();
        let feed = db
            .create_feed("Example", "https://example.com/rss", user.id)
            .await
            .unwrap();
        (db, user.id, feed.id)
    }

    fn new_post(feed_id: i64, slug: &str, published_at: Option<i64>) -> NewPost {
        NewPost {
            feed_id,
            title: format!("Post {slug}"),
            url: format!("https://example.com/{slug}"),
            description: Some(format!("About {slug}")),
            published_at,
        }
    }

    #[tokio::test]
    async fn test_create_post_round_trips_fields() {
        let (db, _, feed_id) = setup().await;

        let created = db
            .create_post(&new_post(feed_id, "one", Some(1_700_000_000_000)))
            .await
            .unwrap();
        assert_eq!(created.title, "Post one");
        assert_eq!(created.published_at, Some(1_700_000_000_000));

        let stored = db.get_posts_for_feed(feed_id).await.unwrap();
        assert_eq!(stored, vec![created]);
    }

    #[tokio::test]
    async fn test_duplicate_link_is_unique_violation() {
        let (db, _, feed_id) = setup().await;
        db.create_post(&new_post(feed_id, "one", None)).await.unwrap();

        let err = db
            .create_post(&new_post(feed_id, "one", None))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::UniqueViolation(_)), "got {:?}", err);
        assert_eq!(db.get_posts_for_feed(feed_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_link_is_rejected_but_not_as_duplicate() {
        let (db, _, feed_id) = setup().await;
        let mut post = new_post(feed_id, "one", None);
        post.url = String::new();

        let err = db.create_post(&post).await.unwrap_err();
        assert!(!err.is_unique_violation(), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_posts_for_user_only_from_followed_feeds() {
        let (db, user_id, feed_id) = setup().await;
        let other = db
            .create_feed("Other", "https://other.example.com/rss", user_id)
            .await
            .unwrap();
        db.create_feed_follow(user_id, feed_id).await.unwrap();

        db.create_post(&new_post(feed_id, "followed", Some(1_000)))
            .await
            .unwrap();
        let mut unfollowed = new_post(other.id, "unfollowed", Some(2_000));
        unfollowed.url = "https://other.example.com/unfollowed".to_string();
        db.create_post(&unfollowed).await.unwrap();

        let posts = db.get_posts_for_user(user_id, 10).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "Post followed");
        assert_eq!(posts[0].feed_name, "Example");
    }

    #[tokio::test]
    async fn test_posts_for_user_newest_first_with_limit() {
        let (db, user_id, feed_id) = setup().await;
        db.create_feed_follow(user_id, feed_id).await.unwrap();

        db.create_post(&new_post(feed_id, "undated", None))
            .await
            .unwrap();
        db.create_post(&new_post(feed_id, "old", Some(1_000)))
            .await
            .unwrap();
        db.create_post(&new_post(feed_id, "new", Some(3_000)))
            .await
            .unwrap();

        let titles: Vec<String> = db
            .get_posts_for_user(user_id, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(titles, vec!["Post new", "Post old", "Post undated"]);

        let limited = db.get_posts_for_user(user_id, 2).await.unwrap();
        assert_eq!(limited.len(), 2);
    }
}
