//! In-process doubles for the aggregation loop's two seams.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::feed::{FeedSource, FetchError, FetchedDocument};
use crate::storage::{DatabaseError, Feed, FeedStore, NewPost, Post};

#[derive(Default)]
struct State {
    feeds: Vec<Feed>,
    posts: Vec<Post>,
    failing_urls: Vec<String>,
    claims: Vec<i64>,
}

/// Vec-backed store. Relies on the trait's default `claim_next_feed`.
#[derive(Default)]
pub(crate) struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub(crate) fn with_feeds(count: usize) -> Self {
        let store = Self::default();
        {
            let mut state = store.state.lock().unwrap();
            for i in 0..count {
                let id = i as i64 + 1;
                state.feeds.push(Feed {
                    id,
                    name: format!("Feed {id}"),
                    url: format!("https://feed{id}.example.com/rss"),
                    user_id: 1,
                    last_fetched_at: None,
                    created_at: 0,
                });
            }
        }
        store
    }

    pub(crate) fn fail_post_url(&self, url: &str) {
        self.state.lock().unwrap().failing_urls.push(url.to_string());
    }

    pub(crate) fn feeds(&self) -> Vec<Feed> {
        self.state.lock().unwrap().feeds.clone()
    }

    pub(crate) fn post_urls(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.posts.iter().map(|p| p.url.clone()).collect()
    }

    /// Feed ids in the order they were claimed
    pub(crate) fn claims(&self) -> Vec<i64> {
        self.state.lock().unwrap().claims.clone()
    }
}

#[async_trait]
impl FeedStore for MemoryStore {
    async fn next_feed_to_fetch(&self) -> Result<Option<Feed>, DatabaseError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .feeds
            .iter()
            .min_by_key(|f| (f.last_fetched_at.is_some(), f.last_fetched_at, f.id))
            .cloned())
    }

    async fn mark_feed_fetched(&self, feed_id: i64, fetched_at: i64) -> Result<(), DatabaseError> {
        let mut state = self.state.lock().unwrap();
        if let Some(feed) = state.feeds.iter_mut().find(|f| f.id == feed_id) {
            feed.last_fetched_at = Some(fetched_at);
        }
        state.claims.push(feed_id);
        Ok(())
    }

    async fn create_post(&self, post: &NewPost) -> Result<Post, DatabaseError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_urls.contains(&post.url) {
            return Err(DatabaseError::Other(sqlx::Error::PoolTimedOut));
        }
        if state.posts.iter().any(|p| p.url == post.url) {
            return Err(DatabaseError::UniqueViolation(post.url.clone()));
        }
        let stored = Post {
            id: state.posts.len() as i64 + 1,
            feed_id: post.feed_id,
            title: post.title.clone(),
            url: post.url.clone(),
            description: post.description.clone(),
            published_at: post.published_at,
            created_at: 0,
        };
        state.posts.push(stored.clone());
        Ok(stored)
    }
}

/// Serves the same document for every URL, or fails every request when built
/// with [`StaticSource::failing`].
pub(crate) struct StaticSource {
    document: Option<FetchedDocument>,
    requests: Mutex<Vec<String>>,
}

impl StaticSource {
    pub(crate) fn serving(document: FetchedDocument) -> Self {
        Self {
            document: Some(document),
            requests: Mutex::default(),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            document: None,
            requests: Mutex::default(),
        }
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedSource for StaticSource {
    async fn fetch(&self, url: &str, _deadline: Duration) -> Result<FetchedDocument, FetchError> {
        self.requests.lock().unwrap().push(url.to_string());
        self.document.clone().ok_or(FetchError::HttpStatus(503))
    }
}

/// Fails every request after sleeping for the next queued delay (zero once
/// the queue is empty). Records when each fetch started and finished.
pub(crate) struct SlowSource {
    delays: Mutex<VecDeque<Duration>>,
    spans: Mutex<Vec<(Instant, Instant)>>,
}

impl SlowSource {
    pub(crate) fn with_delays(delays: impl IntoIterator<Item = Duration>) -> Self {
        Self {
            delays: Mutex::new(delays.into_iter().collect()),
            spans: Mutex::default(),
        }
    }

    pub(crate) fn spans(&self) -> Vec<(Instant, Instant)> {
        self.spans.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedSource for SlowSource {
    async fn fetch(&self, _url: &str, _deadline: Duration) -> Result<FetchedDocument, FetchError> {
        let delay = self.delays.lock().unwrap().pop_front().unwrap_or_default();
        let started = Instant::now();
        tokio::time::sleep(delay).await;
        self.spans.lock().unwrap().push((started, Instant::now()));
        Err(FetchError::HttpStatus(503))
    }
}
