use std::sync::Arc;

use chrono::DateTime;
use thiserror::Error;

use crate::feed::{FetchedDocument, RawEntry};
use crate::storage::{DatabaseError, Feed, FeedStore, NewPost};

/// The one `pubDate` layout accepted: RFC 1123 with a numeric zone,
/// e.g. `Mon, 02 Jan 2006 15:04:05 -0700`.
pub const PUB_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// A single item that could not be stored for a reason other than being a duplicate
#[derive(Debug, Error)]
#[error("item {position} ({link:?}) was not stored: {source}")]
pub struct EntryError {
    /// 1-based position of the item in the document
    pub position: usize,
    pub link: String,
    #[source]
    pub source: DatabaseError,
}

/// Outcome of ingesting one document
#[derive(Debug, Default)]
pub struct IngestReport {
    pub created: usize,
    /// Items whose link was already stored
    pub skipped: usize,
    pub errors: Vec<EntryError>,
}

impl IngestReport {
    /// Items looked at, whatever happened to them
    pub fn attempted(&self) -> usize {
        self.created + self.skipped + self.errors.len()
    }
}

/// Parse a `pubDate` into epoch milliseconds. Anything not in [`PUB_DATE_FORMAT`] is `None`.
pub fn parse_pub_date(raw: &str) -> Option<i64> {
    DateTime::parse_from_str(raw.trim(), PUB_DATE_FORMAT)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// Turns parsed items into stored posts.
///
/// Deduplication is left entirely to the store's unique constraint on the post
/// link: an insert rejected as a unique violation is a duplicate. Nothing is
/// remembered between calls.
#[derive(Clone)]
pub struct Ingester {
    store: Arc<dyn FeedStore>,
}

impl Ingester {
    pub fn new(store: Arc<dyn FeedStore>) -> Self {
        Self { store }
    }

    /// Store every new item of `document` under `feed`, in document order.
    ///
    /// Never fails as a whole: each item is created, skipped as a duplicate,
    /// or recorded in [`IngestReport::errors`], and the next item is always
    /// attempted.
    pub async fn ingest(&self, feed: &Feed, document: &FetchedDocument) -> IngestReport {
        let mut report = IngestReport::default();

        for (index, item) in document.items.iter().enumerate() {
            let post = to_new_post(feed, item);

            match self.store.create_post(&post).await {
                Ok(_) => report.created += 1,
                Err(e) if e.is_unique_violation() => report.skipped += 1,
                Err(e) => {
                    tracing::warn!(
                        feed_id = feed.id,
                        position = index + 1,
                        link = %item.link,
                        error = %e,
                        "Failed to store post"
                    );
                    report.errors.push(EntryError {
                        position: index + 1,
                        link: item.link.clone(),
                        source: e,
                    });
                }
            }
        }

        report
    }
}

fn to_new_post(feed: &Feed, item: &RawEntry) -> NewPost {
    let published_at = if item.pub_date.is_empty() {
        None
    } else {
        let parsed = parse_pub_date(&item.pub_date);
        if parsed.is_none() {
            tracing::debug!(
                feed_id = feed.id,
                link = %item.link,
                pub_date = %item.pub_date,
                "Unrecognised pubDate, storing without publication time"
            );
        }
        parsed
    };

    NewPost {
        feed_id: feed.id,
        title: item.title.clone(),
        url: item.link.clone(),
        description: (!item.description.is_empty()).then(|| item.description.clone()),
        published_at,
    }
}
