//! Integration tests for a full aggregation cycle: claim, fetch over HTTP, ingest.
//!
//! Each test creates its own in-memory SQLite database and wiremock server.

use std::sync::Arc;
use std::time::Duration;

use gator::aggregator::{CycleError, CycleOutcome, Scheduler};
use gator::feed::{FetchError, Fetcher, DEFAULT_USER_AGENT};
use gator::storage::{Database, Feed};
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BLOG_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom">
<channel>
    <title>Engineering Blog</title>
    <link>https://blog.example.com</link>
    <atom:link href="https://blog.example.com/rss" rel="self" type="application/rss+xml"/>
    <item>
        <title>Shipping the new scheduler</title>
        <link>https://blog.example.com/posts/scheduler</link>
        <description><![CDATA[How we <b>rebuilt</b> it]]></description>
        <pubDate>Wed, 01 Jan 2025 09:30:00 +0100</pubDate>
    </item>
    <item>
        <title>Notes &amp; errata</title>
        <link>https://blog.example.com/posts/errata</link>
        <pubDate>sometime in spring</pubDate>
    </item>
    <item>
        <title>Hello world</title>
        <link>https://blog.example.com/posts/hello</link>
        <description>First post</description>
        <pubDate>Mon, 02 Jan 2006 15:04:05 -0700</pubDate>
    </item>
</channel>
</rss>"#;

async fn setup(feed_urls: &[String]) -> (Database, Vec<Feed>) {
    let db = Database::open(":memory:").await.unwrap();
    let user = db.create_user("reader").await.unwrap();
    let mut feeds = Vec::new();
    for (i, url) in feed_urls.iter().enumerate() {
        let feed = db.create_feed(&format!("Feed {i}"), url, user.id).await.unwrap();
        db.create_feed_follow(user.id, feed.id).await.unwrap();
        feeds.push(feed);
    }
    (db, feeds)
}

fn scheduler(db: &Database) -> Scheduler {
    let fetcher = Fetcher::new(DEFAULT_USER_AGENT).unwrap();
    Scheduler::new(Arc::new(db.clone()), Arc::new(fetcher), Duration::from_secs(60))
        .with_fetch_timeout(Duration::from_secs(5))
}

#[tokio::test]
async fn test_cycle_stores_posts_then_skips_them() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rss"))
        .respond_with(ResponseTemplate::new(200).set_body_string(BLOG_RSS))
        .mount(&server)
        .await;

    let (db, feeds) = setup(&[format!("{}/rss", server.uri())]).await;
    let scheduler = scheduler(&db);

    match scheduler.run_cycle().await.unwrap() {
        CycleOutcome::Ingested {
            feed,
            document_title,
            report,
        } => {
            assert_eq!(feed.id, feeds[0].id);
            assert_eq!(document_title, "Engineering Blog");
            assert_eq!((report.created, report.skipped), (3, 0));
            assert!(report.errors.is_empty());
        }
        CycleOutcome::NoFeeds => panic!("feed was registered"),
    }

    let reader = db.get_user_by_name("reader").await.unwrap().unwrap();
    let posts = db.get_posts_for_user(reader.id, 10).await.unwrap();
    assert_eq!(posts.len(), 3);
    assert_eq!(posts[0].title, "Shipping the new scheduler");
    assert_eq!(posts[0].feed_id, feeds[0].id);
    assert_eq!(posts[0].description.as_deref(), Some("How we <b>rebuilt</b> it"));
    assert_eq!(posts[0].published_at, Some(1_735_720_200_000));
    assert_eq!(posts[2].title, "Notes & errata");
    assert_eq!(posts[2].description, None);
    assert_eq!(posts[2].published_at, None);

    match scheduler.run_cycle().await.unwrap() {
        CycleOutcome::Ingested { report, .. } => {
            assert_eq!((report.created, report.skipped), (0, 3));
        }
        CycleOutcome::NoFeeds => panic!("feed was registered"),
    }
    assert_eq!(db.get_posts_for_user(reader.id, 10).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_failing_feed_does_not_block_rotation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rss"))
        .respond_with(ResponseTemplate::new(200).set_body_string(BLOG_RSS))
        .mount(&server)
        .await;

    let (db, feeds) = setup(&[
        format!("{}/broken", server.uri()),
        format!("{}/rss", server.uri()),
    ])
    .await;
    let scheduler = scheduler(&db);

    match scheduler.run_cycle().await {
        Err(CycleError::Fetch {
            feed_id,
            source: FetchError::HttpStatus(500),
            ..
        }) => assert_eq!(feed_id, feeds[0].id),
        other => panic!("Expected HTTP 500 fetch failure, got {:?}", other),
    }
    let broken = db.get_feed_by_url(&feeds[0].url).await.unwrap().unwrap();
    assert!(broken.last_fetched_at.is_some());

    match scheduler.run_cycle().await.unwrap() {
        CycleOutcome::Ingested { feed, report, .. } => {
            assert_eq!(feed.id, feeds[1].id);
            assert_eq!(report.created, 3);
        }
        CycleOutcome::NoFeeds => panic!("feeds were registered"),
    }

    // Back to the broken feed: it waited its turn instead of being retried immediately
    assert!(matches!(
        scheduler.run_cycle().await,
        Err(CycleError::Fetch { feed_id, .. }) if feed_id == feeds[0].id
    ));
}

#[tokio::test]
async fn test_collected_posts_reach_followers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(BLOG_RSS))
        .mount(&server)
        .await;

    let (db, _) = setup(&[format!("{}/rss", server.uri())]).await;
    let outsider = db.create_user("outsider").await.unwrap();
    let reader = db.get_user_by_name("reader").await.unwrap().unwrap();

    scheduler(&db).run_cycle().await.unwrap();

    let posts = db.get_posts_for_user(reader.id, 2).await.unwrap();
    let titles: Vec<&str> = posts.iter().map(|p| p.title.as_str()).collect();
    assert_eq!(titles, vec!["Shipping the new scheduler", "Hello world"]);
    assert_eq!(posts[0].feed_name, "Feed 0");

    let all = db.get_posts_for_user(reader.id, 10).await.unwrap();
    assert_eq!(all.last().unwrap().title, "Notes & errata");

    assert!(db.get_posts_for_user(outsider.id, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_registry_cycle() {
    let (db, _) = setup(&[]).await;
    let outcome = scheduler(&db).run_cycle().await.unwrap();
    assert!(matches!(outcome, CycleOutcome::NoFeeds));
}
