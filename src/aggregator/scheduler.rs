use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use super::ingest::{IngestReport, Ingester};
use super::selector::FeedSelector;
use crate::feed::{FeedSource, FetchError};
use crate::storage::{DatabaseError, Feed, FeedStore};
use crate::util::{parse_duration, DurationError};

/// Deadline for a single feed request unless the caller overrides it
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Startup failures of [`run_aggregation`]. Nothing after startup is fatal.
#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("Invalid aggregation interval: {0}")]
    InvalidInterval(#[from] DurationError),
    #[error("Aggregation interval must be greater than zero")]
    ZeroInterval,
}

/// Why a single cycle ended early
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Failed to select next feed: {0}")]
    Select(#[source] DatabaseError),
    #[error("Failed to fetch feed {feed_id} ({url}): {source}")]
    Fetch {
        feed_id: i64,
        url: String,
        #[source]
        source: FetchError,
    },
}

/// What a completed cycle did
#[derive(Debug)]
pub enum CycleOutcome {
    /// No feeds are registered
    NoFeeds,
    Ingested {
        feed: Feed,
        document_title: String,
        report: IngestReport,
    },
}

/// Fixed-period loop: every tick claims one feed, fetches it and stores its new items.
pub struct Scheduler {
    selector: FeedSelector,
    source: Arc<dyn FeedSource>,
    ingester: Ingester,
    period: Duration,
    fetch_timeout: Duration,
}

impl Scheduler {
    pub fn new(store: Arc<dyn FeedStore>, source: Arc<dyn FeedSource>, period: Duration) -> Self {
        Self {
            selector: FeedSelector::new(Arc::clone(&store)),
            source,
            ingester: Ingester::new(store),
            period,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// One select, fetch, ingest pass.
    ///
    /// The feed is claimed before the request goes out, so a fetch failure
    /// still moves it to the back of the rotation.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, CycleError> {
        let Some(feed) = self.selector.select_next().await.map_err(CycleError::Select)? else {
            return Ok(CycleOutcome::NoFeeds);
        };

        let document = self
            .source
            .fetch(&feed.url, self.fetch_timeout)
            .await
            .map_err(|source| CycleError::Fetch {
                feed_id: feed.id,
                url: feed.url.clone(),
                source,
            })?;

        let report = self.ingester.ingest(&feed, &document).await;
        Ok(CycleOutcome::Ingested {
            feed,
            document_title: document.title,
            report,
        })
    }

    /// Run cycles until `shutdown` turns true or its sender is dropped.
    ///
    /// The first cycle starts immediately. Shutdown is honoured between cycles
    /// only; a cycle in progress always finishes. Ticks missed during a slow
    /// cycle are not replayed.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_requested(&mut shutdown) => break,
                _ = ticker.tick() => {}
            }

            self.log_cycle(self.run_cycle().await);
        }

        tracing::info!("Aggregation stopped");
    }

    fn log_cycle(&self, result: Result<CycleOutcome, CycleError>) {
        match result {
            Ok(CycleOutcome::NoFeeds) => {
                tracing::info!("No feeds registered, nothing to fetch");
            }
            Ok(CycleOutcome::Ingested {
                feed,
                document_title,
                report,
            }) => {
                tracing::info!(
                    feed_id = feed.id,
                    feed = %feed.name,
                    title = %document_title,
                    items = report.attempted(),
                    created = report.created,
                    skipped = report.skipped,
                    errors = report.errors.len(),
                    "Collected feed"
                );
            }
            Err(e @ CycleError::Select(_)) => {
                tracing::error!(error = %e, "Aggregation cycle failed");
            }
            Err(e @ CycleError::Fetch { .. }) => {
                tracing::warn!(error = %e, "Aggregation cycle failed");
            }
        }
    }
}

async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender can never signal again, so treat it as a request to stop.
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Parse `interval` and collect feeds on that period until `shutdown` fires.
///
/// Returns an error only when the interval is malformed or zero, before any
/// cycle runs. Per-cycle failures are logged and the loop carries on.
pub async fn run_aggregation(
    store: Arc<dyn FeedStore>,
    source: Arc<dyn FeedSource>,
    interval: &str,
    fetch_timeout: Duration,
    shutdown: watch::Receiver<bool>,
) -> Result<(), AggregatorError> {
    let period = parse_duration(interval)?;
    if period.is_zero() {
        return Err(AggregatorError::ZeroInterval);
    }

    tracing::info!(interval = ?period, "Collecting feeds");
    Scheduler::new(store, source, period)
        .with_fetch_timeout(fetch_timeout)
        .run(shutdown)
        .await;
    Ok(())
}
