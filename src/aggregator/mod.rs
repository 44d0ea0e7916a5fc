//! The aggregation loop.
//!
//! Each cycle claims the stalest feed ([`FeedSelector`]), fetches it through a
//! [`FeedSource`](crate::feed::FeedSource) and stores any posts not seen before
//! ([`Ingester`]). [`Scheduler`] repeats that on a fixed period until told to stop.

mod ingest;
mod scheduler;
mod selector;
#[cfg(test)]
pub(crate) mod testing;

pub use ingest::{parse_pub_date, EntryError, IngestReport, Ingester, PUB_DATE_FORMAT};
pub use scheduler::{
    run_aggregation, AggregatorError, CycleError, CycleOutcome, Scheduler, DEFAULT_FETCH_TIMEOUT,
};
pub use selector::FeedSelector;
