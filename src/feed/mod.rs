//! Feed retrieval: HTTP fetching and RSS decoding.
//!
//! - [`parser`] decodes an RSS 2.0 body into a [`FetchedDocument`]
//! - [`fetcher`] performs the bounded HTTP GET and hands the body to the parser
//!
//! # Example
//!
//! ```ignore
//! use gator::feed::{FeedSource, Fetcher};
//!
//! let fetcher = Fetcher::new("gator")?;
//! let doc = fetcher.fetch("https://example.com/rss", Duration::from_secs(30)).await?;
//! ```

mod fetcher;
mod parser;

pub use fetcher::{FeedSource, FetchError, Fetcher, DEFAULT_MAX_FEED_BYTES, DEFAULT_USER_AGENT};
pub use parser::{parse_document, FetchedDocument, ParseError, RawEntry};
