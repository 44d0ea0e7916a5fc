use crate::feed::parser::{parse_document, FetchedDocument, ParseError};
use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

/// Default response size cap
pub const DEFAULT_MAX_FEED_BYTES: usize = 10 * 1024 * 1024; // 10MB

/// `User-Agent` sent with every feed request unless configured otherwise
pub const DEFAULT_USER_AGENT: &str = concat!("gator/", env!("CARGO_PKG_VERSION"));

/// Errors that can occur while retrieving and decoding a feed.
///
/// A fetch either yields a complete document or one of these; there is no
/// partial result.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request did not complete within the caller's deadline
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Body could not be decoded as RSS
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    /// Response body exceeded the configured size limit
    #[error("Response too large (limit {0} bytes)")]
    ResponseTooLarge(usize),
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Anything that can turn a feed URL into a parsed document.
///
/// The scheduler only depends on this trait; [`Fetcher`] is the HTTP implementation.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Retrieve and decode the feed at `url`, giving up after `deadline`
    async fn fetch(&self, url: &str, deadline: Duration) -> Result<FetchedDocument, FetchError>;
}

/// HTTP feed fetcher. Owns its `reqwest::Client` for the life of the process.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl Fetcher {
    /// Build a fetcher whose requests identify themselves with `user_agent`
    pub fn new(user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self::with_client(client))
    }

    /// Wrap an existing client (its default headers are used as-is)
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            max_bytes: DEFAULT_MAX_FEED_BYTES,
        }
    }

    /// Override the response size cap
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        read_limited_bytes(response, self.max_bytes).await
    }
}

#[async_trait]
impl FeedSource for Fetcher {
    /// Single GET, no retries. The deadline covers connect, headers and body.
    async fn fetch(&self, url: &str, deadline: Duration) -> Result<FetchedDocument, FetchError> {
        let bytes = tokio::time::timeout(deadline, self.fetch_bytes(url))
            .await
            .map_err(|_| FetchError::Timeout(deadline))??;

        let document = parse_document(&bytes)?;
        tracing::debug!(
            url = %url,
            bytes = bytes.len(),
            items = document.items.len(),
            "Fetched feed"
        );
        Ok(document)
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    // EDGE-005: A connection cut mid-body can end the stream early without an error
    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
