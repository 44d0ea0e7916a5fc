use rss::{Channel, Item};
use thiserror::Error;

/// Errors raised while decoding a feed body
#[derive(Debug, Error)]
pub enum ParseError {
    /// Body is not valid UTF-8
    #[error("Feed is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    /// Body is not an RSS 2.0 document
    #[error("Invalid RSS document: {0}")]
    Rss(#[from] rss::Error),
}

/// A parsed feed document. Lives only for the duration of one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedDocument {
    pub title: String,
    pub items: Vec<RawEntry>,
}

/// One `<item>` as it appeared in the document, unvalidated
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub title: String,
    pub link: String,
    pub description: String,
    /// The `<pubDate>` text, unparsed
    pub pub_date: String,
}

fn trimmed(value: Option<&str>) -> String {
    value.map(str::trim).unwrap_or_default().to_string()
}

impl From<&Item> for RawEntry {
    fn from(item: &Item) -> Self {
        RawEntry {
            title: trimmed(item.title()),
            link: trimmed(item.link()),
            description: trimmed(item.description()),
            pub_date: trimmed(item.pub_date()),
        }
    }
}

impl From<Channel> for FetchedDocument {
    fn from(channel: Channel) -> Self {
        FetchedDocument {
            title: channel.title().trim().to_string(),
            items: channel.items().iter().map(RawEntry::from).collect(),
        }
    }
}

/// Decode an RSS 2.0 body into a [`FetchedDocument`].
///
/// The whole document must decode; a malformed body yields an error and no items.
/// Namespaced elements (`media:*`, `itunes:*`, `atom:*`) never stand in for
/// the plain RSS fields, and markup nested inside a text element is dropped
/// rather than failing the document.
pub fn parse_document(bytes: &[u8]) -> Result<FetchedDocument, ParseError> {
    let text = std::str::from_utf8(bytes)?;
    let channel = Channel::read_from(text.as_bytes())?;
    Ok(FetchedDocument::from(channel))
}
