//! Small helpers shared by the binary and the library.
//!
//! - **Durations**: parsing the aggregation interval (`"1m"`, `"1h30m"`)
//! - **URL validation**: refusing internal addresses when a feed is registered
//! - **Text**: making feed-supplied strings safe to print on a terminal

mod duration;
mod text;
mod url_validator;

pub use duration::{parse_duration, DurationError};
pub use text::{sanitize_line, truncate_to_width};
pub use url_validator::{validate_feed_url, UrlValidationError};
