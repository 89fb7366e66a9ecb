//! Feed fetching and decoding
//!
//! [`FetchClient`] is the port the workers use: `fetch` downloads a feed's raw
//! bytes and `decode` turns them into [`ItemRecord`]s. [`HttpFetchClient`] is
//! the reqwest-backed implementation; decoding defaults to [`parse_feed`].

mod client;
mod error;
mod parser;

use async_trait::async_trait;
use serde::Serialize;

pub use client::HttpFetchClient;
pub use error::FetchError;
pub use parser::{parse_feed, parse_published_at};

/// One decoded feed item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ItemRecord {
    pub title: String,
    pub link: String,
    pub description: String,
    /// Publication date exactly as the feed wrote it
    pub published_at_text: String,
}

/// Downloads and decodes feeds
#[async_trait]
pub trait FetchClient: Send + Sync {
    /// Download the raw feed document at `url`
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;

    /// Decode a feed document into items, in document order
    fn decode(&self, bytes: &[u8]) -> Result<Vec<ItemRecord>, FetchError> {
        parse_feed(bytes)
    }
}
