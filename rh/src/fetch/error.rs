use std::time::Duration;

use thiserror::Error;

/// Errors from fetching or decoding a feed
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status} when fetching {url}")]
    Status { status: u16, url: String },

    #[error("Fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unsupported feed URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to parse feed: {0}")]
    Parse(String),
}

impl FetchError {
    /// Whether a later attempt against the same URL could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Request(_) | FetchError::Timeout(_) => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::InvalidUrl(_) | FetchError::Parse(_) => false,
        }
    }
}
