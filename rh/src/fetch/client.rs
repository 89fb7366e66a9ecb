use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{FetchClient, FetchError};
use crate::config::FetchConfig;

/// reqwest-backed feed downloader with a per-request deadline
#[derive(Debug, Clone)]
pub struct HttpFetchClient {
    client: Client,
    timeout: Duration,
}

impl HttpFetchClient {
    /// Build a client from fetch settings
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        debug!(timeout_ms = config.timeout_ms, "HttpFetchClient::new: called");
        let timeout = config.timeout();
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

fn check_url(url: &str) -> Result<(), FetchError> {
    let lower = url.trim().to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        Ok(())
    } else {
        Err(FetchError::InvalidUrl(url.to_string()))
    }
}

#[async_trait]
impl FetchClient for HttpFetchClient {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        debug!(%url, "HttpFetchClient::fetch: called");
        check_url(url)?;

        let response = self.client.get(url.trim()).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout)
            } else {
                FetchError::Request(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout)
            } else {
                FetchError::Request(e)
            }
        })?;
        debug!(%url, len = bytes.len(), "HttpFetchClient::fetch: downloaded");
        Ok(bytes.to_vec())
    }
}
