//! HTTP fetcher backed by reqwest.

use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{BoxFuture, FetchError, TileFetcher};
use crate::config::WorkerConfig;

/// Real fetcher implementation using an async reqwest client.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher with the given timeout and user agent.
    pub fn new(timeout_secs: u64, user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .build()
            .map_err(|e| FetchError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::with_client(client))
    }

    /// Creates a fetcher using the configured timeout and user agent.
    pub fn from_config(config: &WorkerConfig) -> Result<Self, FetchError> {
        Self::new(config.fetch_timeout_secs, &config.user_agent)
    }

    /// Wraps an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn get(&self, url: &str) -> Result<Bytes, FetchError> {
        let response = self.client.get(url).send().await.map_err(|e| map_error(url, e))?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        response.bytes().await.map_err(|e| map_error(url, e))
    }
}

fn map_error(url: &str, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(url.to_string())
    } else {
        FetchError::Request(format!("{}: {}", url, err))
    }
}

impl TileFetcher for HttpFetcher {
    fn fetch(
        &self,
        locator: &str,
        cancel: CancellationToken,
    ) -> BoxFuture<'_, Result<Bytes, FetchError>> {
        let url = locator.to_string();
        Box::pin(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(url = %url, "Fetch cancelled");
                    Err(FetchError::Cancelled)
                }
                result = self.get(&url) => result,
            }
        })
    }
}
