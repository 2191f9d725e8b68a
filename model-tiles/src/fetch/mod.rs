//! Fetch collaborator interface.
//!
//! The worker never talks to the network directly. It hands a locator to a
//! [`TileFetcher`] and waits for exactly one completion. A zero-length body
//! is a valid success and is distinct from an error.
//!
//! # Example
//!
//! ```ignore
//! use model_tiles::fetch::{HttpFetcher, TileFetcher};
//! use tokio_util::sync::CancellationToken;
//!
//! let fetcher = HttpFetcher::new(30, "model-tiles/0.1")?;
//! let bytes = fetcher.fetch("https://tiles.example/14/8192/5461.glb", CancellationToken::new()).await?;
//! ```

mod http;

pub use http::HttpFetcher;

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors produced by a fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// The request could not be sent or the body could not be read.
    #[error("Request failed: {0}")]
    Request(String),

    /// The request did not finish within the configured timeout.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The fetch observed its cancellation token.
    #[error("Fetch cancelled")]
    Cancelled,
}

/// Source of raw tile bytes.
///
/// Implementations must complete each call at most once. The cancellation
/// token is advisory: the worker checks its own registry after the fetch
/// returns regardless of whether the fetcher honoured it.
pub trait TileFetcher: Send + Sync {
    /// Fetches the bytes behind `locator`.
    fn fetch(&self, locator: &str, cancel: CancellationToken)
        -> BoxFuture<'_, Result<Bytes, FetchError>>;
}
