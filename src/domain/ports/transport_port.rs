//! Port definition for the HTTP transport used by the downloader.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};
use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::domain::entities::DownloadPriority;
use crate::domain::errors::DownloadError;

/// Outgoing image request, open to modification before it is sent.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    /// Target URL.
    pub url: Url,
    /// Extra request headers.
    pub headers: HeaderMap,
    /// Per-request timeout; `None` uses the transport default.
    pub timeout: Option<Duration>,
    /// Priority hint for transports able to honor it.
    pub priority: DownloadPriority,
}

impl DownloadRequest {
    /// Creates a plain GET request for `url`.
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            url,
            headers: HeaderMap::new(),
            timeout: None,
            priority: DownloadPriority::default(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Streaming response returned by a transport.
pub struct TransportResponse {
    /// Value of `Content-Length`, when known.
    pub expected_length: Option<u64>,
    /// Body chunks in arrival order.
    pub body: BoxStream<'static, Result<Bytes, DownloadError>>,
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("expected_length", &self.expected_length)
            .finish_non_exhaustive()
    }
}

impl TransportResponse {
    /// Response whose body arrives as the given chunks.
    #[must_use]
    pub fn from_chunks(chunks: Vec<Bytes>) -> Self {
        let expected = chunks.iter().map(|c| c.len() as u64).sum();
        Self {
            expected_length: Some(expected),
            body: stream::iter(chunks.into_iter().map(Ok)).boxed(),
        }
    }

    /// Response whose body is a single chunk.
    #[must_use]
    pub fn from_bytes(bytes: Bytes) -> Self {
        Self::from_chunks(vec![bytes])
    }
}

/// Port for sending image requests over the host's HTTP stack.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransportPort: Send + Sync {
    /// Sends the request and returns the response once headers arrived.
    /// Non-success statuses are reported as errors.
    async fn open(&self, request: DownloadRequest) -> Result<TransportResponse, DownloadError>;
}
