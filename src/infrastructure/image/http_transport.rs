//! HTTP transport backed by reqwest.

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::Client;
use tracing::{trace, warn};

use crate::domain::errors::DownloadError;
use crate::domain::ports::{DownloadRequest, TransportPort, TransportResponse};

const USER_AGENT: &str = concat!("pixcache/", env!("CARGO_PKG_VERSION"));

/// Sends image requests with a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Creates a transport with a default client.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new() -> Result<Self, DownloadError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| DownloadError::transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn map_error(e: &reqwest::Error) -> DownloadError {
    if e.is_timeout() {
        DownloadError::Timeout
    } else if let Some(status) = e.status() {
        DownloadError::BadStatus {
            status: status.as_u16(),
        }
    } else if e.is_connect() {
        DownloadError::transport(format!("failed to connect: {e}"))
    } else {
        DownloadError::transport(e.to_string())
    }
}

#[async_trait]
impl TransportPort for HttpTransport {
    async fn open(&self, request: DownloadRequest) -> Result<TransportResponse, DownloadError> {
        let mut builder = self.client.get(request.url.clone()).headers(request.headers);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| {
            warn!(url = %request.url, error = %e, "Image request failed");
            map_error(&e)
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::BadStatus {
                status: status.as_u16(),
            });
        }

        let expected_length = response.content_length();
        trace!(url = %request.url, status = %status, expected_length, "Response headers received");

        let body = response
            .bytes_stream()
            .map_err(|e| map_error(&e))
            .boxed();

        Ok(TransportResponse {
            expected_length,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Url;

    #[test]
    fn test_new_builds_client() {
        assert!(HttpTransport::new().is_ok());
    }

    #[tokio::test]
    async fn test_unsupported_scheme_is_transport_error() {
        let transport = HttpTransport::new().unwrap();
        let url = Url::parse("ftp://example.com/image.png").unwrap();

        let result = transport.open(DownloadRequest::new(url)).await;

        assert!(matches!(result, Err(DownloadError::Transport { .. })));
    }
}
