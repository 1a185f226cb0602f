//! Port for rewriting requests before they are sent.

use super::transport_port::DownloadRequest;

/// Rewrites an outgoing request. Returning `None` aborts it before send.
pub trait RequestModifier: Send + Sync {
    /// Modifies the request.
    fn modify(&self, request: DownloadRequest) -> Option<DownloadRequest>;
}

impl<F> RequestModifier for F
where
    F: Fn(DownloadRequest) -> Option<DownloadRequest> + Send + Sync,
{
    fn modify(&self, request: DownloadRequest) -> Option<DownloadRequest> {
        self(request)
    }
}
