//! Image downloader with one shared in-flight session per URL.
//!
//! Every caller gets its own [`DownloadSubscription`]; subscriptions for the
//! same URL observe the same underlying transfer. Dropping the last
//! subscription of a session aborts the transfer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use parking_lot::Mutex;
use reqwest::Url;
use reqwest::header::{HeaderValue, USER_AGENT};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, trace, warn};

use crate::domain::entities::DownloadPriority;
use crate::domain::errors::DownloadError;
use crate::domain::ports::{DownloadRequest, RequestModifier, TransportPort};

/// Default request timeout.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(15);

/// Downloader settings.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Timeout covering connection and body transfer.
    pub timeout: Duration,
    /// `User-Agent` header sent with every request.
    pub user_agent: Option<String>,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            user_agent: Some(concat!("pixcache/", env!("CARGO_PKG_VERSION")).to_string()),
        }
    }
}

/// Event delivered to a subscription.
#[derive(Debug, Clone)]
pub enum DownloadEvent {
    /// Bytes received so far and the expected total, when known.
    Progress {
        received: u64,
        expected: Option<u64>,
    },
    /// Terminal outcome of the session.
    Finished(Result<Bytes, DownloadError>),
}

#[derive(Default)]
struct SessionState {
    observers: HashMap<u64, mpsc::UnboundedSender<DownloadEvent>>,
    priority: DownloadPriority,
    received: u64,
    expected: Option<u64>,
    driver: Option<AbortHandle>,
    finished: bool,
}

/// Shared fetch for one URL.
struct DownloadSession {
    url: Url,
    state: Mutex<SessionState>,
}

impl DownloadSession {
    fn broadcast(&self, event: &DownloadEvent) {
        let state = self.state.lock();
        for sender in state.observers.values() {
            let _ = sender.send(event.clone());
        }
    }

    fn set_expected(&self, expected: Option<u64>) {
        self.state.lock().expected = expected;
    }

    fn progress(&self, received: u64) {
        let expected = {
            let mut state = self.state.lock();
            state.received = received;
            state.expected
        };
        self.broadcast(&DownloadEvent::Progress { received, expected });
    }
}

struct DownloaderInner {
    transport: Arc<dyn TransportPort>,
    config: DownloaderConfig,
    default_modifier: Option<Arc<dyn RequestModifier>>,
    sessions: Mutex<HashMap<Url, Arc<DownloadSession>>>,
    next_observer: AtomicU64,
}

/// Fetches raw image bytes, sharing concurrent requests for the same URL.
///
/// Cloning is cheap; clones share sessions.
#[derive(Clone)]
pub struct ImageDownloader {
    inner: Arc<DownloaderInner>,
}

impl std::fmt::Debug for ImageDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageDownloader")
            .field("config", &self.inner.config)
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl ImageDownloader {
    /// Creates a downloader over `transport` with default settings.
    #[must_use]
    pub fn new(transport: Arc<dyn TransportPort>) -> Self {
        Self::with_config(transport, DownloaderConfig::default())
    }

    /// Creates a downloader with explicit settings.
    #[must_use]
    pub fn with_config(transport: Arc<dyn TransportPort>, config: DownloaderConfig) -> Self {
        Self::build(transport, config, None)
    }

    fn build(
        transport: Arc<dyn TransportPort>,
        config: DownloaderConfig,
        default_modifier: Option<Arc<dyn RequestModifier>>,
    ) -> Self {
        Self {
            inner: Arc::new(DownloaderInner {
                transport,
                config,
                default_modifier,
                sessions: Mutex::new(HashMap::new()),
                next_observer: AtomicU64::new(1),
            }),
        }
    }

    /// Returns a downloader applying `modifier` to every request before the
    /// per-request modifier. The result does not share sessions with `self`.
    #[must_use]
    pub fn with_default_modifier(self, modifier: Arc<dyn RequestModifier>) -> Self {
        Self::build(
            Arc::clone(&self.inner.transport),
            self.inner.config.clone(),
            Some(modifier),
        )
    }

    /// Active settings.
    #[must_use]
    pub fn config(&self) -> &DownloaderConfig {
        &self.inner.config
    }

    /// Subscribes to the download of `url`, joining an in-flight session when
    /// one exists. `modifier` only applies when this call starts the session.
    ///
    /// Must be called within a Tokio runtime.
    pub fn fetch(
        &self,
        url: Url,
        priority: DownloadPriority,
        modifier: Option<Arc<dyn RequestModifier>>,
    ) -> DownloadSubscription {
        let id = self.inner.next_observer.fetch_add(1, Ordering::Relaxed);
        let (sender, events) = mpsc::unbounded_channel();

        let mut sessions = self.inner.sessions.lock();

        if let Some(session) = sessions.get(&url) {
            let mut state = session.state.lock();
            if !state.finished {
                if state.received > 0 {
                    let _ = sender.send(DownloadEvent::Progress {
                        received: state.received,
                        expected: state.expected,
                    });
                }
                state.observers.insert(id, sender);
                state.priority = state.priority.max(priority);
                debug!(url = %url, observers = state.observers.len(), "Joined download session");
                drop(state);
                return DownloadSubscription::new(id, Arc::clone(session), events, &self.inner);
            }
        }

        let session = Arc::new(DownloadSession {
            url: url.clone(),
            state: Mutex::new(SessionState {
                priority,
                ..SessionState::default()
            }),
        });
        session.state.lock().observers.insert(id, sender);

        let driver = tokio::spawn(drive(
            Arc::clone(&self.inner),
            Arc::clone(&session),
            priority,
            modifier,
        ));
        session.state.lock().driver = Some(driver.abort_handle());
        sessions.insert(url.clone(), Arc::clone(&session));
        drop(sessions);

        debug!(url = %url, priority = priority.value(), "Started download session");
        DownloadSubscription::new(id, session, events, &self.inner)
    }

    /// Number of sessions currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.sessions.lock().len()
    }

    /// Current priority of the session for `url`, if one is in flight.
    #[must_use]
    pub fn session_priority(&self, url: &Url) -> Option<DownloadPriority> {
        self.inner
            .sessions
            .lock()
            .get(url)
            .map(|session| session.state.lock().priority)
    }

    /// Aborts every session. Observers receive `SessionAborted`.
    pub fn cancel_all(&self) {
        let drained: Vec<_> = self.inner.sessions.lock().drain().map(|(_, s)| s).collect();
        for session in drained {
            let observers = {
                let mut state = session.state.lock();
                state.finished = true;
                if let Some(driver) = state.driver.take() {
                    driver.abort();
                }
                std::mem::take(&mut state.observers)
            };
            for sender in observers.into_values() {
                let _ = sender.send(DownloadEvent::Finished(Err(DownloadError::SessionAborted)));
            }
            debug!(url = %session.url, "Cancelled download session");
        }
    }
}

impl DownloaderInner {
    /// Removes an observer; aborts the session when it was the last one.
    fn cancel(&self, session: &Arc<DownloadSession>, observer: u64) {
        let mut sessions = self.sessions.lock();
        let mut state = session.state.lock();
        if state.observers.remove(&observer).is_none() || state.finished {
            return;
        }
        trace!(url = %session.url, observer, "Observer left download session");
        if !state.observers.is_empty() {
            return;
        }

        state.finished = true;
        if let Some(driver) = state.driver.take() {
            driver.abort();
        }
        if sessions
            .get(&session.url)
            .is_some_and(|current| Arc::ptr_eq(current, session))
        {
            sessions.remove(&session.url);
        }
        debug!(url = %session.url, "Aborted download without observers");
    }

    fn finish(&self, session: &Arc<DownloadSession>, result: Result<Bytes, DownloadError>) {
        let observers = {
            let mut sessions = self.sessions.lock();
            if sessions
                .get(&session.url)
                .is_some_and(|current| Arc::ptr_eq(current, session))
            {
                sessions.remove(&session.url);
            }
            let mut state = session.state.lock();
            state.finished = true;
            state.driver = None;
            std::mem::take(&mut state.observers)
        };

        match &result {
            Ok(bytes) => debug!(
                url = %session.url,
                size = bytes.len(),
                observers = observers.len(),
                "Download finished"
            ),
            Err(e) => warn!(url = %session.url, error = %e, "Download failed"),
        }

        let event = DownloadEvent::Finished(result);
        for sender in observers.into_values() {
            let _ = sender.send(event.clone());
        }
    }
}

async fn drive(
    inner: Arc<DownloaderInner>,
    session: Arc<DownloadSession>,
    priority: DownloadPriority,
    modifier: Option<Arc<dyn RequestModifier>>,
) {
    let timeout = inner.config.timeout;
    let result = match tokio::time::timeout(
        timeout,
        transfer(&inner, &session, priority, modifier.as_deref()),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(DownloadError::Timeout),
    };
    inner.finish(&session, result);
}

async fn transfer(
    inner: &DownloaderInner,
    session: &DownloadSession,
    priority: DownloadPriority,
    modifier: Option<&dyn RequestModifier>,
) -> Result<Bytes, DownloadError> {
    let mut request = DownloadRequest::new(session.url.clone()).with_timeout(inner.config.timeout);
    request.priority = priority;
    if let Some(agent) = &inner.config.user_agent {
        match HeaderValue::from_str(agent) {
            Ok(value) => {
                request.headers.insert(USER_AGENT, value);
            }
            Err(e) => warn!(error = %e, "Ignoring invalid user agent"),
        }
    }

    for step in [inner.default_modifier.as_deref(), modifier].into_iter().flatten() {
        request = step.modify(request).ok_or(DownloadError::RequestRejected)?;
    }

    trace!(url = %request.url, "Opening transfer");
    let mut response = inner.transport.open(request).await?;
    session.set_expected(response.expected_length);

    let mut buffer = BytesMut::with_capacity(
        response
            .expected_length
            .and_then(|len| usize::try_from(len).ok())
            .unwrap_or(0),
    );
    while let Some(chunk) = response.body.next().await {
        buffer.extend_from_slice(&chunk?);
        session.progress(buffer.len() as u64);
    }

    if buffer.is_empty() {
        return Err(DownloadError::EmptyBody);
    }
    Ok(buffer.freeze())
}

/// One observer of a download session.
///
/// Dropping it before the session finished unsubscribes, aborting the
/// transfer if no other observer remains.
pub struct DownloadSubscription {
    id: u64,
    session: Arc<DownloadSession>,
    events: mpsc::UnboundedReceiver<DownloadEvent>,
    downloader: Weak<DownloaderInner>,
    finished: bool,
}

impl std::fmt::Debug for DownloadSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadSubscription")
            .field("id", &self.id)
            .field("url", &self.session.url.as_str())
            .field("finished", &self.finished)
            .finish()
    }
}

impl DownloadSubscription {
    fn new(
        id: u64,
        session: Arc<DownloadSession>,
        events: mpsc::UnboundedReceiver<DownloadEvent>,
        downloader: &Arc<DownloaderInner>,
    ) -> Self {
        Self {
            id,
            session,
            events,
            downloader: Arc::downgrade(downloader),
            finished: false,
        }
    }

    /// URL being downloaded.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.session.url
    }

    /// Next event, or `None` once the terminal event was consumed.
    pub async fn next_event(&mut self) -> Option<DownloadEvent> {
        if self.finished {
            return None;
        }
        let event = self.events.recv().await;
        if matches!(event, Some(DownloadEvent::Finished(_)) | None) {
            self.finished = true;
        }
        event
    }

    /// Waits for the outcome, reporting progress along the way.
    ///
    /// # Errors
    /// Returns the session's error, or `SessionAborted` if it ended without one.
    pub async fn wait(
        mut self,
        mut on_progress: impl FnMut(u64, Option<u64>),
    ) -> Result<Bytes, DownloadError> {
        while let Some(event) = self.next_event().await {
            match event {
                DownloadEvent::Progress { received, expected } => on_progress(received, expected),
                DownloadEvent::Finished(result) => return result,
            }
        }
        Err(DownloadError::SessionAborted)
    }

    /// Leaves the session explicitly.
    pub fn cancel(mut self) {
        self.leave();
    }

    fn leave(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Some(inner) = self.downloader.upgrade() {
            inner.cancel(&self.session, self.id);
        }
    }
}

impl Drop for DownloadSubscription {
    fn drop(&mut self) {
        self.leave();
    }
}
