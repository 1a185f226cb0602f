//! Retrieval coordinator: memory, then disk, then network.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::OnceCell;
use tracing::{debug, info, trace, warn};

use crate::application::dto::{RetrievalOptions, RetrieveImageResult, RetrieveResult};
use crate::domain::entities::{CacheKey, CacheType, DecodedImage, Resource, TaskState};
use crate::domain::errors::{CacheResult, RetrieveError, SetupError};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::image::{
    CleanupReport, HttpTransport, ImageCache, ImageDownloader, decoder,
};

use super::callback_queue::CallbackQueue;
use super::retrieve_task::RetrieveTask;

/// Progress callback: bytes received and expected total, when known.
pub type ProgressCallback = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

static SHARED: OnceCell<ImageRetriever> = OnceCell::const_new();

/// Coordinates cache lookups, downloads and decoding for image requests.
pub struct ImageRetriever {
    cache: Arc<ImageCache>,
    downloader: ImageDownloader,
    callback_queue: CallbackQueue,
}

impl std::fmt::Debug for ImageRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageRetriever")
            .field("cache", &self.cache)
            .field("downloader", &self.downloader)
            .finish_non_exhaustive()
    }
}

impl ImageRetriever {
    /// Creates an independent retriever delivering callbacks on its own serial queue.
    ///
    /// Must be called within a Tokio runtime.
    #[must_use]
    pub fn new(cache: Arc<ImageCache>, downloader: ImageDownloader) -> Self {
        Self {
            cache,
            downloader,
            callback_queue: CallbackQueue::serial(),
        }
    }

    /// Replaces the default callback queue.
    #[must_use]
    pub fn with_callback_queue(mut self, queue: CallbackQueue) -> Self {
        self.callback_queue = queue;
        self
    }

    /// Builds a retriever from configuration, with an HTTP transport and the
    /// memory expiration sweep running.
    ///
    /// # Errors
    /// Returns error if the disk cache or the HTTP client cannot be created.
    pub async fn from_config(config: &AppConfig) -> Result<Self, SetupError> {
        let memory = config.memory_cache.to_cache_config();
        let disk = config.disk_cache.to_cache_config();
        let cache = match &config.disk_cache.directory {
            Some(directory) => ImageCache::open(memory, directory.clone(), disk).await?,
            None => ImageCache::default_location(memory, disk).await?,
        };
        cache.start_sweeper();

        let transport = HttpTransport::new()?;
        let downloader = ImageDownloader::with_config(
            Arc::new(transport),
            config.downloader.to_downloader_config(),
        );

        info!(disk_dir = %cache.disk().directory().display(), "Image retriever ready");
        Ok(Self::new(Arc::new(cache), downloader))
    }

    /// Process-wide retriever with default configuration, created on first use.
    ///
    /// # Errors
    /// Returns error if the first initialization fails; later calls retry.
    pub async fn shared() -> Result<&'static Self, SetupError> {
        SHARED
            .get_or_try_init(|| async { Self::from_config(&AppConfig::default()).await })
            .await
    }

    /// Default cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<ImageCache> {
        &self.cache
    }

    /// Default downloader.
    #[must_use]
    pub const fn downloader(&self) -> &ImageDownloader {
        &self.downloader
    }

    /// Retrieves `resource`.
    ///
    /// `on_complete` runs exactly once on the configured callback queue unless
    /// the returned task is cancelled first. Progress is reported before
    /// completion, in increasing order of received bytes.
    pub fn retrieve(
        &self,
        resource: Resource,
        options: RetrievalOptions,
        on_progress: Option<ProgressCallback>,
        on_complete: impl FnOnce(RetrieveResult) + Send + 'static,
    ) -> RetrieveTask {
        let cache = options
            .target_cache
            .clone()
            .unwrap_or_else(|| Arc::clone(&self.cache));
        let downloader = options
            .downloader
            .clone()
            .unwrap_or_else(|| self.downloader.clone());
        let queue = options
            .callback_queue
            .clone()
            .unwrap_or_else(|| self.callback_queue.clone());
        let key = resource
            .cache_key()
            .processed(&options.processor.identifier());

        if !options.skips_cache()
            && let Some(image) = cache.retrieve_from_memory(&key)
        {
            trace!(key = %key, "Memory cache hit");
            let source_url = resource.download_url().clone();
            queue.execute(move || {
                on_complete(Ok(RetrieveImageResult {
                    image,
                    cache_type: CacheType::Memory,
                    source_url,
                }));
            });
            return RetrieveTask::completed(&resource);
        }

        let task = RetrieveTask::new(&resource);
        let job = RetrieveJob {
            resource,
            key,
            options,
            cache,
            downloader,
            queue,
            task: task.clone(),
            on_progress,
        };
        let driver = tokio::spawn(job.run(on_complete));
        task.set_driver(driver.abort_handle());
        task
    }

    /// Retrieves `resource` and waits for the result.
    ///
    /// # Errors
    /// Returns the retrieval error, or `Cancelled` if the request was dropped.
    pub async fn retrieve_async(
        &self,
        resource: Resource,
        options: RetrievalOptions,
    ) -> RetrieveResult {
        let (sender, receiver) = tokio::sync::oneshot::channel();
        let _task = self.retrieve(resource, options, None, move |result| {
            let _ = sender.send(result);
        });
        receiver.await.unwrap_or(Err(RetrieveError::Cancelled))
    }

    /// Reports where `key` is cached for the identity processor.
    pub async fn cached_type(&self, key: &CacheKey) -> CacheType {
        self.cache.cached_type(key).await
    }

    /// Empties the memory cache.
    pub fn clear_memory_cache(&self) {
        self.cache.clear_memory();
    }

    /// Empties the disk cache.
    ///
    /// # Errors
    /// Returns error if the cache directory cannot be read.
    pub async fn clear_disk_cache(&self) -> CacheResult<()> {
        self.cache.clear_disk().await
    }

    /// Removes expired disk entries and enforces the disk size limit.
    ///
    /// # Errors
    /// Returns error if the cache directory cannot be read.
    pub async fn clean_expired_disk_cache(&self) -> CacheResult<CleanupReport> {
        self.cache.clean_expired_disk().await
    }

    /// Removes expired memory entries.
    pub fn clean_expired_memory_cache(&self) -> usize {
        self.cache.clean_expired_memory()
    }
}

/// State of one in-flight retrieval.
struct RetrieveJob {
    resource: Resource,
    key: CacheKey,
    options: RetrievalOptions,
    cache: Arc<ImageCache>,
    downloader: ImageDownloader,
    queue: CallbackQueue,
    task: RetrieveTask,
    on_progress: Option<ProgressCallback>,
}

impl RetrieveJob {
    async fn run(self, on_complete: impl FnOnce(RetrieveResult) + Send + 'static) {
        let outcome = self.execute().await;
        let source_url = self.resource.download_url().clone();

        let next = if outcome.is_ok() {
            TaskState::Completed
        } else {
            TaskState::Failed
        };
        if !self.task.advance(next) || self.task.is_suppressed() {
            debug!(key = %self.key, "Retrieval cancelled, dropping result");
            return;
        }

        let result = outcome.map(|(image, cache_type)| RetrieveImageResult {
            image,
            cache_type,
            source_url,
        });
        if let Err(e) = &result {
            debug!(key = %self.key, error = %e, "Retrieval failed");
        }
        self.queue.execute(move || on_complete(result));
    }

    async fn execute(&self) -> Result<(Arc<DecodedImage>, CacheType), RetrieveError> {
        if !self.options.skips_cache() {
            if let Some(hit) = self.from_cache().await {
                return Ok(hit);
            }
            trace!(key = %self.key, "Cache miss");
        }

        if self.options.only_from_cache {
            return Err(RetrieveError::cache_miss(self.key.as_str()));
        }

        let bytes = self.download().await?;
        let image = self.decode(bytes.clone()).await?;

        let write = self.cache.store(
            &self.key,
            Arc::clone(&image),
            Some(bytes),
            Arc::clone(&self.options.cache_serializer),
            self.options.cache_memory_only,
        );
        if write.is_some() {
            trace!(key = %self.key, "Disk cache write scheduled");
        }

        Ok((image, CacheType::None))
    }

    /// Disk lookup for the processed key, falling back to processing a
    /// cached original.
    async fn from_cache(&self) -> Option<(Arc<DecodedImage>, CacheType)> {
        let decode_options = self.options.decode_options();
        let serializer = Arc::clone(&self.options.cache_serializer);

        if let Some(hit) = self
            .cache
            .retrieve_image(
                &self.key,
                decode_options,
                Arc::clone(&serializer),
                self.options.background_decode,
            )
            .await
        {
            return Some(hit);
        }

        let processor = Arc::clone(&self.options.processor);
        if processor.is_identity() {
            return None;
        }

        let (original, cache_type) = self
            .cache
            .retrieve_image(
                self.resource.cache_key(),
                decode_options,
                Arc::clone(&serializer),
                false,
            )
            .await?;
        debug!(key = %self.key, "Processing cached original");

        let background_decode = self.options.background_decode;
        let processed = tokio::task::spawn_blocking(move || {
            let image = decoder::apply_processor(original.as_ref().clone(), processor.as_ref());
            if background_decode {
                decoder::prepare_for_display(image)
            } else {
                image
            }
        })
        .await
        .map_err(|e| warn!(key = %self.key, error = %e, "Processing task failed"))
        .ok()?;

        let image = Arc::new(processed);
        self.cache.store(
            &self.key,
            Arc::clone(&image),
            None,
            serializer,
            self.options.cache_memory_only,
        );
        Some((image, cache_type))
    }

    async fn download(&self) -> Result<Bytes, RetrieveError> {
        if !self.task.advance(TaskState::Fetching) {
            return Err(RetrieveError::Cancelled);
        }
        let url = self.resource.download_url().clone();
        debug!(url = %url, key = %self.key, "Downloading image");

        let subscription = self.downloader.fetch(
            url.clone(),
            self.options.download_priority,
            self.options.request_modifier.clone(),
        );

        let on_progress = self.on_progress.clone();
        let queue = self.queue.clone();
        let task = self.task.clone();
        subscription
            .wait(move |received, expected| {
                if let Some(callback) = &on_progress {
                    let callback = Arc::clone(callback);
                    let task = task.clone();
                    queue.execute(move || {
                        if !task.is_suppressed() {
                            callback(received, expected);
                        }
                    });
                }
            })
            .await
            .map_err(|e| RetrieveError::download(url, e))
    }

    async fn decode(&self, bytes: Bytes) -> Result<Arc<DecodedImage>, RetrieveError> {
        if !self.task.advance(TaskState::Decoding) {
            return Err(RetrieveError::Cancelled);
        }

        let options = self.options.decode_options();
        let processor = Arc::clone(&self.options.processor);
        let background_decode = self.options.background_decode;
        let image = tokio::task::spawn_blocking(move || {
            decoder::decode_and_process(&bytes, &options, processor.as_ref(), background_decode)
        })
        .await
        .map_err(|e| RetrieveError::decode(format!("decode task failed: {e}")))??;

        trace!(
            key = %self.key,
            width = image.width(),
            height = image.height(),
            frames = image.frame_count(),
            "Decoded image"
        );
        Ok(Arc::new(image))
    }
}
