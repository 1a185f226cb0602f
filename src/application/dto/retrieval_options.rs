//! Per-request retrieval configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::application::services::CallbackQueue;
use crate::domain::entities::{DecodeOptions, DownloadPriority};
use crate::domain::ports::{CacheSerializer, ImageProcessor, RequestModifier};
use crate::infrastructure::image::{
    DefaultCacheSerializer, DefaultProcessor, ImageCache, ImageDownloader,
};

/// Transition a view should play when the image arrives.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Transition {
    /// Show the image immediately.
    #[default]
    None,
    /// Fade in over the given duration.
    Fade(Duration),
}

/// One tagged option. A list of these resolves to [`RetrievalOptions`];
/// when a kind appears more than once, the last one wins.
#[derive(Clone)]
#[allow(missing_docs)]
pub enum OptionItem {
    TargetCache(Arc<ImageCache>),
    Downloader(ImageDownloader),
    Transition(Transition),
    DownloadPriority(DownloadPriority),
    ForceRefresh,
    ForceTransition,
    CacheMemoryOnly,
    OnlyFromCache,
    BackgroundDecode,
    CallbackQueue(CallbackQueue),
    ScaleFactor(f32),
    PreloadAllFrames,
    OnlyFirstFrame,
    KeepCurrentWhileLoading,
    RequestModifier(Arc<dyn RequestModifier>),
    Processor(Arc<dyn ImageProcessor>),
    CacheSerializer(Arc<dyn CacheSerializer>),
}

/// Resolved configuration of one retrieval. A plain value: building or
/// changing it never touches shared state.
#[derive(Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct RetrievalOptions {
    /// Cache to use instead of the retriever's own.
    pub target_cache: Option<Arc<ImageCache>>,
    /// Downloader to use instead of the retriever's own.
    pub downloader: Option<ImageDownloader>,
    /// Transition for view bindings.
    pub transition: Transition,
    /// Priority hint for the download.
    pub download_priority: DownloadPriority,
    /// Skip cache lookups and download again.
    pub force_refresh: bool,
    /// Play the transition even for cached results.
    pub force_transition: bool,
    /// Do not write the result to the disk cache.
    pub cache_memory_only: bool,
    /// Fail with a cache miss instead of downloading.
    pub only_from_cache: bool,
    /// Convert frames to display buffers before reporting the image ready.
    pub background_decode: bool,
    /// Where callbacks run; `None` uses the retriever's queue.
    pub callback_queue: Option<CallbackQueue>,
    /// Pixels per point of the decoded image.
    pub scale_factor: f32,
    /// Decode every frame of animated images up front.
    pub preload_all_frames: bool,
    /// Decode only the first frame of animated images.
    pub only_first_frame: bool,
    /// Keep the current image of a view while loading.
    pub keep_current_while_loading: bool,
    /// Rewrites the request before it is sent.
    pub request_modifier: Option<Arc<dyn RequestModifier>>,
    /// Transform applied after decoding.
    pub processor: Arc<dyn ImageProcessor>,
    /// Converts images to and from disk cache bytes.
    pub cache_serializer: Arc<dyn CacheSerializer>,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            target_cache: None,
            downloader: None,
            transition: Transition::None,
            download_priority: DownloadPriority::DEFAULT,
            force_refresh: false,
            force_transition: false,
            cache_memory_only: false,
            only_from_cache: false,
            background_decode: false,
            callback_queue: None,
            scale_factor: 1.0,
            preload_all_frames: false,
            only_first_frame: false,
            keep_current_while_loading: false,
            request_modifier: None,
            processor: Arc::new(DefaultProcessor),
            cache_serializer: Arc::new(DefaultCacheSerializer::new()),
        }
    }
}

impl std::fmt::Debug for RetrievalOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalOptions")
            .field("transition", &self.transition)
            .field("download_priority", &self.download_priority)
            .field("force_refresh", &self.force_refresh)
            .field("cache_memory_only", &self.cache_memory_only)
            .field("only_from_cache", &self.only_from_cache)
            .field("background_decode", &self.background_decode)
            .field("scale_factor", &self.scale_factor)
            .field("preload_all_frames", &self.preload_all_frames)
            .field("only_first_frame", &self.only_first_frame)
            .field("processor", &self.processor.identifier())
            .finish_non_exhaustive()
    }
}

impl RetrievalOptions {
    /// Resolves an ordered option list; later items override earlier ones.
    #[must_use]
    pub fn from_items(items: impl IntoIterator<Item = OptionItem>) -> Self {
        items.into_iter().fold(Self::default(), Self::apply)
    }

    /// Applies one option.
    #[must_use]
    pub fn apply(mut self, item: OptionItem) -> Self {
        match item {
            OptionItem::TargetCache(cache) => self.target_cache = Some(cache),
            OptionItem::Downloader(downloader) => self.downloader = Some(downloader),
            OptionItem::Transition(transition) => self.transition = transition,
            OptionItem::DownloadPriority(priority) => self.download_priority = priority,
            OptionItem::ForceRefresh => self.force_refresh = true,
            OptionItem::ForceTransition => self.force_transition = true,
            OptionItem::CacheMemoryOnly => self.cache_memory_only = true,
            OptionItem::OnlyFromCache => self.only_from_cache = true,
            OptionItem::BackgroundDecode => self.background_decode = true,
            OptionItem::CallbackQueue(queue) => self.callback_queue = Some(queue),
            OptionItem::ScaleFactor(scale) => self.scale_factor = scale,
            OptionItem::PreloadAllFrames => self.preload_all_frames = true,
            OptionItem::OnlyFirstFrame => self.only_first_frame = true,
            OptionItem::KeepCurrentWhileLoading => self.keep_current_while_loading = true,
            OptionItem::RequestModifier(modifier) => self.request_modifier = Some(modifier),
            OptionItem::Processor(processor) => self.processor = processor,
            OptionItem::CacheSerializer(serializer) => self.cache_serializer = serializer,
        }
        self
    }

    /// Sets the processor.
    #[must_use]
    pub fn with_processor(mut self, processor: impl ImageProcessor + 'static) -> Self {
        self.processor = Arc::new(processor);
        self
    }

    /// Sets the cache serializer.
    #[must_use]
    pub fn with_serializer(mut self, serializer: impl CacheSerializer + 'static) -> Self {
        self.cache_serializer = Arc::new(serializer);
        self
    }

    /// Sets the request modifier.
    #[must_use]
    pub fn with_request_modifier(mut self, modifier: impl RequestModifier + 'static) -> Self {
        self.request_modifier = Some(Arc::new(modifier));
        self
    }

    /// Uses `cache` instead of the retriever's cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<ImageCache>) -> Self {
        self.target_cache = Some(cache);
        self
    }

    /// Uses `downloader` instead of the retriever's downloader.
    #[must_use]
    pub fn with_downloader(mut self, downloader: ImageDownloader) -> Self {
        self.downloader = Some(downloader);
        self
    }

    /// Runs callbacks on `queue`.
    #[must_use]
    pub fn with_callback_queue(mut self, queue: CallbackQueue) -> Self {
        self.callback_queue = Some(queue);
        self
    }

    /// Sets the download priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: DownloadPriority) -> Self {
        self.download_priority = priority;
        self
    }

    /// Sets the scale factor.
    #[must_use]
    pub const fn with_scale_factor(mut self, scale: f32) -> Self {
        self.scale_factor = scale;
        self
    }

    /// Sets the transition.
    #[must_use]
    pub const fn with_transition(mut self, transition: Transition) -> Self {
        self.transition = transition;
        self
    }

    /// Skips cache lookups.
    #[must_use]
    pub const fn force_refresh(mut self) -> Self {
        self.force_refresh = true;
        self
    }

    /// Never downloads.
    #[must_use]
    pub const fn only_from_cache(mut self) -> Self {
        self.only_from_cache = true;
        self
    }

    /// Keeps results out of the disk cache.
    #[must_use]
    pub const fn cache_memory_only(mut self) -> Self {
        self.cache_memory_only = true;
        self
    }

    /// Prepares display buffers before delivery.
    #[must_use]
    pub const fn background_decode(mut self) -> Self {
        self.background_decode = true;
        self
    }

    /// Decodes every animation frame up front.
    #[must_use]
    pub const fn preload_all_frames(mut self) -> Self {
        self.preload_all_frames = true;
        self
    }

    /// Decodes only the first animation frame.
    #[must_use]
    pub const fn only_first_frame(mut self) -> Self {
        self.only_first_frame = true;
        self
    }

    /// Whether cache lookups are skipped. `only_from_cache` takes precedence.
    #[must_use]
    pub const fn skips_cache(&self) -> bool {
        self.force_refresh && !self.only_from_cache
    }

    /// Frame and scale settings for the decoder.
    #[must_use]
    pub const fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            scale: self.scale_factor,
            preload_all_frames: self.preload_all_frames,
            only_first_frame: self.only_first_frame,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::image::ResizeProcessor;

    #[test]
    fn test_defaults() {
        let options = RetrievalOptions::default();
        assert!(!options.force_refresh);
        assert!(!options.only_from_cache);
        assert_eq!(options.download_priority, DownloadPriority::DEFAULT);
        assert!((options.scale_factor - 1.0).abs() < f32::EPSILON);
        assert!(options.processor.is_identity());
        assert!(options.callback_queue.is_none());
    }

    #[test]
    fn test_from_items_last_wins() {
        let options = RetrievalOptions::from_items([
            OptionItem::ScaleFactor(2.0),
            OptionItem::DownloadPriority(DownloadPriority::LOW),
            OptionItem::ForceRefresh,
            OptionItem::ScaleFactor(3.0),
            OptionItem::Transition(Transition::Fade(Duration::from_millis(250))),
            OptionItem::DownloadPriority(DownloadPriority::HIGH),
        ]);

        assert!((options.scale_factor - 3.0).abs() < f32::EPSILON);
        assert_eq!(options.download_priority, DownloadPriority::HIGH);
        assert_eq!(
            options.transition,
            Transition::Fade(Duration::from_millis(250))
        );
        assert!(options.force_refresh);
        assert!(!options.only_from_cache);
    }

    #[test]
    fn test_processor_item() {
        let options = RetrievalOptions::from_items([OptionItem::Processor(Arc::new(
            ResizeProcessor::new(10, 10),
        ))]);
        assert!(!options.processor.is_identity());
    }

    #[test]
    fn test_only_from_cache_wins_over_force_refresh() {
        let options = RetrievalOptions::default().force_refresh().only_from_cache();
        assert!(!options.skips_cache());
        assert!(RetrievalOptions::default().force_refresh().skips_cache());
    }

    #[test]
    fn test_decode_options() {
        let options = RetrievalOptions::default()
            .with_scale_factor(2.0)
            .preload_all_frames();
        let decode = options.decode_options();
        assert!((decode.scale - 2.0).abs() < f32::EPSILON);
        assert!(decode.preload_all_frames);
        assert!(!decode.only_first_frame);
    }
}
