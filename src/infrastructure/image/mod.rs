//! Image handling infrastructure.
//!
//! This module provides:
//! - Format sniffing and the decode/process pipeline
//! - Built-in processors and the default cache serializer
//! - Memory caching with cost-bounded LRU eviction
//! - Disk caching for persistence
//! - Shared per-URL downloads over a pluggable transport

pub mod decoder;
pub mod disk_cache;
pub mod downloader;
pub mod format;
pub mod http_transport;
pub mod image_cache;
pub mod memory_cache;
pub mod processor;
pub mod serializer;

#[cfg(test)]
pub(crate) mod fixtures;

pub use decoder::{apply_processor, decode, decode_and_process, prepare_for_display};
pub use disk_cache::{CleanupReport, DiskCacheConfig, DiskImageCache};
pub use downloader::{DownloadEvent, DownloadSubscription, DownloaderConfig, ImageDownloader};
pub use format::sniff_format;
pub use http_transport::HttpTransport;
pub use image_cache::ImageCache;
pub use memory_cache::{CacheStats, MemoryCacheConfig, MemoryImageCache};
pub use processor::{
    BlurProcessor, ColorControlsProcessor, ContentMode, CroppingProcessor, DefaultProcessor,
    ProcessorChain, ResizeProcessor, RoundCornerProcessor, TintProcessor,
};
pub use serializer::DefaultCacheSerializer;
