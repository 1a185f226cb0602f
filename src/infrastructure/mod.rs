//! Infrastructure layer with external service adapters.

/// Application configuration.
pub mod config;
/// Image handling (decoding, caching, downloading).
pub mod image;

pub use config::{AppConfig, CliArgs, Command, LogLevel, StorageManager};
pub use image::{
    CacheStats, DefaultCacheSerializer, DiskImageCache, HttpTransport, ImageCache,
    ImageDownloader, MemoryImageCache,
};
