//! pixcache - image retrieval with request deduplication and two-tier caching.
//!
//! Requests are keyed by a cache key and a download URL. Each request checks
//! the memory cache, then the disk cache, then joins or starts a shared
//! download, decodes the bytes (including animated GIFs), and stores the
//! result in both caches.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Application layer containing the retrieval coordinator and its DTOs.
pub mod application;
/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing caches, codecs and the HTTP transport.
pub mod infrastructure;

pub use application::{
    CallbackQueue, ImageRetriever, OptionItem, RetrievalOptions, RetrieveImageResult,
    RetrieveResult, RetrieveTask,
};
pub use domain::{CacheKey, CacheType, DecodedImage, Resource, RetrieveError, TaskState};

/// Current version of the library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "pixcache";
