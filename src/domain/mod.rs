//! Domain layer with core entities, errors and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use entities::{CacheKey, CacheType, DecodedImage, ImageFormat, Resource, TaskState};
pub use errors::{CacheError, DownloadError, RetrieveError, SetupError};
pub use ports::{CacheSerializer, ImageProcessor, RequestModifier, TransportPort};
