//! Port for converting images to and from stored bytes.

use crate::domain::entities::{DecodeOptions, DecodedImage};

/// Converts decoded images into disk cache bytes and back.
pub trait CacheSerializer: Send + Sync {
    /// Produces the bytes to store, given the image and the bytes it was decoded from.
    fn serialize(&self, image: &DecodedImage, original: Option<&[u8]>) -> Option<Vec<u8>>;

    /// Rebuilds an image from stored bytes.
    fn deserialize(&self, data: &[u8], options: &DecodeOptions) -> Option<DecodedImage>;
}
