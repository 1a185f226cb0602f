//! Port for post-decode image transforms.

use image::DynamicImage;

use crate::domain::errors::ProcessError;

/// A transform applied to decoded pixels before caching.
pub trait ImageProcessor: Send + Sync {
    /// Stable identifier, part of the cache key for processed images.
    /// The identity processor returns an empty string.
    fn identifier(&self) -> String;

    /// Transforms one frame.
    ///
    /// # Errors
    /// Returns error if the frame cannot be processed.
    fn process(&self, image: &DynamicImage) -> Result<DynamicImage, ProcessError>;

    /// Returns true if this processor leaves images untouched.
    fn is_identity(&self) -> bool {
        self.identifier().is_empty()
    }
}
