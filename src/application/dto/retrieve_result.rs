//! Outcome of a retrieval.

use std::sync::Arc;

use reqwest::Url;

use crate::domain::entities::{CacheType, DecodedImage};
use crate::domain::errors::RetrieveError;

/// Successful retrieval.
#[derive(Debug, Clone)]
pub struct RetrieveImageResult {
    /// The image.
    pub image: Arc<DecodedImage>,
    /// Where the image came from.
    pub cache_type: CacheType,
    /// URL of the requested resource.
    pub source_url: Url,
}

/// Value passed to a completion callback.
pub type RetrieveResult = Result<RetrieveImageResult, RetrieveError>;
