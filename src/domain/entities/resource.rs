//! Resource identity: cache keys and download locations.

use reqwest::Url;

/// Logical identity of a cached image, independent of where it was fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Creates a new `CacheKey` from any string-like input.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the key under which a processed variant of this image is stored.
    ///
    /// An empty identifier denotes the identity processor and maps to the bare key.
    #[must_use]
    pub fn processed(&self, processor_identifier: &str) -> Self {
        if processor_identifier.is_empty() {
            self.clone()
        } else {
            Self(format!("{}@{}", self.0, processor_identifier))
        }
    }

    /// Hashes the key into a file-system safe storage name.
    #[must_use]
    pub fn storage_name(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A fetchable, cacheable image: where to download it and what to cache it as.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resource {
    cache_key: CacheKey,
    download_url: Url,
}

impl Resource {
    /// Creates a resource with an explicit cache key.
    #[must_use]
    pub fn new(cache_key: impl Into<CacheKey>, download_url: Url) -> Self {
        Self {
            cache_key: cache_key.into(),
            download_url,
        }
    }

    /// Creates a resource keyed by its own URL.
    #[must_use]
    pub fn from_url(download_url: Url) -> Self {
        Self {
            cache_key: CacheKey::new(download_url.as_str()),
            download_url,
        }
    }

    /// Logical cache identity.
    #[must_use]
    pub const fn cache_key(&self) -> &CacheKey {
        &self.cache_key
    }

    /// Network location of the image bytes.
    #[must_use]
    pub const fn download_url(&self) -> &Url {
        &self.download_url
    }
}

impl From<Url> for Resource {
    fn from(url: Url) -> Self {
        Self::from_url(url)
    }
}
