//! Two-tier image cache: decoded images in memory, serialized bytes on disk.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::domain::entities::{CacheKey, CacheType, DecodeOptions, DecodedImage};
use crate::domain::errors::{CacheError, CacheResult};
use crate::domain::ports::CacheSerializer;

use super::decoder::prepare_for_display;
use super::disk_cache::{CleanupReport, DiskCacheConfig, DiskImageCache};
use super::memory_cache::{MemoryCacheConfig, MemoryImageCache};

/// Memory and disk cache behind one handle.
pub struct ImageCache {
    memory: Arc<MemoryImageCache>,
    disk: Arc<DiskImageCache>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    writes: Arc<PendingWrites>,
}

#[derive(Default)]
struct PendingWrites {
    count: AtomicUsize,
    idle: Notify,
}

impl PendingWrites {
    fn finish(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

impl std::fmt::Debug for ImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageCache")
            .field("memory", &self.memory)
            .field("disk", &self.disk)
            .finish_non_exhaustive()
    }
}

impl ImageCache {
    /// Combines existing caches.
    #[must_use]
    pub fn new(memory: Arc<MemoryImageCache>, disk: Arc<DiskImageCache>) -> Self {
        Self {
            memory,
            disk,
            sweeper: Mutex::new(None),
            writes: Arc::new(PendingWrites::default()),
        }
    }

    /// Opens a cache whose disk tier lives in `directory`.
    ///
    /// # Errors
    /// Returns error if the disk cache directory cannot be created.
    pub async fn open(
        memory: MemoryCacheConfig,
        directory: PathBuf,
        disk: DiskCacheConfig,
    ) -> CacheResult<Self> {
        let disk = DiskImageCache::new(directory, disk).await?;
        Ok(Self::new(
            Arc::new(MemoryImageCache::new(memory)),
            Arc::new(disk),
        ))
    }

    /// Opens a cache in the default cache directory.
    ///
    /// # Errors
    /// Returns error if the disk cache directory cannot be created.
    pub async fn default_location(
        memory: MemoryCacheConfig,
        disk: DiskCacheConfig,
    ) -> CacheResult<Self> {
        let disk = DiskImageCache::default_location(disk).await?;
        Ok(Self::new(
            Arc::new(MemoryImageCache::new(memory)),
            Arc::new(disk),
        ))
    }

    /// Memory tier.
    #[must_use]
    pub const fn memory(&self) -> &Arc<MemoryImageCache> {
        &self.memory
    }

    /// Disk tier.
    #[must_use]
    pub const fn disk(&self) -> &Arc<DiskImageCache> {
        &self.disk
    }

    /// Starts the periodic memory expiration sweep. Idempotent.
    pub fn start_sweeper(&self) {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_none() {
            *sweeper = Some(self.memory.spawn_sweeper());
        }
    }

    /// Caches `image` in memory and, unless `memory_only`, serializes it to
    /// disk in the background.
    ///
    /// The returned handle resolves when the disk write finished.
    pub fn store(
        &self,
        key: &CacheKey,
        image: Arc<DecodedImage>,
        original: Option<Bytes>,
        serializer: Arc<dyn CacheSerializer>,
        memory_only: bool,
    ) -> Option<JoinHandle<CacheResult<()>>> {
        if !self.memory.insert(key.clone(), Arc::clone(&image)) {
            debug!(key = %key, cost = image.cost(), "Image too large for memory cache");
        }
        if memory_only {
            return None;
        }

        let disk = Arc::clone(&self.disk);
        let writes = Arc::clone(&self.writes);
        let key = key.clone();
        writes.count.fetch_add(1, Ordering::AcqRel);
        Some(tokio::spawn(async move {
            let result = write_to_disk(&disk, key, image, original, serializer).await;
            writes.finish();
            result
        }))
    }

    /// Waits until every disk write scheduled by [`store`](Self::store) finished.
    pub async fn flush(&self) {
        loop {
            let idle = self.writes.idle.notified();
            if self.writes.count.load(Ordering::Acquire) == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Looks up memory, then disk. A disk hit is decoded off the async
    /// workers and promoted to memory.
    pub async fn retrieve_image(
        &self,
        key: &CacheKey,
        options: DecodeOptions,
        serializer: Arc<dyn CacheSerializer>,
        background_decode: bool,
    ) -> Option<(Arc<DecodedImage>, CacheType)> {
        if let Some(image) = self.memory.get(key) {
            return Some((image, CacheType::Memory));
        }

        let data = self.disk.get_bytes(key).await?;
        let decoded = tokio::task::spawn_blocking(move || {
            serializer.deserialize(&data, &options).map(|image| {
                if background_decode {
                    prepare_for_display(image)
                } else {
                    image
                }
            })
        })
        .await;

        let image = match decoded {
            Ok(Some(image)) => Arc::new(image),
            Ok(None) => {
                debug!(key = %key, "Stored bytes not decodable, treating as miss");
                return None;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Disk cache decode task failed");
                return None;
            }
        };

        trace!(key = %key, "Promoting disk hit to memory");
        self.memory.insert(key.clone(), Arc::clone(&image));
        Some((image, CacheType::Disk))
    }

    /// Looks up memory only.
    #[must_use]
    pub fn retrieve_from_memory(&self, key: &CacheKey) -> Option<Arc<DecodedImage>> {
        self.memory.get(key)
    }

    /// Reports where `key` is currently cached.
    pub async fn cached_type(&self, key: &CacheKey) -> CacheType {
        if self.memory.contains(key) {
            CacheType::Memory
        } else if self.disk.contains(key).await {
            CacheType::Disk
        } else {
            CacheType::None
        }
    }

    /// Removes `key` from both tiers.
    pub async fn remove(&self, key: &CacheKey) {
        self.memory.remove(key);
        self.disk.remove(key).await;
    }

    /// Empties the memory tier.
    pub fn clear_memory(&self) {
        self.memory.clear();
    }

    /// Empties the disk tier.
    ///
    /// # Errors
    /// Returns error if the cache directory cannot be read.
    pub async fn clear_disk(&self) -> CacheResult<()> {
        self.disk.clear().await
    }

    /// Removes expired memory entries.
    pub fn clean_expired_memory(&self) -> usize {
        self.memory.remove_expired()
    }

    /// Removes expired disk entries and enforces the disk size limit.
    ///
    /// # Errors
    /// Returns error if the cache directory cannot be read.
    pub async fn clean_expired_disk(&self) -> CacheResult<CleanupReport> {
        self.disk.clean_expired().await
    }
}

async fn write_to_disk(
    disk: &Arc<DiskImageCache>,
    key: CacheKey,
    image: Arc<DecodedImage>,
    original: Option<Bytes>,
    serializer: Arc<dyn CacheSerializer>,
) -> CacheResult<()> {
    let serialized =
        tokio::task::spawn_blocking(move || serializer.serialize(&image, original.as_deref()))
            .await
            .map_err(|e| CacheError::TaskFailed(e.to_string()))?;

    let Some(data) = serialized else {
        warn!(key = %key, "Serializer produced no data, skipping disk cache");
        return Err(CacheError::SerializationFailed(key.to_string()));
    };

    let result = disk
        .store(key.clone(), Bytes::from(data))
        .await
        .map_err(|e| CacheError::TaskFailed(e.to_string()))?;
    if let Err(e) = &result {
        warn!(key = %key, error = %e, "Failed to write image to disk cache");
    }
    result
}

impl Drop for ImageCache {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::image::decoder;
    use crate::infrastructure::image::fixtures::png_bytes;
    use crate::infrastructure::image::serializer::DefaultCacheSerializer;
    use tempfile::TempDir;

    async fn create_cache() -> (ImageCache, TempDir) {
        let temp = TempDir::new().unwrap();
        let cache = ImageCache::open(
            MemoryCacheConfig::default(),
            temp.path().to_path_buf(),
            DiskCacheConfig::default(),
        )
        .await
        .unwrap();
        (cache, temp)
    }

    fn serializer() -> Arc<dyn CacheSerializer> {
        Arc::new(DefaultCacheSerializer::new())
    }

    fn sample() -> (Arc<DecodedImage>, Bytes) {
        let bytes = png_bytes(5, 5);
        let image = decoder::decode(&bytes, &DecodeOptions::default()).unwrap();
        (Arc::new(image), bytes)
    }

    #[tokio::test]
    async fn test_store_populates_both_tiers() {
        let (cache, _temp) = create_cache().await;
        let (image, original) = sample();
        let key = CacheKey::new("both");

        cache
            .store(&key, image, Some(original), serializer(), false)
            .unwrap()
            .await
            .unwrap()
            .unwrap();

        assert_eq!(cache.cached_type(&key).await, CacheType::Memory);
        cache.clear_memory();
        assert_eq!(cache.cached_type(&key).await, CacheType::Disk);
    }

    #[tokio::test]
    async fn test_flush_waits_for_disk_writes() {
        let (cache, _temp) = create_cache().await;
        let (image, original) = sample();
        let key = CacheKey::new("flushed");

        let _write = cache.store(&key, image, Some(original), serializer(), false);
        cache.flush().await;

        assert!(cache.disk().contains(&key).await);
    }

    #[tokio::test]
    async fn test_memory_only_skips_disk() {
        let (cache, _temp) = create_cache().await;
        let (image, original) = sample();
        let key = CacheKey::new("memory-only");

        assert!(
            cache
                .store(&key, image, Some(original), serializer(), true)
                .is_none()
        );
        assert!(cache.memory().contains(&key));
        assert!(!cache.disk().contains(&key).await);
    }

    #[tokio::test]
    async fn test_disk_hit_is_promoted_to_memory() {
        let (cache, _temp) = create_cache().await;
        let (image, original) = sample();
        let key = CacheKey::new("promote");
        cache
            .store(&key, image, Some(original), serializer(), false)
            .unwrap()
            .await
            .unwrap()
            .unwrap();
        cache.clear_memory();

        let (restored, from) = cache
            .retrieve_image(&key, DecodeOptions::default(), serializer(), false)
            .await
            .unwrap();
        assert_eq!(from, CacheType::Disk);
        assert_eq!((restored.width(), restored.height()), (5, 5));

        let (_, from) = cache
            .retrieve_image(&key, DecodeOptions::default(), serializer(), false)
            .await
            .unwrap();
        assert_eq!(from, CacheType::Memory);
    }

    #[tokio::test]
    async fn test_undecodable_disk_entry_is_a_miss() {
        let (cache, _temp) = create_cache().await;
        let key = CacheKey::new("corrupt");
        cache
            .disk()
            .put_bytes(&key, Bytes::from_static(b"not an image"))
            .await
            .unwrap();

        assert!(
            cache
                .retrieve_image(&key, DecodeOptions::default(), serializer(), false)
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let (cache, _temp) = create_cache().await;
        let (image, original) = sample();
        let key = CacheKey::new("gone");
        cache
            .store(&key, image, Some(original), serializer(), false)
            .unwrap()
            .await
            .unwrap()
            .unwrap();

        cache.remove(&key).await;
        assert_eq!(cache.cached_type(&key).await, CacheType::None);

        cache.clear_disk().await.unwrap();
        assert!(cache.disk().is_empty());
    }
}
