//! In-memory, cost-bounded LRU image cache with expiration.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::domain::entities::{CacheKey, DecodedImage};

/// Default total cost budget (100 MB of pixels).
pub const DEFAULT_COST_LIMIT: usize = 100 * 1024 * 1024;

/// Default time an unused entry stays alive.
pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(300);

/// Default interval of the background expiration sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(120);

/// Memory cache limits.
#[derive(Debug, Clone, Copy)]
pub struct MemoryCacheConfig {
    /// Total cost budget in bytes.
    pub cost_limit: usize,
    /// Lifetime of an entry since its last access; `None` never expires.
    pub expiration: Option<Duration>,
    /// Interval of the background sweep.
    pub sweep_interval: Duration,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            cost_limit: DEFAULT_COST_LIMIT,
            expiration: Some(DEFAULT_EXPIRATION),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

struct MemoryEntry {
    image: Arc<DecodedImage>,
    cost: usize,
    ttl: Option<Duration>,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    fn touch(&mut self, now: Instant) {
        if let Some(ttl) = self.ttl {
            self.expires_at = Some(now + ttl);
        }
    }
}

struct Inner {
    entries: LruCache<CacheKey, MemoryEntry>,
    total_cost: usize,
}

impl Inner {
    fn remove(&mut self, key: &CacheKey) -> Option<MemoryEntry> {
        let entry = self.entries.pop(key)?;
        self.total_cost -= entry.cost;
        Some(entry)
    }
}

/// In-memory LRU cache for decoded images, bounded by total cost.
/// Thread-safe; all operations are synchronous and never await.
pub struct MemoryImageCache {
    inner: Mutex<Inner>,
    config: MemoryCacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for MemoryImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryImageCache")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MemoryImageCache {
    /// Creates a new cache with the specified limits.
    #[must_use]
    pub fn new(config: MemoryCacheConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                total_cost: 0,
            }),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Creates a cache with the default limits.
    #[must_use]
    pub fn with_cost_limit(cost_limit: usize) -> Self {
        Self::new(MemoryCacheConfig {
            cost_limit,
            ..MemoryCacheConfig::default()
        })
    }

    /// Active limits.
    #[must_use]
    pub const fn config(&self) -> &MemoryCacheConfig {
        &self.config
    }

    /// Gets an image, promoting it in the LRU order and renewing its expiration.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<DecodedImage>> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let hit = match inner.entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.touch(now);
                Some(entry.image.clone())
            }
            _ => None,
        };
        if hit.is_none() && inner.remove(key).is_some() {
            debug!(key = %key, "Dropped expired memory cache entry");
        }
        drop(inner);

        if hit.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache miss");
        }
        hit
    }

    /// Peeks at an image without promoting it or renewing its expiration.
    #[must_use]
    pub fn peek(&self, key: &CacheKey) -> Option<Arc<DecodedImage>> {
        let now = Instant::now();
        let inner = self.inner.lock();
        inner
            .entries
            .peek(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.image.clone())
    }

    /// Returns true if a live entry exists for `key`.
    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.peek(key).is_some()
    }

    /// Stores an image using its own cost and the configured expiration.
    pub fn insert(&self, key: CacheKey, image: Arc<DecodedImage>) -> bool {
        let cost = image.cost();
        self.set(key, image, cost, self.config.expiration)
    }

    /// Stores an image with an explicit cost and lifetime.
    ///
    /// Least recently used entries are evicted until the new entry fits. An
    /// entry costing more than the whole budget is rejected and `false` is
    /// returned; any previous value for the key is dropped in that case.
    pub fn set(
        &self,
        key: CacheKey,
        image: Arc<DecodedImage>,
        cost: usize,
        ttl: Option<Duration>,
    ) -> bool {
        let mut inner = self.inner.lock();

        if cost > self.config.cost_limit {
            inner.remove(&key);
            debug!(key = %key, cost, limit = self.config.cost_limit, "Image exceeds memory budget, not cached");
            return false;
        }

        let entry = MemoryEntry {
            image,
            cost,
            ttl,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        if let Some(old) = inner.entries.put(key.clone(), entry) {
            inner.total_cost -= old.cost;
        }
        inner.total_cost += cost;

        while inner.total_cost > self.config.cost_limit {
            let Some((evicted, entry)) = inner.entries.pop_lru() else {
                break;
            };
            inner.total_cost -= entry.cost;
            debug!(key = %evicted, cost = entry.cost, "Evicted image from memory cache");
        }

        debug!(key = %key, cost, total = inner.total_cost, "Stored image in memory cache");
        true
    }

    /// Removes an image.
    pub fn remove(&self, key: &CacheKey) {
        if self.inner.lock().remove(key).is_some() {
            debug!(key = %key, "Removed image from memory cache");
        }
    }

    /// Removes every entry immediately.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.total_cost = 0;
        debug!("Cleared memory image cache");
    }

    /// Removes expired entries, returning how many were dropped.
    pub fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let expired: Vec<CacheKey> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "Removed expired memory cache entries");
        }
        expired.len()
    }

    /// Spawns a task sweeping expired entries every `sweep_interval`.
    /// The task ends once the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        let period = self.config.sweep_interval.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                cache.remove_expired();
            }
        })
    }

    /// Number of cached images.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of the costs of all cached images.
    #[must_use]
    pub fn total_cost(&self) -> usize {
        self.inner.lock().total_cost
    }

    /// Returns cache statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        let inner = self.inner.lock();
        CacheStats {
            hits,
            misses,
            hit_rate,
            size: inner.entries.len(),
            total_cost: inner.total_cost,
        }
    }
}

impl Default for MemoryImageCache {
    fn default() -> Self {
        Self::new(MemoryCacheConfig::default())
    }
}

/// Statistics about cache performance.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of cached images.
    pub size: usize,
    /// Current total cost in bytes.
    pub total_cost: usize,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} images ({} bytes), {:.1}% hit rate ({} hits, {} misses)",
            self.size, self.total_cost, self.hit_rate, self.hits, self.misses
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::ImageFormat;

    fn image() -> Arc<DecodedImage> {
        Arc::new(DecodedImage::from_static(
            image::DynamicImage::new_rgba8(5, 5),
            ImageFormat::Png,
            1.0,
        ))
    }

    fn key(s: &str) -> CacheKey {
        CacheKey::new(s)
    }

    #[test]
    fn test_cache_put_and_get() {
        let cache = MemoryImageCache::default();
        cache.insert(key("a"), image());

        let retrieved = cache.get(&key("a"));
        assert!(retrieved.is_some());
        assert_eq!(retrieved.unwrap().width(), 5);
        assert_eq!(cache.total_cost(), 100);
    }

    #[test]
    fn test_cache_miss() {
        let cache = MemoryImageCache::default();
        assert!(cache.get(&key("nonexistent")).is_none());
    }

    #[test]
    fn test_eviction_follows_access_order() {
        let cache = MemoryImageCache::with_cost_limit(300);

        cache.set(key("a"), image(), 100, None);
        cache.set(key("b"), image(), 100, None);
        cache.set(key("c"), image(), 100, None);

        // Touch "a" so "b" becomes least recently used.
        assert!(cache.get(&key("a")).is_some());

        cache.set(key("d"), image(), 100, None);

        assert!(cache.contains(&key("a")));
        assert!(!cache.contains(&key("b")));
        assert!(cache.contains(&key("c")));
        assert!(cache.contains(&key("d")));
        assert_eq!(cache.total_cost(), 300);
    }

    #[test]
    fn test_large_insert_evicts_several() {
        let cache = MemoryImageCache::with_cost_limit(300);
        cache.set(key("a"), image(), 100, None);
        cache.set(key("b"), image(), 100, None);
        cache.set(key("c"), image(), 250, None);

        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&key("c")));
    }

    #[test]
    fn test_oversized_entry_is_rejected() {
        let cache = MemoryImageCache::with_cost_limit(300);
        cache.set(key("a"), image(), 100, None);

        assert!(!cache.set(key("huge"), image(), 301, None));
        assert!(!cache.contains(&key("huge")));
        assert!(cache.contains(&key("a")));
    }

    #[test]
    fn test_replacing_entry_updates_cost() {
        let cache = MemoryImageCache::with_cost_limit(300);
        cache.set(key("a"), image(), 100, None);
        cache.set(key("a"), image(), 40, None);
        assert_eq!(cache.total_cost(), 40);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let cache = MemoryImageCache::default();
        cache.set(key("a"), image(), 10, Some(Duration::from_millis(20)));
        assert!(cache.get(&key("a")).is_some());

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(cache.get(&key("a")).is_none());
        assert_eq!(cache.total_cost(), 0);
    }

    #[tokio::test]
    async fn test_remove_expired() {
        let cache = MemoryImageCache::default();
        cache.set(key("short"), image(), 10, Some(Duration::from_millis(10)));
        cache.set(key("forever"), image(), 10, None);

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(cache.remove_expired(), 1);
        assert!(cache.contains(&key("forever")));
    }

    #[tokio::test]
    async fn test_sweeper_removes_expired_entries() {
        let cache = Arc::new(MemoryImageCache::new(MemoryCacheConfig {
            sweep_interval: Duration::from_millis(10),
            ..MemoryCacheConfig::default()
        }));
        cache.set(key("a"), image(), 10, Some(Duration::from_millis(5)));
        let handle = cache.spawn_sweeper();

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(cache.is_empty());
        handle.abort();
    }

    #[test]
    fn test_clear_is_immediate() {
        let cache = MemoryImageCache::default();
        cache.insert(key("a"), image());
        cache.insert(key("b"), image());
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.total_cost(), 0);
    }

    #[test]
    fn test_cache_stats() {
        let cache = MemoryImageCache::default();
        cache.insert(key("a"), image());

        let _ = cache.get(&key("a"));
        let _ = cache.get(&key("missing"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
    }

    #[test]
    fn test_peek_does_not_promote() {
        let cache = MemoryImageCache::with_cost_limit(200);
        cache.set(key("a"), image(), 100, None);
        cache.set(key("b"), image(), 100, None);

        let _ = cache.peek(&key("a"));
        cache.set(key("c"), image(), 100, None);

        assert!(cache.peek(&key("a")).is_none());
    }
}
