//! Disk-based image cache for persistence across sessions.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use tokio::fs;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::domain::entities::CacheKey;
use crate::domain::errors::{CacheError, CacheResult};

/// Maximum disk cache size in bytes (200 MB default).
pub const DEFAULT_MAX_CACHE_SIZE: u64 = 200 * 1024 * 1024;

/// Default lifetime of an entry since its last access (one week).
pub const DEFAULT_DISK_EXPIRATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const ENTRY_EXTENSION: &str = "img";
const LOCK_STRIPES: usize = 32;

/// Disk cache limits.
#[derive(Debug, Clone, Copy)]
pub struct DiskCacheConfig {
    /// Size above which a cleanup pass evicts least recently used entries.
    pub size_limit: u64,
    /// Lifetime of an entry since its last access; `None` never expires.
    pub expiration: Option<Duration>,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self {
            size_limit: DEFAULT_MAX_CACHE_SIZE,
            expiration: Some(DEFAULT_DISK_EXPIRATION),
        }
    }
}

/// Outcome of a cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Entries removed because they expired.
    pub expired: usize,
    /// Entries removed to get under the size limit.
    pub evicted: usize,
    /// Bytes freed in total.
    pub freed_bytes: u64,
}

struct StoredEntry {
    name: String,
    path: PathBuf,
    last_access: SystemTime,
    size: u64,
}

/// Disk-based image cache storing serialized bytes under hashed keys.
pub struct DiskImageCache {
    cache_dir: PathBuf,
    config: DiskCacheConfig,
    current_size: AtomicU64,
    item_count: AtomicUsize,
    key_locks: Vec<Mutex<()>>,
    cleaning: AtomicBool,
}

impl std::fmt::Debug for DiskImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskImageCache")
            .field("cache_dir", &self.cache_dir)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DiskImageCache {
    /// Creates a new disk cache in the specified directory.
    ///
    /// # Errors
    /// Returns error if cache directory cannot be created.
    pub async fn new(cache_dir: PathBuf, config: DiskCacheConfig) -> CacheResult<Self> {
        fs::create_dir_all(&cache_dir)
            .await
            .map_err(|e| CacheError::io("Failed to create cache dir", &e))?;

        let entries = scan_entries(&cache_dir).await?;
        let total_size = entries.iter().map(|e| e.size).sum();

        let cache = Self {
            cache_dir,
            config,
            current_size: AtomicU64::new(total_size),
            item_count: AtomicUsize::new(entries.len()),
            key_locks: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
            cleaning: AtomicBool::new(false),
        };

        cache.clean_if_over_limit().await;

        Ok(cache)
    }

    /// Creates a cache in the default location (e.g. `~/.cache/pixcache/images/`).
    ///
    /// # Errors
    /// Returns error if cache directory cannot be created.
    pub async fn default_location(config: DiskCacheConfig) -> CacheResult<Self> {
        Self::new(default_cache_dir(), config).await
    }

    /// Cache directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.cache_dir
    }

    /// Active limits.
    #[must_use]
    pub const fn config(&self) -> &DiskCacheConfig {
        &self.config
    }

    /// Returns the file path backing `key`.
    #[must_use]
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{ENTRY_EXTENSION}", key.storage_name()))
    }

    fn lock_for(&self, key: &CacheKey) -> &Mutex<()> {
        self.lock_for_name(&key.storage_name())
    }

    /// Lock stripe for a storage name, so scans can lock entries they only
    /// know by file name.
    #[allow(clippy::cast_possible_truncation)]
    fn lock_for_name(&self, name: &str) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        &self.key_locks[(hasher.finish() as usize) % self.key_locks.len()]
    }

    fn is_expired(&self, last_access: SystemTime) -> bool {
        self.config.expiration.is_some_and(|expiration| {
            SystemTime::now()
                .duration_since(last_access)
                .unwrap_or_default()
                >= expiration
        })
    }

    /// Gets stored bytes. Unreadable and expired entries are misses.
    pub async fn get_bytes(&self, key: &CacheKey) -> Option<Bytes> {
        let _guard = self.lock_for(key).lock().await;
        let path = self.path_for(key);

        let meta = match fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(key = %key, error = %e, "Failed to stat cache file");
                }
                trace!(key = %key, "Disk cache miss");
                return None;
            }
        };

        let last_access = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if self.is_expired(last_access) {
            debug!(key = %key, "Disk cache entry expired");
            self.remove_file(&path, meta.len()).await;
            return None;
        }

        match fs::read(&path).await {
            Ok(bytes) => {
                trace!(key = %key, path = %path.display(), "Disk cache hit");
                touch(path).await;
                Some(Bytes::from(bytes))
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read cache file");
                None
            }
        }
    }

    /// Stores bytes, replacing any previous entry for the key.
    ///
    /// The write goes to a temporary file first, so readers never observe a
    /// partially written entry. Size limits are not enforced here.
    ///
    /// # Errors
    /// Returns error if file cannot be created or written.
    pub async fn put_bytes(&self, key: &CacheKey, bytes: Bytes) -> CacheResult<()> {
        let _guard = self.lock_for(key).lock().await;
        let path = self.path_for(key);
        let old_size = fs::metadata(&path).await.map(|m| m.len()).ok();
        let new_size = bytes.len() as u64;

        let dir = self.cache_dir.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut file = tempfile::NamedTempFile::new_in(&dir)?;
            file.write_all(&bytes)?;
            file.flush()?;
            file.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| CacheError::TaskFailed(e.to_string()))?
        .map_err(|e| CacheError::io("Failed to write cache file", &e))?;

        if let Some(old) = old_size {
            if new_size > old {
                self.current_size
                    .fetch_add(new_size - old, Ordering::Relaxed);
            } else {
                saturating_sub(&self.current_size, old - new_size);
            }
        } else {
            self.current_size.fetch_add(new_size, Ordering::Relaxed);
            self.item_count.fetch_add(1, Ordering::Relaxed);
        }

        debug!(key = %key, path = %path.display(), size = new_size, "Stored image in disk cache");
        Ok(())
    }

    /// Stores bytes in the background. The returned handle resolves once the
    /// write finished; a cleanup pass follows if the size limit was exceeded.
    pub fn store(self: &Arc<Self>, key: CacheKey, bytes: Bytes) -> JoinHandle<CacheResult<()>> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let result = cache.put_bytes(&key, bytes).await;
            if cache.current_size() > cache.config.size_limit {
                cache.clean_if_over_limit().await;
            }
            result
        })
    }

    /// Removes an entry.
    pub async fn remove(&self, key: &CacheKey) {
        let _guard = self.lock_for(key).lock().await;
        let path = self.path_for(key);
        if let Ok(meta) = fs::metadata(&path).await
            && self.remove_file(&path, meta.len()).await
        {
            debug!(key = %key, "Removed from disk cache");
        }
    }

    async fn remove_file(&self, path: &Path, size: u64) -> bool {
        match fs::remove_file(path).await {
            Ok(()) => {
                saturating_sub(&self.current_size, size);
                let _ = self
                    .item_count
                    .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                        Some(n.saturating_sub(1))
                    });
                true
            }
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Failed to remove cache file");
                }
                false
            }
        }
    }

    /// Removes a scanned entry under its key lock if `still_removable`
    /// holds for the file's current modification time. Returns the freed size.
    async fn remove_entry(
        &self,
        entry: &StoredEntry,
        still_removable: impl Fn(SystemTime) -> bool,
    ) -> Option<u64> {
        let _guard = self.lock_for_name(&entry.name).lock().await;
        let meta = fs::metadata(&entry.path).await.ok()?;
        if !still_removable(meta.modified().unwrap_or(SystemTime::UNIX_EPOCH)) {
            return None;
        }
        let size = meta.len();
        self.remove_file(&entry.path, size).await.then_some(size)
    }

    /// Clears the entire disk cache.
    ///
    /// # Errors
    /// Returns error if cache directory cannot be read.
    pub async fn clear(&self) -> CacheResult<()> {
        let mut removed = 0usize;
        for entry in scan_entries(&self.cache_dir).await? {
            if self.remove_entry(&entry, |_| true).await.is_some() {
                removed += 1;
            }
        }
        debug!(removed, "Cleared disk cache");
        Ok(())
    }

    /// Removes expired entries, then evicts least recently used entries until
    /// the cache is at most half its size limit if the limit is exceeded.
    ///
    /// # Errors
    /// Returns error if cache directory cannot be read.
    pub async fn clean_expired(&self) -> CacheResult<CleanupReport> {
        let mut report = CleanupReport::default();
        let mut remaining = Vec::new();

        for entry in scan_entries(&self.cache_dir).await? {
            if self.is_expired(entry.last_access) {
                if let Some(size) = self
                    .remove_entry(&entry, |last_access| self.is_expired(last_access))
                    .await
                {
                    report.expired += 1;
                    report.freed_bytes += size;
                }
            } else {
                remaining.push(entry);
            }
        }

        let size: u64 = remaining.iter().map(|e| e.size).sum();
        if size > self.config.size_limit {
            let excess = size - self.config.size_limit / 2;
            let (evicted, freed) = self.evict_oldest(remaining, excess).await;
            report.evicted = evicted;
            report.freed_bytes += freed;
        }

        debug!(
            expired = report.expired,
            evicted = report.evicted,
            freed_bytes = report.freed_bytes,
            "Disk cache expiration pass complete"
        );
        Ok(report)
    }

    /// Cleans up old cache entries if over size limit.
    pub async fn clean_if_over_limit(&self) {
        let current_size = self.current_size();
        if current_size <= self.config.size_limit {
            return;
        }
        if self.cleaning.swap(true, Ordering::AcqRel) {
            return;
        }

        debug!(
            current_size = current_size,
            max_size = self.config.size_limit,
            "Disk cache over limit, cleaning up"
        );

        if let Ok(files) = scan_entries(&self.cache_dir).await {
            let target =
                current_size - self.config.size_limit + (self.config.size_limit / 10);
            let (freed_count, freed_size) = self.evict_oldest(files, target).await;
            debug!(
                freed_size = freed_size,
                freed_count = freed_count,
                "Disk cache cleanup complete"
            );
        }

        self.cleaning.store(false, Ordering::Release);
    }

    async fn evict_oldest(&self, mut files: Vec<StoredEntry>, target: u64) -> (usize, u64) {
        files.sort_by_key(|entry| entry.last_access);

        let mut freed_size = 0u64;
        let mut freed_count = 0usize;
        for entry in files {
            if freed_size >= target {
                break;
            }
            // Entries read or rewritten since the scan are no longer the oldest.
            let scanned_access = entry.last_access;
            if let Some(size) = self
                .remove_entry(&entry, |last_access| last_access <= scanned_access)
                .await
            {
                debug!(path = %entry.path.display(), "Removed old cache file");
                freed_size += size;
                freed_count += 1;
            }
        }
        (freed_count, freed_size)
    }

    /// Returns the current cache size in bytes.
    #[must_use]
    pub fn current_size(&self) -> u64 {
        self.current_size.load(Ordering::Relaxed)
    }

    /// Returns the number of cached files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.item_count.load(Ordering::Relaxed)
    }

    /// Returns true if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks if a live entry is cached.
    pub async fn contains(&self, key: &CacheKey) -> bool {
        match fs::metadata(self.path_for(key)).await {
            Ok(meta) => !self.is_expired(meta.modified().unwrap_or(SystemTime::UNIX_EPOCH)),
            Err(_) => false,
        }
    }
}

fn is_entry_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION)
}

async fn scan_entries(dir: &Path) -> CacheResult<Vec<StoredEntry>> {
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| CacheError::io("Failed to read cache dir", &e))?;

    let mut files = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if !is_entry_file(&path) {
            continue;
        }
        let Some(name) = path.file_stem().map(|stem| stem.to_string_lossy().into_owned()) else {
            continue;
        };
        if let Ok(meta) = entry.metadata().await {
            let last_access = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            files.push(StoredEntry {
                name,
                path,
                last_access,
                size: meta.len(),
            });
        }
    }
    Ok(files)
}

fn saturating_sub(counter: &AtomicU64, amount: u64) {
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
        Some(n.saturating_sub(amount))
    });
}

/// Records an access by bumping the file's modification time.
async fn touch(path: PathBuf) {
    let result = tokio::task::spawn_blocking(move || {
        std::fs::File::options()
            .write(true)
            .open(&path)?
            .set_modified(SystemTime::now())
    })
    .await;
    if let Ok(Err(e)) = result {
        trace!(error = %e, "Failed to record cache file access");
    }
}

/// Returns the default cache directory path.
fn default_cache_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "pixcache", "pixcache").map_or_else(
        || std::env::temp_dir().join("pixcache").join("cache").join("images"),
        |dirs| dirs.cache_dir().join("images"),
    )
}
