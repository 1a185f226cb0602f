//! Application configuration.

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::infrastructure::image::{DiskCacheConfig, DownloaderConfig, MemoryCacheConfig};

use super::args::CliArgs;

pub(crate) const APP_NAME: &str = "pixcache";
pub(crate) const APP_QUALIFIER: &str = "com";
pub(crate) const APP_ORGANIZATION: &str = "pixcache";

const MB: u64 = 1024 * 1024;

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Converts to tracing level.
    #[must_use]
    pub const fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Application configuration, read from `config.toml` and overridden by CLI flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Memory cache settings.
    #[serde(default)]
    pub memory_cache: MemoryCacheSettings,

    /// Disk cache settings.
    #[serde(default)]
    pub disk_cache: DiskCacheSettings,

    /// Downloader settings.
    #[serde(default)]
    pub downloader: DownloaderSettings,
}

/// `[memory_cache]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryCacheSettings {
    /// Total cost budget in megabytes.
    #[serde(default = "default_memory_limit_mb")]
    pub cost_limit_mb: u64,

    /// Seconds an unused entry stays alive; 0 never expires.
    #[serde(default = "default_memory_expiration_secs")]
    pub expiration_secs: u64,

    /// Seconds between expiration sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for MemoryCacheSettings {
    fn default() -> Self {
        Self {
            cost_limit_mb: default_memory_limit_mb(),
            expiration_secs: default_memory_expiration_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl MemoryCacheSettings {
    /// Converts to cache limits.
    #[must_use]
    pub fn to_cache_config(&self) -> MemoryCacheConfig {
        MemoryCacheConfig {
            cost_limit: usize::try_from(self.cost_limit_mb.saturating_mul(MB))
                .unwrap_or(usize::MAX),
            expiration: (self.expiration_secs > 0)
                .then(|| Duration::from_secs(self.expiration_secs)),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs.max(1)),
        }
    }
}

/// `[disk_cache]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskCacheSettings {
    /// Cache directory; defaults to the platform cache dir.
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Size limit in megabytes.
    #[serde(default = "default_disk_limit_mb")]
    pub size_limit_mb: u64,

    /// Days an unused entry stays on disk; 0 never expires.
    #[serde(default = "default_disk_expiration_days")]
    pub expiration_days: u64,
}

impl Default for DiskCacheSettings {
    fn default() -> Self {
        Self {
            directory: None,
            size_limit_mb: default_disk_limit_mb(),
            expiration_days: default_disk_expiration_days(),
        }
    }
}

impl DiskCacheSettings {
    /// Converts to cache limits.
    #[must_use]
    pub fn to_cache_config(&self) -> DiskCacheConfig {
        DiskCacheConfig {
            size_limit: self.size_limit_mb.saturating_mul(MB),
            expiration: (self.expiration_days > 0)
                .then(|| Duration::from_secs(self.expiration_days.saturating_mul(24 * 60 * 60))),
        }
    }
}

/// `[downloader]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloaderSettings {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Custom `User-Agent`.
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for DownloaderSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: None,
        }
    }
}

impl DownloaderSettings {
    /// Converts to downloader settings.
    #[must_use]
    pub fn to_downloader_config(&self) -> DownloaderConfig {
        let defaults = DownloaderConfig::default();
        DownloaderConfig {
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
            user_agent: self.user_agent.clone().or(defaults.user_agent),
        }
    }
}

const fn default_memory_limit_mb() -> u64 {
    100
}

const fn default_memory_expiration_secs() -> u64 {
    300
}

const fn default_sweep_interval_secs() -> u64 {
    120
}

const fn default_disk_limit_mb() -> u64 {
    200
}

const fn default_disk_expiration_days() -> u64 {
    7
}

const fn default_timeout_secs() -> u64 {
    15
}

impl AppConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(config_path) = &args.config {
            self.config = Some(config_path.clone());
        }
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(cache_dir) = &args.cache_dir {
            self.disk_cache.directory = Some(cache_dir.clone());
        }
        if let Some(memory_limit) = args.memory_limit_mb {
            self.memory_cache.cost_limit_mb = memory_limit;
        }
        if let Some(disk_limit) = args.disk_limit_mb {
            self.disk_cache.size_limit_mb = disk_limit;
        }
        if let Some(timeout) = args.timeout_secs {
            self.downloader.timeout_secs = timeout;
        }
    }

    /// Returns default config directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns default config file path.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        Self::default_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Returns default log file path.
    #[must_use]
    pub fn default_log_path() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.data_dir().join("pixcache.log"))
    }

    /// Returns effective config path.
    #[must_use]
    pub fn effective_config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(Self::default_config_path)
    }

    /// Returns effective log path.
    #[must_use]
    pub fn effective_log_path(&self) -> Option<PathBuf> {
        self.log_path.clone().or_else(Self::default_log_path)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config: None,
            log_path: None,
            log_level: LogLevel::Info,
            memory_cache: MemoryCacheSettings::default(),
            disk_cache: DiskCacheSettings::default(),
            downloader: DownloaderSettings::default(),
        }
    }
}
