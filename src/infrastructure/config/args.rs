use super::app_config::LogLevel;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "pixcache",
    version,
    about = "Fetch, decode and cache remote images",
    long_about = None
)]
pub struct CliArgs {
    /// Configuration file path.
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH", global = true)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum, global = true)]
    pub log_level: Option<LogLevel>,

    /// Disk cache directory.
    #[arg(long, value_name = "PATH", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Memory cache budget in megabytes.
    #[arg(long, global = true)]
    pub memory_limit_mb: Option<u64>,

    /// Disk cache size limit in megabytes.
    #[arg(long, global = true)]
    pub disk_limit_mb: Option<u64>,

    /// Request timeout in seconds.
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Retrieve an image through the caches and report where it came from.
    Fetch {
        /// Image URL.
        url: reqwest::Url,

        /// Cache key; defaults to the URL.
        #[arg(long)]
        key: Option<String>,

        /// Ignore cached entries and download again.
        #[arg(long)]
        force_refresh: bool,

        /// Fail instead of downloading when nothing is cached.
        #[arg(long, conflicts_with = "force_refresh")]
        only_from_cache: bool,

        /// Do not write the result to the disk cache.
        #[arg(long)]
        memory_only: bool,

        /// Decode only the first frame of animated images.
        #[arg(long)]
        first_frame: bool,

        /// Decode every frame of animated images up front.
        #[arg(long)]
        preload_frames: bool,

        /// Pixels per point of the decoded image.
        #[arg(long, default_value_t = 1.0)]
        scale: f32,

        /// Resize to fit within `WIDTHxHEIGHT` before caching.
        #[arg(long, value_name = "WIDTHxHEIGHT")]
        resize: Option<String>,
    },

    /// Remove cached images.
    Clear {
        /// Only clear the memory cache.
        #[arg(long, conflicts_with = "disk")]
        memory: bool,

        /// Only clear the disk cache.
        #[arg(long)]
        disk: bool,
    },

    /// Remove expired disk entries and enforce the size limit.
    CleanExpired,
}
