use clap::Parser;
use color_eyre::eyre::{Result, WrapErr, eyre};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use pixcache::infrastructure::image::ResizeProcessor;
use pixcache::infrastructure::{AppConfig, CliArgs, Command, StorageManager};
use pixcache::{CacheType, ImageRetriever, RetrievalOptions, Resource};

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = config.effective_log_path() {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let storage = StorageManager::new()?;
    let mut config = storage.load_config(args.config.as_deref())?;
    config.merge_with_args(args);
    Ok(config)
}

fn parse_size(size: &str) -> Result<(u32, u32)> {
    let (width, height) = size
        .split_once(['x', 'X'])
        .ok_or_else(|| eyre!("expected WIDTHxHEIGHT, got {size:?}"))?;
    Ok((
        width.trim().parse().wrap_err("invalid width")?,
        height.trim().parse().wrap_err("invalid height")?,
    ))
}

fn describe(cache_type: CacheType) -> &'static str {
    match cache_type {
        CacheType::None => "network",
        CacheType::Memory => "memory cache",
        CacheType::Disk => "disk cache",
    }
}

async fn run(retriever: ImageRetriever, command: Command) -> Result<()> {
    match command {
        Command::Fetch {
            url,
            key,
            force_refresh,
            only_from_cache,
            memory_only,
            first_frame,
            preload_frames,
            scale,
            resize,
        } => {
            let resource = match key {
                Some(key) => Resource::new(key, url),
                None => Resource::from_url(url),
            };

            let mut options = RetrievalOptions::default().with_scale_factor(scale);
            options.force_refresh = force_refresh;
            options.only_from_cache = only_from_cache;
            options.cache_memory_only = memory_only;
            options.only_first_frame = first_frame;
            options.preload_all_frames = preload_frames;
            if let Some(size) = resize {
                let (width, height) = parse_size(&size)?;
                options = options.with_processor(ResizeProcessor::new(width, height).aspect_fit());
            }

            let result = retriever.retrieve_async(resource, options).await?;
            let image = &result.image;
            println!("url:       {}", result.source_url);
            println!("source:    {}", describe(result.cache_type));
            println!("format:    {}", image.format());
            println!("size:      {}x{} px", image.width(), image.height());
            println!("frames:    {}", image.frame_count());
            if let Some(duration) = image.total_duration() {
                println!("duration:  {} ms", duration.as_millis());
            }
            println!("cost:      {} bytes", image.cost());

            retriever.cache().flush().await;
            info!(
                disk_entries = retriever.cache().disk().len(),
                disk_bytes = retriever.cache().disk().current_size(),
                "Cache state"
            );
        }
        Command::Clear { memory, disk } => {
            if !disk {
                retriever.clear_memory_cache();
                println!("memory cache cleared");
            }
            if !memory {
                retriever.clear_disk_cache().await?;
                println!("disk cache cleared");
            }
        }
        Command::CleanExpired => {
            let memory = retriever.clean_expired_memory_cache();
            let report = retriever.clean_expired_disk_cache().await?;
            println!(
                "removed {} expired and {} evicted disk entries ({} bytes), {} memory entries",
                report.expired, report.evicted, report.freed_bytes, memory
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let config = load_config(&args)?;

    init_logging(&config)?;

    info!(version = pixcache::VERSION, "Starting pixcache");

    let retriever = ImageRetriever::from_config(&config)
        .await
        .wrap_err("failed to set up image retriever")?;

    run(retriever, args.command).await
}
